//! Trading logic: position sizing, trade filtering, retries and the copy engine.

mod config;
mod copy_engine;
mod notifications;
mod position_sizer;
mod reference_data;
mod retry;
mod trade_filter;

pub use config::EngineConfig;
pub use copy_engine::{CopyEngine, TradeSummary};
pub use notifications::{LogSink, Notification, NotificationSink};
pub use position_sizer::PositionSizer;
pub use reference_data::{ReferenceData, StaticReferenceData};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use trade_filter::TradeFilter;
