//! Data models for leader trades, copy relationships, executions and positions.

mod execution;
mod position;
mod relationship;
mod trade;

pub use execution::{CopyExecution, ExecutionStatus, FillDetails};
pub use position::{DailyActivity, PositionBook};
pub use relationship::{
    BrokerageConnection, CopyRelationship, ExposureLimits, ProtectiveOrders, SizingConfig,
    SizingMethod, TradeFilters,
};
pub use trade::{AssetType, LeaderTrade, OptionDetails, OptionType, TradeAction};

#[cfg(test)]
pub use position::Position;
#[cfg(test)]
pub use relationship::RelationshipStatus;
#[cfg(test)]
pub use trade::OrderType;
