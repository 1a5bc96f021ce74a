//! Brokerage capability consumed by the copy engine.

use anyhow::Result;
use async_trait::async_trait;

use super::types::*;

/// Remote brokerage operations. Every call is network-bound and may fail transiently.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Search tradeable symbols. Needs no user credentials.
    async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>>;

    /// Live quote for `symbol` in the given account.
    async fn get_quote(
        &self,
        credentials: &BrokerCredentials,
        account_id: &str,
        symbol: &str,
    ) -> Result<Quote>;

    /// Pre-trade check. The returned ticket is consumed by [`place_order`](Self::place_order).
    async fn check_trade_impact(
        &self,
        credentials: &BrokerCredentials,
        request: &TradeImpactRequest,
    ) -> Result<TradeImpact>;

    /// Place the order behind a trade ticket.
    async fn place_order(
        &self,
        credentials: &BrokerCredentials,
        trade_id: &str,
        wait_to_confirm: bool,
    ) -> Result<PlacedOrder>;

    async fn cancel_order(
        &self,
        credentials: &BrokerCredentials,
        account_id: &str,
        order_id: &str,
    ) -> Result<()>;
}
