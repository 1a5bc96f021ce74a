//! Simulated broker for dry runs: resolves every symbol and fills every order.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::info;

use super::gateway::BrokerGateway;
use super::types::*;

/// Dry-run broker. Quotes are unavailable, so the engine falls back to trade prices.
#[derive(Debug, Default)]
pub struct PaperBroker {
    order_count: AtomicU64,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_count(&self) -> u64 {
        self.order_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>> {
        let symbol = query.trim().to_uppercase();
        Ok(vec![SymbolMatch {
            symbol_id: format!("paper-{}", symbol),
            symbol,
            description: "Simulated listing".to_string(),
        }])
    }

    async fn get_quote(
        &self,
        _credentials: &BrokerCredentials,
        _account_id: &str,
        symbol: &str,
    ) -> Result<Quote> {
        Err(anyhow!("Paper broker has no market data for {}", symbol))
    }

    async fn check_trade_impact(
        &self,
        _credentials: &BrokerCredentials,
        request: &TradeImpactRequest,
    ) -> Result<TradeImpact> {
        Ok(TradeImpact {
            trade: Some(ImpactTrade {
                id: uuid::Uuid::new_v4().to_string(),
                price: request.price,
            }),
            trade_impacts: vec![ImpactDetail::default()],
        })
    }

    async fn place_order(
        &self,
        _credentials: &BrokerCredentials,
        trade_id: &str,
        _wait_to_confirm: bool,
    ) -> Result<PlacedOrder> {
        let n = self.order_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(trade_id = %trade_id, "[DRY RUN] Would place order");
        Ok(PlacedOrder {
            order_id: Some(format!("paper-{}", n)),
            executed_price: None,
            status: Some("SIMULATED".to_string()),
            filled_units: None,
        })
    }

    async fn cancel_order(
        &self,
        _credentials: &BrokerCredentials,
        _account_id: &str,
        order_id: &str,
    ) -> Result<()> {
        info!(order_id = %order_id, "[DRY RUN] Would cancel order");
        Ok(())
    }
}
