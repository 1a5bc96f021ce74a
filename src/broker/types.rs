//! Request and response types for the brokerage API.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::BrokerageConnection;

/// Per-user credentials for account-scoped calls.
#[derive(Debug, Clone)]
pub struct BrokerCredentials {
    pub user_id: String,
    pub user_secret: String,
}

impl From<&BrokerageConnection> for BrokerCredentials {
    fn from(conn: &BrokerageConnection) -> Self {
        Self {
            user_id: conn.broker_user_id.clone(),
            user_secret: conn.broker_user_secret.clone(),
        }
    }
}

/// Symbol search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolMatch {
    /// Broker's internal (universal) symbol id
    #[serde(rename = "id")]
    pub symbol_id: String,
    pub symbol: String,
    #[serde(default)]
    pub description: String,
}

/// Quote for a single symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Quote {
    #[serde(default, alias = "last_trade_price")]
    pub last_price: Option<Decimal>,
    #[serde(default)]
    pub bid_price: Option<Decimal>,
    #[serde(default)]
    pub ask_price: Option<Decimal>,
}

impl Quote {
    /// Best single price: last trade, else bid/ask midpoint, else whichever side exists.
    pub fn price(&self) -> Option<Decimal> {
        let positive = |p: Option<Decimal>| p.filter(|v| *v > Decimal::ZERO);

        if let Some(last) = positive(self.last_price) {
            return Some(last);
        }
        match (positive(self.bid_price), positive(self.ask_price)) {
            (Some(bid), Some(ask)) => Some((bid + ask) / dec!(2)),
            (Some(bid), None) => Some(bid),
            (None, Some(ask)) => Some(ask),
            (None, None) => None,
        }
    }
}

/// Pre-trade check request.
#[derive(Debug, Clone, Serialize)]
pub struct TradeImpactRequest {
    pub account_id: String,
    /// "BUY" or "SELL"
    pub action: String,
    pub universal_symbol_id: String,
    pub order_type: String,
    pub time_in_force: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub units: Decimal,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,
}

/// Trade ticket returned by the pre-trade check. The id is short-lived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactTrade {
    pub id: String,
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Cash and fee impact of a prospective trade.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImpactDetail {
    #[serde(default)]
    pub remaining_cash: Option<Decimal>,
    #[serde(default)]
    pub estimated_commissions: Option<Decimal>,
    #[serde(default)]
    pub forex_fees: Option<Decimal>,
}

/// Pre-trade check response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeImpact {
    #[serde(default)]
    pub trade: Option<ImpactTrade>,
    #[serde(default)]
    pub trade_impacts: Vec<ImpactDetail>,
}

/// Order placement response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlacedOrder {
    #[serde(default, alias = "brokerage_order_id")]
    pub order_id: Option<String>,
    #[serde(default, alias = "execution_price")]
    pub executed_price: Option<Decimal>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "filled_quantity")]
    pub filled_units: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_price_preference() {
        let quote = Quote {
            last_price: Some(dec!(10.5)),
            bid_price: Some(dec!(10)),
            ask_price: Some(dec!(11)),
        };
        assert_eq!(quote.price(), Some(dec!(10.5)));

        let quote = Quote {
            last_price: Some(Decimal::ZERO),
            bid_price: Some(dec!(10)),
            ask_price: Some(dec!(11)),
        };
        assert_eq!(quote.price(), Some(dec!(10.5)));

        assert_eq!(Quote::default().price(), None);
    }

    #[test]
    fn test_impact_request_sends_numbers() {
        let mut request = TradeImpactRequest {
            account_id: "acct-1".to_string(),
            action: "BUY".to_string(),
            universal_symbol_id: "sym-aapl".to_string(),
            order_type: "Limit".to_string(),
            time_in_force: "Day".to_string(),
            units: dec!(20),
            price: Some(dec!(50.5)),
        };

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["units"], serde_json::json!(20.0));
        assert_eq!(body["price"], serde_json::json!(50.5));

        request.price = None;
        let body = serde_json::to_value(&request).unwrap();
        assert!(body["units"].is_number());
        assert!(body.get("price").is_none());
    }

    #[test]
    fn test_parse_impact_response() {
        let json = r#"{
            "trade": {"id": "139e307a-82f7-4402-b39e-4da7baa87758", "price": 24.56},
            "trade_impacts": [{"remaining_cash": 9000.5, "estimated_commissions": 0}]
        }"#;
        let impact: TradeImpact = serde_json::from_str(json).unwrap();
        assert_eq!(impact.trade.unwrap().id, "139e307a-82f7-4402-b39e-4da7baa87758");
        assert_eq!(impact.trade_impacts[0].remaining_cash, Some(dec!(9000.5)));

        let empty: TradeImpact = serde_json::from_str("{}").unwrap();
        assert!(empty.trade.is_none());
    }

    #[test]
    fn test_parse_order_aliases() {
        let json = r#"{"brokerage_order_id": "66a033fa", "status": "EXECUTED",
                       "execution_price": 24.6, "filled_quantity": 4}"#;
        let order: PlacedOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.order_id.as_deref(), Some("66a033fa"));
        assert_eq!(order.executed_price, Some(dec!(24.6)));
        assert_eq!(order.filled_units, Some(dec!(4)));
    }
}
