//! Signed HTTP client for the brokerage aggregation API.
//!
//! Every request carries `clientId` and `timestamp` query parameters (plus
//! `userId`/`userSecret` for account-scoped calls) and a `Signature` header:
//! base64 HMAC-SHA256 over the canonical `{"content","path","query"}` JSON,
//! keyed with the consumer key.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, instrument};

use super::gateway::BrokerGateway;
use super::types::*;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_BROKER_URL: &str = "https://api.snaptrade.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Brokerage API client.
pub struct BrokerClient {
    http: Client,
    base_url: String,
    client_id: String,
    consumer_key: String,
}

impl BrokerClient {
    /// Create a new client.
    pub fn new(base_url: &str, client_id: &str, consumer_key: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            consumer_key: consumer_key.to_string(),
        })
    }

    /// Create from environment variables:
    /// - BROKER_CLIENT_ID
    /// - BROKER_CONSUMER_KEY
    /// - BROKER_API_URL (defaults to the public API)
    pub fn from_env() -> Result<Self> {
        let client_id =
            std::env::var("BROKER_CLIENT_ID").context("BROKER_CLIENT_ID not set")?;
        let consumer_key =
            std::env::var("BROKER_CONSUMER_KEY").context("BROKER_CONSUMER_KEY not set")?;
        let base_url =
            std::env::var("BROKER_API_URL").unwrap_or_else(|_| DEFAULT_BROKER_URL.to_string());

        Self::new(&base_url, &client_id, &consumer_key)
    }

    /// Signature over path, encoded query string and JSON body.
    fn sign(&self, path: &str, query: &str, body: Option<&Value>) -> Result<String> {
        // serde_json maps are key-sorted, which gives the canonical form.
        let payload = json!({
            "content": body.cloned().unwrap_or(Value::Null),
            "path": path,
            "query": query,
        });
        let message = serde_json::to_string(&payload)?;

        let mut mac = HmacSha256::new_from_slice(self.consumer_key.as_bytes())
            .map_err(|e| anyhow!("Invalid consumer key: {}", e))?;
        mac.update(message.as_bytes());

        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    fn build_url(
        &self,
        path: &str,
        credentials: Option<&BrokerCredentials>,
        params: &[(&str, &str)],
    ) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .with_context(|| format!("Invalid broker URL for {}", path))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("clientId", &self.client_id);
            query.append_pair("timestamp", &Utc::now().timestamp().to_string());
            if let Some(creds) = credentials {
                query.append_pair("userId", &creds.user_id);
                query.append_pair("userSecret", &creds.user_secret);
            }
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        credentials: Option<&BrokerCredentials>,
        params: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<T> {
        let url = self.build_url(path, credentials, params)?;
        let signature = self.sign(path, url.query().unwrap_or_default(), body.as_ref())?;

        debug!(method = %method, path = %path, "Broker request");

        let mut request = self
            .http
            .request(method, url)
            .header("Signature", signature);
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Broker request to {} failed", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Broker request {} failed: {} - {}", path, status, text);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse broker response from {}", path))
    }
}

#[async_trait]
impl BrokerGateway for BrokerClient {
    #[instrument(skip(self))]
    async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>> {
        self.request(
            Method::POST,
            "/api/v1/symbols",
            None,
            &[],
            Some(json!({ "substring": query })),
        )
        .await
    }

    #[instrument(skip(self, credentials))]
    async fn get_quote(
        &self,
        credentials: &BrokerCredentials,
        account_id: &str,
        symbol: &str,
    ) -> Result<Quote> {
        let path = format!("/api/v1/accounts/{}/quotes", account_id);
        let quotes: Vec<Quote> = self
            .request(
                Method::GET,
                &path,
                Some(credentials),
                &[("symbols", symbol), ("use_ticker", "true")],
                None,
            )
            .await?;

        quotes
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No quote returned for {}", symbol))
    }

    #[instrument(skip(self, credentials, request), fields(symbol_id = %request.universal_symbol_id))]
    async fn check_trade_impact(
        &self,
        credentials: &BrokerCredentials,
        request: &TradeImpactRequest,
    ) -> Result<TradeImpact> {
        let body = serde_json::to_value(request)?;
        self.request(Method::POST, "/api/v1/trade/impact", Some(credentials), &[], Some(body))
            .await
    }

    #[instrument(skip(self, credentials))]
    async fn place_order(
        &self,
        credentials: &BrokerCredentials,
        trade_id: &str,
        wait_to_confirm: bool,
    ) -> Result<PlacedOrder> {
        let path = format!("/api/v1/trade/{}", trade_id);
        self.request(
            Method::POST,
            &path,
            Some(credentials),
            &[],
            Some(json!({ "wait_to_confirm": wait_to_confirm })),
        )
        .await
    }

    #[instrument(skip(self, credentials))]
    async fn cancel_order(
        &self,
        credentials: &BrokerCredentials,
        account_id: &str,
        order_id: &str,
    ) -> Result<()> {
        let path = format!("/api/v1/accounts/{}/orders/cancel", account_id);
        let _: Value = self
            .request(
                Method::POST,
                &path,
                Some(credentials),
                &[],
                Some(json!({ "brokerage_order_id": order_id })),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> BrokerClient {
        BrokerClient::new("https://broker.test/", "CLIENT", "consumer-key").unwrap()
    }

    #[test]
    fn test_sign_is_deterministic_base64() {
        let c = client();
        let body = json!({ "substring": "AAPL" });
        let a = c.sign("/api/v1/symbols", "clientId=CLIENT&timestamp=1", Some(&body)).unwrap();
        let b = c.sign("/api/v1/symbols", "clientId=CLIENT&timestamp=1", Some(&body)).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 44);
        assert!(BASE64.decode(&a).is_ok());

        let other = c.sign("/api/v1/symbols", "clientId=CLIENT&timestamp=2", Some(&body)).unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_build_url_adds_auth_params() {
        let creds = BrokerCredentials {
            user_id: "user 1".to_string(),
            user_secret: "s3cret".to_string(),
        };
        let url = client()
            .build_url("/api/v1/accounts/a1/quotes", Some(&creds), &[("symbols", "AAPL")])
            .unwrap();

        assert_eq!(url.path(), "/api/v1/accounts/a1/quotes");
        let query = url.query().unwrap();
        assert!(query.starts_with("clientId=CLIENT&timestamp="));
        assert!(query.contains("userId=user+1"));
        assert!(query.ends_with("symbols=AAPL"));
    }
}
