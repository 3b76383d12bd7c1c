use async_trait::async_trait;
use ragcore_domain::{Endpoint, IngestionUnit, UnitId};
use serde_json::Value;
use tracing::debug;

use crate::driver::Driver;
use crate::error::DriverError;
use crate::record::SyncOutcome;

/// Calls a source system over plain HTTP: `GET {url}/units` to enumerate units, `POST
/// {url}/units/{unitId}/sync` to pull one page. Grounded on the ner crate's `HttpLlmProvider`
/// (generic JSON-in/out over a configured endpoint) and generalized from the orchestration tool's
/// cloud-provider HTTP clients (auth header, status-to-`DriverError` mapping) to the pull-based
/// driver contract. The request/response bodies reuse the domain's own wire types directly, the
/// same way a source that natively speaks this protocol would.
pub struct HttpDriver {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl HttpDriver {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    /// Per-endpoint `config["apiKey"]` overrides the driver-level default, so one registered
    /// `HttpDriver` can still serve endpoints belonging to different tenants with different
    /// credentials.
    fn authed(&self, endpoint: &Endpoint, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let key = endpoint
            .config
            .get("apiKey")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| self.api_key.clone());
        match key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    fn classify_transport_error(err: reqwest::Error) -> DriverError {
        if err.is_timeout() || err.is_connect() {
            DriverError::RetriableTransport(err.to_string())
        } else {
            DriverError::Unavailable(err.to_string())
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, DriverError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DriverError::from_status(status.as_u16(), body));
        }
        resp.json::<T>()
            .await
            .map_err(|e| DriverError::Internal(format!("malformed response body: {e}")))
    }
}

#[async_trait]
impl Driver for HttpDriver {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn list_units(&self, endpoint: &Endpoint) -> Result<Vec<IngestionUnit>, DriverError> {
        debug!(endpoint_id = %endpoint.id, url = %endpoint.url, "HttpDriver: list_units");
        let url = format!("{}/units", endpoint.url.trim_end_matches('/'));
        let req = self.authed(endpoint, self.client.get(&url));
        let resp = req.send().await.map_err(Self::classify_transport_error)?;
        Self::decode(resp).await
    }

    async fn sync_unit(
        &self,
        endpoint: &Endpoint,
        unit_id: &UnitId,
        checkpoint: Value,
        limit: usize,
    ) -> Result<SyncOutcome, DriverError> {
        debug!(endpoint_id = %endpoint.id, unit_id = %unit_id, limit, "HttpDriver: sync_unit");
        let url = format!(
            "{}/units/{}/sync",
            endpoint.url.trim_end_matches('/'),
            unit_id.as_str()
        );
        let req = self
            .authed(endpoint, self.client.post(&url))
            .json(&serde_json::json!({
                "checkpoint": checkpoint,
                "limit": limit,
            }));
        let resp = req.send().await.map_err(Self::classify_transport_error)?;
        Self::decode(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn fixture_endpoint(config: HashMap<String, Value>) -> Endpoint {
        Endpoint {
            id: ragcore_domain::EndpointId::new("ep1"),
            source_id: "ep1".into(),
            display_name: "Remote".into(),
            driver_id: ragcore_domain::DriverId::new("http"),
            url: "http://example.invalid".into(),
            auth_policy_ref: None,
            project_id: None,
            domain_id: Some("org1".into()),
            labels: vec![],
            config,
            detected_version: None,
            capabilities: vec![],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            deleted_at: None,
            delete_reason: None,
        }
    }

    #[test]
    fn unauthenticated_request_carries_no_bearer_header() {
        let driver = HttpDriver::new(None);
        let client = reqwest::Client::new();
        let ep = fixture_endpoint(HashMap::new());
        let req = driver.authed(&ep, client.get("http://example.invalid/units"));
        let built = req.build().unwrap();
        assert!(built.headers().get("authorization").is_none());
    }

    #[test]
    fn driver_level_key_is_used_when_endpoint_has_none() {
        let driver = HttpDriver::new(Some("secret-token".into()));
        let client = reqwest::Client::new();
        let ep = fixture_endpoint(HashMap::new());
        let req = driver.authed(&ep, client.get("http://example.invalid/units"));
        let built = req.build().unwrap();
        let header = built.headers().get("authorization").unwrap();
        assert!(header.to_str().unwrap().starts_with("Bearer "));
    }

    #[test]
    fn endpoint_level_key_overrides_driver_default() {
        let driver = HttpDriver::new(Some("driver-token".into()));
        let client = reqwest::Client::new();
        let mut config = HashMap::new();
        config.insert("apiKey".to_string(), Value::String("endpoint-token".into()));
        let ep = fixture_endpoint(config);
        let req = driver.authed(&ep, client.get("http://example.invalid/units"));
        let built = req.build().unwrap();
        let header = built.headers().get("authorization").unwrap().to_str().unwrap().to_string();
        assert_eq!(header, "Bearer endpoint-token");
    }
}
