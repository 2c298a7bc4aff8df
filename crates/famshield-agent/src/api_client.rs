use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use famshield_proto::api::{
    DetectionReport, KeywordsResponse, RulesResponse, UsageBaselineResponse, UsageReport,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::ServerConfig;
use crate::sync::SyncError;

/// Parent dashboard API.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn fetch_rules(&self, device_id: &str) -> Result<RulesResponse, SyncError>;

    async fn fetch_keywords(&self, device_id: &str) -> Result<KeywordsResponse, SyncError>;

    async fn fetch_usage_baseline(
        &self,
        device_id: &str,
        day: NaiveDate,
    ) -> Result<UsageBaselineResponse, SyncError>;

    async fn report_usage(&self, report: &UsageReport) -> Result<(), SyncError>;

    async fn report_detection(&self, report: &DetectionReport) -> Result<(), SyncError>;
}

/// [`RemoteApi`] over HTTPS with a bearer token.
pub struct HttpApi {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpApi {
    pub fn new(config: &ServerConfig) -> Result<Self, SyncError> {
        let raw = config
            .base_url
            .as_deref()
            .ok_or_else(|| SyncError::Config("server.base_url is not set".to_string()))?;

        // a trailing slash keeps the last path segment when joining
        let normalized = if raw.ends_with('/') { raw.to_string() } else { format!("{}/", raw) };
        let base_url = Url::parse(&normalized)
            .map_err(|e| SyncError::Config(format!("invalid server.base_url {}: {}", raw, e)))?;

        let client = Client::builder()
            .user_agent(format!("famshield-agent/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .build()?;

        Ok(Self { client, base_url, api_token: config.api_token.clone() })
    }

    fn url(&self, path: &str) -> Result<Url, SyncError> {
        self.base_url
            .join(path)
            .map_err(|e| SyncError::Config(format!("invalid request path {}: {}", path, e)))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SyncError> {
        debug!("GET {}", url);
        let response = self.authorized(self.client.get(url.clone())).send().await?;
        let response = check_status(response, &url)?;
        Ok(response.json::<T>().await?)
    }

    async fn post_json<B: Serialize + Sync>(&self, url: Url, body: &B) -> Result<(), SyncError> {
        debug!("POST {}", url);
        let response = self.authorized(self.client.post(url.clone())).json(body).send().await?;
        check_status(response, &url)?;
        Ok(())
    }
}

fn check_status(response: reqwest::Response, url: &Url) -> Result<reqwest::Response, SyncError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(SyncError::Unauthorized(format!("{} for {}", response.status(), url)))
        }
        status => Err(SyncError::Status { status: status.as_u16(), url: url.to_string() }),
    }
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn fetch_rules(&self, device_id: &str) -> Result<RulesResponse, SyncError> {
        self.get_json(self.url(&format!("devices/{}/rules", device_id))?).await
    }

    async fn fetch_keywords(&self, device_id: &str) -> Result<KeywordsResponse, SyncError> {
        self.get_json(self.url(&format!("devices/{}/keywords", device_id))?).await
    }

    async fn fetch_usage_baseline(
        &self,
        device_id: &str,
        day: NaiveDate,
    ) -> Result<UsageBaselineResponse, SyncError> {
        let mut url = self.url(&format!("devices/{}/usage", device_id))?;
        url.query_pairs_mut().append_pair("day", &day.format("%Y-%m-%d").to_string());
        self.get_json(url).await
    }

    async fn report_usage(&self, report: &UsageReport) -> Result<(), SyncError> {
        let url = self.url(&format!("devices/{}/usage", report.device_id))?;
        self.post_json(url, report).await
    }

    async fn report_detection(&self, report: &DetectionReport) -> Result<(), SyncError> {
        let url = self.url(&format!("devices/{}/detections", report.device_id))?;
        self.post_json(url, report).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: Option<&str>) -> ServerConfig {
        ServerConfig { base_url: base_url.map(String::from), ..Default::default() }
    }

    #[test]
    fn test_requires_base_url() {
        assert!(matches!(HttpApi::new(&config(None)), Err(SyncError::Config(_))));
        assert!(matches!(HttpApi::new(&config(Some("::nope"))), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_paths_keep_base_prefix() {
        let api = HttpApi::new(&config(Some("https://dashboard.example.cz/api/v1"))).unwrap();
        assert_eq!(
            api.url("devices/tablet-1/rules").unwrap().as_str(),
            "https://dashboard.example.cz/api/v1/devices/tablet-1/rules"
        );
    }
}
