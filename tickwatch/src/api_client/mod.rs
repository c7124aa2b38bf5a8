//! HTTP client for the tickwatch API.

pub mod types;

use anyhow::{Context, Result, bail};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::ingress::AlertPayload;
use types::{
    ActionResult, AlertPatchRequest, AlertResponse, AlertView, ErrorBody, Health, MarkReadResult,
    Settings, SettingsPatchRequest,
};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7878";

/// Which suppression list a call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum List {
    Ignored,
    Snoozed,
}

impl List {
    fn path(self) -> &'static str {
        match self {
            List::Ignored => "ignored",
            List::Snoozed => "snoozed",
        }
    }
}

pub struct Client {
    base_url: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(url: impl Into<String>) -> Self {
        Self {
            base_url: url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/api/v0{}", self.base_url, path))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.checked(builder).await?;
        response.json().await.context("decoding response")
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        self.checked(builder).await?;
        Ok(())
    }

    async fn checked(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("connecting to {}", self.base_url))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match response.json::<ErrorBody>().await {
            Ok(body) => bail!("{status}: {}", body.error),
            Err(_) => bail!("{status}"),
        }
    }

    pub async fn health(&self) -> Result<Health> {
        self.send(self.request(Method::GET, "/health")).await
    }

    pub async fn post_alert(&self, symbol: &str, high_priority: bool) -> Result<AlertResponse> {
        let payload = AlertPayload {
            symbol: symbol.to_string(),
            high_priority: Some(high_priority),
        };
        self.send(self.request(Method::POST, "/alert").json(&payload))
            .await
    }

    pub async fn alerts(&self) -> Result<Vec<AlertView>> {
        self.send(self.request(Method::GET, "/alerts")).await
    }

    pub async fn clear_alerts(&self) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, "/alerts"))
            .await
    }

    pub async fn patch_alert(&self, symbol: &str, patch: &AlertPatchRequest) -> Result<AlertView> {
        self.send(
            self.request(Method::PATCH, &format!("/alerts/{symbol}"))
                .json(patch),
        )
        .await
    }

    pub async fn hide(&self, symbol: &str) -> Result<ActionResult> {
        self.send(self.request(Method::POST, &format!("/alerts/{symbol}/hide")))
            .await
    }

    pub async fn reveal(&self, symbol: &str) -> Result<ActionResult> {
        self.send(self.request(Method::POST, &format!("/alerts/{symbol}/reveal")))
            .await
    }

    pub async fn dismiss(&self, symbol: &str) -> Result<ActionResult> {
        self.send(self.request(Method::POST, &format!("/alerts/{symbol}/dismiss")))
            .await
    }

    pub async fn mark_all_read(&self) -> Result<MarkReadResult> {
        self.send(self.request(Method::POST, "/alerts/read")).await
    }

    pub async fn list(&self, list: List) -> Result<Vec<String>> {
        self.send(self.request(Method::GET, &format!("/{}", list.path())))
            .await
    }

    pub async fn add(&self, list: List, symbol: &str) -> Result<ActionResult> {
        self.send(self.request(Method::PUT, &format!("/{}/{symbol}", list.path())))
            .await
    }

    pub async fn remove(&self, list: List, symbol: &str) -> Result<ActionResult> {
        self.send(self.request(Method::DELETE, &format!("/{}/{symbol}", list.path())))
            .await
    }

    pub async fn clear(&self, list: List) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, &format!("/{}", list.path())))
            .await
    }

    pub async fn settings(&self) -> Result<Settings> {
        self.send(self.request(Method::GET, "/settings")).await
    }

    pub async fn patch_settings(&self, patch: &SettingsPatchRequest) -> Result<Settings> {
        self.send(self.request(Method::PATCH, "/settings").json(patch))
            .await
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
