//! Thin WebDriver (JSON wire) client. Speaks to a chromedriver endpoint and
//! keeps exactly one session.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::driver::{BrowserDriver, DriverError, LaunchOptions};

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

pub struct WebDriverClient {
    base_url: String,
    http: reqwest::Client,
    session_id: Option<String>,
}

impl WebDriverClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, DriverError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| DriverError::Transport(error.to_string()))?;

        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), http, session_id: None })
    }

    fn session_id(&self) -> Result<&str, DriverError> {
        self.session_id.as_deref().ok_or(DriverError::NoSession)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, DriverError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|error| DriverError::Transport(error.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|error| DriverError::Transport(error.to_string()))?;

        if !status.is_success() {
            return Err(DriverError::Session(wire_error(&payload)));
        }

        Ok(payload)
    }

    /// Returns the element reference for the first match, or `None` when the
    /// endpoint reports `no such element`.
    async fn find_element(&self, selector: &str) -> Result<Option<String>, DriverError> {
        let session_id = self.session_id()?;
        let response = self
            .http
            .post(format!("{}/session/{session_id}/element", self.base_url))
            .json(&json!({ "using": "css selector", "value": selector }))
            .send()
            .await
            .map_err(|error| DriverError::Transport(error.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|error| DriverError::Transport(error.to_string()))?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(DriverError::Session(wire_error(&payload)));
        }

        Ok(payload
            .pointer(&format!("/value/{ELEMENT_KEY}"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn require_element(&self, selector: &str) -> Result<String, DriverError> {
        self.find_element(selector)
            .await?
            .ok_or_else(|| DriverError::Session(format!("no element matches `{selector}`")))
    }
}

#[async_trait]
impl BrowserDriver for WebDriverClient {
    async fn start(&mut self, options: &LaunchOptions) -> Result<(), DriverError> {
        let payload = self.post("/session", capabilities(options)).await?;
        let session_id = payload
            .pointer("/value/sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Session("session response had no sessionId".to_string()))?;

        self.session_id = Some(session_id.to_string());
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        let session_id = self.session_id()?;
        self.post(&format!("/session/{session_id}/url"), json!({ "url": url })).await?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, text: &str) -> Result<(), DriverError> {
        let element = self.require_element(selector).await?;
        let session_id = self.session_id()?;
        self.post(&format!("/session/{session_id}/element/{element}/clear"), json!({})).await?;
        self.post(
            &format!("/session/{session_id}/element/{element}/value"),
            json!({ "text": text }),
        )
        .await?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), DriverError> {
        let element = self.require_element(selector).await?;
        let session_id = self.session_id()?;
        self.post(&format!("/session/{session_id}/element/{element}/click"), json!({})).await?;
        Ok(())
    }

    async fn exists(&mut self, selector: &str) -> Result<bool, DriverError> {
        Ok(self.find_element(selector).await?.is_some())
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        let Some(session_id) = self.session_id.take() else {
            return Ok(());
        };

        self.http
            .delete(format!("{}/session/{session_id}", self.base_url))
            .send()
            .await
            .map_err(|error| DriverError::Transport(error.to_string()))?;
        Ok(())
    }
}

fn wire_error(payload: &Value) -> String {
    payload
        .pointer("/value/message")
        .and_then(Value::as_str)
        .unwrap_or("webdriver request failed")
        .to_string()
}

/// New-session payload with the chromium flags and user agent baked in.
fn capabilities(options: &LaunchOptions) -> Value {
    let mut args = options.args.clone();
    args.push(format!("--user-agent={}", options.user_agent));

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": { "args": args }
            }
        }
    })
}
