use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("driver transport error: {0}")]
    Transport(String),
    #[error("driver session error: {0}")]
    Session(String),
    #[error("no browser session is active")]
    NoSession,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchOptions {
    pub args: Vec<String>,
    pub user_agent: String,
}

/// Seam between the cart session and whatever drives the browser. The
/// production implementation talks WebDriver over HTTP; tests script one in
/// memory.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn start(&mut self, options: &LaunchOptions) -> Result<(), DriverError>;

    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Clears the matched element and types `text` into it.
    async fn fill(&mut self, selector: &str, text: &str) -> Result<(), DriverError>;

    async fn click(&mut self, selector: &str) -> Result<(), DriverError>;

    async fn exists(&mut self, selector: &str) -> Result<bool, DriverError>;

    async fn quit(&mut self) -> Result<(), DriverError>;
}
