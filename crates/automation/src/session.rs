//! Storefront cart session. Owns one browser, walks the sign-in flow, and
//! adds products to the cart of the configured account.
//!
//! State moves strictly `Uninitialized -> Initialized -> LoggedIn`; cart
//! operations refuse to run before login instead of failing mid-page.

use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio::sync::Mutex;

use procura_core::config::ConfirmationMode;

use crate::driver::{BrowserDriver, DriverError, LaunchOptions};
use crate::selectors;

// How long the confirmation sweep keeps looking after the add-to-cart click.
const CONFIRMATION_SWEEPS: u32 = 6;

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("browser session is not initialized")]
    NotInitialized,
    #[error("not logged in to the storefront")]
    NotLoggedIn,
    #[error("no storefront credentials are configured")]
    CredentialsMissing,
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error("page element not found: {0}")]
    ElementNotFound(String),
    #[error("timed out during {0}")]
    Timeout(&'static str),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    LoggedIn,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Storefront domain, e.g. `amazon.com` or `amazon.com.mx`.
    pub marketplace: String,
    /// Budget for a single cart operation. Login gets twice this, the
    /// sign-in flow crosses several pages.
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub confirmation: ConfirmationMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            marketplace: "amazon.com".to_string(),
            timeout: Duration::from_secs(45),
            poll_interval: Duration::from_millis(500),
            confirmation: ConfirmationMode::Optimistic,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartConfirmation {
    /// False means the click landed but no confirmation marker rendered;
    /// only possible in optimistic mode.
    pub confirmed: bool,
    pub added_at: DateTime<Utc>,
}

#[derive(Clone)]
struct Credentials {
    email: String,
    password: SecretString,
    marketplace: String,
}

struct Inner<D> {
    driver: D,
    state: SessionState,
    credentials: Option<Credentials>,
    last_activity: DateTime<Utc>,
}

pub struct CartSession<D: BrowserDriver> {
    config: SessionConfig,
    inner: Mutex<Inner<D>>,
}

impl<D: BrowserDriver> CartSession<D> {
    pub fn new(driver: D, config: SessionConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                driver,
                state: SessionState::Uninitialized,
                credentials: None,
                last_activity: Utc::now(),
            }),
        }
    }

    pub async fn status(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn is_logged_in(&self) -> bool {
        self.inner.lock().await.state == SessionState::LoggedIn
    }

    pub async fn last_activity(&self) -> DateTime<Utc> {
        self.inner.lock().await.last_activity
    }

    /// Swapping credentials or marketplace drops any logged-in state; the
    /// next cart job logs in again under the new account. Re-setting
    /// identical credentials keeps the session as it is.
    pub async fn set_credentials(&self, email: &str, password: SecretString, marketplace: &str) {
        let mut inner = self.inner.lock().await;
        let unchanged = inner.credentials.as_ref().is_some_and(|current| {
            current.email == email
                && current.password.expose_secret() == password.expose_secret()
                && current.marketplace == marketplace
        });
        inner.credentials = Some(Credentials {
            email: email.to_string(),
            password,
            marketplace: marketplace.to_string(),
        });
        if inner.state == SessionState::LoggedIn && !unchanged {
            inner.state = SessionState::Initialized;
        }
    }

    /// Launches the browser and lands on the storefront home page. Calling
    /// again on a live session is a no-op.
    pub async fn initialize(&self) -> Result<(), AutomationError> {
        let mut inner = self.inner.lock().await;
        inner.last_activity = Utc::now();
        if inner.state != SessionState::Uninitialized {
            return Ok(());
        }

        let options = LaunchOptions {
            args: selectors::browser_args(),
            user_agent: selectors::USER_AGENT.to_string(),
        };
        inner.driver.start(&options).await?;

        if let Err(error) = inner.driver.navigate(&selectors::home_url(&self.config.marketplace)).await
        {
            let _ = inner.driver.quit().await;
            return Err(error.into());
        }

        inner.state = SessionState::Initialized;
        Ok(())
    }

    pub async fn login(&self) -> Result<(), AutomationError> {
        let mut guard = self.inner.lock().await;
        guard.last_activity = Utc::now();
        match guard.state {
            SessionState::Uninitialized => return Err(AutomationError::NotInitialized),
            SessionState::LoggedIn => return Ok(()),
            SessionState::Initialized => {}
        }
        let credentials =
            guard.credentials.clone().ok_or(AutomationError::CredentialsMissing)?;

        let budget = self.config.timeout * 2;
        let inner = &mut *guard;
        let outcome = tokio::time::timeout(
            budget,
            drive_login(&mut inner.driver, &credentials, self.config.poll_interval),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                inner.state = SessionState::LoggedIn;
                Ok(())
            }
            Ok(Err(error)) => Err(error),
            Err(_) => Err(AutomationError::LoginFailed(
                "no signed-in marker appeared within the login budget".to_string(),
            )),
        }
    }

    /// Navigates to the product page and clicks the first add-to-cart control
    /// present. Requires a logged-in session.
    pub async fn add_to_cart(
        &self,
        product_url: &str,
        quantity: u32,
    ) -> Result<CartConfirmation, AutomationError> {
        let mut guard = self.inner.lock().await;
        guard.last_activity = Utc::now();
        match guard.state {
            SessionState::Uninitialized => return Err(AutomationError::NotInitialized),
            SessionState::Initialized => return Err(AutomationError::NotLoggedIn),
            SessionState::LoggedIn => {}
        }

        let inner = &mut *guard;
        let outcome = tokio::time::timeout(
            self.config.timeout,
            drive_add_to_cart(&mut inner.driver, product_url, quantity, self.config.poll_interval),
        )
        .await;

        match outcome {
            Ok(Ok(true)) => Ok(CartConfirmation { confirmed: true, added_at: Utc::now() }),
            Ok(Ok(false)) => match self.config.confirmation {
                ConfirmationMode::Optimistic => {
                    tracing::debug!(
                        event_name = "automation.cart.unconfirmed",
                        product_url,
                        "add-to-cart click landed without a confirmation marker"
                    );
                    Ok(CartConfirmation { confirmed: false, added_at: Utc::now() })
                }
                ConfirmationMode::Strict => Err(AutomationError::ElementNotFound(
                    "cart confirmation marker".to_string(),
                )),
            },
            Ok(Err(error)) => Err(error),
            Err(_) => Err(AutomationError::Timeout("add to cart")),
        }
    }

    /// Tears down the browser; the session can be initialized again later.
    pub async fn close(&self) -> Result<(), AutomationError> {
        let mut inner = self.inner.lock().await;
        inner.last_activity = Utc::now();
        if inner.state == SessionState::Uninitialized {
            return Ok(());
        }
        inner.driver.quit().await?;
        inner.state = SessionState::Uninitialized;
        Ok(())
    }
}

async fn drive_login<D: BrowserDriver>(
    driver: &mut D,
    credentials: &Credentials,
    poll_interval: Duration,
) -> Result<(), AutomationError> {
    driver.navigate(&selectors::signin_url(&credentials.marketplace)).await?;
    driver.fill(selectors::EMAIL_FIELD, &credentials.email).await?;
    // Two-step sign-in pages put a continue button between email and password.
    if driver.exists(selectors::CONTINUE_BUTTON).await? {
        driver.click(selectors::CONTINUE_BUTTON).await?;
    }
    driver.fill(selectors::PASSWORD_FIELD, credentials.password.expose_secret()).await?;
    driver.click(selectors::SIGN_IN_BUTTON).await?;

    // Bounded by the caller's login budget.
    loop {
        for marker in selectors::LOGGED_IN_MARKERS {
            if driver.exists(marker).await? {
                return Ok(());
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Returns whether a confirmation marker rendered after the click.
async fn drive_add_to_cart<D: BrowserDriver>(
    driver: &mut D,
    product_url: &str,
    quantity: u32,
    poll_interval: Duration,
) -> Result<bool, AutomationError> {
    driver.navigate(product_url).await?;

    if quantity > 1 && driver.exists(selectors::QUANTITY_FIELD).await? {
        driver.fill(selectors::QUANTITY_FIELD, &quantity.to_string()).await?;
    }

    let mut clicked = false;
    for button in selectors::ADD_TO_CART_BUTTONS {
        if driver.exists(button).await? {
            driver.click(button).await?;
            clicked = true;
            break;
        }
    }
    if !clicked {
        return Err(AutomationError::ElementNotFound("add-to-cart button".to_string()));
    }

    for _ in 0..CONFIRMATION_SWEEPS {
        for marker in selectors::CART_CONFIRMATION_MARKERS {
            if driver.exists(marker).await? {
                return Ok(true);
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use secrecy::SecretString;

    use procura_core::config::ConfirmationMode;

    use crate::driver::{BrowserDriver, DriverError, LaunchOptions};
    use crate::selectors;

    use super::{AutomationError, CartSession, SessionConfig, SessionState};

    #[derive(Default)]
    struct ScriptState {
        present: HashSet<String>,
        reveal_on_click: HashMap<String, Vec<String>>,
        starts: u32,
        navigations: Vec<String>,
        filled: Vec<(String, String)>,
        clicked: Vec<String>,
        quits: u32,
    }

    /// In-memory driver scripted per test. Clones share state so assertions
    /// can inspect it after the session takes ownership.
    #[derive(Clone, Default)]
    struct ScriptedDriver {
        state: Arc<Mutex<ScriptState>>,
    }

    impl ScriptedDriver {
        fn with_elements(selectors: &[&str]) -> Self {
            let driver = Self::default();
            {
                let mut state = driver.state.lock().unwrap();
                state.present = selectors.iter().map(|s| s.to_string()).collect();
            }
            driver
        }

        fn reveal_on_click(&self, clicked: &str, revealed: &[&str]) {
            let mut state = self.state.lock().unwrap();
            state
                .reveal_on_click
                .insert(clicked.to_string(), revealed.iter().map(|s| s.to_string()).collect());
        }

        fn navigations(&self) -> Vec<String> {
            self.state.lock().unwrap().navigations.clone()
        }

        fn clicked(&self) -> Vec<String> {
            self.state.lock().unwrap().clicked.clone()
        }

        fn filled(&self) -> Vec<(String, String)> {
            self.state.lock().unwrap().filled.clone()
        }

        fn starts(&self) -> u32 {
            self.state.lock().unwrap().starts
        }
    }

    #[async_trait]
    impl BrowserDriver for ScriptedDriver {
        async fn start(&mut self, _options: &LaunchOptions) -> Result<(), DriverError> {
            self.state.lock().unwrap().starts += 1;
            Ok(())
        }

        async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
            self.state.lock().unwrap().navigations.push(url.to_string());
            Ok(())
        }

        async fn fill(&mut self, selector: &str, text: &str) -> Result<(), DriverError> {
            let mut state = self.state.lock().unwrap();
            if !state.present.contains(selector) {
                return Err(DriverError::Session(format!("no element matches `{selector}`")));
            }
            state.filled.push((selector.to_string(), text.to_string()));
            Ok(())
        }

        async fn click(&mut self, selector: &str) -> Result<(), DriverError> {
            let mut state = self.state.lock().unwrap();
            if !state.present.contains(selector) {
                return Err(DriverError::Session(format!("no element matches `{selector}`")));
            }
            state.clicked.push(selector.to_string());
            if let Some(revealed) = state.reveal_on_click.get(selector).cloned() {
                state.present.extend(revealed);
            }
            Ok(())
        }

        async fn exists(&mut self, selector: &str) -> Result<bool, DriverError> {
            Ok(self.state.lock().unwrap().present.contains(selector))
        }

        async fn quit(&mut self) -> Result<(), DriverError> {
            self.state.lock().unwrap().quits += 1;
            Ok(())
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            timeout: Duration::from_millis(40),
            poll_interval: Duration::from_millis(1),
            ..SessionConfig::default()
        }
    }

    fn signin_page() -> ScriptedDriver {
        ScriptedDriver::with_elements(&[
            selectors::EMAIL_FIELD,
            selectors::CONTINUE_BUTTON,
            selectors::PASSWORD_FIELD,
            selectors::SIGN_IN_BUTTON,
        ])
    }

    async fn logged_in_session(
        driver: ScriptedDriver,
        config: SessionConfig,
    ) -> CartSession<ScriptedDriver> {
        driver.reveal_on_click(selectors::SIGN_IN_BUTTON, &[selectors::LOGGED_IN_MARKERS[0]]);
        let session = CartSession::new(driver, config);
        session.initialize().await.expect("initialize");
        session
            .set_credentials("buyer@example.com", SecretString::from("hunter2"), "amazon.com")
            .await;
        session.login().await.expect("login");
        session
    }

    #[tokio::test]
    async fn cart_operations_require_a_login_first() {
        let driver = signin_page();
        let session = CartSession::new(driver.clone(), fast_config());
        session.initialize().await.expect("initialize");

        let error = session
            .add_to_cart("https://www.amazon.com/dp/B08N5WRWNW", 1)
            .await
            .expect_err("must refuse");
        assert!(matches!(error, AutomationError::NotLoggedIn));

        // Only the home page was visited; the product URL never loaded.
        assert_eq!(driver.navigations(), vec!["https://www.amazon.com".to_string()]);
    }

    #[tokio::test]
    async fn uninitialized_session_refuses_everything_but_initialize() {
        let session = CartSession::new(ScriptedDriver::default(), fast_config());

        assert!(matches!(session.login().await, Err(AutomationError::NotInitialized)));
        assert!(matches!(
            session.add_to_cart("https://www.amazon.com/dp/B08N5WRWNW", 1).await,
            Err(AutomationError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let driver = ScriptedDriver::default();
        let session = CartSession::new(driver.clone(), fast_config());

        session.initialize().await.expect("first");
        session.initialize().await.expect("second");
        assert_eq!(driver.starts(), 1);
        assert_eq!(session.status().await, SessionState::Initialized);
    }

    #[tokio::test]
    async fn login_walks_the_signin_flow_and_waits_for_a_marker() {
        let driver = signin_page();
        let session = logged_in_session(driver.clone(), fast_config()).await;

        assert!(session.is_logged_in().await);
        assert_eq!(
            driver.clicked(),
            vec![selectors::CONTINUE_BUTTON.to_string(), selectors::SIGN_IN_BUTTON.to_string()]
        );
        let filled = driver.filled();
        assert_eq!(filled[0], (selectors::EMAIL_FIELD.to_string(), "buyer@example.com".into()));
        assert_eq!(filled[1], (selectors::PASSWORD_FIELD.to_string(), "hunter2".into()));
    }

    #[tokio::test]
    async fn login_without_a_marker_times_out_and_stays_logged_out() {
        let driver = signin_page();
        let session = CartSession::new(driver, fast_config());
        session.initialize().await.expect("initialize");
        session
            .set_credentials("buyer@example.com", SecretString::from("hunter2"), "amazon.com")
            .await;

        let error = session.login().await.expect_err("must time out");
        assert!(matches!(error, AutomationError::LoginFailed(_)));
        assert!(!session.is_logged_in().await);
    }

    #[tokio::test]
    async fn login_without_credentials_is_refused() {
        let session = CartSession::new(signin_page(), fast_config());
        session.initialize().await.expect("initialize");

        assert!(matches!(session.login().await, Err(AutomationError::CredentialsMissing)));
    }

    #[tokio::test]
    async fn add_to_cart_clicks_the_first_button_present() {
        let driver = signin_page();
        {
            let mut state = driver.state.lock().unwrap();
            state.present.insert(selectors::ADD_TO_CART_BUTTONS[0].to_string());
            state.present.insert(selectors::ADD_TO_CART_BUTTONS[1].to_string());
            state.present.insert(selectors::CART_CONFIRMATION_MARKERS[0].to_string());
        }
        let session = logged_in_session(driver.clone(), fast_config()).await;

        let confirmation = session
            .add_to_cart("https://www.amazon.com/dp/B08N5WRWNW", 1)
            .await
            .expect("add to cart");
        assert!(confirmation.confirmed);
        assert_eq!(
            driver.clicked().last().map(String::as_str),
            Some(selectors::ADD_TO_CART_BUTTONS[0])
        );
    }

    #[tokio::test]
    async fn quantity_is_typed_when_the_field_exists() {
        let driver = signin_page();
        {
            let mut state = driver.state.lock().unwrap();
            state.present.insert(selectors::QUANTITY_FIELD.to_string());
            state.present.insert(selectors::ADD_TO_CART_BUTTONS[0].to_string());
            state.present.insert(selectors::CART_CONFIRMATION_MARKERS[0].to_string());
        }
        let session = logged_in_session(driver.clone(), fast_config()).await;

        session.add_to_cart("https://www.amazon.com/dp/B08N5WRWNW", 3).await.expect("add");
        assert!(driver
            .filled()
            .contains(&(selectors::QUANTITY_FIELD.to_string(), "3".to_string())));
    }

    #[tokio::test]
    async fn missing_add_button_reports_element_not_found() {
        let session = logged_in_session(signin_page(), fast_config()).await;

        let error = session
            .add_to_cart("https://www.amazon.com/dp/B08N5WRWNW", 1)
            .await
            .expect_err("no button");
        assert!(matches!(error, AutomationError::ElementNotFound(ref what) if what.contains("button")));
    }

    #[tokio::test]
    async fn optimistic_mode_accepts_an_unconfirmed_click() {
        let driver = signin_page();
        driver.state.lock().unwrap().present.insert(selectors::ADD_TO_CART_BUTTONS[0].to_string());
        let session = logged_in_session(driver, fast_config()).await;

        let confirmation = session
            .add_to_cart("https://www.amazon.com/dp/B08N5WRWNW", 1)
            .await
            .expect("optimistic success");
        assert!(!confirmation.confirmed);
    }

    #[tokio::test]
    async fn strict_mode_requires_a_confirmation_marker() {
        let driver = signin_page();
        driver.state.lock().unwrap().present.insert(selectors::ADD_TO_CART_BUTTONS[0].to_string());
        let config = SessionConfig { confirmation: ConfirmationMode::Strict, ..fast_config() };
        let session = logged_in_session(driver, config).await;

        let error = session
            .add_to_cart("https://www.amazon.com/dp/B08N5WRWNW", 1)
            .await
            .expect_err("strict refuses");
        assert!(matches!(error, AutomationError::ElementNotFound(ref what) if what.contains("confirmation")));
    }

    #[tokio::test]
    async fn swapping_credentials_forces_a_fresh_login() {
        let session = logged_in_session(signin_page(), fast_config()).await;
        assert!(session.is_logged_in().await);

        session
            .set_credentials("other@example.com", SecretString::from("different"), "amazon.com")
            .await;
        assert_eq!(session.status().await, SessionState::Initialized);
    }

    #[tokio::test]
    async fn changing_the_marketplace_also_forces_a_fresh_login() {
        let session = logged_in_session(signin_page(), fast_config()).await;

        session
            .set_credentials("buyer@example.com", SecretString::from("hunter2"), "amazon.com.mx")
            .await;
        assert_eq!(session.status().await, SessionState::Initialized);
    }

    #[tokio::test]
    async fn resetting_identical_credentials_keeps_the_login() {
        let session = logged_in_session(signin_page(), fast_config()).await;

        session
            .set_credentials("buyer@example.com", SecretString::from("hunter2"), "amazon.com")
            .await;
        assert!(session.is_logged_in().await);
    }

    #[tokio::test]
    async fn last_activity_refreshes_even_on_refused_calls() {
        let session = CartSession::new(ScriptedDriver::default(), fast_config());
        let before = session.last_activity().await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let _ = session.add_to_cart("https://www.amazon.com/dp/B08N5WRWNW", 1).await;
        assert!(session.last_activity().await > before);
    }

    #[tokio::test]
    async fn close_returns_the_session_to_uninitialized() {
        let session = logged_in_session(signin_page(), fast_config()).await;

        session.close().await.expect("close");
        assert_eq!(session.status().await, SessionState::Uninitialized);
        assert!(matches!(session.login().await, Err(AutomationError::NotInitialized)));
    }
}
