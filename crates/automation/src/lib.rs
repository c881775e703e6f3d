pub mod driver;
pub mod selectors;
pub mod session;
pub mod webdriver;

pub use driver::{BrowserDriver, DriverError, LaunchOptions};
pub use session::{
    AutomationError, CartConfirmation, CartSession, SessionConfig, SessionState,
};
pub use webdriver::WebDriverClient;
