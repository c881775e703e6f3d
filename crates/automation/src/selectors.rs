//! Page markers for the Amazon storefront. Selector lists are ordered by how
//! often each variant shows up; the session clicks the first one present.

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const EMAIL_FIELD: &str = "#ap_email";
pub const CONTINUE_BUTTON: &str = "#continue";
pub const PASSWORD_FIELD: &str = "#ap_password";
pub const SIGN_IN_BUTTON: &str = "#signInSubmit";

/// Elements that only render once the storefront recognizes the session.
pub const LOGGED_IN_MARKERS: &[&str] = &["#nav-logo-sprites", "#nav-link-accountList"];

pub const QUANTITY_FIELD: &str = "#quantity";

pub const ADD_TO_CART_BUTTONS: &[&str] = &[
    "#add-to-cart-button",
    "#add-to-cart-button-ubb",
    "input[name=\"submit.add-to-cart\"]",
    "#turbo-checkout-pyo-button",
    "#one-click-button",
];

pub const CART_CONFIRMATION_MARKERS: &[&str] = &[
    "#huc-v2-order-row-confirm-text",
    "#NATC_SMART_WAGON_CONF_MSG_SUCCESS",
    "#sw-atc-confirmation",
    "#hlb-ptc-btn",
];

pub fn home_url(marketplace: &str) -> String {
    format!("https://www.{marketplace}")
}

pub fn signin_url(marketplace: &str) -> String {
    format!("https://www.{marketplace}/ap/signin?openid.pape.max_auth_age=0&openid.return_to=https%3A%2F%2Fwww.{marketplace}%2F&openid.assoc_handle=usflex&openid.mode=checkid_setup&openid.ns=http%3A%2F%2Fspecs.openid.net%2Fauth%2F2.0")
}

/// Chromium flags the storefront tolerates when driven headless.
pub fn browser_args() -> Vec<String> {
    [
        "--headless=new",
        "--disable-gpu",
        "--no-sandbox",
        "--disable-dev-shm-usage",
        "--disable-blink-features=AutomationControlled",
        "--window-size=1920,1080",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_the_configured_marketplace() {
        assert_eq!(home_url("amazon.com.mx"), "https://www.amazon.com.mx");
        assert!(signin_url("amazon.com").starts_with("https://www.amazon.com/ap/signin"));
    }

    #[test]
    fn primary_add_button_is_tried_first() {
        assert_eq!(ADD_TO_CART_BUTTONS[0], "#add-to-cart-button");
    }

    #[test]
    fn headless_args_disable_automation_fingerprint() {
        let args = browser_args();
        assert!(args.iter().any(|arg| arg.contains("AutomationControlled")));
        assert!(args.iter().any(|arg| arg.starts_with("--headless")));
    }
}
