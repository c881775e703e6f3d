//! URL classification for the automatable marketplace.

use std::sync::OnceLock;

use regex::Regex;

const AMAZON_HOSTS: &[&str] =
    &["amazon.com", "amazon.com.mx", "amazon.co", "amzn.to", "a.co"];

pub fn is_amazon_url(url: &str) -> bool {
    let lowered = url.to_ascii_lowercase();
    AMAZON_HOSTS.iter().any(|host| lowered.contains(host))
}

fn asin_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // /dp/<ASIN> is the canonical product path.
            Regex::new(r"/dp/([A-Z0-9]{10})").unwrap(),
            Regex::new(r"/gp/product/([A-Z0-9]{10})").unwrap(),
            Regex::new(r"/([A-Z0-9]{10})(?:[/?]|$)").unwrap(),
        ]
    })
}

/// Pull the 10-character product identifier out of a marketplace URL, trying
/// the most specific path shapes first.
pub fn extract_asin(url: &str) -> Option<String> {
    for pattern in asin_patterns() {
        if let Some(captures) = pattern.captures(url) {
            if let Some(asin) = captures.get(1) {
                return Some(asin.as_str().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{extract_asin, is_amazon_url};

    #[test]
    fn recognizes_marketplace_hosts_case_insensitively() {
        assert!(is_amazon_url("https://www.amazon.com/dp/B08N5WRWNW"));
        assert!(is_amazon_url("https://WWW.AMAZON.COM.MX/dp/B08N5WRWNW"));
        assert!(is_amazon_url("https://amzn.to/3xyz"));
        assert!(is_amazon_url("https://a.co/d/abc123"));
        assert!(!is_amazon_url("https://www.ebay.com/itm/12345"));
        assert!(!is_amazon_url("https://example.com/dp/B08N5WRWNW-ish"));
    }

    #[test]
    fn extracts_asin_from_canonical_product_paths() {
        assert_eq!(
            extract_asin("https://www.amazon.com/dp/B08N5WRWNW?th=1"),
            Some("B08N5WRWNW".to_string())
        );
        assert_eq!(
            extract_asin("https://www.amazon.com/gp/product/B0C1J2K3L4"),
            Some("B0C1J2K3L4".to_string())
        );
        assert_eq!(
            extract_asin("https://www.amazon.com/Some-Product-Name/B0ABCDEFGH/ref=sr_1_1"),
            Some("B0ABCDEFGH".to_string())
        );
    }

    #[test]
    fn returns_none_when_no_asin_is_present() {
        assert_eq!(extract_asin("https://www.amazon.com/gp/cart/view.html"), None);
        assert_eq!(extract_asin("https://amzn.to/short"), None);
    }
}
