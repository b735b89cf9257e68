//! Structural validators for untrusted input
//!
//! All checks are pure and never touch the network.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static TARGET_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[-a-zA-Z0-9@:%._\+~#=]{2,256}\.[a-z]{2,6}\b[-a-zA-Z0-9@:%_\+.~#?&/=]*$")
        .expect("target url pattern is valid")
});

/// Key the interaction payload is nested under
pub const UNTRUSTED_DATA_KEY: &str = "untrustedData";

/// Fields every interaction payload must carry under [`UNTRUSTED_DATA_KEY`]
pub const UNTRUSTED_DATA_FIELDS: [&str; 3] = ["fid", "url", "buttonIndex"];

/// True for absolute http(s) URLs with a dotted host and a TLD-shaped suffix
pub fn is_valid_target_url(url: &str) -> bool {
    TARGET_URL.is_match(url)
}

/// True when `payload.untrustedData` is an object holding `fid`, `url` and `buttonIndex`
///
/// Field values are not inspected.
pub fn is_valid_untrusted_payload(payload: &Value) -> bool {
    payload
        .get(UNTRUSTED_DATA_KEY)
        .and_then(Value::as_object)
        .map(|data| UNTRUSTED_DATA_FIELDS.iter().all(|f| data.contains_key(*f)))
        .unwrap_or(false)
}

/// True when `value` (or the JSON held in a string `value`) is a transaction intent
///
/// A transaction intent has `chainId`, `method`, and a `params` object with `to`.
/// Unparsable strings yield false.
pub fn is_transaction_payload(value: &Value) -> bool {
    match value {
        Value::String(text) => serde_json::from_str::<Value>(text)
            .map(|parsed| !parsed.is_string() && is_transaction_payload(&parsed))
            .unwrap_or(false),
        Value::Object(map) => {
            map.contains_key("chainId")
                && map.contains_key("method")
                && map
                    .get("params")
                    .and_then(Value::as_object)
                    .map(|params| params.contains_key("to"))
                    .unwrap_or(false)
        }
        _ => false,
    }
}
