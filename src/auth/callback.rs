//! Redirect-back callback parsing
//!
//! The authorization server redirects to the host with the result in the query
//! string. Hosts forward it in one of three shapes:
//!
//! - `?cb-query=<base64 of the inner query>`
//! - `?source=<marker>&query=<inner query>`
//! - plain `?code=...&state=...`
//!
//! The marker (`state` or `source`) must name this extension's module, so a
//! callback meant for another extension is never consumed here.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use url::Url;

/// What a callback URL carried for this extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    Code(String),
    /// The provider redirected back with an `error` (e.g. `access_denied`).
    Denied(String),
}

/// Extract the callback result addressed to `marker`, if any.
pub fn read_callback(url: &Url, marker: &str) -> Option<CallbackResult> {
    let top: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    let get = |pairs: &[(String, String)], key: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };

    let (inner, marker_ok) = if let Some(encoded) = get(&top, "cb-query") {
        let decoded = decode_base64(&encoded)?;
        let inner = parse_query(&decoded);
        let ok = get(&inner, "state").as_deref() == Some(marker);
        (inner, ok)
    } else if let Some(source) = get(&top, "source") {
        let inner = parse_query(&get(&top, "query").unwrap_or_default());
        let state_ok = get(&inner, "state").map_or(true, |s| s == marker);
        (inner, source == marker && state_ok)
    } else {
        let ok = get(&top, "state").as_deref() == Some(marker);
        (top, ok)
    };

    if !marker_ok {
        tracing::debug!("Ignoring callback not addressed to '{}'", marker);
        return None;
    }

    if let Some(error) = get(&inner, "error") {
        return Some(CallbackResult::Denied(error));
    }

    get(&inner, "code")
        .filter(|c| !c.is_empty())
        .map(CallbackResult::Code)
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    let query = query.trim_start_matches('?');
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// Decode base64 in either alphabet, padded or not.
fn decode_base64(input: &str) -> Option<String> {
    // '+' arrives as ' ' when the host did not percent-encode the value
    let input = input.trim().replace(' ', "+");
    let bytes = STANDARD
        .decode(&input)
        .or_else(|_| STANDARD_NO_PAD.decode(&input))
        .or_else(|_| URL_SAFE.decode(&input))
        .or_else(|_| URL_SAFE_NO_PAD.decode(&input))
        .ok()?;
    String::from_utf8(bytes).ok()
}
