//! Shared HTTP helpers for the provider adapters

use serde::de::DeserializeOwned;

use super::ApiError;

/// Check HTTP response status code and return a clear error on failure.
pub async fn check_response(
    resp: reqwest::Response,
    url: &str,
) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Http {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        });
    }
    Ok(resp)
}

/// Read a JSON body, tolerating trailing commas some endpoints emit.
pub async fn read_json<T: DeserializeOwned>(
    resp: reqwest::Response,
    url: &str,
) -> Result<T, ApiError> {
    let text = resp.text().await.map_err(|e| ApiError::network(url, e))?;
    parse_json_lax(&text).map_err(|e| ApiError::malformed(url, e.to_string()))
}

/// Parse JSON strictly, then retry once with trailing commas removed.
pub fn parse_json_lax<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(strict_err) => {
            tracing::debug!("Strict JSON parse failed ({}), retrying lax", strict_err);
            serde_json::from_str(&strip_trailing_commas(text))
        }
    }
}

/// Remove commas directly followed (modulo whitespace) by `}` or `]`,
/// leaving string contents alone.
pub fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }

    out
}
