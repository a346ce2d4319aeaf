//! Session-cookie helpers for cookie-authenticated providers

use std::fmt::Write;

use sha1::{Digest, Sha1};

/// Normalize a pasted cookie header: drop a leading `Cookie:` and line breaks.
pub fn normalize_cookie(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .strip_prefix("Cookie:")
        .or_else(|| trimmed.strip_prefix("cookie:"))
        .unwrap_or(trimmed);
    without_prefix
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Value of one cookie in a `name=value; name2=value2` header.
pub fn cookie_value<'a>(cookie: &'a str, name: &str) -> Option<&'a str> {
    cookie
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim())
}

/// The SAPISID used to sign requests, preferring the secure variant.
pub fn sapisid(cookie: &str) -> Option<&str> {
    cookie_value(cookie, "__Secure-3PAPISID")
        .or_else(|| cookie_value(cookie, "SAPISID"))
        .filter(|v| !v.is_empty())
}

/// `Authorization` header value: `SAPISIDHASH <ts>_<sha1("<ts> <sapisid> <origin>")>`.
pub fn sapisid_hash(sapisid: &str, origin: &str, timestamp: i64) -> String {
    let digest = Sha1::digest(format!("{} {} {}", timestamp, sapisid, origin).as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        let _ = write!(hex, "{:02x}", b);
    }
    format!("SAPISIDHASH {}_{}", timestamp, hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_cookie() {
        assert_eq!(
            normalize_cookie("Cookie: a=1;\n b=2 \n"),
            "a=1; b=2"
        );
        assert_eq!(normalize_cookie("  x=y  "), "x=y");
    }

    #[test]
    fn test_cookie_value_lookup() {
        let cookie = "HSID=h; SAPISID=plain; __Secure-3PAPISID=secure; PREF=f=1";
        assert_eq!(cookie_value(cookie, "HSID"), Some("h"));
        assert_eq!(cookie_value(cookie, "PREF"), Some("f=1"));
        assert_eq!(cookie_value(cookie, "MISSING"), None);
        assert_eq!(sapisid(cookie), Some("secure"));
        assert_eq!(sapisid("SAPISID=plain"), Some("plain"));
        assert_eq!(sapisid("HSID=h"), None);
        assert_eq!(sapisid("SAPISID="), None);
    }

    #[test]
    fn test_sapisid_hash_shape() {
        let header = sapisid_hash("abc", "https://music.youtube.com", 1700000000);
        let (prefix, rest) = header.split_once(' ').unwrap();
        assert_eq!(prefix, "SAPISIDHASH");
        let (ts, hex) = rest.split_once('_').unwrap();
        assert_eq!(ts, "1700000000");
        assert_eq!(hex.len(), 40);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(header, sapisid_hash("abc", "https://music.youtube.com", 1700000000));
    }
}
