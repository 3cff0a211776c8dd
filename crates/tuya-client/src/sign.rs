//! Request signing for the Tuya OpenAPI
//!
//! Every call carries an HMAC-SHA256 signature over the client id, the access
//! token (absent for the token request itself), a millisecond timestamp, a
//! random nonce and a canonical description of the request:
//!
//! ```text
//! METHOD \n
//! hex(sha256(body)) \n
//! \n
//! /path?canonical-query
//! ```
//!
//! The third line is reserved for signed headers and is always empty here.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Value of the `sign_method` header
pub const SIGN_METHOD: &str = "HMAC-SHA256";

/// RFC 3986 unreserved characters are left as-is, everything else is escaped
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a string per RFC 3986 (spaces become `%20`, not `+`)
pub fn rfc3986_encode(value: &str) -> String {
    utf8_percent_encode(value, RFC3986).to_string()
}

/// Output of signing one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureResult {
    /// Uppercase hex HMAC-SHA256
    pub sign: String,
    /// Millisecond timestamp that was signed
    pub t: i64,
    /// 16 hex characters
    pub nonce: String,
}

/// Inputs to the signature of a single request
#[derive(Clone, Copy)]
pub struct SigningRequest<'a> {
    pub client_id: &'a str,
    pub secret: &'a str,
    /// `None` for the token request
    pub access_token: Option<&'a str>,
    pub method: &'a str,
    /// Path without the query string
    pub path: &'a str,
    /// Raw query string, without the leading `?`
    pub query: &'a str,
    pub body: &'a [u8],
}

impl std::fmt::Debug for SigningRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningRequest")
            .field("client_id", &self.client_id)
            .field("has_access_token", &self.access_token.is_some())
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl SigningRequest<'_> {
    /// Sign with the current time and a fresh nonce
    pub fn sign(&self) -> SignatureResult {
        self.sign_with(timestamp_millis(), &generate_nonce())
    }

    /// Sign with a caller-provided timestamp and nonce
    pub fn sign_with(&self, t: i64, nonce: &str) -> SignatureResult {
        let string_to_sign = string_to_sign(self.method, self.body, self.path, self.query);

        let mut base = String::with_capacity(
            self.client_id.len() + string_to_sign.len() + nonce.len() + 64,
        );
        base.push_str(self.client_id);
        if let Some(token) = self.access_token {
            base.push_str(token);
        }
        base.push_str(&t.to_string());
        base.push_str(nonce);
        base.push_str(&string_to_sign);

        SignatureResult {
            sign: hmac_sha256_upper(self.secret, &base),
            t,
            nonce: nonce.to_string(),
        }
    }
}

/// Build the canonical string-to-sign for a request
pub fn string_to_sign(method: &str, body: &[u8], path: &str, query: &str) -> String {
    let canonical = canonical_query(query);
    let url = if canonical.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, canonical)
    };

    format!("{}\n{}\n\n{}", method, content_sha256(body), url)
}

/// Sort query parameters by key and re-encode them per RFC 3986
///
/// Repeated keys keep the order of their values. Keys with empty values
/// are kept as `key=`.
pub fn canonical_query(query: &str) -> String {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
        if key.is_empty() {
            continue;
        }
        params
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }

    params
        .iter()
        .flat_map(|(key, values)| {
            values
                .iter()
                .map(move |value| format!("{}={}", rfc3986_encode(key), rfc3986_encode(value)))
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Lowercase hex SHA-256 of the body
pub fn content_sha256(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

fn hmac_sha256_upper(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    hex::encode_upper(mac.finalize().into_bytes())
}

/// Current time in milliseconds since the Unix epoch
pub fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 8 random bytes as 16 lowercase hex characters
pub fn generate_nonce() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn request<'a>(
        access_token: Option<&'a str>,
        query: &'a str,
        body: &'a [u8],
    ) -> SigningRequest<'a> {
        SigningRequest {
            client_id: "client123",
            secret: "secret456",
            access_token,
            method: "GET",
            path: "/v1.0/token",
            query,
            body,
        }
    }

    #[rstest]
    #[case("b=2&a=1&a=3", "a=1&a=3&b=2")]
    #[case("", "")]
    #[case("grant_type=1", "grant_type=1")]
    #[case("empty=&z=1", "empty=&z=1")]
    #[case("flag", "flag=")]
    #[case("name=living+room", "name=living%20room")]
    #[case("q=a%2Fb&p=%7E", "p=~&q=a%2Fb")]
    #[case("page_size=20&last_id=vdevo123", "last_id=vdevo123&page_size=20")]
    fn test_canonical_query(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(canonical_query(input), expected);
    }

    #[test]
    fn test_rfc3986_encode_keeps_unreserved() {
        assert_eq!(rfc3986_encode("AZaz09-._~"), "AZaz09-._~");
        assert_eq!(rfc3986_encode("a b/c"), "a%20b%2Fc");
        assert_eq!(rfc3986_encode("é"), "%C3%A9");
    }

    #[test]
    fn test_empty_body_hash() {
        assert_eq!(content_sha256(b""), EMPTY_SHA256);
    }

    #[test]
    fn test_string_to_sign_layout() {
        let s = string_to_sign("GET", b"", "/v1.0/token", "grant_type=1");
        assert_eq!(s, format!("GET\n{}\n\n/v1.0/token?grant_type=1", EMPTY_SHA256));

        let s = string_to_sign("GET", b"", "/v1.0/devices/abc", "");
        assert!(s.ends_with("\n\n/v1.0/devices/abc"));
        assert!(!s.contains('?'));
    }

    #[test]
    fn test_token_request_golden_vector() {
        let result =
            request(None, "grant_type=1", b"").sign_with(1700000000000, "0123456789abcdef");
        assert_eq!(
            result.sign,
            "826C5F75DB34D5886B1173130ACBE28A7EDA65C23F2CA9D79C56F7D69DFF96D5"
        );
        assert_eq!(result.t, 1700000000000);
        assert_eq!(result.nonce, "0123456789abcdef");
    }

    #[test]
    fn test_signed_request_golden_vector() {
        let body = br#"{"commands":[{"code":"switch_1","value":false}]}"#;
        let req = SigningRequest {
            method: "POST",
            path: "/v1.0/iot-03/devices/vdevo123/commands",
            ..request(Some("tok789"), "", body)
        };
        let result = req.sign_with(1700000000000, "0123456789abcdef");
        assert_eq!(
            result.sign,
            "DDB1DFEF4B2ABA1FB63F68E4BFCD09156FCB5B5EA7A239DEA25735691E40EF4B"
        );
    }

    #[test]
    fn test_signature_is_deterministic_for_fixed_inputs() {
        let req = request(Some("tok789"), "b=2&a=1", b"");
        let a = req.sign_with(1700000000000, "aaaaaaaaaaaaaaaa");
        let b = req.sign_with(1700000000000, "aaaaaaaaaaaaaaaa");
        assert_eq!(a, b);
        assert_eq!(a.sign.len(), 64);
        assert!(a.sign.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_token_changes_signature() {
        let with = request(Some("tok789"), "", b"").sign_with(1, "aaaaaaaaaaaaaaaa");
        let without = request(None, "", b"").sign_with(1, "aaaaaaaaaaaaaaaa");
        assert_ne!(with.sign, without.sign);
    }

    #[test]
    fn test_fresh_nonce_changes_signature() {
        let req = request(Some("tok789"), "", b"");
        let a = req.sign();
        let b = req.sign();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.sign, b.sign);
    }

    #[test]
    fn test_nonce_format() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), 16);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
