//! Signed request dispatch and response classification

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{Result, ResultExt, TuyaClientError};
use crate::sign::{SigningRequest, SIGN_METHOD};
use crate::token::{TokenManager, TOKEN_PATH};
use crate::transport::{HttpRequest, Transport};
use crate::types::{AccessToken, Credentials};

/// Performs authenticated calls against the OpenAPI
///
/// Every call is signed, sent through the [`Transport`] and its JSON
/// envelope classified. The first call logs in transparently.
#[derive(Debug)]
pub struct RequestDispatcher {
    credentials: Credentials,
    base_url: Url,
    transport: Arc<dyn Transport>,
    tokens: TokenManager,
}

impl RequestDispatcher {
    pub fn new(credentials: Credentials, base_url: Url, transport: Arc<dyn Transport>) -> Self {
        Self {
            credentials,
            base_url,
            transport,
            tokens: TokenManager::new(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Return the held token, logging in first if there is none
    pub async fn ensure_token(&self) -> Result<AccessToken> {
        self.tokens.ensure_token(|| self.fetch_token()).await
    }

    async fn fetch_token(&self) -> Result<AccessToken> {
        let envelope = self
            .execute(Method::GET, TOKEN_PATH, Vec::new(), None)
            .await
            .with_context(|| "token request failed")?;

        let result = envelope.get("result").ok_or_else(|| {
            TuyaClientError::Auth(format!("unexpected token response: {}", envelope))
        })?;

        TokenManager::parse_token_result(result)
    }

    /// Signed GET; returns the `result` of the envelope
    pub async fn get(&self, path: &str) -> Result<Value> {
        let token = self.ensure_token().await?;
        let mut envelope = self
            .execute(Method::GET, path, Vec::new(), Some(token.as_str()))
            .await
            .with_context(|| format!("GET {}", path))?;

        match take_result(&mut envelope) {
            Some(result) => Ok(result),
            None => Err(unexpected_envelope(&envelope).context(format!("GET {}", path))),
        }
    }

    /// Signed POST with a JSON body; returns the whole envelope
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
        let body = serde_json::to_vec(body)
            .map_err(|e| TuyaClientError::Parse(format!("failed to encode request body: {}", e)))?;

        let token = self.ensure_token().await?;
        let envelope = self
            .execute(Method::POST, path, body, Some(token.as_str()))
            .await
            .with_context(|| format!("POST {}", path))?;

        if has_result(&envelope) {
            Ok(envelope)
        } else {
            Err(unexpected_envelope(&envelope).context(format!("POST {}", path)))
        }
    }

    /// Sign, send and decode one request, rejecting error envelopes
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
        access_token: Option<&str>,
    ) -> Result<Value> {
        let (base_path, query) = split_path(path);

        let signature = SigningRequest {
            client_id: &self.credentials.client_id,
            secret: &self.credentials.client_secret,
            access_token,
            method: method.as_str(),
            path: base_path,
            query,
            body: &body,
        }
        .sign();

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("client_id"),
            header_value(&self.credentials.client_id)?,
        );
        if let Some(token) = access_token {
            headers.insert(HeaderName::from_static("access_token"), header_value(token)?);
        }
        headers.insert(HeaderName::from_static("sign"), header_value(&signature.sign)?);
        headers.insert(
            HeaderName::from_static("sign_method"),
            HeaderValue::from_static(SIGN_METHOD),
        );
        headers.insert(HeaderName::from_static("t"), HeaderValue::from(signature.t));
        headers.insert(HeaderName::from_static("nonce"), header_value(&signature.nonce)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let url = endpoint_url(&self.base_url, path)?;
        debug!("{} {}", method, path);

        let raw = self
            .transport
            .send(HttpRequest {
                method,
                url,
                headers,
                body,
            })
            .await?;

        decode_envelope(&raw)
    }
}

/// Split `path?query` at the first `?`
pub(crate) fn split_path(path: &str) -> (&str, &str) {
    path.split_once('?').unwrap_or((path, ""))
}

/// Append an API path to the base URL, keeping any path prefix of the base
///
/// `http://proxy/tuya` + `/v1.0/token` gives `http://proxy/tuya/v1.0/token`.
/// The signature still covers the API path alone.
pub(crate) fn endpoint_url(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    base.set_query(None);
    base.set_fragment(None);
    let prefix = base.as_str().trim_end_matches('/');
    Ok(Url::parse(&format!("{}/{}", prefix, path.trim_start_matches('/')))?)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| TuyaClientError::InvalidHeader(e.to_string()))
}

/// Parse the body and reject both error envelope shapes
///
/// The cloud reports failures either as `{"success": false, ...}` or with a
/// `code` other than `0`/`"SUCCESS"`; both are checked, in that order.
pub(crate) fn decode_envelope(raw: &[u8]) -> Result<Value> {
    let envelope: Value = serde_json::from_slice(raw)
        .map_err(|e| TuyaClientError::Parse(format!("invalid JSON response: {}", e)))?;

    if let Some(obj) = envelope.as_object() {
        if obj.get("success") == Some(&Value::Bool(false)) {
            return Err(TuyaClientError::api(
                coerce_code(obj.get("code")),
                error_message(&envelope),
            ));
        }
        if let Some(code) = obj.get("code") {
            if !is_success_code(code) {
                return Err(TuyaClientError::api(
                    coerce_code(Some(code)),
                    error_message(&envelope),
                ));
            }
        }
    }

    Ok(envelope)
}

fn is_success_code(code: &Value) -> bool {
    match code {
        Value::Number(n) => n.as_i64() == Some(0),
        Value::String(s) => s == "SUCCESS",
        _ => false,
    }
}

/// Provider code as an integer; 0 when absent or not numeric
fn coerce_code(code: Option<&Value>) -> i64 {
    match code {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// `msg` if the envelope has one, otherwise the whole envelope
fn error_message(envelope: &Value) -> String {
    match envelope.get("msg") {
        Some(Value::String(msg)) => msg.clone(),
        Some(Value::Null) | None => envelope.to_string(),
        Some(other) => other.to_string(),
    }
}

fn has_result(envelope: &Value) -> bool {
    envelope.get("result").is_some_and(|r| !r.is_null())
}

fn take_result(envelope: &mut Value) -> Option<Value> {
    if !has_result(envelope) {
        return None;
    }
    envelope.as_object_mut()?.remove("result")
}

fn unexpected_envelope(envelope: &Value) -> TuyaClientError {
    TuyaClientError::api(0, format!("unexpected response: {}", envelope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sign::canonical_query;
    use crate::testing::ScriptedTransport;
    use crate::types::Region;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn dispatcher(transport: Arc<ScriptedTransport>) -> RequestDispatcher {
        RequestDispatcher::new(
            Credentials::new("client123", "secret456", Region::Eu),
            Url::parse("https://openapi.tuyaeu.com").unwrap(),
            transport,
        )
    }

    fn header<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
        request.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[rstest]
    #[case("/v1.0/devices/abc", ("/v1.0/devices/abc", ""))]
    #[case("/v1.0/token?grant_type=1", ("/v1.0/token", "grant_type=1"))]
    #[case("/p?a=1?b=2", ("/p", "a=1?b=2"))]
    fn test_split_path(#[case] path: &str, #[case] expected: (&str, &str)) {
        assert_eq!(split_path(path), expected);
    }

    #[rstest]
    #[case("https://openapi.tuyaeu.com", "https://openapi.tuyaeu.com/v1.0/token?grant_type=1")]
    #[case("https://openapi.tuyaeu.com/", "https://openapi.tuyaeu.com/v1.0/token?grant_type=1")]
    #[case("http://proxy.local/tuya", "http://proxy.local/tuya/v1.0/token?grant_type=1")]
    #[case("http://proxy.local/tuya/", "http://proxy.local/tuya/v1.0/token?grant_type=1")]
    fn test_endpoint_url_keeps_base_path(#[case] base: &str, #[case] expected: &str) {
        let base = Url::parse(base).unwrap();
        assert_eq!(endpoint_url(&base, TOKEN_PATH).unwrap().as_str(), expected);
    }

    #[tokio::test]
    async fn test_proxy_prefix_is_sent_but_not_signed() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(json!({"result": {"access_token": "tok"}}));
        transport.push_json(json!({"result": {"id": "d1"}}));

        let dispatcher = RequestDispatcher::new(
            Credentials::new("client123", "secret456", Region::Eu),
            Url::parse("http://proxy.local/tuya").unwrap(),
            transport.clone(),
        );
        dispatcher.get("/v1.0/devices/d1").await.unwrap();

        let request = &transport.requests()[1];
        assert_eq!(request.url.as_str(), "http://proxy.local/tuya/v1.0/devices/d1");
        let t: i64 = header(request, "t").unwrap().parse().unwrap();
        let expected = SigningRequest {
            client_id: "client123",
            secret: "secret456",
            access_token: Some("tok"),
            method: "GET",
            path: "/v1.0/devices/d1",
            query: "",
            body: b"",
        }
        .sign_with(t, header(request, "nonce").unwrap());
        assert_eq!(header(request, "sign"), Some(expected.sign.as_str()));
    }

    #[test]
    fn test_success_false_wins_over_result() {
        let err = decode_envelope(
            br#"{"success": false, "code": 1100, "msg": "param is empty", "result": []}"#,
        )
        .unwrap_err();
        match err {
            TuyaClientError::Api { code, message } => {
                assert_eq!(code, 1100);
                assert_eq!(message, "param is empty");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[rstest]
    #[case(r#"{"code": 1010, "msg": "token invalid"}"#, 1010, "token invalid")]
    #[case(r#"{"code": "2009", "msg": "not allow"}"#, 2009, "not allow")]
    #[case(r#"{"code": "FAILED", "msg": "nope"}"#, 0, "nope")]
    #[case(r#"{"success": false}"#, 0, r#"{"success":false}"#)]
    #[case(r#"{"success": false, "code": "abc", "msg": 42}"#, 0, "42")]
    fn test_error_envelopes(#[case] body: &str, #[case] code: i64, #[case] message: &str) {
        match decode_envelope(body.as_bytes()).unwrap_err() {
            TuyaClientError::Api { code: c, message: m } => {
                assert_eq!(c, code);
                assert_eq!(m, message);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[rstest]
    #[case(r#"{"code": 0, "result": 1}"#)]
    #[case(r#"{"code": "SUCCESS", "result": 1}"#)]
    #[case(r#"{"success": true, "result": 1}"#)]
    #[case(r#"[1, 2]"#)]
    fn test_success_envelopes(#[case] body: &str) {
        assert!(decode_envelope(body.as_bytes()).is_ok());
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = decode_envelope(b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, TuyaClientError::Parse(_)));
    }

    #[tokio::test]
    async fn test_first_get_logs_in_then_signs_with_token() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(json!({
            "success": true,
            "result": {"access_token": "tok789", "expire_time": 7200}
        }));
        transport.push_json(json!({"success": true, "result": {"id": "dev1"}}));
        transport.push_json(json!({"success": true, "result": {"id": "dev2"}}));

        let dispatcher = dispatcher(transport.clone());
        assert_eq!(dispatcher.get("/v1.0/devices/dev1").await.unwrap(), json!({"id": "dev1"}));
        assert_eq!(dispatcher.get("/v1.0/devices/dev2").await.unwrap(), json!({"id": "dev2"}));

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);

        let login = &requests[0];
        assert_eq!(login.method, Method::GET);
        assert_eq!(login.url.as_str(), "https://openapi.tuyaeu.com/v1.0/token?grant_type=1");
        assert_eq!(header(login, "access_token"), None);
        assert_eq!(header(login, "client_id"), Some("client123"));
        assert_eq!(header(login, "sign_method"), Some("HMAC-SHA256"));
        assert_eq!(header(login, "content-type"), Some("application/json"));

        let t: i64 = header(login, "t").unwrap().parse().unwrap();
        let nonce = header(login, "nonce").unwrap();
        let expected = SigningRequest {
            client_id: "client123",
            secret: "secret456",
            access_token: None,
            method: "GET",
            path: "/v1.0/token",
            query: "grant_type=1",
            body: b"",
        }
        .sign_with(t, nonce);
        assert_eq!(header(login, "sign"), Some(expected.sign.as_str()));

        for request in &requests[1..] {
            assert_eq!(header(request, "access_token"), Some("tok789"));
        }
        assert_eq!(
            dispatcher.tokens().current_token().await.unwrap().as_str(),
            "tok789"
        );
    }

    #[tokio::test]
    async fn test_get_signs_canonical_query() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(json!({"result": {"access_token": "tok"}}));
        transport.push_json(json!({"result": []}));

        let dispatcher = dispatcher(transport.clone());
        dispatcher.get("/v2.0/x?b=2&a=1").await.unwrap();

        let request = &transport.requests()[1];
        assert_eq!(request.url.query(), Some("b=2&a=1"));
        let t: i64 = header(request, "t").unwrap().parse().unwrap();
        let expected = SigningRequest {
            client_id: "client123",
            secret: "secret456",
            access_token: Some("tok"),
            method: "GET",
            path: "/v2.0/x",
            query: "b=2&a=1",
            body: b"",
        }
        .sign_with(t, header(request, "nonce").unwrap());
        assert_eq!(header(request, "sign"), Some(expected.sign.as_str()));
        assert_eq!(canonical_query("b=2&a=1"), "a=1&b=2");
    }

    #[tokio::test]
    async fn test_get_without_result_is_api_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(json!({"result": {"access_token": "tok"}}));
        transport.push_json(json!({"success": true, "t": 1}));

        let err = dispatcher(transport).get("/v1.0/devices/x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Api);
        assert_eq!(err.api_code(), Some(0));
        assert!(err.to_string().starts_with("GET /v1.0/devices/x"));
    }

    #[tokio::test]
    async fn test_post_returns_whole_envelope() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(json!({"result": {"access_token": "tok"}}));
        transport.push_json(json!({"success": true, "result": true, "t": 1700000000000i64}));

        let dispatcher = dispatcher(transport.clone());
        let body = json!({"commands": [{"code": "switch_1", "value": true}]});
        let response = dispatcher.post("/v1.0/iot-03/devices/d/commands", &body).await.unwrap();
        assert_eq!(
            response,
            json!({"success": true, "result": true, "t": 1700000000000i64})
        );

        let request = &transport.requests()[1];
        assert_eq!(request.method, Method::POST);
        assert_eq!(serde_json::from_slice::<Value>(&request.body).unwrap(), body);
    }

    #[tokio::test]
    async fn test_token_without_access_token_is_auth_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(json!({"success": true, "result": {"uid": "x"}}));

        let err = dispatcher(transport.clone()).get("/v1.0/devices/x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_token_api_error_propagates_with_context() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(json!({"success": false, "code": 1004, "msg": "sign invalid"}));

        let err = dispatcher(transport).get("/v1.0/devices/x").await.unwrap_err();
        assert_eq!(err.api_code(), Some(1004));
        assert!(err.to_string().contains("token request failed"));
    }

    #[tokio::test]
    async fn test_transport_error_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(json!({"result": {"access_token": "tok"}}));
        transport.push_error("connection reset");
        transport.push_json(json!({"result": {}}));

        let dispatcher = dispatcher(transport.clone());
        let err = dispatcher.get("/v1.0/devices/x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(transport.requests().len(), 2);
    }
}
