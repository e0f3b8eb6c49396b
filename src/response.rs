use crate::request::{write_body, write_headers, BodyPrintLimit};
use http::{HeaderMap, StatusCode};
use hyper::body::Bytes;
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use url::Url;

/// The response received from the application under test.
///
/// A `Response` is immutable once built: every queued expectation gets a shared reference
/// to the same instance.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// The url the request was sent to, including the resolved address of the application.
    pub url: Url,
    /// The body as (lossy) UTF-8 text, whatever the declared content type.
    pub text: String,
    /// The body, parsed according to the declared content type.
    ///
    /// JSON (`application/json`, `*/*+json`) is parsed as is, url-encoded forms become an
    /// object of strings. Everything else - text, multipart payloads, unknown types - is never
    /// parsed: `body` is `Null` and the payload is only available, verbatim, in `text`/`raw`.
    pub body: Value,
    pub raw: Bytes,
}

impl Response {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, url: Url, raw: Bytes) -> Self {
        let content_type = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let body = parse_body(content_type, &raw);
        Self {
            status,
            text: String::from_utf8_lossy(&raw).into_owned(),
            body,
            headers,
            url,
            raw,
        }
    }

    /// The value of a header, if present and valid UTF-8. Lookup is case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(http::header::CONTENT_TYPE.as_str())
    }

    /// Deserialize the raw body as JSON, regardless of the declared content type.
    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.raw)
    }

    /// The `name=value` pairs set by the application through `Set-Cookie` headers.
    pub fn cookies(&self) -> Vec<SetCookie> {
        self.headers
            .get_all(http::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(SetCookie::parse)
            .collect()
    }

    pub(crate) fn print_with_limit(
        &self,
        mut buffer: impl fmt::Write,
        body_print_limit: BodyPrintLimit,
    ) -> fmt::Result {
        writeln!(buffer, "{} {}", self.status, self.url)?;
        write_headers(&mut buffer, &self.headers)?;
        write_body(&mut buffer, &self.raw, body_print_limit)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print_with_limit(f, BodyPrintLimit::default())
    }
}

/// A cookie found in a `Set-Cookie` response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    /// `Max-Age` attribute, in seconds, when present and valid.
    pub max_age: Option<i64>,
}

impl SetCookie {
    pub(crate) fn parse(header: &str) -> Option<Self> {
        let mut attributes = header.split(';');
        let (name, value) = attributes.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let max_age = attributes
            .filter_map(|attribute| attribute.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("max-age"))
            .and_then(|(_, value)| value.trim().parse().ok());
        Some(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
            max_age,
        })
    }

    /// `true` if the application asked the client to drop this cookie.
    pub fn is_removal(&self) -> bool {
        matches!(self.max_age, Some(age) if age <= 0)
    }
}

/// Derive the structured body from the raw payload.
///
/// This never fails: anything we cannot, or should not, parse degrades to `Null`.
pub(crate) fn parse_body(content_type: Option<&str>, raw: &[u8]) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if essence == "application/json" || essence.ends_with("+json") {
        match serde_json::from_slice(raw) {
            Ok(body) => body,
            Err(e) => {
                debug!("Response declared as `{}` is not valid JSON: {}", essence, e);
                Value::Null
            }
        }
    } else if essence == "application/x-www-form-urlencoded" {
        Value::Object(
            url::form_urlencoded::parse(raw)
                .into_owned()
                .map(|(key, value)| (key, Value::String(value)))
                .collect(),
        )
    } else {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_bodies_are_parsed() {
        let body = parse_body(Some("application/json; charset=utf-8"), br#"{"ok":true}"#);
        assert_eq!(body, json!({ "ok": true }));
        let body = parse_body(Some("application/problem+json"), br#"[1,2]"#);
        assert_eq!(body, json!([1, 2]));
    }

    #[test]
    fn malformed_json_degrades_to_null() {
        assert_eq!(parse_body(Some("application/json"), b"{not json"), Value::Null);
    }

    #[test]
    fn forms_become_objects_of_strings() {
        let body = parse_body(Some("application/x-www-form-urlencoded"), b"a=1&b=two%20words");
        assert_eq!(body, json!({ "a": "1", "b": "two words" }));
    }

    #[test]
    fn multipart_and_unknown_types_are_never_parsed() {
        let payload = b"--b\r\nContent-Disposition: form-data; name=\"x\"\r\n\r\ny\r\n--b--\r\n";
        assert_eq!(
            parse_body(Some("multipart/form-data; boundary=b"), payload),
            Value::Null
        );
        assert_eq!(parse_body(Some("application/x-unknown"), b"{}"), Value::Null);
        assert_eq!(parse_body(None, br#"{"ok":true}"#), Value::Null);
    }

    #[test]
    fn set_cookie_headers_are_parsed() {
        let cookie = SetCookie::parse("sid=abc123; Path=/; HttpOnly").unwrap();
        assert_eq!(cookie.name, "sid");
        assert_eq!(cookie.value, "abc123");
        assert!(!cookie.is_removal());

        let removal = SetCookie::parse("sid=; Max-Age=0").unwrap();
        assert!(removal.is_removal());

        assert!(SetCookie::parse("garbage").is_none());
    }
}
