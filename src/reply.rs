use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;
use serde::Serialize;
use std::convert::TryInto;
use std::time::Duration;

/// The response an application handler sends back for a [`Request`].
///
/// `Reply` is a small fluent builder: it is what a [`Respond`] implementation (or a closure)
/// returns to the ephemeral server started around it.
///
/// [`Request`]: crate::Request
/// [`Respond`]: crate::Respond
#[derive(Clone, Debug)]
pub struct Reply {
    mime: String,
    status_code: StatusCode,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
    delay: Option<Duration>,
}

// Handlers only exist inside tests: a malformed header or status code is a mistake in the test
// itself, so we panic with a clear message instead of threading `Result`s through the builder.
impl Reply {
    /// Start a reply with the given status code.
    pub fn new<S>(s: S) -> Self
    where
        S: TryInto<StatusCode>,
        <S as TryInto<StatusCode>>::Error: std::fmt::Debug,
    {
        let status_code = s.try_into().expect("Failed to convert into status code.");
        Self {
            status_code,
            headers: HeaderMap::new(),
            mime: String::new(),
            body: None,
            delay: None,
        }
    }

    /// Append a header, keeping any value already set under the same name.
    pub fn append_header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
        V: TryInto<HeaderValue>,
        <V as TryInto<HeaderValue>>::Error: std::fmt::Debug,
    {
        let key = key.try_into().expect("Failed to convert into header name.");
        let value = value
            .try_into()
            .expect("Failed to convert into header value.");
        self.headers.append(key, value);
        self
    }

    /// Set a header, replacing any value already set under the same name.
    pub fn insert_header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
        V: TryInto<HeaderValue>,
        <V as TryInto<HeaderValue>>::Error: std::fmt::Debug,
    {
        let key = key.try_into().expect("Failed to convert into header name.");
        let value = value
            .try_into()
            .expect("Failed to convert into header value.");
        self.headers.insert(key, value);
        self
    }

    /// Append a `Set-Cookie` header. `attributes` is copied verbatim after the pair,
    /// e.g. `"Path=/; HttpOnly"`.
    pub fn set_cookie(self, name: &str, value: &str, attributes: &str) -> Self {
        let cookie = if attributes.is_empty() {
            format!("{}={}", name, value)
        } else {
            format!("{}={}; {}", name, value, attributes)
        };
        self.append_header(http::header::SET_COOKIE, cookie.as_str())
    }

    /// Serialize `body` as JSON and set `Content-Type: application/json`.
    pub fn json<B: Serialize>(mut self, body: B) -> Self {
        let body = serde_json::to_vec(&body).expect("Failed to convert into body.");

        self.body = Some(body);
        self.mime = "application/json".to_string();
        self
    }

    /// Use `body` as a `text/plain` body.
    pub fn text<T: Into<String>>(mut self, body: T) -> Self {
        self.body = Some(body.into().into_bytes());
        self.mime = "text/plain".to_string();
        self
    }

    /// Use raw bytes as body with the given MIME type.
    ///
    /// Nothing is validated: the bytes are sent exactly as provided, which makes this the way to
    /// reply with payloads that do not match their declared content type.
    pub fn raw<B: Into<Vec<u8>>>(mut self, body: B, mime: &str) -> Self {
        self.body = Some(body.into());
        self.mime = mime.to_string();
        self
    }

    /// Wait for `delay` before sending the reply.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn into_hyper(self) -> (Response<Full<Bytes>>, Option<Duration>) {
        let mut headers = self.headers;
        if !self.mime.is_empty() && !headers.contains_key(http::header::CONTENT_TYPE) {
            if let Ok(mime) = HeaderValue::from_str(&self.mime) {
                headers.insert(http::header::CONTENT_TYPE, mime);
            }
        }

        let mut response = Response::new(Full::new(Bytes::from(self.body.unwrap_or_default())));
        *response.status_mut() = self.status_code;
        *response.headers_mut() = headers;
        (response, self.delay)
    }
}
