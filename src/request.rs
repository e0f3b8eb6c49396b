use std::fmt;

use http::{HeaderMap, Method};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use url::Url;

pub const BODY_PRINT_LIMIT: usize = 10_000;

pub(crate) type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Specifies limitations on printing bodies in assertion failures and logs.
/// Some applications return bodies that are too large to reasonably print.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyPrintLimit {
    /// Maximum length of a body to print in bytes.
    Limited(usize),
    /// There is no limit to the size of a body that may be printed.
    Unlimited,
}

impl Default for BodyPrintLimit {
    fn default() -> Self {
        BodyPrintLimit::Limited(BODY_PRINT_LIMIT)
    }
}

/// A request received by the application under test.
///
/// Handlers get an immutable reference to a `Request` in [`Respond::respond`]: the body has
/// already been read in full, so it can be inspected as many times as needed.
///
/// [`Respond::respond`]: crate::Respond::respond
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Request {
    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// The query string as decoded key/value pairs, in order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url.query_pairs().into_owned().collect()
    }

    /// The body decoded as `application/x-www-form-urlencoded` pairs.
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(&self.body)
            .into_owned()
            .collect()
    }

    /// Look up a cookie sent by the client.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| key.trim() == name)
            .map(|(_, value)| value.trim().to_string())
    }

    pub(crate) async fn from_hyper(
        request: hyper::Request<hyper::body::Incoming>,
    ) -> Result<Request, DynError> {
        let (parts, body) = request.into_parts();
        let url = match parts.uri.authority() {
            Some(_) => parts.uri.to_string(),
            None => format!("http://localhost{}", parts.uri),
        }
        .parse()?;

        let body = body.collect().await?.to_bytes();

        Ok(Self {
            url,
            method: parts.method,
            headers: parts.headers,
            body: body.to_vec(),
        })
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.method, self.url)?;
        write_headers(&mut *f, &self.headers)?;
        write_body(f, &self.body, BodyPrintLimit::default())
    }
}

pub(crate) fn write_headers(mut buffer: impl fmt::Write, headers: &HeaderMap) -> fmt::Result {
    for name in headers.keys() {
        let values = headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()))
            .collect::<Vec<_>>();
        writeln!(buffer, "{}: {}", name, values.join(","))?;
    }
    Ok(())
}

pub(crate) fn write_body(
    mut buffer: impl fmt::Write,
    body: &[u8],
    body_print_limit: BodyPrintLimit,
) -> fmt::Result {
    match body_print_limit {
        BodyPrintLimit::Limited(limit) if body.len() > limit => {
            // Back off to the closest char boundary, at most 3 bytes away.
            let truncated = (limit.saturating_sub(3)..=limit)
                .rev()
                .find_map(|end| std::str::from_utf8(&body[..end]).ok());
            match truncated {
                Some(truncated) => {
                    writeln!(buffer, "{}", truncated)?;
                    writeln!(
                        buffer,
                        "We truncated the body because it was too large: {} bytes (limit: {} bytes)",
                        body.len(),
                        limit
                    )?;
                    writeln!(
                        buffer,
                        "Increase this limit by calling `TesterBuilder::body_print_limit`"
                    )
                }
                None => writeln!(
                    buffer,
                    "Body is likely binary (invalid utf-8) size is {} bytes",
                    body.len()
                ),
            }
        }
        _ => {
            if let Ok(body) = std::str::from_utf8(body) {
                writeln!(buffer, "{}", body)
            } else {
                writeln!(
                    buffer,
                    "Body is likely binary (invalid utf-8) size is {} bytes",
                    body.len()
                )
            }
        }
    }
}
