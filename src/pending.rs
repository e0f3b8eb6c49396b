use crate::Error;
use http::header::{CONTENT_TYPE, COOKIE};
use http::{HeaderMap, HeaderValue, Method};
use serde::Serialize;
use serde_json::Value;
use url::Url;

/// A request body, as handed to [`Test::send`].
///
/// How it goes on the wire depends on the `Content-Type` of the request:
/// - an explicit JSON content type sends the body as JSON (text is sent as is);
/// - an explicit `application/x-www-form-urlencoded` content type url-encodes JSON objects;
/// - without an explicit content type, JSON values are sent as `application/json`, text as
///   `text/plain` and bytes as `application/octet-stream`.
///
/// [`Test::send`]: crate::Test::send
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Text(String),
    Bytes(Vec<u8>),
    Json(Value),
}

impl From<String> for Body {
    fn from(body: String) -> Self {
        Body::Text(body)
    }
}

impl From<&str> for Body {
    fn from(body: &str) -> Self {
        Body::Text(body.to_string())
    }
}

impl From<Vec<u8>> for Body {
    fn from(body: Vec<u8>) -> Self {
        Body::Bytes(body)
    }
}

impl From<&[u8]> for Body {
    fn from(body: &[u8]) -> Self {
        Body::Bytes(body.to_vec())
    }
}

impl From<Value> for Body {
    fn from(body: Value) -> Self {
        Body::Json(body)
    }
}

/// One part of a `multipart/form-data` body.
#[derive(Debug, Clone)]
pub(crate) enum FormPart {
    Field {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: Option<String>,
        content: Vec<u8>,
    },
}

/// Everything we know about a request before it is sent.
///
/// It belongs to exactly one `Test` and is moved into the exchange when the `Test` is
/// dispatched: from then on it can no longer change.
#[derive(Debug, Clone)]
pub(crate) struct PendingRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<Body>,
    pub(crate) parts: Vec<FormPart>,
    pub(crate) cookies: Vec<(String, String)>,
}

impl PendingRequest {
    pub(crate) fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            parts: Vec::new(),
            cookies: Vec::new(),
        }
    }

    /// Merge `pairs` into the query: keys passed in this call replace any earlier value,
    /// everything else is kept.
    pub(crate) fn merge_query(&mut self, pairs: Vec<(String, String)>) {
        merge_pairs(&mut self.query, pairs);
    }

    /// Set the body. Two JSON objects in a row are merged, anything else replaces the
    /// previous body.
    pub(crate) fn set_body(&mut self, body: Body) {
        self.body = match (self.body.take(), body) {
            (Some(Body::Json(Value::Object(mut current))), Body::Json(Value::Object(next))) => {
                current.extend(next);
                Some(Body::Json(Value::Object(current)))
            }
            (_, next) => Some(next),
        };
    }

    pub(crate) fn set_cookie(&mut self, name: &str, value: &str) {
        merge_pairs(
            &mut self.cookies,
            vec![(name.to_string(), value.to_string())],
        );
    }

    /// The full url of this request against `base`, the address of the application.
    pub(crate) fn url(&self, base: &Url) -> Result<Url, Error> {
        let url = if self.path.starts_with("http://") || self.path.starts_with("https://") {
            self.path.clone()
        } else if self.path.starts_with('/') {
            format!("{}{}", base.as_str().trim_end_matches('/'), self.path)
        } else {
            format!("{}/{}", base.as_str().trim_end_matches('/'), self.path)
        };
        let mut url = Url::parse(&url)
            .map_err(|e| Error::transport(format!("`{}` is not a valid url: {}", url, e), None))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }

    /// Build the transport request to send to the application at `base`.
    pub(crate) fn into_transport(
        self,
        client: &reqwest::Client,
        base: &Url,
    ) -> Result<reqwest::RequestBuilder, Error> {
        let url = self.url(base)?;
        let mut headers = self.headers;

        if !self.cookies.is_empty() {
            let cookies = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");
            let cookies = match headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
                Some(explicit) => format!("{}; {}", explicit, cookies),
                None => cookies,
            };
            let value = HeaderValue::from_str(&cookies)
                .map_err(|e| Error::transport(format!("Invalid cookie header: {}", e), None))?;
            headers.insert(COOKIE, value);
        }

        if !self.parts.is_empty() {
            // The transport picks the multipart boundary, and with it the content type.
            headers.remove(CONTENT_TYPE);
            let mut form = reqwest::multipart::Form::new();
            for part in self.parts {
                form = match part {
                    FormPart::Field { name, value } => form.text(name, value),
                    FormPart::File {
                        name,
                        file_name,
                        mime,
                        content,
                    } => {
                        let mut part =
                            reqwest::multipart::Part::bytes(content).file_name(file_name);
                        if let Some(mime) = mime {
                            part = part.mime_str(&mime)?;
                        }
                        form.part(name, part)
                    }
                };
            }
            return Ok(client
                .request(self.method, url)
                .headers(headers)
                .multipart(form));
        }

        let body = match self.body {
            Some(body) => Some(encode_body(&mut headers, body)?),
            None => None,
        };
        let mut builder = client.request(self.method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        Ok(builder)
    }
}

/// Serialize `body` according to the content type in `headers`, setting one if missing.
pub(crate) fn encode_body(headers: &mut HeaderMap, body: Body) -> Result<Vec<u8>, Error> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase());

    let encoded = match (content_type.as_deref(), body) {
        (_, Body::Text(text)) => {
            if content_type.is_none() {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                );
            }
            text.into_bytes()
        }
        (_, Body::Bytes(bytes)) => {
            if content_type.is_none() {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
            }
            bytes
        }
        (Some(ct), Body::Json(value)) if ct.starts_with("application/x-www-form-urlencoded") => {
            serde_urlencoded::to_string(value_to_pairs(&value))
                .map_err(|e| Error::transport(format!("Failed to url-encode body: {}", e), None))?
                .into_bytes()
        }
        (ct, Body::Json(value)) => {
            if ct.is_none() {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            serde_json::to_vec(&value)
                .map_err(|e| Error::transport(format!("Failed to serialize body: {}", e), None))?
        }
    };
    Ok(encoded)
}

/// Turn anything serializable into query/form pairs.
///
/// Maps and structs become `key=value` pairs, sequences of 2-tuples are taken as pairs and
/// strings are parsed as an already encoded query string (`"a=1&b=2"`).
pub(crate) fn to_pairs<T: Serialize + ?Sized>(params: &T) -> Vec<(String, String)> {
    let value = serde_json::to_value(params).expect("Failed to serialize query parameters.");
    value_to_pairs(&value)
}

fn value_to_pairs(value: &Value) -> Vec<(String, String)> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| (key.clone(), scalar_to_string(value)))
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item.as_array().map(Vec::as_slice) {
                Some([key, value]) => Some((scalar_to_string(key), scalar_to_string(value))),
                _ => None,
            })
            .collect(),
        Value::String(query) => url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
            .into_owned()
            .collect(),
        Value::Null => Vec::new(),
        other => panic!(
            "Query parameters must be a map, a list of pairs or a query string, got `{}`.",
            other
        ),
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn merge_pairs(current: &mut Vec<(String, String)>, next: Vec<(String, String)>) {
    current.retain(|(key, _)| !next.iter().any(|(new_key, _)| new_key == key));
    current.extend(next);
}
