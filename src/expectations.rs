//! A collection of expectations provided out-of-the-box by `supertest`.
//!
//! If they are not enough for your specific testing needs you can implement your own thanks to
//! the [`Expect`] trait - closures taking a [`Response`] reference and returning
//! `Result<(), String>` implement it automatically.
//!
//! Check [`Expect`]'s documentation for examples.
use crate::{Expect, Response};
use assert_json_diff::{assert_json_matches_no_panic, CompareMode, Config};
use http::{HeaderName, HeaderValue, StatusCode};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::convert::TryInto;
use std::marker::PhantomData;
use std::ops::{Bound, RangeBounds};

#[derive(Debug)]
/// Expect the status code to be **exactly** the given one.
///
/// ### Example:
/// ```rust
/// use supertest::{Reply, Request};
/// use supertest::expectations::status;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let app = |_: &Request| Reply::new(201);
///
///     supertest::request(app)
///         .post("/users")
///         .expect(status(201))
///         .await
///         .unwrap();
/// }
/// ```
pub struct StatusExactExpectation(StatusCode);

/// Shorthand for [`StatusExactExpectation::new`].
pub fn status<S>(status: S) -> StatusExactExpectation
where
    S: TryInto<StatusCode>,
    <S as TryInto<StatusCode>>::Error: std::fmt::Debug,
{
    StatusExactExpectation::new(status)
}

impl StatusExactExpectation {
    pub fn new<S>(status: S) -> Self
    where
        S: TryInto<StatusCode>,
        <S as TryInto<StatusCode>>::Error: std::fmt::Debug,
    {
        Self(status.try_into().expect("Failed to convert into status code."))
    }
}

impl Expect for StatusExactExpectation {
    fn verify(&self, response: &Response) -> Result<(), String> {
        self.0.verify(response)
    }

    fn describe(&self) -> String {
        self.0.describe()
    }
}

#[derive(Debug)]
/// Expect the status code to fall within a range, e.g. `200..300`.
pub struct StatusRangeExpectation(Bound<u16>, Bound<u16>);

/// Shorthand for [`StatusRangeExpectation::new`].
pub fn status_in<R: RangeBounds<u16>>(range: R) -> StatusRangeExpectation {
    StatusRangeExpectation::new(range)
}

impl StatusRangeExpectation {
    pub fn new<R: RangeBounds<u16>>(range: R) -> Self {
        Self(range.start_bound().cloned(), range.end_bound().cloned())
    }
}

impl Expect for StatusRangeExpectation {
    fn verify(&self, response: &Response) -> Result<(), String> {
        let actual = response.status.as_u16();
        if (self.0, self.1).contains(&actual) {
            Ok(())
        } else {
            Err(format!("expected status in {}, got {}", self.describe_range(), actual))
        }
    }

    fn describe(&self) -> String {
        format!("status in {}", self.describe_range())
    }
}

impl StatusRangeExpectation {
    fn describe_range(&self) -> String {
        let start = match self.0 {
            Bound::Included(s) => format!("[{}", s),
            Bound::Excluded(s) => format!("({}", s),
            Bound::Unbounded => "(-inf".to_string(),
        };
        let end = match self.1 {
            Bound::Included(e) => format!("{}]", e),
            Bound::Excluded(e) => format!("{})", e),
            Bound::Unbounded => "+inf)".to_string(),
        };
        format!("{}, {}", start, end)
    }
}

#[derive(Debug)]
/// Expect a header to have **exactly** the given value.
///
/// The header name is case-insensitive. If the header is repeated, it is enough for one of its
/// values to be equal to `value`. [`header_regex`] is stricter: every value must match.
///
/// ### Example:
/// ```rust
/// use supertest::{Reply, Request};
/// use supertest::expectations::header;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let app = |_: &Request| Reply::new(200).json(serde_json::json!({}));
///
///     supertest::request(app)
///         .get("/")
///         .expect(header("Content-Type", "application/json"))
///         .await
///         .unwrap();
/// }
/// ```
pub struct HeaderExactExpectation(HeaderName, HeaderValue);

/// Shorthand for [`HeaderExactExpectation::new`].
pub fn header<K, V>(key: K, value: V) -> HeaderExactExpectation
where
    K: TryInto<HeaderName>,
    <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
    V: TryInto<HeaderValue>,
    <V as TryInto<HeaderValue>>::Error: std::fmt::Debug,
{
    HeaderExactExpectation::new(key, value)
}

impl HeaderExactExpectation {
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
        V: TryInto<HeaderValue>,
        <V as TryInto<HeaderValue>>::Error: std::fmt::Debug,
    {
        let key = key.try_into().expect("Failed to convert to header name.");
        let value = value
            .try_into()
            .expect("Failed to convert to header value.");
        Self(key, value)
    }
}

impl Expect for HeaderExactExpectation {
    fn verify(&self, response: &Response) -> Result<(), String> {
        let values: Vec<_> = response.headers.get_all(&self.0).iter().collect();
        if values.is_empty() {
            Err(format!("expected \"{}\" header field", self.0))
        } else if values.iter().any(|v| **v == self.1) {
            Ok(())
        } else {
            Err(format!(
                "expected \"{}\" of {:?}, got {:?}",
                self.0, self.1, values
            ))
        }
    }

    fn describe(&self) -> String {
        format!("header {} is {:?}", self.0, self.1)
    }
}

#[derive(Debug)]
/// Expect a header to be present, whatever its value.
pub struct HeaderExistsExpectation(HeaderName);

/// Shorthand for [`HeaderExistsExpectation::new`].
pub fn header_exists<K>(key: K) -> HeaderExistsExpectation
where
    K: TryInto<HeaderName>,
    <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
{
    HeaderExistsExpectation::new(key)
}

impl HeaderExistsExpectation {
    pub fn new<K>(key: K) -> Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
    {
        Self(key.try_into().expect("Failed to convert to header name."))
    }
}

impl Expect for HeaderExistsExpectation {
    fn verify(&self, response: &Response) -> Result<(), String> {
        match response.headers.get(&self.0) {
            Some(_) => Ok(()),
            None => Err(format!("expected \"{}\" header field", self.0)),
        }
    }

    fn describe(&self) -> String {
        format!("header {} exists", self.0)
    }
}

#[derive(Debug)]
/// Expect a header to be absent.
pub struct HeaderMissingExpectation(HeaderName);

/// Shorthand for [`HeaderMissingExpectation::new`].
pub fn header_missing<K>(key: K) -> HeaderMissingExpectation
where
    K: TryInto<HeaderName>,
    <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
{
    HeaderMissingExpectation::new(key)
}

impl HeaderMissingExpectation {
    pub fn new<K>(key: K) -> Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
    {
        Self(key.try_into().expect("Failed to convert to header name."))
    }
}

impl Expect for HeaderMissingExpectation {
    fn verify(&self, response: &Response) -> Result<(), String> {
        match response.headers.get(&self.0) {
            None => Ok(()),
            Some(value) => Err(format!(
                "unexpected \"{}\" header field, got {:?}",
                self.0, value
            )),
        }
    }

    fn describe(&self) -> String {
        format!("header {} is missing", self.0)
    }
}

#[derive(Debug)]
/// Match the value of a header against a regular expression.
///
/// If the header is repeated, every one of its values must match the pattern. [`header`] is
/// looser: one equal value is enough.
///
/// ### Example:
/// ```rust
/// use supertest::{Reply, Request};
/// use supertest::expectations::header_regex;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let app = |_: &Request| Reply::new(200).json(serde_json::json!({}));
///
///     supertest::request(app)
///         .get("/")
///         .expect(header_regex("content-type", r"^application/(.+\+)?json"))
///         .await
///         .unwrap();
/// }
/// ```
pub struct HeaderRegexExpectation(HeaderName, Regex);

/// Shorthand for [`HeaderRegexExpectation::new`].
pub fn header_regex<K>(key: K, value: &str) -> HeaderRegexExpectation
where
    K: TryInto<HeaderName>,
    <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
{
    HeaderRegexExpectation::new(key, value)
}

impl HeaderRegexExpectation {
    pub fn new<K>(key: K, value: &str) -> Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
    {
        let key = key.try_into().expect("Failed to convert to header name.");
        let value_matcher = Regex::new(value).expect("Failed to create regex for value matcher");
        Self(key, value_matcher)
    }
}

impl Expect for HeaderRegexExpectation {
    fn verify(&self, response: &Response) -> Result<(), String> {
        let values: Vec<_> = response
            .headers
            .get_all(&self.0)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
            .collect();
        if values.is_empty() {
            Err(format!("expected \"{}\" header field", self.0))
        } else if values.iter().all(|v| self.1.is_match(v)) {
            Ok(())
        } else {
            Err(format!(
                "expected \"{}\" matching {:?}, got {:?}",
                self.0,
                self.1.as_str(),
                values
            ))
        }
    }

    fn describe(&self) -> String {
        format!("header {} matches {:?}", self.0, self.1.as_str())
    }
}

#[derive(Debug)]
/// Expect the body to be **exactly** the given text or JSON document.
///
/// JSON comparisons are structural: key order and whitespace do not matter.
///
/// ### Example:
/// ```rust
/// use supertest::{Reply, Request};
/// use supertest::expectations::{body_json, body_string};
/// use serde_json::json;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let json_app = |_: &Request| Reply::new(200).json(json!({ "hello": "world" }));
///     supertest::request(json_app)
///         .get("/")
///         .expect(body_json(json!({ "hello": "world" })))
///         .await
///         .unwrap();
///
///     let text_app = |_: &Request| Reply::new(200).text("hello world");
///     supertest::request(text_app)
///         .get("/")
///         .expect(body_string("hello world"))
///         .await
///         .unwrap();
/// }
/// ```
pub struct BodyExactExpectation(Body);

#[derive(Debug)]
enum Body {
    Text(String),
    Json(Value),
}

impl BodyExactExpectation {
    /// Specify the expected body as a string.
    pub fn string<T: Into<String>>(body: T) -> Self {
        Self(Body::Text(body.into()))
    }

    /// Specify something JSON-serializable as the expected body.
    pub fn json<T: Serialize>(body: T) -> Self {
        Self(Body::Json(
            serde_json::to_value(body).expect("Failed to serialize JSON body"),
        ))
    }
}

/// Shorthand for [`BodyExactExpectation::string`].
pub fn body_string<T>(body: T) -> BodyExactExpectation
where
    T: Into<String>,
{
    BodyExactExpectation::string(body)
}

/// Shorthand for [`BodyExactExpectation::json`].
pub fn body_json<T>(body: T) -> BodyExactExpectation
where
    T: Serialize,
{
    BodyExactExpectation::json(body)
}

impl Expect for BodyExactExpectation {
    fn verify(&self, response: &Response) -> Result<(), String> {
        match &self.0 {
            Body::Text(text) if response.text == *text => Ok(()),
            Body::Text(text) => Err(format!("expected {:?} response body, got {:?}", text, response.text)),
            Body::Json(json) => {
                let config = Config::new(CompareMode::Strict);
                assert_json_matches_no_panic(&response.body, json, config)
            }
        }
    }

    fn describe(&self) -> String {
        match &self.0 {
            Body::Text(_) => "body equals text".to_string(),
            Body::Json(_) => "body equals JSON".to_string(),
        }
    }
}

#[derive(Debug)]
/// Expect the body text to contain the given substring.
pub struct BodyContainsExpectation(String);

/// Shorthand for [`BodyContainsExpectation`].
pub fn body_string_contains<T>(body: T) -> BodyContainsExpectation
where
    T: Into<String>,
{
    BodyContainsExpectation(body.into())
}

impl Expect for BodyContainsExpectation {
    fn verify(&self, response: &Response) -> Result<(), String> {
        if response.text.contains(&self.0) {
            Ok(())
        } else {
            Err(format!(
                "expected response body to contain {:?}, got {:?}",
                self.0, response.text
            ))
        }
    }

    fn describe(&self) -> String {
        format!("body contains {:?}", self.0)
    }
}

/// Match the body text against a regular expression.
///
/// It is a shorthand for using a [`Regex`] as expectation directly.
pub fn body_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("Failed to create regex for body matcher")
}

#[derive(Debug)]
/// Expect the parsed body to contain the given JSON document.
///
/// Fields missing from the expected document are ignored, so you can check a subset of a
/// larger payload.
///
/// ### Example:
/// ```rust
/// use supertest::{Reply, Request};
/// use supertest::expectations::body_partial_json;
/// use serde_json::json;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let app = |_: &Request| {
///         Reply::new(200).json(json!({ "id": 7, "name": "tj", "roles": ["admin"] }))
///     };
///
///     supertest::request(app)
///         .get("/users/7")
///         .expect(body_partial_json(json!({ "name": "tj" })))
///         .await
///         .unwrap();
/// }
/// ```
pub struct BodyPartialJsonExpectation(Value);

impl BodyPartialJsonExpectation {
    /// Specify the part of the body that should be matched as a JSON value.
    pub fn json<T: Serialize>(body: T) -> Self {
        Self(serde_json::to_value(body).expect("Can't serialize to JSON"))
    }
}

/// Shorthand for [`BodyPartialJsonExpectation::json`].
pub fn body_partial_json<T: Serialize>(body: T) -> BodyPartialJsonExpectation {
    BodyPartialJsonExpectation::json(body)
}

impl Expect for BodyPartialJsonExpectation {
    fn verify(&self, response: &Response) -> Result<(), String> {
        let config = Config::new(CompareMode::Inclusive);
        assert_json_matches_no_panic(&response.body, &self.0, config)
    }

    fn describe(&self) -> String {
        "body contains JSON".to_string()
    }
}

/// Expect the body to deserialize into `T`: a check on the shape of the payload rather than
/// on its exact content.
///
/// ### Example:
/// ```rust
/// use supertest::{Reply, Request};
/// use supertest::expectations::body_json_schema;
/// use serde_json::json;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Greeting {
///     hello: String,
/// }
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let app = |_: &Request| Reply::new(200).json(json!({ "hello": "world" }));
///
///     supertest::request(app)
///         .get("/")
///         .expect(body_json_schema::<Greeting>())
///         .await
///         .unwrap();
/// }
/// ```
pub fn body_json_schema<T>() -> BodyJsonSchemaExpectation<T>
where
    T: DeserializeOwned,
{
    BodyJsonSchemaExpectation(PhantomData)
}

#[derive(Debug)]
/// See [`body_json_schema`].
pub struct BodyJsonSchemaExpectation<T>(PhantomData<fn() -> T>);

impl<T: DeserializeOwned> Expect for BodyJsonSchemaExpectation<T> {
    fn verify(&self, response: &Response) -> Result<(), String> {
        response
            .body_json::<T>()
            .map(|_| ())
            .map_err(|e| format!("body does not deserialize into the expected shape: {}", e))
    }

    fn describe(&self) -> String {
        format!("body is a valid {}", std::any::type_name::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;
    use hyper::body::Bytes;
    use serde_json::json;

    fn json_response(body: Value) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.append(http::header::VARY, HeaderValue::from_static("accept"));
        headers.append(http::header::VARY, HeaderValue::from_static("origin"));
        Response::new(
            StatusCode::OK,
            headers,
            "http://127.0.0.1:1/".parse().unwrap(),
            Bytes::from(serde_json::to_vec(&body).unwrap()),
        )
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let response = json_response(json!({}));
        assert!(header("CONTENT-TYPE", "application/json").verify(&response).is_ok());
        assert!(header("content-type", "text/plain").verify(&response).is_err());
        assert!(header("vary", "origin").verify(&response).is_ok());
        assert!(header_exists("Content-Type").verify(&response).is_ok());
        assert!(header_missing("set-cookie").verify(&response).is_ok());
        assert!(header_missing("vary").verify(&response).is_err());
    }

    #[test]
    fn header_regex_requires_every_value_to_match() {
        let response = json_response(json!({}));
        assert!(header_regex("vary", "^(accept|origin)$").verify(&response).is_ok());
        assert!(header_regex("vary", "^accept$").verify(&response).is_err());
        assert!(header_regex("x-missing", ".*").verify(&response).is_err());
    }

    #[test]
    fn repeated_headers_need_one_equal_value_but_every_value_matching_a_pattern() {
        let response = json_response(json!({}));
        assert!(header("vary", "accept").verify(&response).is_ok());
        assert!(header_regex("vary", "^accept$").verify(&response).is_err());
        assert!(header_regex("vary", "^(accept|origin)$").verify(&response).is_ok());
    }

    #[test]
    fn status_ranges_honour_their_bounds() {
        let response = json_response(json!({}));
        assert!(status_in(200..300).verify(&response).is_ok());
        assert!(status_in(201..).verify(&response).is_err());
        assert!(status_in(..=200).verify(&response).is_ok());
        assert_eq!(status_in(200..300).describe(), "status in [200, 300)");
    }

    #[test]
    fn json_bodies_are_compared_structurally() {
        let response = json_response(json!({ "a": 1, "b": [1, 2] }));
        assert!(body_json(json!({ "b": [1, 2], "a": 1 })).verify(&response).is_ok());
        assert!(body_json(json!({ "a": 1 })).verify(&response).is_err());
        assert!(body_partial_json(json!({ "a": 1 })).verify(&response).is_ok());
        assert!(body_partial_json(json!({ "a": 2 })).verify(&response).is_err());
        assert!(json!({ "a": 1, "b": [1, 2] }).verify(&response).is_ok());
    }

    #[test]
    fn schema_checks_only_look_at_the_shape() {
        #[derive(serde::Deserialize)]
        #[allow(dead_code)]
        struct Shape {
            a: u32,
        }
        #[derive(serde::Deserialize)]
        #[allow(dead_code)]
        struct OtherShape {
            z: String,
        }
        let response = json_response(json!({ "a": 1 }));
        assert!(body_json_schema::<Shape>().verify(&response).is_ok());
        assert!(body_json_schema::<OtherShape>().verify(&response).is_err());
    }

    #[test]
    fn text_expectations_look_at_the_raw_text() {
        let response = json_response(json!({ "greeting": "hello world" }));
        assert!(body_string_contains("hello").verify(&response).is_ok());
        assert!(body_regex(r#""greeting":"hello \w+""#).verify(&response).is_ok());
        assert!(body_string("hello").verify(&response).is_err());
    }
}
