use crate::agent::Session;
use crate::app::App;
use crate::binder::{self, Endpoint};
use crate::expectations::{body_json, body_string, header};
use crate::pending::{to_pairs, Body, FormPart, PendingRequest};
use crate::queue::{Expect, ExpectationQueue};
use crate::tester::Settings;
use crate::{Error, Response};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use futures::future::BoxFuture;
use http::{HeaderName, HeaderValue};
use log::debug;
use serde::Serialize;
use std::convert::TryInto;
use std::future::IntoFuture;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// A single HTTP request against the application under test, plus the expectations its
/// response must satisfy.
///
/// You get a `Test` from the verb methods of [`Tester`] or [`Agent`]: configure the request
/// with the fluent methods (`set`, `query`, `send`, ...), queue expectations with [`expect`]
/// and then settle it, either by `.await`ing it or by calling [`end`].
///
/// ### Lifecycle
///
/// A `Test` goes through three phases: building, dispatched and settled.
/// - the request is sent exactly once, when the `Test` is [`dispatch`]ed - explicitly, or
///   implicitly the first time a completion protocol (`end` or `.await`) is attached;
/// - the expectations are evaluated, in registration order, when the response has been fully
///   received. Expectations added after dispatch are still taken into account;
/// - the outcome is stored once: `end` and `.await` on the same `Test` observe the same value.
///
/// Changing the request after it has been dispatched is a programming error: the `Test` settles
/// with [`Error::InvalidState`].
///
/// ```rust
/// use supertest::{Reply, Request};
/// use serde_json::json;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let app = |request: &Request| {
///         let payload: serde_json::Value = request.body_json().unwrap();
///         Reply::new(201).json(json!({ "created": payload["name"] }))
///     };
///
///     let response = supertest::request(app)
///         .post("/users")
///         .set("x-api-key", "foobar")
///         .send(json!({ "name": "john" }))
///         .expect(201)
///         .expect_header("content-type", "application/json")
///         .expect(json!({ "created": "john" }))
///         .await
///         .unwrap();
///
///     assert_eq!(response.body["created"], "john");
/// }
/// ```
///
/// [`Tester`]: crate::Tester
/// [`Agent`]: crate::Agent
/// [`expect`]: Test::expect
/// [`end`]: Test::end
/// [`dispatch`]: Test::dispatch
pub struct Test {
    app: App,
    settings: Settings,
    client: Option<reqwest::Client>,
    session: Option<Arc<Mutex<Session>>>,
    expectations: ExpectationQueue,
    misuse: Option<Error>,
    phase: Phase,
}

enum Phase {
    Building(Box<PendingRequest>),
    Dispatched(JoinHandle<Result<Response, Error>>),
    Settled(Result<Response, Error>),
}

impl Test {
    pub(crate) fn new(
        app: App,
        pending: PendingRequest,
        settings: Settings,
        client: Option<reqwest::Client>,
        session: Option<Arc<Mutex<Session>>>,
    ) -> Self {
        Self {
            app,
            settings,
            client,
            session,
            expectations: ExpectationQueue::default(),
            misuse: None,
            phase: Phase::Building(Box::new(pending)),
        }
    }

    /// Set a request header, replacing any previous value.
    pub fn set<K, V>(mut self, key: K, value: V) -> Self
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
        if let Some(pending) = self.pending("set") {
            pending.headers.insert(key, value);
        }
        self
    }

    /// Add query parameters.
    ///
    /// `params` can be anything serializing to a map (a struct, a `HashMap`, `json!({..})`), a
    /// list of pairs, or an already encoded query string such as `"page=2&sort=asc"`.
    /// Successive calls merge: a key passed again replaces its previous value.
    pub fn query<T: Serialize + ?Sized>(mut self, params: &T) -> Self {
        let pairs = to_pairs(params);
        if let Some(pending) = self.pending("query") {
            pending.merge_query(pairs);
        }
        self
    }

    /// Set the request body. See [`Body`] for how it gets encoded.
    ///
    /// Sending two JSON objects merges them.
    pub fn send<B: Into<Body>>(mut self, body: B) -> Self {
        let body = body.into();
        if let Some(pending) = self.pending("send") {
            pending.set_body(body);
        }
        self.check_body_kinds();
        self
    }

    /// Serialize `body` as JSON and send it.
    pub fn send_json<T: Serialize + ?Sized>(self, body: &T) -> Self {
        let body = serde_json::to_value(body).expect("Failed to serialize JSON body.");
        self.send(body)
    }

    /// Add a text field to a `multipart/form-data` body.
    pub fn field(mut self, name: &str, value: &str) -> Self {
        if let Some(pending) = self.pending("field") {
            pending.parts.push(FormPart::Field {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
        self.check_body_kinds();
        self
    }

    /// Attach a file to a `multipart/form-data` body.
    pub fn attach<C: Into<Vec<u8>>>(self, name: &str, file_name: &str, content: C) -> Self {
        self.attach_part(name, file_name, None, content.into())
    }

    /// Attach a file with an explicit MIME type to a `multipart/form-data` body.
    pub fn attach_with_mime<C: Into<Vec<u8>>>(
        self,
        name: &str,
        file_name: &str,
        mime: &str,
        content: C,
    ) -> Self {
        self.attach_part(name, file_name, Some(mime.to_string()), content.into())
    }

    fn attach_part(
        mut self,
        name: &str,
        file_name: &str,
        mime: Option<String>,
        content: Vec<u8>,
    ) -> Self {
        if let Some(pending) = self.pending("attach") {
            pending.parts.push(FormPart::File {
                name: name.to_string(),
                file_name: file_name.to_string(),
                mime,
                content,
            });
        }
        self.check_body_kinds();
        self
    }

    /// Send a cookie with this request only.
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        if let Some(pending) = self.pending("cookie") {
            pending.set_cookie(name, value);
        }
        self
    }

    /// Authenticate with HTTP basic authentication.
    pub fn auth(self, username: &str, password: &str) -> Self {
        let token = BASE64_STANDARD.encode(format!("{}:{}", username, password));
        self.set(http::header::AUTHORIZATION, format!("Basic {}", token).as_str())
    }

    /// Authenticate with a bearer token.
    pub fn bearer(self, token: &str) -> Self {
        self.set(http::header::AUTHORIZATION, format!("Bearer {}", token).as_str())
    }

    /// Fail with [`Error::Timeout`] if the response has not been fully received within
    /// `timeout`. The ephemeral server, if any, is shut down all the same.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        if self.pending("timeout").is_some() {
            self.settings.timeout = Some(timeout);
        }
        self
    }

    /// Follow up to `max` redirects. By default redirects are not followed.
    ///
    /// Only the final response is returned: for an [`Agent`] request, cookies set by the
    /// intermediate responses are not stored in the session.
    pub fn redirects(mut self, max: usize) -> Self {
        if self.pending("redirects").is_some() {
            self.settings.redirects = max;
            // The redirect policy lives in the transport client: this request needs its own.
            self.client = None;
        }
        self
    }

    /// Queue an expectation.
    ///
    /// It accepts a status code (`200`, `StatusCode::OK`), a `serde_json::Value` that must be
    /// equal to the parsed body, a `Regex` that must match the body text, any of the
    /// [`expectations`](crate::expectations) or a closure
    /// `Fn(&Response) -> Result<(), String>`.
    pub fn expect<E: Expect + 'static>(mut self, expectation: E) -> Self {
        if let Phase::Settled(_) = self.phase {
            record_misuse(&mut self.misuse, "expect");
        } else {
            self.expectations.add(expectation);
        }
        self
    }

    /// Shorthand for `expect(status)`.
    pub fn expect_status(self, status: u16) -> Self {
        self.expect(status)
    }

    /// Expect a header to have exactly the given value.
    pub fn expect_header<K, V>(self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
        V: TryInto<HeaderValue>,
        <V as TryInto<HeaderValue>>::Error: std::fmt::Debug,
    {
        self.expect(header(key, value))
    }

    /// Expect the body to be exactly `body`: text is compared with the body text, JSON with
    /// the parsed body and bytes with the raw payload.
    pub fn expect_body<B: Into<Body>>(self, body: B) -> Self {
        match body.into() {
            Body::Text(text) => self.expect(body_string(text)),
            Body::Json(value) => self.expect(body_json(value)),
            Body::Bytes(bytes) => self.expect(move |response: &Response| {
                if response.raw.as_ref() == bytes.as_slice() {
                    Ok(())
                } else {
                    Err(format!(
                        "expected a {} bytes body, got {} bytes",
                        bytes.len(),
                        response.raw.len()
                    ))
                }
            }),
        }
    }

    /// Send the request now, without waiting for the response.
    ///
    /// You rarely need to call this directly: `end` and `.await` dispatch the request if it
    /// has not been dispatched yet. A request can only be dispatched once: calling `dispatch`
    /// again returns [`Error::InvalidState`] and sends nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&mut self) -> Result<(), Error> {
        let pending = match &self.phase {
            Phase::Building(pending) => pending.as_ref().clone(),
            _ => {
                return Err(Error::InvalidState(
                    "the request has already been dispatched".to_string(),
                ))
            }
        };
        debug!("Dispatching {} {}", pending.method, pending.path);

        let client = match self.client.clone() {
            Some(client) => Ok(client),
            None => self.settings.client(),
        };
        let exchange = exchange(
            self.app.clone(),
            pending,
            client,
            self.settings.timeout,
            self.session.clone(),
        );
        self.phase = Phase::Dispatched(tokio::spawn(exchange));
        Ok(())
    }

    /// Settle the test and hand the outcome to `callback`, returning whatever it returns.
    ///
    /// The callback owns its copy of the outcome: it can move the response, or the error,
    /// out of it.
    ///
    /// ```rust
    /// use supertest::{Reply, Request};
    ///
    /// #[tokio::main(flavor = "current_thread")]
    /// async fn main() {
    ///     let app = |_: &Request| Reply::new(200).text("hello");
    ///
    ///     let mut test = supertest::request(app).get("/").expect(200);
    ///     let text = test
    ///         .end(|outcome| outcome.map(|response| response.text))
    ///         .await
    ///         .unwrap();
    ///     assert_eq!(text, "hello");
    ///
    ///     // The request is not sent again: awaiting observes the same outcome.
    ///     let response = test.await.unwrap();
    ///     assert_eq!(response.text, "hello");
    /// }
    /// ```
    pub async fn end<F, T>(&mut self, callback: F) -> T
    where
        F: FnOnce(Result<Response, Error>) -> T,
    {
        callback(self.settle().await)
    }

    /// Drive the test to its settlement, sending the request if needed.
    async fn settle(&mut self) -> Result<Response, Error> {
        if let Phase::Building(_) = self.phase {
            // A request that was misused while being built is never sent.
            if let Some(misuse) = &self.misuse {
                self.phase = Phase::Settled(Err(misuse.clone()));
            } else {
                self.dispatch()?;
            }
        }
        if let Phase::Dispatched(handle) = &mut self.phase {
            let exchange = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(Error::transport(
                    format!("The exchange task did not complete: {}", e),
                    None,
                )),
            };
            debug!("Evaluating {} expectation(s)", self.expectations.len());
            let body_print_limit = self.settings.body_print_limit;
            let expectations = &self.expectations;
            let settlement = exchange.and_then(|response| {
                expectations.evaluate(&response, body_print_limit)?;
                Ok(response)
            });
            self.phase = Phase::Settled(settlement);
        }

        if let Some(misuse) = &self.misuse {
            return Err(misuse.clone());
        }
        match &self.phase {
            Phase::Settled(settlement) => settlement.clone(),
            _ => Err(Error::InvalidState(
                "the request could not be settled".to_string(),
            )),
        }
    }

    /// The pending request, if we are still building it.
    fn pending(&mut self, operation: &str) -> Option<&mut PendingRequest> {
        match &mut self.phase {
            Phase::Building(pending) => Some(&mut **pending),
            _ => {
                record_misuse(&mut self.misuse, operation);
                None
            }
        }
    }

    fn check_body_kinds(&mut self) {
        if let Phase::Building(pending) = &self.phase {
            if pending.body.is_some() && !pending.parts.is_empty() && self.misuse.is_none() {
                self.misuse = Some(Error::InvalidState(
                    "a request body cannot be combined with multipart fields or attachments"
                        .to_string(),
                ));
            }
        }
    }
}

impl Drop for Test {
    // A dispatched test that is dropped before settling cancels its exchange: the ephemeral
    // server, if any, goes down with it.
    fn drop(&mut self) {
        if let Phase::Dispatched(handle) = &self.phase {
            handle.abort();
        }
    }
}

impl IntoFuture for Test {
    type Output = Result<Response, Error>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(mut self) -> Self::IntoFuture {
        Box::pin(async move { self.settle().await })
    }
}

impl<'a> IntoFuture for &'a mut Test {
    type Output = Result<Response, Error>;
    type IntoFuture = BoxFuture<'a, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.settle())
    }
}

/// Keep the first misuse: it is the one the settlement reports.
fn record_misuse(misuse: &mut Option<Error>, operation: &str) {
    if misuse.is_none() {
        *misuse = Some(Error::InvalidState(format!(
            "`{}` was called after the request had been dispatched",
            operation
        )));
    }
}

/// Bind, send, receive, release: the network side of a test, run as its own task.
async fn exchange(
    app: App,
    pending: PendingRequest,
    client: Result<reqwest::Client, Error>,
    timeout: Option<Duration>,
    session: Option<Arc<Mutex<Session>>>,
) -> Result<Response, Error> {
    let client = client?;
    let endpoint = binder::bind(&app)?;

    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, send(&client, &endpoint, pending))
            .await
            .unwrap_or_else(|_| Err(Error::Timeout(limit))),
        None => send(&client, &endpoint, pending).await,
    };
    endpoint.release().await;

    // Only the final response is seen here: redirects are followed inside the client.
    if let (Ok(response), Some(session)) = (&outcome, &session) {
        session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .absorb(response);
    }
    outcome
}

async fn send(
    client: &reqwest::Client,
    endpoint: &Endpoint,
    pending: PendingRequest,
) -> Result<Response, Error> {
    let request = pending.into_transport(client, endpoint.url())?;
    let response = request.send().await?;
    let status = response.status();
    let headers = response.headers().clone();
    let url = response.url().clone();
    let raw = response.bytes().await?;
    Ok(Response::new(status, headers, url, raw))
}
