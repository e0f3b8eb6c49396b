#![allow(clippy::needless_doctest_main)]
//! `supertest` provides high-level assertions to perform black-box testing of HTTP
//! applications written in Rust.
//!
//! You hand it an application (a handler, or the address of a server that is already
//! running), describe a request, queue the expectations its response must satisfy and
//! `.await` the outcome.
//!
//! # Table of Contents
//! 1. [Getting started](#getting-started)
//! 2. [Expectations](#expectations)
//! 3. [Sessions](#sessions)
//! 4. [Application lifecycle](#application-lifecycle)
//! 5. [Runtime compatibility](#runtime-compatibility)
//!
//! ## Getting started
//! ```rust
//! use supertest::{Reply, Request};
//! use serde_json::json;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     // The application under test: any `Fn(&Request) -> Reply`, or a type implementing
//!     // `Respond`.
//!     let app = |request: &Request| match (request.method.as_str(), request.url.path()) {
//!         ("GET", "/user") => Reply::new(200).json(json!({ "name": "john" })),
//!         _ => Reply::new(404),
//!     };
//!
//!     // No need to start a server: `supertest` binds the application to a random local
//!     // port for the duration of the request, and shuts it down afterwards.
//!     let response = supertest::request(app)
//!         .get("/user")
//!         .set("accept", "application/json")
//!         .expect(200)
//!         .expect_header("content-type", "application/json")
//!         .await
//!         .unwrap();
//!
//!     // JSON bodies are parsed for you.
//!     assert_eq!(response.body["name"], "john");
//! }
//! ```
//!
//! ## Expectations
//!
//! Expectations are evaluated once the response has been fully received, in the order they
//! were registered. Evaluation stops at the first failure: the `Test` resolves with an
//! [`Error::Assertion`] naming the failed expectation and printing the response.
//!
//! `supertest` ships expectations for status codes, headers and bodies in the
//! [`expectations`] module; any closure `Fn(&Response) -> Result<(), String>` can be used as
//! a custom one.
//!
//! If you prefer callbacks over `.await`, use [`Test::end`]: both observe the same outcome
//! and the request is never sent twice.
//!
//! ## Sessions
//!
//! Requests issued through [`request`] share nothing. An [`Agent`], created with [`agent`],
//! keeps a cookie jar fed by the `Set-Cookie` headers it receives, plus default headers and
//! query parameters, and applies them to every request it issues.
//!
//! ## Application lifecycle
//!
//! An unbound application is started on a fresh ephemeral port for every single request and
//! shut down as soon as the response has been received, whatever the outcome: success,
//! failed expectation, transport error or timeout. Two requests never share a listener, so
//! tests can run in parallel.
//!
//! An application that is already listening (e.g. `supertest::request("127.0.0.1:8080")`) is
//! only borrowed: `supertest` never shuts down a server it did not start.
//!
//! ## Runtime compatibility
//!
//! `supertest` runs on `tokio`: tests must be executed within a `tokio` runtime, e.g. using
//! `#[tokio::test]`. Both the current-thread and the multi-thread flavours are supported.
#[macro_use]
mod verbs;

mod agent;
mod app;
mod binder;
mod error;
pub mod expectations;
pub mod http;
mod pending;
mod queue;
mod reply;
mod request;
mod response;
mod test_request;
mod tester;

pub use agent::Agent;
pub use app::{App, IntoApp, Respond};
pub use error::{AssertionError, Error};
pub use pending::Body;
pub use queue::Expect;
pub use reply::Reply;
pub use request::{BodyPrintLimit, Request};
pub use response::{Response, SetCookie};
pub use test_request::Test;
pub use tester::{Tester, TesterBuilder};

/// Issue one-shot requests against `app`, with the default settings.
///
/// `app` is either a handler (a closure `Fn(&Request) -> Reply`, an [`App`]) or the address
/// of an application that is already listening (`"127.0.0.1:8080"`, a `SocketAddr`, a `Url`).
///
/// Use [`Tester::builder`] to change the defaults.
pub fn request(app: impl IntoApp) -> Tester {
    Tester::builder().request(app)
}

/// Issue requests against `app` within a single session, with the default settings.
///
/// See [`Agent`].
pub fn agent(app: impl IntoApp) -> Agent {
    Tester::builder().agent(app)
}
