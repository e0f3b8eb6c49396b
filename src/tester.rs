use crate::agent::Agent;
use crate::app::{App, IntoApp};
use crate::pending::PendingRequest;
use crate::request::BodyPrintLimit;
use crate::{Error, Test};
use http::Method;
use std::time::Duration;

/// Settings shared by every request issued from the same [`Tester`] or [`Agent`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
    pub(crate) timeout: Option<Duration>,
    pub(crate) redirects: usize,
    pub(crate) body_print_limit: BodyPrintLimit,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout: None,
            redirects: 0,
            body_print_limit: BodyPrintLimit::default(),
        }
    }
}

impl Settings {
    /// A transport client honouring these settings.
    pub(crate) fn client(&self) -> Result<reqwest::Client, Error> {
        let redirect = match self.redirects {
            0 => reqwest::redirect::Policy::none(),
            max => reqwest::redirect::Policy::limited(max),
        };
        reqwest::Client::builder()
            .redirect(redirect)
            .no_proxy()
            .build()
            .map_err(|e| Error::transport("Failed to build the HTTP client", Some(e)))
    }
}

/// Issues one-shot requests against an application.
///
/// Each verb method (`get`, `post`, ...) returns a fresh [`Test`]: nothing is shared between
/// two requests issued from the same `Tester`, cookies included. Use an [`Agent`] if you need
/// a session.
///
/// You usually get a `Tester` from [`request`](crate::request); use [`Tester::builder`] to
/// change the defaults.
#[derive(Debug, Clone)]
pub struct Tester {
    app: App,
    settings: Settings,
}

impl Tester {
    pub(crate) fn new(app: App, settings: Settings) -> Self {
        Self { app, settings }
    }

    /// Configure timeouts, redirects and failure output before picking the application.
    pub fn builder() -> TesterBuilder {
        TesterBuilder::default()
    }

    /// Start a request with an arbitrary method.
    pub fn request(&self, method: Method, path: &str) -> Test {
        Test::new(
            self.app.clone(),
            PendingRequest::new(method, path),
            self.settings,
            None,
            None,
        )
    }

    http_verbs!();
}

/// A builder providing a fluent API to configure a [`Tester`] or an [`Agent`].
///
/// ```rust
/// use std::time::Duration;
/// use supertest::{BodyPrintLimit, Reply, Request, Tester};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let app = |_: &Request| Reply::new(302).insert_header("location", "/home");
///
///     let tester = Tester::builder()
///         .timeout(Duration::from_secs(5))
///         .body_print_limit(BodyPrintLimit::Limited(512))
///         .request(app);
///
///     // Redirects are not followed by default.
///     tester.get("/").expect(302).await.unwrap();
/// }
/// ```
#[derive(Debug, Default)]
pub struct TesterBuilder {
    settings: Settings,
}

impl TesterBuilder {
    /// Fail every request that takes longer than `timeout` to complete.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = Some(timeout);
        self
    }

    /// Follow up to `max` redirects. Defaults to 0.
    pub fn redirects(mut self, max: usize) -> Self {
        self.settings.redirects = max;
        self
    }

    /// The maximum size of a response body printed when an expectation fails.
    /// Defaults to 10 000 bytes.
    pub fn body_print_limit(mut self, limit: BodyPrintLimit) -> Self {
        self.settings.body_print_limit = limit;
        self
    }

    /// Issue one-shot requests against `app`.
    pub fn request(self, app: impl IntoApp) -> Tester {
        Tester::new(app.into_app(), self.settings)
    }

    /// Issue requests against `app` within a single session.
    pub fn agent(self, app: impl IntoApp) -> Agent {
        Agent::new(app.into_app(), self.settings)
    }
}
