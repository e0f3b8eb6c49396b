use crate::{Reply, Request};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use url::Url;

/// Anything that implements `Respond` can be tested with `supertest`: it is the application
/// under test.
///
/// `supertest` never asks you to start a server for it. When a request is issued against a
/// `Respond`er, it is bound to a random local port for the duration of that single request and
/// shut down as soon as the response has been received.
///
/// Closures taking a [`Request`] reference and returning a [`Reply`] implement `Respond` out of
/// the box:
///
/// ```rust
/// use supertest::{Reply, Request};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let app = |request: &Request| match request.url.path() {
///         "/" => Reply::new(200).json(serde_json::json!({ "ok": true })),
///         _ => Reply::new(404),
///     };
///
///     let response = supertest::request(app).get("/").expect(200).await.unwrap();
///     assert_eq!(response.body, serde_json::json!({ "ok": true }));
/// }
/// ```
pub trait Respond: Send + Sync + 'static {
    /// Given a reference to the incoming [`Request`], build the [`Reply`] to send back.
    fn respond(&self, request: &Request) -> Reply;
}

impl<F> Respond for F
where
    F: Fn(&Request) -> Reply + Send + Sync + 'static,
{
    fn respond(&self, request: &Request) -> Reply {
        self(request)
    }
}

/// The application under test.
///
/// It is either a handler that still has to be bound to an address (we own its listener for
/// the duration of each request) or an address that is already listening (we only borrow it,
/// and we never shut it down).
///
/// Cloning an `App` is cheap.
#[derive(Clone)]
pub struct App(pub(crate) AppInner);

#[derive(Clone)]
pub(crate) enum AppInner {
    Unbound(Arc<dyn Respond>),
    Listening(Url),
    Invalid(String),
}

impl App {
    /// An application that `supertest` will bind to an ephemeral port on every request.
    pub fn new<R: Respond>(handler: R) -> Self {
        Self(AppInner::Unbound(Arc::new(handler)))
    }

    /// An application that is already reachable at `address`, e.g. `http://localhost:3000`.
    ///
    /// An invalid address is reported as [`Error::Bind`] when the first request is issued.
    ///
    /// [`Error::Bind`]: crate::Error::Bind
    pub fn listening(address: &str) -> Self {
        let address = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };
        match Url::parse(&address) {
            Ok(url) if url.has_host() => Self(AppInner::Listening(url)),
            Ok(_) => Self(AppInner::Invalid(format!("`{}` has no host", address))),
            Err(e) => Self(AppInner::Invalid(format!("`{}` is not a valid URL: {}", address, e))),
        }
    }

    /// `true` if the application is already listening on an address we do not own.
    pub fn is_listening(&self) -> bool {
        matches!(self.0, AppInner::Listening(_))
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            AppInner::Unbound(_) => f.write_str("App(unbound handler)"),
            AppInner::Listening(url) => write!(f, "App({})", url),
            AppInner::Invalid(reason) => write!(f, "App(invalid: {})", reason),
        }
    }
}

/// Conversion into an [`App`], accepted by [`request`](crate::request) and
/// [`agent`](crate::agent).
pub trait IntoApp {
    fn into_app(self) -> App;
}

impl IntoApp for App {
    fn into_app(self) -> App {
        self
    }
}

impl IntoApp for &App {
    fn into_app(self) -> App {
        self.clone()
    }
}

impl<F> IntoApp for F
where
    F: Fn(&Request) -> Reply + Send + Sync + 'static,
{
    fn into_app(self) -> App {
        App::new(self)
    }
}

impl IntoApp for SocketAddr {
    fn into_app(self) -> App {
        App::listening(&self.to_string())
    }
}

impl IntoApp for Url {
    fn into_app(self) -> App {
        App(AppInner::Listening(self))
    }
}

impl IntoApp for &str {
    fn into_app(self) -> App {
        App::listening(self)
    }
}

impl IntoApp for String {
    fn into_app(self) -> App {
        App::listening(&self)
    }
}
