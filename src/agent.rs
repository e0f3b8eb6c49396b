use crate::app::App;
use crate::pending::{to_pairs, PendingRequest};
use crate::tester::Settings;
use crate::{Response, Test};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use log::debug;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::convert::TryInto;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Issues requests against an application within a single session.
///
/// An `Agent` remembers the cookies set by the application and sends them back with every
/// following request, like a browser would. It can also carry default headers and query
/// parameters, applied to every request it issues.
///
/// Cloning an `Agent` gives you a handle to the same session.
///
/// Cookies are only taken from the final response of each request. When redirects are
/// followed (see [`Test::redirects`]), the `Set-Cookie` headers of the intermediate `3xx`
/// responses never reach the session: leave redirects off and follow them yourself if a
/// cookie is set along the way.
///
/// ```rust
/// use supertest::{Reply, Request};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let app = |request: &Request| match request.url.path() {
///         "/login" => Reply::new(200).set_cookie("session", "s3cr3t", "Path=/; HttpOnly"),
///         _ => match request.cookie("session") {
///             Some(_) => Reply::new(200).text("welcome back"),
///             None => Reply::new(401),
///         },
///     };
///
///     let agent = supertest::agent(app);
///     agent.post("/login").expect(200).await.unwrap();
///     agent.get("/profile").expect(200).expect_body("welcome back").await.unwrap();
///
///     // One-shot requests do not share the session.
///     supertest::request(app).get("/profile").expect(401).await.unwrap();
/// }
/// ```
#[derive(Clone)]
pub struct Agent {
    app: App,
    settings: Settings,
    session: Arc<Mutex<Session>>,
    client: Arc<OnceCell<reqwest::Client>>,
}

/// State shared by the requests of an [`Agent`].
#[derive(Debug, Default)]
pub(crate) struct Session {
    cookies: Vec<(String, String)>,
    headers: HeaderMap,
    query: Vec<(String, String)>,
}

impl Session {
    /// Store the cookies set by `response`, dropping those it asked to remove.
    pub(crate) fn absorb(&mut self, response: &Response) {
        for cookie in response.cookies() {
            self.cookies.retain(|(name, _)| *name != cookie.name);
            if cookie.is_removal() {
                debug!("Removing cookie `{}` from the agent session", cookie.name);
            } else {
                self.cookies.push((cookie.name, cookie.value));
            }
        }
    }
}

impl Agent {
    pub(crate) fn new(app: App, settings: Settings) -> Self {
        Self {
            app,
            settings,
            session: Arc::new(Mutex::new(Session::default())),
            client: Arc::new(OnceCell::new()),
        }
    }

    /// Start a request with an arbitrary method.
    ///
    /// The request starts from the agent defaults: its headers, its query parameters and the
    /// cookies collected so far. Changing the returned [`Test`] never changes the agent.
    pub fn request(&self, method: Method, path: &str) -> Test {
        let mut pending = PendingRequest::new(method, path);
        {
            let session = self.session();
            pending.headers = session.headers.clone();
            pending.query = session.query.clone();
            for (name, value) in &session.cookies {
                pending.set_cookie(name, value);
            }
        }
        // If the client cannot be built, the test builds its own and reports the failure.
        let client = self
            .client
            .get_or_try_init(|| self.settings.client())
            .ok()
            .cloned();
        Test::new(
            self.app.clone(),
            pending,
            self.settings,
            client,
            Some(self.session.clone()),
        )
    }

    http_verbs!();

    /// Add default query parameters, sent with every following request.
    ///
    /// Accepts the same inputs as [`Test::query`]. Keys passed again replace their previous
    /// value.
    pub fn query<T: Serialize + ?Sized>(&self, params: &T) -> &Self {
        let pairs = to_pairs(params);
        let mut session = self.session();
        session.query.retain(|(key, _)| !pairs.iter().any(|(k, _)| k == key));
        session.query.extend(pairs);
        self
    }

    /// Set a default header, sent with every following request.
    pub fn set<K, V>(&self, key: K, value: V) -> &Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: fmt::Debug,
        V: TryInto<HeaderValue>,
        <V as TryInto<HeaderValue>>::Error: fmt::Debug,
    {
        let key = key.try_into().expect("Failed to convert into header name.");
        let value = value
            .try_into()
            .expect("Failed to convert into header value.");
        self.session().headers.insert(key, value);
        self
    }

    /// Authenticate every following request with HTTP basic authentication.
    pub fn auth(&self, username: &str, password: &str) -> &Self {
        let token = BASE64_STANDARD.encode(format!("{}:{}", username, password));
        self.set(http::header::AUTHORIZATION, format!("Basic {}", token).as_str())
    }

    /// Authenticate every following request with a bearer token.
    pub fn bearer(&self, token: &str) -> &Self {
        self.set(http::header::AUTHORIZATION, format!("Bearer {}", token).as_str())
    }

    /// The value of a cookie held by the session.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.session()
            .cookies
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    /// All cookies held by the session, least recently set first.
    pub fn cookies(&self) -> Vec<(String, String)> {
        self.session().cookies.clone()
    }

    /// Forget every cookie collected so far.
    pub fn clear_cookies(&self) -> &Self {
        self.session().cookies.clear();
        self
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("app", &self.app)
            .field("settings", &self.settings)
            .field("session", &*self.session())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use hyper::body::Bytes;

    fn response_setting(cookies: &[&str]) -> Response {
        let mut headers = HeaderMap::new();
        for cookie in cookies {
            headers.append(http::header::SET_COOKIE, cookie.parse().unwrap());
        }
        Response::new(
            StatusCode::OK,
            headers,
            "http://127.0.0.1:1/".parse().unwrap(),
            Bytes::new(),
        )
    }

    #[test]
    fn set_cookie_headers_replace_and_remove_cookies() {
        let mut session = Session::default();
        session.absorb(&response_setting(&["a=1", "b=2; Path=/"]));
        session.absorb(&response_setting(&["a=3; HttpOnly", "b=; Max-Age=0"]));

        assert_eq!(session.cookies, vec![("a".to_string(), "3".to_string())]);
    }

    #[test]
    fn default_query_parameters_are_merged() {
        let agent = Agent::new(App::listening("127.0.0.1:1"), Settings::default());
        agent.query(&[("v", "1"), ("lang", "en")]).query("v=2");

        assert_eq!(
            agent.session().query,
            vec![
                ("lang".to_string(), "en".to_string()),
                ("v".to_string(), "2".to_string())
            ]
        );
    }
}
