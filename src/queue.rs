use crate::error::AssertionError;
use crate::request::BodyPrintLimit;
use crate::Response;
use http::StatusCode;
use regex::Regex;
use serde_json::Value;
use std::fmt::{Debug, Formatter};

/// Anything that implements `Expect` can be queued on a [`Test`] with [`Test::expect`].
///
/// `verify` gets a shared reference to the received [`Response`]: return `Ok(())` if the
/// expectation holds, or a message explaining what went wrong.
///
/// Closures with the right signature implement `Expect` out of the box:
///
/// ```rust
/// use supertest::{Reply, Request, Response};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let app = |_: &Request| Reply::new(200).insert_header("x-request-id", "42");
///
///     supertest::request(app)
///         .get("/")
///         .expect(|response: &Response| match response.header("x-request-id") {
///             Some(_) => Ok(()),
///             None => Err("missing request id".to_string()),
///         })
///         .await
///         .unwrap();
/// }
/// ```
///
/// `supertest` also implements `Expect` for status codes (`u16`, [`StatusCode`]), for
/// `serde_json::Value` (deep equality with the parsed body) and for [`Regex`] (matched against
/// the body text). Check the [`expectations`](crate::expectations) module for the others.
///
/// [`Test`]: crate::Test
/// [`Test::expect`]: crate::Test::expect
pub trait Expect: Send + Sync {
    /// Check the expectation against the received response.
    fn verify(&self, response: &Response) -> Result<(), String>;

    /// A short description of what is being checked, used in failure messages.
    fn describe(&self) -> String {
        "custom expectation".to_string()
    }
}

impl<F> Expect for F
where
    F: Fn(&Response) -> Result<(), String>,
    F: Send + Sync,
{
    fn verify(&self, response: &Response) -> Result<(), String> {
        self(response)
    }
}

impl Expect for StatusCode {
    fn verify(&self, response: &Response) -> Result<(), String> {
        if response.status == *self {
            Ok(())
        } else {
            Err(format!(
                "expected {} \"{}\", got {} \"{}\"",
                self.as_u16(),
                self.canonical_reason().unwrap_or_default(),
                response.status.as_u16(),
                response.status.canonical_reason().unwrap_or_default()
            ))
        }
    }

    fn describe(&self) -> String {
        format!("status is {}", self.as_u16())
    }
}

impl Expect for u16 {
    fn verify(&self, response: &Response) -> Result<(), String> {
        match StatusCode::from_u16(*self) {
            Ok(status) => status.verify(response),
            Err(_) => Err(format!("{} is not a valid status code", self)),
        }
    }

    fn describe(&self) -> String {
        format!("status is {}", self)
    }
}

impl Expect for Value {
    fn verify(&self, response: &Response) -> Result<(), String> {
        if response.body == *self {
            Ok(())
        } else {
            Err(format!("expected body {}, got {}", self, response.body))
        }
    }

    fn describe(&self) -> String {
        "body equals JSON value".to_string()
    }
}

impl Expect for Regex {
    fn verify(&self, response: &Response) -> Result<(), String> {
        if self.is_match(&response.text) {
            Ok(())
        } else {
            Err(format!("expected body to match {:?}, got {:?}", self.as_str(), response.text))
        }
    }

    fn describe(&self) -> String {
        format!("body matches {:?}", self.as_str())
    }
}

pub(crate) struct Expectation(Box<dyn Expect>);

impl Debug for Expectation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Closures do not implement `Debug`: the description is all we can show.
        write!(f, "Expectation({})", self.0.describe())
    }
}

/// Expectations queued on a single request, in registration order.
#[derive(Debug, Default)]
pub(crate) struct ExpectationQueue {
    expectations: Vec<Expectation>,
}

impl ExpectationQueue {
    pub(crate) fn add<E: Expect + 'static>(&mut self, expectation: E) {
        self.expectations.push(Expectation(Box::new(expectation)));
    }

    pub(crate) fn len(&self) -> usize {
        self.expectations.len()
    }

    /// Evaluate expectations in registration order, stopping at the first failure.
    pub(crate) fn evaluate(
        &self,
        response: &Response,
        body_print_limit: BodyPrintLimit,
    ) -> Result<(), AssertionError> {
        for (index, Expectation(expectation)) in self.expectations.iter().enumerate() {
            if let Err(message) = expectation.verify(response) {
                let mut printed = String::new();
                // Writing to a `String` cannot fail.
                let _ = response.print_with_limit(&mut printed, body_print_limit);
                return Err(AssertionError {
                    position: index + 1,
                    expectation: expectation.describe(),
                    message,
                    response: printed,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;
    use hyper::body::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn response(status: u16) -> Response {
        Response::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            "http://127.0.0.1:1/".parse().unwrap(),
            Bytes::from_static(b"hello"),
        )
    }

    #[test]
    fn evaluation_stops_at_the_first_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut queue = ExpectationQueue::default();
        for outcome in [true, true, false, true, false] {
            let calls = calls.clone();
            queue.add(move |_: &Response| {
                calls.fetch_add(1, Ordering::SeqCst);
                if outcome {
                    Ok(())
                } else {
                    Err("nope".to_string())
                }
            });
        }

        let error = queue
            .evaluate(&response(200), BodyPrintLimit::default())
            .unwrap_err();

        assert_eq!(error.position, 3);
        assert_eq!(error.message, "nope");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn status_failures_name_both_codes() {
        let mut queue = ExpectationQueue::default();
        queue.add(200u16);

        let error = queue
            .evaluate(&response(404), BodyPrintLimit::default())
            .unwrap_err();

        assert_eq!(error.expectation, "status is 200");
        assert_eq!(error.message, "expected 200 \"OK\", got 404 \"Not Found\"");
        assert!(error.response.contains("hello"));
    }

    #[test]
    fn an_empty_queue_always_passes() {
        let queue = ExpectationQueue::default();
        assert_eq!(queue.len(), 0);
        assert!(queue.evaluate(&response(500), BodyPrintLimit::default()).is_ok());
    }
}
