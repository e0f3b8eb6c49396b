use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use supertest::{App, Error, Reply, Request};
use tokio::net::TcpStream;

/// An application that remembers the address it was reached at.
fn recording_app() -> (App, Arc<Mutex<Vec<SocketAddr>>>) {
    let addresses = Arc::new(Mutex::new(Vec::new()));
    let recorded = addresses.clone();
    let app = App::new(move |request: &Request| {
        let host = request
            .headers
            .get("host")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        if let Some(host) = host {
            recorded.lock().unwrap().push(host);
        }
        Reply::new(200).text("hello")
    });
    (app, addresses)
}

/// A server we start (and own) ourselves, counting the requests it serves.
async fn listening_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let served = Arc::new(AtomicUsize::new(0));
    let counter = served.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let counter = counter.clone();
            tokio::spawn(async move {
                let service = service_fn(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async {
                        Ok::<_, hyper::Error>(hyper::Response::new(Full::new(Bytes::from(
                            "borrowed",
                        ))))
                    }
                });
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });
    (address, served)
}

#[tokio::test]
async fn the_ephemeral_server_is_closed_once_the_test_settles() {
    // Arrange
    let (app, addresses) = recording_app();

    // Act
    supertest::request(&app).get("/").expect(200).await.unwrap();

    // Assert
    let address = addresses.lock().unwrap()[0];
    assert!(TcpStream::connect(address).await.is_err());
}

#[tokio::test]
async fn the_ephemeral_server_is_closed_when_an_expectation_fails() {
    // Arrange
    let (app, addresses) = recording_app();

    // Act
    let outcome = supertest::request(&app).get("/").expect(500).await;

    // Assert
    assert!(matches!(outcome, Err(Error::Assertion(_))));
    let address = addresses.lock().unwrap()[0];
    assert!(TcpStream::connect(address).await.is_err());
}

#[tokio::test]
async fn every_request_gets_its_own_ephemeral_server() {
    // Arrange
    let (app, addresses) = recording_app();
    let tester = supertest::request(&app);

    // Act
    let (first, second) = tokio::join!(
        tester.get("/a").into_future(),
        tester.get("/b").into_future()
    );

    // Assert
    first.unwrap();
    second.unwrap();
    let addresses = addresses.lock().unwrap();
    assert_eq!(addresses.len(), 2);
    assert_ne!(addresses[0], addresses[1]);
}

#[tokio::test]
async fn a_listening_application_is_never_closed() {
    // Arrange
    let (address, served) = listening_server().await;

    // Act
    let response = supertest::request(address).get("/").expect(200).await.unwrap();
    supertest::request(format!("http://{}", address))
        .get("/")
        .expect(200)
        .await
        .unwrap();

    // Assert
    assert_eq!(response.text, "borrowed");
    assert_eq!(served.load(Ordering::SeqCst), 2);
    assert!(TcpStream::connect(address).await.is_ok());
}

#[tokio::test]
async fn the_request_is_sent_once_whatever_the_completion_protocol() {
    // Arrange
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = move |_: &Request| {
        counter.fetch_add(1, Ordering::SeqCst);
        Reply::new(200)
    };
    let mut test = supertest::request(app).get("/").expect(200);

    // Act
    test.dispatch().unwrap();
    let via_callback = test.end(|outcome| outcome.is_ok()).await;
    let via_await = (&mut test).await;
    let via_callback_again = test.end(|outcome| outcome.is_ok()).await;

    // Assert
    assert!(via_callback);
    assert!(via_await.is_ok());
    assert!(via_callback_again);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn both_completion_protocols_observe_the_same_failure() {
    // Arrange
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = move |_: &Request| {
        counter.fetch_add(1, Ordering::SeqCst);
        Reply::new(200)
    };
    let mut test = supertest::request(app).get("/").expect(500);

    // Act
    let via_callback = test.end(|outcome| outcome.err()).await.unwrap();
    let via_await = test.await.unwrap_err();

    // Assert
    let via_callback = via_callback.as_assertion().unwrap().clone();
    let via_await = via_await.as_assertion().unwrap().clone();
    assert_eq!(via_callback.position, 1);
    assert_eq!(via_callback.position, via_await.position);
    assert_eq!(via_callback.message, via_await.message);
    assert_eq!(via_callback, via_await);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dispatching_twice_is_an_invalid_state() {
    // Arrange
    let app = |_: &Request| Reply::new(200);
    let mut test = supertest::request(app).get("/");

    // Act
    test.dispatch().unwrap();
    let second = test.dispatch();

    // Assert
    assert!(matches!(second, Err(Error::InvalidState(_))));
    assert!(test.await.is_ok());
}

#[tokio::test]
async fn changing_the_request_after_dispatch_is_an_invalid_state() {
    // Arrange
    let app = |_: &Request| Reply::new(200);
    let mut test = supertest::request(app).get("/");
    test.dispatch().unwrap();

    // Act
    let outcome = test.set("x-late", "too late").await;

    // Assert
    assert!(matches!(outcome, Err(Error::InvalidState(_))));
}

#[tokio::test]
async fn expectations_registered_after_dispatch_are_evaluated() {
    // Arrange
    let app = |_: &Request| Reply::new(404);
    let mut test = supertest::request(app).get("/");
    test.dispatch().unwrap();

    // Act
    let outcome = test.expect(200).await;

    // Assert
    assert_eq!(outcome.unwrap_err().as_assertion().unwrap().position, 1);
}

#[tokio::test]
async fn an_invalid_address_is_a_bind_error() {
    // Act
    let outcome = supertest::request("http://").get("/").await;

    // Assert
    assert!(matches!(outcome, Err(Error::Bind(_))));
}

#[tokio::test]
async fn an_unreachable_application_is_a_transport_error() {
    // Arrange
    let address = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    // Act
    let outcome = supertest::request(address).get("/").await;

    // Assert
    assert!(matches!(outcome, Err(Error::Transport { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn tests_work_on_the_multi_thread_runtime() {
    let app = |_: &Request| Reply::new(204);
    supertest::request(app).delete("/").expect(204).await.unwrap();
}
