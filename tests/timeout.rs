use std::sync::{Arc, Mutex};
use std::time::Duration;
use supertest::{Error, Reply, Request, Tester};
use tokio::net::TcpStream;

fn slow_app(
    delay: Duration,
) -> (
    impl Fn(&Request) -> Reply + Send + Sync + 'static,
    Arc<Mutex<Option<String>>>,
) {
    let host = Arc::new(Mutex::new(None));
    let recorded = host.clone();
    let app = move |request: &Request| {
        *recorded.lock().unwrap() = request
            .headers
            .get("host")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Reply::new(200).delay(delay)
    };
    (app, host)
}

#[tokio::test]
async fn request_times_out_if_the_application_takes_too_long() {
    // Arrange
    let (app, host) = slow_app(Duration::from_secs(60));

    // Act
    let outcome = supertest::request(app)
        .get("/")
        .timeout(Duration::from_millis(200))
        .expect(200)
        .await;

    // Assert
    match outcome {
        Err(Error::Timeout(limit)) => assert_eq!(limit, Duration::from_millis(200)),
        other => panic!("Expected a timeout, got {:?}", other),
    }
    let host = host.lock().unwrap().clone().unwrap();
    assert!(TcpStream::connect(host).await.is_err());
}

#[tokio::test]
async fn the_timeout_can_be_set_for_every_request_of_a_tester() {
    // Arrange
    let (app, _) = slow_app(Duration::from_secs(60));
    let tester = Tester::builder()
        .timeout(Duration::from_millis(200))
        .request(app);

    // Act
    let outcome = tester.get("/").await;

    // Assert
    assert!(outcome.unwrap_err().is_timeout());
}

#[tokio::test]
async fn responses_within_the_timeout_are_evaluated_as_usual() {
    // Arrange
    let (app, _) = slow_app(Duration::from_millis(50));

    // Act
    let outcome = supertest::request(app)
        .get("/")
        .timeout(Duration::from_secs(5))
        .expect(200)
        .await;

    // Assert
    assert!(outcome.is_ok());
}
