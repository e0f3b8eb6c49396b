use serde_json::json;
use supertest::{Agent, Reply, Request};

/// Logs in on `/login`, logs out on `/logout` and greets logged in users everywhere else.
fn session_app(request: &Request) -> Reply {
    match request.url.path() {
        "/login" => Reply::new(200).set_cookie("session", "s3cr3t", "Path=/; HttpOnly"),
        "/logout" => Reply::new(200).set_cookie("session", "", "Max-Age=0"),
        "/echo" => Reply::new(200).json(json!({
            "query": request.query_pairs(),
            "api_key": request.headers.get("x-api-key").and_then(|v| v.to_str().ok()),
            "cookie": request.headers.get("cookie").and_then(|v| v.to_str().ok()),
        })),
        _ => match request.cookie("session").as_deref() {
            Some("s3cr3t") => Reply::new(200).text("welcome back"),
            _ => Reply::new(401),
        },
    }
}

#[tokio::test]
async fn agents_send_back_the_cookies_they_received() {
    // Arrange
    let agent = supertest::agent(session_app);

    // Act
    agent.post("/login").expect(200).await.unwrap();
    let response = agent.get("/profile").expect(200).await.unwrap();

    // Assert
    assert_eq!(response.text, "welcome back");
    assert_eq!(agent.cookie("session").as_deref(), Some("s3cr3t"));
}

#[tokio::test]
async fn cookies_are_not_shared_outside_the_agent() {
    // Arrange
    let agent = supertest::agent(session_app);
    agent.post("/login").expect(200).await.unwrap();

    // Act
    let fresh_agent = supertest::agent(session_app).get("/profile").await.unwrap();
    let one_shot = supertest::request(session_app)
        .get("/profile")
        .await
        .unwrap();

    // Assert
    assert_eq!(fresh_agent.status, 401);
    assert_eq!(one_shot.status, 401);
}

#[tokio::test]
async fn clones_share_the_session() {
    // Arrange
    let agent = supertest::agent(session_app);
    let clone = agent.clone();

    // Act
    clone.post("/login").expect(200).await.unwrap();

    // Assert
    agent.get("/profile").expect(200).await.unwrap();
}

#[tokio::test]
async fn expired_cookies_are_dropped() {
    // Arrange
    let agent = supertest::agent(session_app);
    agent.post("/login").expect(200).await.unwrap();

    // Act
    agent.post("/logout").expect(200).await.unwrap();

    // Assert
    assert!(agent.cookies().is_empty());
    agent.get("/profile").expect(401).await.unwrap();
}

#[tokio::test]
async fn failed_requests_still_update_the_cookie_jar() {
    // Arrange
    let app = |_: &Request| Reply::new(500).set_cookie("tracking", "1", "");
    let agent = supertest::agent(app);

    // Act
    let outcome = agent.get("/").expect(200).await;

    // Assert
    assert!(outcome.is_err());
    assert_eq!(agent.cookie("tracking").as_deref(), Some("1"));
}

#[tokio::test]
async fn query_and_verbs_coexist_on_the_agent() {
    // Arrange
    let agent: Agent = supertest::agent(session_app);

    // Act
    let response = agent
        .query(&json!({ "v": "1" }))
        .set("x-api-key", "foobar")
        .get("/echo")
        .query("page=2")
        .await
        .unwrap();

    // Assert
    assert_eq!(response.body["query"], json!([["v", "1"], ["page", "2"]]));
    assert_eq!(response.body["api_key"], "foobar");
}

#[tokio::test]
async fn request_level_changes_do_not_leak_into_the_agent() {
    // Arrange
    let agent = supertest::agent(session_app);
    agent.query("v=1");

    // Act
    agent
        .get("/echo")
        .query("v=2")
        .cookie("flavour", "chocolate")
        .await
        .unwrap();
    let response = agent.get("/echo").await.unwrap();

    // Assert
    assert_eq!(response.body["query"], json!([["v", "1"]]));
    assert_eq!(response.body["cookie"], serde_json::Value::Null);
}

#[tokio::test]
async fn agents_can_target_a_listening_address() {
    // Arrange
    let agent = supertest::agent("http://localhost:3000");

    // Act
    let with_query = agent.query("a=1");

    // Assert
    assert!(format!("{:?}", with_query).contains("localhost:3000"));
}

#[tokio::test]
async fn cookies_are_taken_from_the_final_response_only() {
    // Arrange
    let app = |request: &Request| match request.url.path() {
        "/login" => Reply::new(302)
            .insert_header("location", "/home")
            .set_cookie("session", "s3cr3t", "Path=/"),
        _ => Reply::new(200).set_cookie("visited", "1", ""),
    };
    let agent = supertest::agent(app);

    // Act
    let followed = agent.post("/login").redirects(1).await.unwrap();

    // Assert
    assert_eq!(followed.status, 200);
    assert_eq!(agent.cookie("visited").as_deref(), Some("1"));
    assert_eq!(agent.cookie("session"), None);

    // Without redirects the cookie of the 3xx response is kept.
    let not_followed = agent.post("/login").await.unwrap();
    assert_eq!(not_followed.status, 302);
    assert_eq!(agent.cookie("session").as_deref(), Some("s3cr3t"));
}
