// tests/api_tests.rs

use std::sync::Arc;

use classroom::{
    config::Config,
    routes,
    services::Services,
    state::AppState,
    store::{DocumentStore, MemoryStore},
    utils::jwt::sign_jwt,
};
use axum::{body::Body, http::Request};
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "test_secret_for_integration_tests";

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
async fn spawn_app() -> String {
    // 1. In-memory document store
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());

    // 2. Create test configuration and state
    let config = Config::for_tests(SECRET);
    let state = AppState {
        services: Services::new(store, &config),
        config,
    };

    // 3. Create the router with the app state
    let app = routes::create_router(state);

    // 4. Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    // 5. Spawn the server in the background
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

fn token(uid: &str, email: &str) -> String {
    sign_jwt(uid, email, SECRET, 600).expect("Failed to sign token")
}

/// Registers a profile for `uid` and returns its bearer token.
async fn register(client: &reqwest::Client, address: &str, uid: &str, email: &str) -> String {
    let token = token(uid, email);
    let response = client
        .put(format!("{}/api/users/me", address))
        .bearer_auth(&token)
        .json(&json!({ "firstName": uid, "lastName": "Test" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    token
}

async fn create_class(client: &reqwest::Client, address: &str, token: &str) -> String {
    let response = client
        .post(format!("{}/api/classes", address))
        .bearer_auth(token)
        .json(&json!({ "courseId": "course-1", "title": "Algebra" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);

    let body: Value = response.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_check_404() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(&format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn router_rejects_expired_token_without_network() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let config = Config::for_tests(SECRET);
    let app = routes::create_router(AppState {
        services: Services::new(store, &config),
        config,
    });

    // Signed far enough in the past to be outside the default leeway.
    let claims = json!({ "sub": "u1", "email": "u1@example.com", "exp": 1_000 });
    let expired = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/users/me/classes")
                .header("Authorization", format!("Bearer {}", expired))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn requests_without_token_are_rejected() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/api/users/me/classes", address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);

    let response = client
        .get(&format!("{}/api/users/me/classes", address))
        .bearer_auth("not-a-token")
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn create_class_and_list_my_classes() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let teacher = register(&client, &address, "teacher", "teacher@example.com").await;

    let class_id = create_class(&client, &address, &teacher).await;

    let response = client
        .get(&format!("{}/api/users/me/classes", address))
        .bearer_auth(&teacher)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let classes: Value = response.json().await.unwrap();
    assert_eq!(classes[0]["id"], class_id.as_str());
    assert_eq!(classes[0]["role"], "instructor");
    assert_eq!(classes[0]["counts"]["instructors"], 1);

    let response = client
        .get(&format!("{}/api/users/me/teaching", address))
        .bearer_auth(&teacher)
        .send()
        .await
        .unwrap();
    let teaching: Value = response.json().await.unwrap();
    assert_eq!(teaching.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn create_class_rejects_empty_title() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let teacher = register(&client, &address, "teacher", "teacher@example.com").await;

    let response = client
        .post(format!("{}/api/classes", address))
        .bearer_auth(&teacher)
        .json(&json!({ "courseId": "course-1", "title": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn invite_flow_over_http() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let teacher = register(&client, &address, "teacher", "teacher@example.com").await;
    let alice = register(&client, &address, "alice", "alice@example.com").await;
    let class_id = create_class(&client, &address, &teacher).await;

    // Self-invite is refused before anything is written.
    let response = client
        .post(format!("{}/api/classes/{}/invites", address, class_id))
        .bearer_auth(&teacher)
        .json(&json!({ "email": "Teacher@Example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Non-members cannot invite.
    let response = client
        .post(format!("{}/api/classes/{}/invites", address, class_id))
        .bearer_auth(&alice)
        .json(&json!({ "email": "bob@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    // Existing account becomes a member right away.
    let response = client
        .post(format!("{}/api/classes/{}/invites", address, class_id))
        .bearer_auth(&teacher)
        .json(&json!({ "email": "ALICE@example.com", "role": "student" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["uid"], "alice");

    // Unknown email leaves a pending invite.
    let response = client
        .post(format!("{}/api/classes/{}/invites", address, class_id))
        .bearer_auth(&teacher)
        .json(&json!({ "email": "bob@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);

    let response = client
        .get(format!("{}/api/classes/{}/invites", address, class_id))
        .bearer_auth(&teacher)
        .send()
        .await
        .unwrap();
    let invites: Value = response.json().await.unwrap();
    assert_eq!(invites.as_array().map(Vec::len), Some(1));
    assert_eq!(invites[0]["email"], "bob@example.com");

    // Bob registers and lands in the class.
    let response = client
        .put(format!("{}/api/users/me", address))
        .bearer_auth(token("bob", "bob@example.com"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    let registration: Value = response.json().await.unwrap();
    assert_eq!(registration["joinedClasses"][0], class_id.as_str());

    let response = client
        .get(format!("{}/api/classes/{}", address, class_id))
        .bearer_auth(&teacher)
        .send()
        .await
        .unwrap();
    let class: Value = response.json().await.unwrap();
    assert_eq!(class["counts"]["students"], 2);
    assert_eq!(class["counts"]["instructors"], 1);

    let response = client
        .get(format!("{}/api/classes/{}/members", address, class_id))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    let members: Value = response.json().await.unwrap();
    assert_eq!(members.as_array().map(Vec::len), Some(3));

    // Alice leaves on her own.
    let response = client
        .delete(format!("{}/api/classes/{}/members/alice", address, class_id))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = client
        .get(format!("{}/api/classes/{}", address, class_id))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn quiz_flow_over_http() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let teacher = register(&client, &address, "teacher", "teacher@example.com").await;
    let student = register(&client, &address, "student", "student@example.com").await;
    let class_id = create_class(&client, &address, &teacher).await;

    client
        .post(format!("{}/api/classes/{}/members", address, class_id))
        .bearer_auth(&teacher)
        .json(&json!({ "uid": "student", "role": "student" }))
        .send()
        .await
        .unwrap();

    let quiz = json!({
        "title": "Week 1",
        "pool": [
            { "id": "q1", "prompt": "Largest ocean?", "kind": "mcq-single", "choices": ["Pacific", "Atlantic"], "correct": 0 },
            { "id": "q2", "prompt": "Primes?", "kind": "mcq-multi", "choices": ["1", "2", "3", "4"], "correctMulti": [1, 2] }
        ]
    });

    // Students cannot author.
    let response = client
        .post(format!("{}/api/classes/{}/assignments", address, class_id))
        .bearer_auth(&student)
        .json(&quiz)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .post(format!("{}/api/classes/{}/assignments", address, class_id))
        .bearer_auth(&teacher)
        .json(&quiz)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let assignment: Value = response.json().await.unwrap();
    let assignment_id = assignment["id"].as_str().unwrap().to_string();
    assert_eq!(assignment["numQuestions"], 2);

    let base = format!("{}/api/classes/{}/assignments/{}", address, class_id, assignment_id);

    // Students see assignments without the pool.
    let response = client
        .get(format!("{}/api/classes/{}/assignments", address, class_id))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap();
    let listed: Value = response.json().await.unwrap();
    assert_eq!(listed[0]["pool"], json!([]));

    let response = client
        .post(format!("{}/attempt", base))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let view: Value = response.json().await.unwrap();
    assert!(!view.to_string().contains("correct"));

    let selected: Vec<String> = serde_json::from_value(view["attempt"]["selectedIds"].clone()).unwrap();
    let single = selected.iter().position(|id| id == "q1").unwrap();
    let multi = selected.iter().position(|id| id == "q2").unwrap();

    let save = |index: usize, body: Value| {
        client
            .put(format!("{}/attempt/answers/{}", base, index))
            .bearer_auth(&student)
            .json(&body)
            .send()
    };
    assert_eq!(save(single, json!({ "kind": "single", "choice": 0 })).await.unwrap().status().as_u16(), 200);
    assert_eq!(save(multi, json!({ "kind": "multi", "choice": 2 })).await.unwrap().status().as_u16(), 200);
    assert_eq!(save(multi, json!({ "kind": "multi", "choice": 1 })).await.unwrap().status().as_u16(), 200);
    assert_eq!(save(multi, json!({ "kind": "text", "text": "2, 3" })).await.unwrap().status().as_u16(), 400);
    assert_eq!(save(9, json!({ "kind": "single", "choice": 0 })).await.unwrap().status().as_u16(), 400);

    let response = client
        .post(format!("{}/attempt/submit", base))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let graded: Value = response.json().await.unwrap();
    assert_eq!(graded["score"], 2);

    let response = client
        .post(format!("{}/attempt/submit", base))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    let response = client
        .get(format!("{}/api/classes/{}/assignments/attempt-counts", address, class_id))
        .bearer_auth(&teacher)
        .send()
        .await
        .unwrap();
    let counts: Value = response.json().await.unwrap();
    assert_eq!(counts[0]["count"], 1);

    let response = client
        .get(format!("{}/attempts", base))
        .bearer_auth(&teacher)
        .send()
        .await
        .unwrap();
    let rows: Value = response.json().await.unwrap();
    assert_eq!(rows[0]["user"]["email"], "student@example.com");
    assert_eq!(rows[0]["member"]["role"], "student");

    let response = client
        .delete(&base)
        .bearer_auth(&teacher)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = client.get(&base).bearer_auth(&teacher).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn delete_class_over_http() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let teacher = register(&client, &address, "teacher", "teacher@example.com").await;
    let class_id = create_class(&client, &address, &teacher).await;

    let response = client
        .delete(format!("{}/api/classes/{}", address, class_id))
        .bearer_auth(&teacher)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = client
        .get(&format!("{}/api/users/me/classes", address))
        .bearer_auth(&teacher)
        .send()
        .await
        .unwrap();
    let classes: Value = response.json().await.unwrap();
    assert_eq!(classes, json!([]));
}
