// tests/api_tests.rs

mod common;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use lms_backend::{models::user::Role, routes, utils::jwt::JwtKeys};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{TEST_JWT_SECRET, get_json, lazy_state, post_json, register_and_login, spawn_app};

fn token_for(id: i64, role: Role) -> String {
    JwtKeys::new(TEST_JWT_SECRET, 600).sign(id, role).unwrap()
}

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    let app = routes::create_router(lazy_state());
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

// ---------------------------------------------------------------------------
// Router-level checks (no database needed)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_path_is_404() {
    let request = Request::builder()
        .uri("/random_path_that_does_not_exist")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn protected_route_requires_token() {
    let request = Request::builder()
        .uri("/api/courses")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn token_signed_with_other_secret_is_rejected() {
    let forged = JwtKeys::new("not_the_server_secret", 600)
        .sign(1, Role::Admin)
        .unwrap();
    let request = Request::builder()
        .uri("/api/admin/users")
        .header(header::AUTHORIZATION, format!("Bearer {}", forged))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_reject_non_admins() {
    for role in [Role::Student, Role::Instructor] {
        let request = Request::builder()
            .uri("/api/admin/users")
            .header(header::AUTHORIZATION, format!("Bearer {}", token_for(7, role)))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "forbidden");
    }
}

#[tokio::test]
async fn enrollment_restore_is_admin_only() {
    let token = token_for(7, Role::Student);
    let request = json_request("POST", "/api/enrollments/1/restore", Some(&token), json!({}));
    let (status, _) = send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn register_fails_validation() {
    let request = json_request(
        "POST",
        "/api/auth/register",
        None,
        json!({
            "username": "yo",
            "email": "yo@example.com",
            "password": "password123",
            "password_confirm": "password123",
            "role": "student"
        }),
    );
    let (status, body) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn register_as_admin_is_rejected() {
    let request = json_request(
        "POST",
        "/api/auth/register",
        None,
        json!({
            "username": "sneaky_admin",
            "email": "sneaky@example.com",
            "password": "password123",
            "password_confirm": "password123",
            "role": "admin"
        }),
    );
    let (status, _) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn students_cannot_create_courses() {
    let token = token_for(7, Role::Student);
    let request = json_request(
        "POST",
        "/api/courses",
        Some(&token),
        json!({ "title": "Rust", "description": "Ownership", "price_cents": 0 }),
    );
    let (status, _) = send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn negative_course_price_is_rejected() {
    let token = token_for(3, Role::Instructor);
    let request = json_request(
        "POST",
        "/api/courses",
        Some(&token),
        json!({ "title": "Rust", "description": "Ownership", "price_cents": -1 }),
    );
    let (status, _) = send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn instructors_cannot_create_enrollments() {
    let token = token_for(3, Role::Instructor);
    let request = json_request("POST", "/api/enrollments", Some(&token), json!({ "course_id": 1 }));
    let (status, _) = send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ---------------------------------------------------------------------------
// End-to-end CRUD (runs only when DATABASE_URL is set)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_login_and_me() {
    let Some(address) = spawn_app().await else { return };
    let client = reqwest::Client::new();

    let (user_id, token) = register_and_login(&client, &address, "student").await;

    let response = get_json(&client, format!("{}/api/auth/me", address), &token).await;
    assert_eq!(response.status().as_u16(), 200);
    let me: Value = response.json().await.unwrap();
    assert_eq!(me["id"].as_i64(), Some(user_id));
    assert_eq!(me["role"], "student");
    assert!(me.get("password").is_none());
}

#[tokio::test]
async fn login_with_unknown_user_is_401() {
    let Some(address) = spawn_app().await else { return };
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "username": "nobody_here_at_all", "password": "password123" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn course_lifecycle_with_soft_delete() {
    let Some(address) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let (instructor_id, instructor) = register_and_login(&client, &address, "instructor").await;
    let (_, other_instructor) = register_and_login(&client, &address, "instructor").await;

    let title = common::unique_name("course");
    let response = post_json(
        &client,
        format!("{}/api/courses", address),
        &instructor,
        json!({
            "title": title,
            "description": "<b>Borrowing</b><script>alert(1)</script>",
            "price_cents": 1999,
            "status": "active"
        }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 201);
    let course: Value = response.json().await.unwrap();
    let course_id = course["id"].as_i64().unwrap();
    assert_eq!(course["instructor_id"].as_i64(), Some(instructor_id));
    assert!(!course["description"].as_str().unwrap().contains("<script>"));

    // Search finds it.
    let response = get_json(
        &client,
        format!("{}/api/courses?q={}&ordering=-price", address, title),
        &instructor,
    )
    .await;
    let found: Vec<Value> = response.json().await.unwrap();
    assert_eq!(found.len(), 1);

    // Another instructor cannot edit it.
    let response = client
        .put(format!("{}/api/courses/{}", address, course_id))
        .bearer_auth(&other_instructor)
        .json(&json!({ "title": "Hijacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    // Soft delete hides it, restore brings it back.
    let response = client
        .delete(format!("{}/api/courses/{}", address, course_id))
        .bearer_auth(&instructor)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = get_json(&client, format!("{}/api/courses/{}", address, course_id), &instructor).await;
    assert_eq!(response.status().as_u16(), 404);

    let response = get_json(&client, format!("{}/api/courses/deleted", address), &instructor).await;
    let deleted: Vec<Value> = response.json().await.unwrap();
    assert!(deleted.iter().any(|c| c["id"].as_i64() == Some(course_id)));

    let response = post_json(
        &client,
        format!("{}/api/courses/{}/restore", address, course_id),
        &instructor,
        json!({}),
    )
    .await;
    assert_eq!(response.status().as_u16(), 200);

    let response = get_json(&client, format!("{}/api/courses/{}", address, course_id), &instructor).await;
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn duplicate_enrollment_conflicts() {
    let Some(address) = spawn_app().await else { return };
    let client = reqwest::Client::new();
    let (_, instructor) = register_and_login(&client, &address, "instructor").await;
    let (student_id, student) = register_and_login(&client, &address, "student").await;

    let response = post_json(
        &client,
        format!("{}/api/courses", address),
        &instructor,
        json!({ "title": "Databases", "description": "Indexes", "price_cents": 0 }),
    )
    .await;
    let course_id = response.json::<Value>().await.unwrap()["id"].as_i64().unwrap();

    let enroll = json!({ "course_id": course_id });
    let response = post_json(&client, format!("{}/api/enrollments", address), &student, enroll.clone()).await;
    assert_eq!(response.status().as_u16(), 201);
    let enrollment: Value = response.json().await.unwrap();
    assert_eq!(enrollment["student_id"].as_i64(), Some(student_id));
    assert_eq!(enrollment["status"], "active");

    let response = post_json(&client, format!("{}/api/enrollments", address), &student, enroll).await;
    assert_eq!(response.status().as_u16(), 409);
}
