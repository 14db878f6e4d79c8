// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, courses, enrollments, health, quizzes, submissions},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Public: registration, login and the health probe.
/// * Everything else requires a bearer token; `/api/admin` additionally requires the admin role.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let public_auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let course_routes = Router::new()
        .route("/", get(courses::list_courses).post(courses::create_course))
        .route("/deleted", get(courses::list_deleted_courses))
        .route(
            "/{id}",
            get(courses::get_course)
                .put(courses::update_course)
                .delete(courses::delete_course),
        )
        .route("/{id}/restore", post(courses::restore_course));

    let enrollment_routes = Router::new()
        .route(
            "/",
            get(enrollments::list_enrollments).post(enrollments::create_enrollment),
        )
        .route(
            "/{id}",
            get(enrollments::get_enrollment)
                .put(enrollments::update_enrollment)
                .delete(enrollments::delete_enrollment),
        )
        .route(
            "/{id}/restore",
            post(enrollments::restore_enrollment).layer(middleware::from_fn(admin_middleware)),
        );

    let quiz_routes = Router::new()
        .route("/", get(quizzes::list_quizzes).post(quizzes::create_quiz))
        .route(
            "/{id}",
            get(quizzes::get_quiz)
                .put(quizzes::update_quiz)
                .delete(quizzes::delete_quiz),
        )
        .route("/{id}/questions", post(quizzes::create_question))
        .route("/{id}/start", post(submissions::start_submission));

    let question_routes = Router::new()
        .route(
            "/{id}",
            put(quizzes::update_question).delete(quizzes::delete_question),
        )
        .route("/{id}/choices", post(quizzes::create_choice));

    let choice_routes = Router::new().route(
        "/{id}",
        put(quizzes::update_choice).delete(quizzes::delete_choice),
    );

    let submission_routes = Router::new()
        .route("/", get(submissions::list_submissions))
        .route("/{id}", get(submissions::get_submission))
        .route("/{id}/answers", post(submissions::submit_answer))
        .route("/{id}/finalize", post(submissions::finalize_submission));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/{id}",
            put(admin::update_user).delete(admin::delete_user),
        )
        .layer(middleware::from_fn(admin_middleware));

    // Auth runs first (outermost), then the admin check where present.
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .nest("/courses", course_routes)
        .nest("/enrollments", enrollment_routes)
        .nest("/quizzes", quiz_routes)
        .nest("/questions", question_routes)
        .nest("/choices", choice_routes)
        .nest("/submissions", submission_routes)
        .nest("/admin", admin_routes)
        .layer(middleware::from_fn_with_state(
            state.jwt.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/api/auth", public_auth_routes)
        .nest("/api", protected_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
