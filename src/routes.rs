// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{assignments, attempts, classes, invites, members, users},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Every `/api` route sits behind the bearer-token middleware.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (engines and configuration).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let user_routes = Router::new()
        .route("/me", put(users::register_profile))
        .route("/me/classes", get(users::my_classes))
        .route("/me/teaching", get(users::my_teaching))
        .route("/me/class-index/reconcile", post(users::reconcile_class_index));

    let assignment_routes = Router::new()
        .route(
            "/",
            get(assignments::list_assignments).post(assignments::create_quiz),
        )
        .route("/attempt-counts", get(assignments::attempt_counts))
        .route(
            "/{assignment_id}",
            get(assignments::get_assignment).delete(assignments::delete_assignment),
        )
        .route("/{assignment_id}/questions", post(assignments::add_question))
        .route(
            "/{assignment_id}/questions/{question_id}",
            delete(assignments::remove_question),
        )
        .route(
            "/{assignment_id}/attempt",
            post(attempts::start_attempt).get(attempts::get_attempt),
        )
        .route(
            "/{assignment_id}/attempt/answers/{index}",
            put(attempts::save_answer),
        )
        .route(
            "/{assignment_id}/attempt/submit",
            post(attempts::submit_attempt),
        )
        .route("/{assignment_id}/attempts", get(assignments::list_attempts));

    let class_routes = Router::new()
        .route("/", post(classes::create_class))
        .route(
            "/{class_id}",
            get(classes::get_class).delete(classes::delete_class),
        )
        .route(
            "/{class_id}/members",
            get(members::list_members).post(members::add_member),
        )
        .route("/{class_id}/members/{uid}", delete(members::remove_member))
        .route(
            "/{class_id}/invites",
            get(invites::list_invites).post(invites::create_invite),
        )
        .route(
            "/{class_id}/invites/{invite_id}",
            delete(invites::cancel_invite),
        )
        .nest("/{class_id}/assignments", assignment_routes);

    let api_routes = Router::new()
        .nest("/users", user_routes)
        .nest("/classes", class_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api", api_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
