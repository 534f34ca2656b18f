// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, patch, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, player, question, quiz, round, submission, team},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Assembles the main application router.
///
/// * Public: register, login, active quiz.
/// * Authenticated: `/api/auth/me`.
/// * Admin only: everything else under `/api`.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let public_auth = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let user_auth = Router::new()
        .route("/me", get(auth::me))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let question_routes = Router::new()
        .route("/", get(question::list_questions).post(question::create_question))
        .route(
            "/{id}",
            get(question::get_question)
                .put(question::update_question)
                .delete(question::delete_question),
        );

    let round_routes = Router::new()
        .route("/", get(round::list_rounds).post(round::create_round))
        .route(
            "/{id}",
            get(round::get_round).put(round::update_round).delete(round::delete_round),
        );

    let team_routes = Router::new()
        .route("/", get(team::list_teams).post(team::add_team))
        .route("/{id}", axum::routing::delete(team::delete_team))
        .route("/{id}/add", patch(team::add_points))
        .route("/{id}/reduce", patch(team::reduce_points));

    let quiz_routes = Router::new()
        .route("/", get(quiz::list_quizzes).post(quiz::create_quiz))
        .route("/submit-answer", post(submission::submit_answer))
        .route("/{id}", get(quiz::get_quiz).delete(quiz::delete_quiz))
        .route("/{id}/activate", post(quiz::activate_quiz))
        .route("/{id}/leaderboard", get(quiz::leaderboard))
        .route("/{id}/history", get(quiz::history));

    // Auth runs first (outermost layer), then the admin check.
    let admin_routes = Router::new()
        .route("/api/auth/admin/register", post(auth::admin_register))
        .nest("/api/question", question_routes)
        .nest("/api/round", round_routes)
        .nest("/api/team", team_routes)
        .nest("/api/quiz", quiz_routes)
        .route_layer(middleware::from_fn(admin_middleware))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let player_routes = Router::new().route("/active-quiz", get(player::active_quiz));

    Router::new()
        .nest("/api/auth", public_auth.merge(user_auth))
        .nest("/api/player", player_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
