// src/handlers/player.rs

use axum::{Json, extract::State, response::IntoResponse};
use sqlx::PgPool;

use crate::{
    error::AppError,
    handlers::{
        quiz::quiz_standings,
        round::{load_round_details, quiz_rounds},
    },
    models::{
        question::PublicQuestion,
        quiz::{PlayerQuiz, PlayerRound, Quiz},
    },
};

/// Public view of the most recently activated quiz. Correct answers are never included.
pub async fn active_quiz(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;

    let quiz = sqlx::query_as::<_, Quiz>(
        "SELECT id, admin_id, name, num_teams, is_active, activated_at, created_at \
         FROM quizzes WHERE is_active ORDER BY activated_at DESC NULLS LAST, id DESC LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("No active quiz".to_string()))?;

    let rounds = quiz_rounds(&mut conn, quiz.id).await?;
    let rounds = load_round_details(&mut conn, rounds)
        .await?
        .into_iter()
        .map(|detail| PlayerRound {
            round: detail.round,
            questions: detail.questions.into_iter().map(PublicQuestion::from).collect(),
        })
        .collect();

    let teams = quiz_standings(&mut conn, quiz.id).await?;

    Ok(Json(PlayerQuiz {
        id: quiz.id,
        name: quiz.name,
        rounds,
        teams,
    }))
}
