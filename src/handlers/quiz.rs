// src/handlers/quiz.rs

use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgConnection, PgPool};

use crate::{
    error::{AppError, is_unique_violation},
    extract::ValidatedJson,
    handlers::round::{insert_round, load_round_details, quiz_rounds},
    models::{
        history::{AnswerFact, summarize_history},
        quiz::{CreateQuizRequest, Quiz, QuizDetail, QuizSummary},
        round::RoundSummary,
        team::{Team, TeamStanding, name_key, rank_standings},
    },
    utils::jwt::Claims,
};

const QUIZ_COLUMNS: &str = "id, admin_id, name, num_teams, is_active, activated_at, created_at";

/// Loads a quiz owned by `admin_id`, or 404.
pub(crate) async fn find_quiz(conn: &mut PgConnection, id: i64, admin_id: i64) -> Result<Quiz, AppError> {
    sqlx::query_as::<_, Quiz>(&format!(
        "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1 AND admin_id = $2"
    ))
    .bind(id)
    .bind(admin_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))
}

pub(crate) async fn quiz_standings(conn: &mut PgConnection, quiz_id: i64) -> Result<Vec<TeamStanding>, AppError> {
    let teams = sqlx::query_as::<_, TeamStanding>(
        "SELECT id, name, points FROM teams WHERE quiz_id = $1 ORDER BY points DESC, name",
    )
    .bind(quiz_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(teams)
}

/// Returns the first team name that appears twice (ignoring case).
fn duplicate_team_name(names: &[&str]) -> Option<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .find(|n| !seen.insert(name_key(n)))
        .map(|n| n.trim().to_string())
}

/// Creates a quiz with its teams and rounds in a single transaction.
pub async fn create_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    ValidatedJson(payload): ValidatedJson<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let admin_id = claims.user_id()?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Quiz name is required".to_string()));
    }

    let team_names: Vec<&str> = payload.teams.iter().map(|t| t.name.trim()).collect();
    if team_names.iter().any(|n| n.is_empty()) {
        return Err(AppError::BadRequest("Team names cannot be blank".to_string()));
    }
    if let Some(dup) = duplicate_team_name(&team_names) {
        return Err(AppError::BadRequest(format!("Team name '{}' is used more than once", dup)));
    }

    let mut tx = pool.begin().await?;

    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM quizzes WHERE admin_id = $1 AND LOWER(name) = LOWER($2))",
    )
    .bind(admin_id)
    .bind(name)
    .fetch_one(&mut *tx)
    .await?;

    if exists {
        return Err(AppError::Conflict(format!("Quiz '{}' already exists", name)));
    }

    let quiz = sqlx::query_as::<_, Quiz>(&format!(
        "INSERT INTO quizzes (admin_id, name, num_teams) VALUES ($1, $2, $3) RETURNING {QUIZ_COLUMNS}"
    ))
    .bind(admin_id)
    .bind(name)
    .bind(team_names.len() as i32)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Quiz '{}' already exists", name))
        } else {
            tracing::error!("Failed to create quiz: {:?}", e);
            AppError::from(e)
        }
    })?;

    let teams = sqlx::query_as::<_, Team>(
        r#"
        INSERT INTO teams (admin_id, quiz_id, name)
        SELECT $1, $2, t.name FROM UNNEST($3::TEXT[]) WITH ORDINALITY AS t(name, ord)
        ORDER BY t.ord
        RETURNING id, admin_id, quiz_id, name, points, created_at
        "#,
    )
    .bind(admin_id)
    .bind(quiz.id)
    .bind(team_names.iter().map(|n| n.to_string()).collect::<Vec<String>>())
    .fetch_all(&mut *tx)
    .await?;

    let mut rounds = Vec::with_capacity(payload.rounds.len());
    for (i, round) in payload.rounds.iter().enumerate() {
        let number = i as i32 + 1;
        let label = format!("Round {}: ", number);
        rounds.push(insert_round(&mut tx, admin_id, number, round, teams.len(), &label).await?);
    }

    let round_ids: Vec<i64> = rounds.iter().map(|r| r.round.id).collect();
    sqlx::query(
        r#"
        INSERT INTO quiz_rounds (quiz_id, round_id, position)
        SELECT $1, t.round_id, t.position::INTEGER
        FROM UNNEST($2::BIGINT[]) WITH ORDINALITY AS t(round_id, position)
        "#,
    )
    .bind(quiz.id)
    .bind(&round_ids)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(quiz_id = quiz.id, admin_id, rounds = rounds.len(), teams = teams.len(), "quiz created");

    Ok((StatusCode::CREATED, Json(QuizDetail { quiz, rounds, teams })))
}

/// Lists the admin's quizzes with round summaries and team standings.
pub async fn list_quizzes(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let admin_id = claims.user_id()?;

    let quizzes = sqlx::query_as::<_, Quiz>(&format!(
        "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE admin_id = $1 ORDER BY created_at DESC, id DESC"
    ))
    .bind(admin_id)
    .fetch_all(&pool)
    .await?;

    let ids: Vec<i64> = quizzes.iter().map(|q| q.id).collect();

    let round_rows: Vec<(i64, i64, i32, String, String)> = sqlx::query_as(
        r#"
        SELECT qr.quiz_id, r.id, r.round_number, r.name, r.category
        FROM quiz_rounds qr JOIN rounds r ON r.id = qr.round_id
        WHERE qr.quiz_id = ANY($1)
        ORDER BY qr.quiz_id, qr.position
        "#,
    )
    .bind(&ids)
    .fetch_all(&pool)
    .await?;

    let team_rows: Vec<(i64, i64, String, i64)> = sqlx::query_as(
        r#"
        SELECT quiz_id, id, name, points FROM teams
        WHERE quiz_id = ANY($1)
        ORDER BY quiz_id, points DESC, name
        "#,
    )
    .bind(&ids)
    .fetch_all(&pool)
    .await?;

    let mut rounds_by_quiz: HashMap<i64, Vec<RoundSummary>> = HashMap::new();
    for (quiz_id, id, round_number, name, category) in round_rows {
        rounds_by_quiz.entry(quiz_id).or_default().push(RoundSummary {
            id,
            round_number,
            name,
            category,
        });
    }

    let mut teams_by_quiz: HashMap<i64, Vec<TeamStanding>> = HashMap::new();
    for (quiz_id, id, name, points) in team_rows {
        teams_by_quiz
            .entry(quiz_id)
            .or_default()
            .push(TeamStanding { id, name, points });
    }

    let summaries: Vec<QuizSummary> = quizzes
        .into_iter()
        .map(|quiz| QuizSummary {
            rounds: rounds_by_quiz.remove(&quiz.id).unwrap_or_default(),
            teams: teams_by_quiz.remove(&quiz.id).unwrap_or_default(),
            quiz,
        })
        .collect();

    Ok(Json(summaries))
}

/// Full quiz: rounds with their questions, and teams.
pub async fn get_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let quiz = find_quiz(&mut conn, id, claims.user_id()?).await?;

    let rounds = quiz_rounds(&mut conn, quiz.id).await?;
    let rounds = load_round_details(&mut conn, rounds).await?;

    let teams = sqlx::query_as::<_, Team>(
        "SELECT id, admin_id, quiz_id, name, points, created_at FROM teams WHERE quiz_id = $1 ORDER BY id",
    )
    .bind(quiz.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(QuizDetail { quiz, rounds, teams }))
}

/// Deletes a quiz with its rounds, teams and history. Questions are kept.
pub async fn delete_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let admin_id = claims.user_id()?;
    let mut tx = pool.begin().await?;

    let quiz = find_quiz(&mut tx, id, admin_id).await?;

    // Teams and history cascade from the quiz row; rounds do not.
    sqlx::query("DELETE FROM rounds WHERE id IN (SELECT round_id FROM quiz_rounds WHERE quiz_id = $1)")
        .bind(quiz.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM quizzes WHERE id = $1")
        .bind(quiz.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete quiz: {:?}", e);
            AppError::from(e)
        })?;

    tx.commit().await?;

    tracing::info!(quiz_id = quiz.id, admin_id, "quiz deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Makes this quiz the one served to players; the admin's other quizzes are deactivated.
pub async fn activate_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let admin_id = claims.user_id()?;
    let mut tx = pool.begin().await?;

    find_quiz(&mut tx, id, admin_id).await?;

    sqlx::query("UPDATE quizzes SET is_active = FALSE WHERE admin_id = $1 AND id <> $2 AND is_active")
        .bind(admin_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let quiz = sqlx::query_as::<_, Quiz>(&format!(
        "UPDATE quizzes SET is_active = TRUE, activated_at = NOW() WHERE id = $1 RETURNING {QUIZ_COLUMNS}"
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(quiz_id = quiz.id, admin_id, "quiz activated");
    Ok(Json(quiz))
}

pub async fn leaderboard(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let quiz = find_quiz(&mut conn, id, claims.user_id()?).await?;
    let standings = quiz_standings(&mut conn, quiz.id).await?;

    Ok(Json(rank_standings(standings)))
}

/// Per-team, per-round statistics for a quiz.
pub async fn history(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;
    let quiz = find_quiz(&mut conn, id, claims.user_id()?).await?;

    let teams: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM teams WHERE quiz_id = $1 ORDER BY id")
        .bind(quiz.id)
        .fetch_all(&mut *conn)
        .await?;

    let facts = sqlx::query_as::<_, AnswerFact>(
        r#"
        SELECT h.team_id, h.round_id, r.round_number, r.name AS round_name,
               a.points_earned, a.is_correct, a.is_passed
        FROM quiz_history h
        JOIN rounds r ON r.id = h.round_id
        JOIN history_answers a ON a.history_id = h.id
        WHERE h.quiz_id = $1
        ORDER BY a.id
        "#,
    )
    .bind(quiz.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(summarize_history(&teams, &facts)))
}
