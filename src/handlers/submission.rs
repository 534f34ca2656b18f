// src/handlers/submission.rs

use std::collections::HashSet;

use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde_json::{Value, json};
use sqlx::{PgConnection, PgPool};

use crate::{
    error::{AppError, is_unique_violation},
    extract::ValidatedJson,
    handlers::question::find_question,
    models::{
        history::{EstimationGuess, GivenAnswer, SubmitAnswerRequest},
        question::{Question, parse_number},
        quiz::Quiz,
        round::Round,
    },
    scoring::{Guess, answer_points, check_question, closest_guesses, partition_guesses, pass_allowance},
    utils::jwt::Claims,
};

/// Records an answer and updates points.
///
/// Everything runs in one transaction holding a row lock on the quiz, so
/// concurrent submissions for the same quiz are applied one after another.
pub async fn submit_answer(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    ValidatedJson(payload): ValidatedJson<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let admin_id = claims.user_id()?;
    let mut tx = pool.begin().await?;

    let quiz = sqlx::query_as::<_, Quiz>(
        "SELECT id, admin_id, name, num_teams, is_active, activated_at, created_at \
         FROM quizzes WHERE id = $1 AND admin_id = $2 FOR UPDATE",
    )
    .bind(payload.quiz_id)
    .bind(admin_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;

    let round = sqlx::query_as::<_, Round>(
        "SELECT id, admin_id, round_number, name, category, rules, regulation, created_at \
         FROM rounds WHERE id = $1 AND admin_id = $2",
    )
    .bind(payload.round_id)
    .bind(admin_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Round not found".to_string()))?;

    let in_quiz: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM quiz_rounds WHERE quiz_id = $1 AND round_id = $2)")
            .bind(quiz.id)
            .bind(round.id)
            .fetch_one(&mut *tx)
            .await?;
    if !in_quiz {
        return Err(AppError::BadRequest("Round does not belong to this quiz".to_string()));
    }

    let question = find_question(&mut *tx, payload.question_id, admin_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;
    if question.round_id != Some(round.id) {
        return Err(AppError::BadRequest("Question does not belong to this round".to_string()));
    }

    let response = if round.is_estimation() {
        let answers = payload.answers.as_deref().unwrap_or_default();
        if answers.is_empty() {
            return Err(AppError::BadRequest(
                "Estimation rounds require a non-empty 'answers' list".to_string(),
            ));
        }
        submit_estimation(&mut tx, &quiz, &round, &question, answers).await?
    } else {
        let team_id = payload
            .team_id
            .ok_or_else(|| AppError::BadRequest("team_id is required".to_string()))?;
        let given = payload
            .given_answer
            .as_ref()
            .filter(|g| !g.is_blank())
            .ok_or_else(|| AppError::BadRequest("given_answer is required".to_string()))?;
        submit_normal(&mut tx, &quiz, &round, &question, team_id, given, payload.is_passed).await?
    };

    tx.commit().await?;

    Ok(Json(response))
}

/// Finds or creates the history row of (quiz, round, team).
async fn upsert_history(conn: &mut PgConnection, quiz_id: i64, round_id: i64, team_id: i64) -> Result<i64, AppError> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO quiz_history (quiz_id, round_id, team_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (quiz_id, round_id, team_id) DO UPDATE SET updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(quiz_id)
    .bind(round_id)
    .bind(team_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

async fn append_answer(
    conn: &mut PgConnection,
    history_id: i64,
    question_id: i64,
    given_answer: &str,
    points: i64,
    is_correct: bool,
    is_passed: bool,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO history_answers (history_id, question_id, given_answer, points_earned, is_correct, is_passed)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(history_id)
    .bind(question_id)
    .bind(given_answer)
    .bind(points)
    .bind(is_correct)
    .bind(is_passed)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Team has already answered this question".to_string())
        } else {
            AppError::from(e)
        }
    })?;

    Ok(())
}

/// Adds `points` to the history total and to the team score. Returns the new team score.
async fn credit_points(conn: &mut PgConnection, history_id: i64, team_id: i64, points: i64) -> Result<i64, AppError> {
    sqlx::query("UPDATE quiz_history SET total_points = total_points + $1, updated_at = NOW() WHERE id = $2")
        .bind(points)
        .bind(history_id)
        .execute(&mut *conn)
        .await?;

    let team_points: i64 = sqlx::query_scalar("UPDATE teams SET points = points + $1 WHERE id = $2 RETURNING points")
        .bind(points)
        .bind(team_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(team_points)
}

async fn submit_normal(
    conn: &mut PgConnection,
    quiz: &Quiz,
    round: &Round,
    question: &Question,
    team_id: i64,
    given: &GivenAnswer,
    is_passed: bool,
) -> Result<Value, AppError> {
    let in_quiz: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM teams WHERE id = $1 AND quiz_id = $2)")
        .bind(team_id)
        .bind(quiz.id)
        .fetch_one(&mut *conn)
        .await?;
    if !in_quiz {
        return Err(AppError::BadRequest("Team is not part of this quiz".to_string()));
    }

    let answered: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM history_answers a
            JOIN quiz_history h ON h.id = a.history_id
            WHERE h.quiz_id = $1 AND h.team_id = $2 AND a.question_id = $3
        )
        "#,
    )
    .bind(quiz.id)
    .bind(team_id)
    .bind(question.id)
    .fetch_one(&mut *conn)
    .await?;
    if answered {
        return Err(AppError::Conflict("Team has already answered this question".to_string()));
    }

    if is_passed {
        match pass_allowance(&round.rules) {
            Some(0) => {
                return Err(AppError::BadRequest("Passing is not enabled for this round".to_string()));
            }
            Some(limit) => {
                let passes: i64 = sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*) FROM history_answers a
                    JOIN quiz_history h ON h.id = a.history_id
                    WHERE h.quiz_id = $1 AND a.question_id = $2 AND a.is_passed
                    "#,
                )
                .bind(quiz.id)
                .bind(question.id)
                .fetch_one(&mut *conn)
                .await?;
                if passes >= i64::from(limit) {
                    return Err(AppError::BadRequest(format!(
                        "This question can only be passed {} time(s)",
                        limit
                    )));
                }
            }
            None => {}
        }
    }

    let given_text = given.as_text();
    let is_correct = check_question(question, &given_text);
    let points = answer_points(&round.rules, is_correct, is_passed);

    let history_id = upsert_history(conn, quiz.id, round.id, team_id).await?;
    append_answer(conn, history_id, question.id, &given_text, points, is_correct, is_passed).await?;
    let team_points = credit_points(conn, history_id, team_id, points).await?;

    tracing::info!(
        quiz_id = quiz.id,
        question_id = question.id,
        team_id,
        is_correct,
        is_passed,
        points,
        "answer recorded"
    );

    Ok(json!({
        "points_earned": points,
        "is_correct": is_correct,
        "team_points": team_points,
    }))
}

async fn submit_estimation(
    conn: &mut PgConnection,
    quiz: &Quiz,
    round: &Round,
    question: &Question,
    answers: &[EstimationGuess],
) -> Result<Value, AppError> {
    let target = question
        .numeric_answer()
        .ok_or_else(|| AppError::BadRequest("Question has no numeric answer to estimate".to_string()))?;

    let scored: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM history_answers a
            JOIN quiz_history h ON h.id = a.history_id
            WHERE h.quiz_id = $1 AND a.question_id = $2 AND a.is_correct
        )
        "#,
    )
    .bind(quiz.id)
    .bind(question.id)
    .fetch_one(&mut *conn)
    .await?;
    if scored {
        return Err(AppError::Conflict("This question has already been scored".to_string()));
    }

    let quiz_teams: HashSet<i64> = sqlx::query_scalar::<_, i64>("SELECT id FROM teams WHERE quiz_id = $1")
        .bind(quiz.id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .collect();
    if quiz_teams.is_empty() {
        return Err(AppError::BadRequest("Quiz has no teams left".to_string()));
    }

    let answered: HashSet<i64> = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT h.team_id FROM history_answers a
        JOIN quiz_history h ON h.id = a.history_id
        WHERE h.quiz_id = $1 AND a.question_id = $2
        "#,
    )
    .bind(quiz.id)
    .bind(question.id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .filter(|team_id| quiz_teams.contains(team_id))
    .collect();

    let (accepted, skipped) = partition_guesses(&quiz_teams, &answered, answers);

    for guess in &accepted {
        let history_id = upsert_history(conn, quiz.id, round.id, guess.team_id).await?;
        append_answer(conn, history_id, question.id, &guess.value.to_string(), 0, false, false).await?;
    }

    // Counted against the current teams, so a deleted team no longer holds scoring back.
    let pending = quiz_teams.len().saturating_sub(answered.len() + accepted.len());
    if pending > 0 {
        tracing::info!(quiz_id = quiz.id, question_id = question.id, pending, "estimation guesses recorded");
        return Ok(json!({
            "recorded": accepted.len(),
            "skipped": skipped,
            "scored": false,
            "pending_teams": pending,
            "winners": [],
        }));
    }

    // Every team has guessed: score the question.
    let rows: Vec<(i64, i64, String)> = sqlx::query_as(
        r#"
        SELECT h.id, h.team_id, a.given_answer FROM history_answers a
        JOIN quiz_history h ON h.id = a.history_id
        WHERE h.quiz_id = $1 AND a.question_id = $2
        "#,
    )
    .bind(quiz.id)
    .bind(question.id)
    .fetch_all(&mut *conn)
    .await?;

    let guesses: Vec<Guess> = rows
        .iter()
        .filter_map(|(_, team_id, answer)| parse_number(answer).map(|value| Guess { team_id: *team_id, value }))
        .collect();

    let points = round.rules.points;
    let mut winners = Vec::new();
    for winner in closest_guesses(target, &guesses) {
        let Some((history_id, _, _)) = rows.iter().find(|(_, team_id, _)| *team_id == winner.team_id) else {
            continue;
        };

        sqlx::query(
            "UPDATE history_answers SET is_correct = TRUE, points_earned = $1 \
             WHERE history_id = $2 AND question_id = $3",
        )
        .bind(points)
        .bind(history_id)
        .bind(question.id)
        .execute(&mut *conn)
        .await?;

        let team_points = credit_points(conn, *history_id, winner.team_id, points).await?;

        winners.push(json!({
            "team_id": winner.team_id,
            "guess": winner.guess,
            "difference": winner.difference,
            "points_earned": points,
            "team_points": team_points,
        }));
    }

    tracing::info!(
        quiz_id = quiz.id,
        question_id = question.id,
        winners = winners.len(),
        "estimation question scored"
    );

    Ok(json!({
        "recorded": accepted.len(),
        "skipped": skipped,
        "scored": true,
        "pending_teams": 0,
        "correct_answer": target,
        "winners": winners,
    }))
}
