// src/handlers/question.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder, types::Json as SqlJson};

use crate::{
    error::AppError,
    extract::ValidatedJson,
    models::question::{
        CreateQuestionRequest, QUESTION_COLUMNS, Question, QuestionListParams, UpdateQuestionRequest,
        new_options, parse_number, resolve_correct_answer,
    },
    models::round::RoundCategory,
    utils::jwt::Claims,
};

/// Loads one question owned by `admin_id`.
pub(crate) async fn find_question<'e>(
    executor: impl PgExecutor<'e>,
    id: i64,
    admin_id: i64,
) -> Result<Option<Question>, AppError> {
    let question = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions q \
         LEFT JOIN round_questions rq ON rq.question_id = q.id \
         WHERE q.id = $1 AND q.admin_id = $2"
    ))
    .bind(id)
    .bind(admin_id)
    .fetch_optional(executor)
    .await?;

    Ok(question)
}

/// Creates a new question. Option ids are generated here.
pub async fn create_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    ValidatedJson(payload): ValidatedJson<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let admin_id = claims.user_id()?;

    let options = new_options(&payload.options);
    let correct_answer = resolve_correct_answer(&options, &payload.correct_answer)?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions (admin_id, text, options, correct_answer, category, points, media)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(admin_id)
    .bind(payload.text.trim())
    .bind(SqlJson(&options))
    .bind(&correct_answer)
    .bind(payload.category.as_str())
    .bind(payload.points.unwrap_or(0))
    .bind(payload.media.as_ref().map(SqlJson))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::from(e)
    })?;

    let question = find_question(&pool, id, admin_id)
        .await?
        .ok_or_else(|| AppError::InternalServerError(format!("question {} vanished after insert", id)))?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Lists the admin's questions, optionally filtered by category or by being unassigned.
pub async fn list_questions(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<QuestionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let admin_id = claims.user_id()?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT {QUESTION_COLUMNS} FROM questions q \
         LEFT JOIN round_questions rq ON rq.question_id = q.id \
         WHERE q.admin_id = "
    ));
    builder.push_bind(admin_id);

    if let Some(category) = params.category {
        builder.push(" AND q.category = ");
        builder.push_bind(category.as_str());
    }
    if params.unassigned.unwrap_or(false) {
        builder.push(" AND rq.round_id IS NULL");
    }
    builder.push(" ORDER BY q.created_at DESC, q.id DESC");

    let questions: Vec<Question> = builder.build_query_as().fetch_all(&pool).await.map_err(|e| {
        tracing::error!("Failed to list questions: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(questions))
}

pub async fn get_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let question = find_question(&pool, id, claims.user_id()?)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    Ok(Json(question))
}

/// Updates a question. Changing options regenerates their ids, and the correct
/// answer is re-resolved whenever options or answer change.
pub async fn update_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    ValidatedJson(payload): ValidatedJson<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let admin_id = claims.user_id()?;

    let current = find_question(&pool, id, admin_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    if payload.is_empty() {
        return Ok(Json(current));
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");

    if let Some(text) = &payload.text {
        separated.push("text = ");
        separated.push_bind_unseparated(text.trim().to_string());
    }

    if payload.options.is_some() || payload.correct_answer.is_some() {
        let options = match &payload.options {
            Some(texts) => new_options(texts),
            None => current.options.0.clone(),
        };
        let answer_text = payload
            .correct_answer
            .clone()
            .unwrap_or_else(|| current.correct_answer_text().to_string());
        let correct_answer = resolve_correct_answer(&options, &answer_text)?;

        if let Some(round_id) = current.round_id {
            let resolved = options
                .iter()
                .find(|o| o.id == correct_answer)
                .map(|o| o.text.as_str())
                .unwrap_or(&correct_answer);
            if parse_number(resolved).is_none() && is_estimation_round(&pool, round_id).await? {
                return Err(AppError::BadRequest(
                    "Questions in an estimation round need a numeric answer".to_string(),
                ));
            }
        }

        separated.push("options = ");
        separated.push_bind_unseparated(SqlJson(options));
        separated.push("correct_answer = ");
        separated.push_bind_unseparated(correct_answer);
    }

    if let Some(category) = payload.category {
        separated.push("category = ");
        separated.push_bind_unseparated(category.as_str());
    }

    if let Some(points) = payload.points {
        separated.push("points = ");
        separated.push_bind_unseparated(points);
    }

    if let Some(media) = payload.media {
        separated.push("media = ");
        separated.push_bind_unseparated(SqlJson(media));
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" AND admin_id = ");
    builder.push_bind(admin_id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::from(e)
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    let updated = find_question(&pool, id, admin_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    Ok(Json(updated))
}

async fn is_estimation_round(pool: &PgPool, round_id: i64) -> Result<bool, AppError> {
    let category: Option<String> = sqlx::query_scalar("SELECT category FROM rounds WHERE id = $1")
        .bind(round_id)
        .fetch_optional(pool)
        .await?;
    Ok(category.as_deref() == Some(RoundCategory::Estimation.as_str()))
}

/// Deletes a question. It is removed from its round by cascade.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1 AND admin_id = $2")
        .bind(id)
        .bind(claims.user_id()?)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete question: {:?}", e);
            AppError::from(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
