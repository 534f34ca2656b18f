// src/handlers/round.rs

use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, types::Json as SqlJson};

use crate::{
    error::{AppError, is_unique_violation},
    extract::ValidatedJson,
    models::{
        question::{QUESTION_COLUMNS, Question},
        round::{CreateRoundRequest, Round, RoundCategory, RoundDetail, UpdateRoundRequest},
    },
    utils::{html::clean_html, jwt::Claims},
};

const ROUND_COLUMNS: &str = "r.id, r.admin_id, r.round_number, r.name, r.category, r.rules, r.regulation, r.created_at";

/// Checks a round request and returns how many questions it needs.
pub(crate) fn check_round_request(req: &CreateRoundRequest, team_count: usize) -> Result<usize, String> {
    if req.name.trim().is_empty() {
        return Err("Name is required".to_string());
    }
    req.rules.check()?;

    let required = req.rules.required_questions(team_count);

    let mut seen = HashSet::new();
    if let Some(dup) = req.questions.iter().find(|id| !seen.insert(**id)) {
        return Err(format!("Question {} is listed more than once", dup));
    }

    if !req.questions.is_empty() && req.questions.len() < required {
        return Err(format!(
            "You must select {} questions for {} team(s), got {}",
            required,
            team_count.max(1),
            req.questions.len()
        ));
    }

    Ok(required)
}

/// Picks the first `count` questions of the admin's pool that no round uses yet.
async fn pick_unassigned_questions(
    conn: &mut PgConnection,
    admin_id: i64,
    count: usize,
) -> Result<Vec<i64>, AppError> {
    let ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT q.id FROM questions q
        LEFT JOIN round_questions rq ON rq.question_id = q.id
        WHERE q.admin_id = $1 AND rq.question_id IS NULL
        ORDER BY q.created_at, q.id
        LIMIT $2
        "#,
    )
    .bind(admin_id)
    .bind(count as i64)
    .fetch_all(&mut *conn)
    .await?;

    if ids.len() < count {
        return Err(AppError::BadRequest(format!(
            "Not enough unassigned questions available. Found {}, need {}.",
            ids.len(),
            count
        )));
    }

    Ok(ids)
}

/// Loads questions by id, keeping the order of `ids`. Missing ids are skipped.
async fn load_questions_in_order(
    conn: &mut PgConnection,
    ids: &[i64],
    admin_id: i64,
) -> Result<Vec<Question>, AppError> {
    let rows = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions q \
         LEFT JOIN round_questions rq ON rq.question_id = q.id \
         WHERE q.id = ANY($1) AND q.admin_id = $2"
    ))
    .bind(ids)
    .bind(admin_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_id: HashMap<i64, Question> = rows.into_iter().map(|q| (q.id, q)).collect();
    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

/// Creates a round and assigns its questions. Runs on the caller's connection so
/// quiz creation can include it in its transaction.
///
/// `label` prefixes validation messages (e.g. "Round 2: ").
pub(crate) async fn insert_round(
    conn: &mut PgConnection,
    admin_id: i64,
    round_number: i32,
    req: &CreateRoundRequest,
    team_count: usize,
    label: &str,
) -> Result<RoundDetail, AppError> {
    let required =
        check_round_request(req, team_count).map_err(|msg| AppError::BadRequest(format!("{label}{msg}")))?;

    let question_ids = if req.questions.is_empty() {
        pick_unassigned_questions(conn, admin_id, required).await?
    } else {
        req.questions.iter().take(required).copied().collect()
    };

    let mut questions = load_questions_in_order(conn, &question_ids, admin_id).await?;

    if questions.len() != question_ids.len() {
        let found: HashSet<i64> = questions.iter().map(|q| q.id).collect();
        let missing: Vec<String> = question_ids
            .iter()
            .filter(|id| !found.contains(id))
            .map(|id| id.to_string())
            .collect();
        return Err(AppError::BadRequest(format!(
            "{label}Unknown question id(s): {}",
            missing.join(", ")
        )));
    }

    if let Some(taken) = questions.iter().find(|q| q.round_id.is_some()) {
        return Err(AppError::Conflict(format!(
            "{label}Question {} is already assigned to round {}",
            taken.id,
            taken.round_id.unwrap_or_default()
        )));
    }

    if req.category == RoundCategory::Estimation {
        if let Some(q) = questions.iter().find(|q| q.numeric_answer().is_none()) {
            return Err(AppError::BadRequest(format!(
                "{label}Question {} needs a numeric answer for an estimation round",
                q.id
            )));
        }
    }

    let regulation = req.regulation.as_deref().map(clean_html).unwrap_or_default();

    let round = sqlx::query_as::<_, Round>(
        r#"
        INSERT INTO rounds (admin_id, round_number, name, category, rules, regulation)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, admin_id, round_number, name, category, rules, regulation, created_at
        "#,
    )
    .bind(admin_id)
    .bind(round_number)
    .bind(req.name.trim())
    .bind(req.category.as_str())
    .bind(SqlJson(&req.rules))
    .bind(regulation)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO round_questions (round_id, question_id, position)
        SELECT $1, t.question_id, t.position::INTEGER
        FROM UNNEST($2::BIGINT[]) WITH ORDINALITY AS t(question_id, position)
        "#,
    )
    .bind(round.id)
    .bind(&question_ids)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("{label}A question was assigned to another round concurrently"))
        } else {
            AppError::from(e)
        }
    })?;

    for q in &mut questions {
        q.round_id = Some(round.id);
    }

    tracing::info!(round_id = round.id, admin_id, questions = questions.len(), "round created");

    Ok(RoundDetail { round, questions })
}

/// Attaches ordered questions to each round.
pub(crate) async fn load_round_details(
    conn: &mut PgConnection,
    rounds: Vec<Round>,
) -> Result<Vec<RoundDetail>, AppError> {
    let ids: Vec<i64> = rounds.iter().map(|r| r.id).collect();

    let questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions q \
         JOIN round_questions rq ON rq.question_id = q.id \
         WHERE rq.round_id = ANY($1) \
         ORDER BY rq.round_id, rq.position"
    ))
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut grouped: HashMap<i64, Vec<Question>> = HashMap::new();
    for q in questions {
        if let Some(round_id) = q.round_id {
            grouped.entry(round_id).or_default().push(q);
        }
    }

    Ok(rounds
        .into_iter()
        .map(|round| {
            let questions = grouped.remove(&round.id).unwrap_or_default();
            RoundDetail { round, questions }
        })
        .collect())
}

/// Rounds of a quiz in play order.
pub(crate) async fn quiz_rounds(conn: &mut PgConnection, quiz_id: i64) -> Result<Vec<Round>, AppError> {
    let rounds = sqlx::query_as::<_, Round>(&format!(
        "SELECT {ROUND_COLUMNS} FROM rounds r \
         JOIN quiz_rounds qr ON qr.round_id = r.id \
         WHERE qr.quiz_id = $1 ORDER BY qr.position"
    ))
    .bind(quiz_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rounds)
}

/// Creates a stand-alone round.
pub async fn create_round(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    ValidatedJson(payload): ValidatedJson<CreateRoundRequest>,
) -> Result<impl IntoResponse, AppError> {
    let admin_id = claims.user_id()?;
    let round_number = payload
        .round_number
        .ok_or_else(|| AppError::BadRequest("round_number is required".to_string()))?;

    let mut tx = pool.begin().await?;
    let detail = insert_round(&mut tx, admin_id, round_number, &payload, 1, "").await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(detail)))
}

/// Lists the admin's rounds with their questions.
pub async fn list_rounds(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;

    let rounds = sqlx::query_as::<_, Round>(&format!(
        "SELECT {ROUND_COLUMNS} FROM rounds r WHERE r.admin_id = $1 ORDER BY r.round_number, r.id"
    ))
    .bind(claims.user_id()?)
    .fetch_all(&mut *conn)
    .await?;

    let details = load_round_details(&mut conn, rounds).await?;
    Ok(Json(details))
}

pub async fn get_round(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut conn = pool.acquire().await?;

    let round = sqlx::query_as::<_, Round>(&format!(
        "SELECT {ROUND_COLUMNS} FROM rounds r WHERE r.id = $1 AND r.admin_id = $2"
    ))
    .bind(id)
    .bind(claims.user_id()?)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Round not found".to_string()))?;

    let detail = load_round_details(&mut conn, vec![round])
        .await?
        .pop()
        .ok_or_else(|| AppError::NotFound("Round not found".to_string()))?;

    Ok(Json(detail))
}

/// Updates the descriptive fields of a round.
pub async fn update_round(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    ValidatedJson(payload): ValidatedJson<UpdateRoundRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.round_number.is_none() && payload.name.is_none() && payload.regulation.is_none() {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE rounds SET ");
    let mut separated = builder.separated(", ");

    if let Some(round_number) = payload.round_number {
        separated.push("round_number = ");
        separated.push_bind_unseparated(round_number);
    }

    if let Some(name) = payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name.trim().to_string());
    }

    if let Some(regulation) = payload.regulation {
        separated.push("regulation = ");
        separated.push_bind_unseparated(clean_html(&regulation));
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" AND admin_id = ");
    builder.push_bind(claims.user_id()?);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update round: {:?}", e);
        AppError::from(e)
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Round not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Deletes a round. Its questions become unassigned; its answer history goes with it.
pub async fn delete_round(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM rounds WHERE id = $1 AND admin_id = $2")
        .bind(id)
        .bind(claims.user_id()?)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete round: {:?}", e);
            AppError::from(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Round not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
