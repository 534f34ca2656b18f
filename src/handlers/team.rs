// src/handlers/team.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    config::DEFAULT_POINT_DEDUCTION,
    error::{AppError, is_unique_violation},
    extract::ValidatedJson,
    models::team::{AddPointsRequest, CreateTeamRequest, ReducePointsRequest, Team, TeamListParams},
    utils::jwt::Claims,
};

const TEAM_COLUMNS: &str = "id, admin_id, quiz_id, name, points, created_at";

/// Creates a stand-alone team. Names are unique per admin, ignoring case.
pub async fn add_team(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    ValidatedJson(payload): ValidatedJson<CreateTeamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let admin_id = claims.user_id()?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Team name is required".to_string()));
    }

    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM teams
            WHERE admin_id = $1 AND quiz_id IS NULL AND LOWER(name) = LOWER($2)
        )
        "#,
    )
    .bind(admin_id)
    .bind(name)
    .fetch_one(&pool)
    .await?;

    if exists {
        return Err(AppError::Conflict(format!("Team '{}' already exists", name)));
    }

    let team = sqlx::query_as::<_, Team>(&format!(
        "INSERT INTO teams (admin_id, name, points) VALUES ($1, $2, $3) RETURNING {TEAM_COLUMNS}"
    ))
    .bind(admin_id)
    .bind(name)
    .bind(payload.points.unwrap_or(0))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Team '{}' already exists", name))
        } else {
            tracing::error!("Failed to create team: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(team)))
}

/// Lists the admin's teams, highest score first. `?quiz_id=` narrows to one quiz.
pub async fn list_teams(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<TeamListParams>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {TEAM_COLUMNS} FROM teams WHERE admin_id = "));
    builder.push_bind(claims.user_id()?);

    if let Some(quiz_id) = params.quiz_id {
        builder.push(" AND quiz_id = ");
        builder.push_bind(quiz_id);
    }
    builder.push(" ORDER BY points DESC, name");

    let teams: Vec<Team> = builder.build_query_as().fetch_all(&pool).await.map_err(|e| {
        tracing::error!("Failed to list teams: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(teams))
}

/// Deletes a team. A quiz team also leaves its quiz's team count.
pub async fn delete_team(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let quiz_id: Option<i64> =
        sqlx::query_scalar("DELETE FROM teams WHERE id = $1 AND admin_id = $2 RETURNING quiz_id")
            .bind(id)
            .bind(claims.user_id()?)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to delete team: {:?}", e);
                AppError::from(e)
            })?
            .ok_or_else(|| AppError::NotFound("Team not found".to_string()))?;

    if let Some(quiz_id) = quiz_id {
        sqlx::query("UPDATE quizzes SET num_teams = GREATEST(num_teams - 1, 0) WHERE id = $1")
            .bind(quiz_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Manual point adjustment. Negative amounts are allowed.
pub async fn add_points(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    ValidatedJson(payload): ValidatedJson<AddPointsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let team = sqlx::query_as::<_, Team>(&format!(
        "UPDATE teams SET points = points + $1 WHERE id = $2 AND admin_id = $3 RETURNING {TEAM_COLUMNS}"
    ))
    .bind(payload.points)
    .bind(id)
    .bind(claims.user_id()?)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Team not found".to_string()))?;

    tracing::info!(team_id = team.id, delta = payload.points, "team points adjusted");
    Ok(Json(team))
}

/// Deducts points (default `DEFAULT_POINT_DEDUCTION`). A positive score never drops
/// below zero; a score that is already negative is left alone.
pub async fn reduce_points(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    payload: Option<ValidatedJson<ReducePointsRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let amount = payload
        .and_then(|ValidatedJson(req)| req.points)
        .unwrap_or(DEFAULT_POINT_DEDUCTION);

    let team = sqlx::query_as::<_, Team>(&format!(
        "UPDATE teams SET points = CASE WHEN points > 0 THEN GREATEST(points - $1, 0) ELSE points END \
         WHERE id = $2 AND admin_id = $3 RETURNING {TEAM_COLUMNS}"
    ))
    .bind(amount)
    .bind(id)
    .bind(claims.user_id()?)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Team not found".to_string()))?;

    tracing::info!(team_id = team.id, amount, "team points reduced");
    Ok(Json(team))
}
