// src/models/team.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::config::MAX_POINT_ADJUSTMENT;

/// Represents the 'teams' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub admin_id: i64,

    /// Quiz the team plays in. Stand-alone teams have none.
    pub quiz_id: Option<i64>,

    pub name: String,
    pub points: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Team name and score, as shown in standings.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TeamStanding {
    pub id: i64,
    pub name: String,
    pub points: i64,
}

/// Leaderboard row with a competition-style rank (ties share a rank).
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub team_id: i64,
    pub name: String,
    pub points: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTeamRequest {
    #[validate(length(min = 1, max = 100, message = "Team name must be between 1 and 100 characters."))]
    pub name: String,
    #[validate(custom(function = validate_initial_points))]
    pub points: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddPointsRequest {
    #[validate(custom(function = validate_adjustment))]
    pub points: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReducePointsRequest {
    #[validate(range(min = 1, max = 10000))]
    pub points: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TeamListParams {
    pub quiz_id: Option<i64>,
}

/// Rejects zero and anything beyond `MAX_POINT_ADJUSTMENT` either way.
fn validate_adjustment(points: i64) -> Result<(), validator::ValidationError> {
    if points == 0 || points.abs() > MAX_POINT_ADJUSTMENT {
        return Err(validator::ValidationError::new("invalid_point_adjustment"));
    }
    Ok(())
}

fn validate_initial_points(points: i64) -> Result<(), validator::ValidationError> {
    if points.abs() > MAX_POINT_ADJUSTMENT {
        return Err(validator::ValidationError::new("initial_points_out_of_range"));
    }
    Ok(())
}

/// Case-insensitive key used to compare team names.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Ranks standings by points (desc), then name. Equal points share a rank.
pub fn rank_standings(mut teams: Vec<TeamStanding>) -> Vec<LeaderboardEntry> {
    teams.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.name.cmp(&b.name)));

    let mut entries = Vec::with_capacity(teams.len());
    let mut rank = 0;
    let mut last_points = None;
    for (i, t) in teams.into_iter().enumerate() {
        if last_points != Some(t.points) {
            rank = i + 1;
            last_points = Some(t.points);
        }
        entries.push(LeaderboardEntry {
            rank,
            team_id: t.id,
            name: t.name,
            points: t.points,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standing(id: i64, name: &str, points: i64) -> TeamStanding {
        TeamStanding { id, name: name.into(), points }
    }

    #[test]
    fn ties_share_a_rank() {
        let board = rank_standings(vec![
            standing(1, "Bees", 10),
            standing(2, "Ants", 30),
            standing(3, "Cats", 10),
            standing(4, "Dogs", -5),
        ]);
        let ranks: Vec<(usize, &str)> = board.iter().map(|e| (e.rank, e.name.as_str())).collect();
        assert_eq!(ranks, vec![(1, "Ants"), (2, "Bees"), (2, "Cats"), (4, "Dogs")]);
    }

    #[test]
    fn zero_adjustment_is_rejected() {
        assert!(AddPointsRequest { points: 0 }.validate().is_err());
        assert!(AddPointsRequest { points: -15 }.validate().is_ok());
        assert!(AddPointsRequest { points: MAX_POINT_ADJUSTMENT + 1 }.validate().is_err());
    }

    #[test]
    fn name_key_ignores_case_and_padding() {
        assert_eq!(name_key("  The Owls "), name_key("the owls"));
    }
}
