// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::{
    question::PublicQuestion,
    round::{CreateRoundRequest, Round, RoundDetail, RoundSummary},
    team::{Team, TeamStanding},
};

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub admin_id: i64,
    pub name: String,
    pub num_teams: i32,

    /// The active quiz is the one served to players.
    pub is_active: bool,
    pub activated_at: Option<chrono::DateTime<chrono::Utc>>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Full quiz with rounds (and their questions) and teams.
#[derive(Debug, Serialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub rounds: Vec<RoundDetail>,
    pub teams: Vec<Team>,
}

/// Listing form of a quiz.
#[derive(Debug, Serialize)]
pub struct QuizSummary {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub rounds: Vec<RoundSummary>,
    pub teams: Vec<TeamStanding>,
}

/// What players see: no correct answers.
#[derive(Debug, Serialize)]
pub struct PlayerQuiz {
    pub id: i64,
    pub name: String,
    pub rounds: Vec<PlayerRound>,
    pub teams: Vec<TeamStanding>,
}

#[derive(Debug, Serialize)]
pub struct PlayerRound {
    #[serde(flatten)]
    pub round: Round,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct NewTeam {
    #[validate(length(min = 1, max = 100, message = "Team name must be between 1 and 100 characters."))]
    pub name: String,
}

/// DTO for creating a quiz together with its rounds and teams.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200, message = "Quiz name must be between 1 and 200 characters."))]
    pub name: String,
    #[validate(length(min = 1, max = 50, message = "At least one round is required"), nested)]
    pub rounds: Vec<CreateRoundRequest>,
    #[validate(length(min = 1, max = 100, message = "At least one team is required"), nested)]
    pub teams: Vec<NewTeam>,
}
