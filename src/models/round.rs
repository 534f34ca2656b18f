// src/models/round.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::models::question::Question;

/// Represents the 'rounds' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Round {
    pub id: i64,
    pub admin_id: i64,
    pub round_number: i32,
    pub name: String,
    pub category: String,

    /// Scoring and timing rules, stored as JSONB.
    pub rules: Json<RoundRules>,

    /// Free-text regulation shown to players. Sanitized HTML.
    pub regulation: String,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Round {
    pub fn is_estimation(&self) -> bool {
        self.category == RoundCategory::Estimation.as_str()
    }
}

/// A round together with its ordered questions.
#[derive(Debug, Serialize)]
pub struct RoundDetail {
    #[serde(flatten)]
    pub round: Round,
    pub questions: Vec<Question>,
}

/// Short form used in quiz listings.
#[derive(Debug, Serialize, FromRow)]
pub struct RoundSummary {
    pub id: i64,
    pub round_number: i32,
    pub name: String,
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundCategory {
    General,
    Subject,
    Estimation,
    RapidFire,
    Buzzer,
}

impl RoundCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundCategory::General => "general",
            RoundCategory::Subject => "subject",
            RoundCategory::Estimation => "estimation",
            RoundCategory::RapidFire => "rapid_fire",
            RoundCategory::Buzzer => "buzzer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerType {
    PerQuestion,
    PerRound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassCondition {
    /// The question moves once, to the next team.
    OnceToNextTeam,
    /// The question may travel through every team.
    AllTeams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignQuestionType {
    /// Every team answers the same questions.
    ForAllTeams,
    /// Each team gets its own set of questions.
    ForEachTeam,
}

/// Rule bundle of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRules {
    #[serde(default)]
    pub enable_timer: bool,
    pub timer_type: Option<TimerType>,
    pub time_limit_seconds: Option<u32>,

    #[serde(default)]
    pub enable_negative: bool,
    /// Magnitude deducted for a wrong first-hand answer.
    #[serde(default)]
    pub negative_points: i64,

    #[serde(default)]
    pub enable_pass: bool,
    pub pass_condition: Option<PassCondition>,
    pub pass_limit: Option<u32>,
    #[serde(default)]
    pub passed_points: i64,
    pub passed_time_seconds: Option<u32>,

    pub assign_question_type: AssignQuestionType,
    pub number_of_questions: u32,

    /// Points for a first-hand correct answer, and for winning an estimation question.
    pub points: i64,
}

impl RoundRules {
    /// Checks the rule bundle for internal consistency.
    pub fn check(&self) -> Result<(), String> {
        if self.number_of_questions == 0 {
            return Err("number_of_questions must be greater than 0".to_string());
        }
        if self.points <= 0 {
            return Err("points must be greater than 0".to_string());
        }
        if self.enable_timer {
            if self.assign_question_type == AssignQuestionType::ForAllTeams {
                return Err("enable_timer must be false when questions are assigned for_all_teams".to_string());
            }
            if self.timer_type.is_none() {
                return Err("timer_type is required when enable_timer is true".to_string());
            }
            if !matches!(self.time_limit_seconds, Some(t) if t > 0) {
                return Err("time_limit_seconds must be greater than 0 when enable_timer is true".to_string());
            }
        }
        if self.enable_negative && self.negative_points <= 0 {
            return Err("negative_points must be greater than 0 when enable_negative is true".to_string());
        }
        if self.negative_points < 0 {
            return Err("negative_points is a magnitude and cannot be negative".to_string());
        }
        if self.enable_pass && self.pass_condition.is_none() {
            return Err("pass_condition must be set when enable_pass is true".to_string());
        }
        if self.passed_points < 0 {
            return Err("passed_points cannot be negative".to_string());
        }
        Ok(())
    }

    /// Number of questions a round needs for the given number of teams.
    pub fn required_questions(&self, team_count: usize) -> usize {
        let per_set = self.number_of_questions as usize;
        match self.assign_question_type {
            AssignQuestionType::ForAllTeams => per_set,
            AssignQuestionType::ForEachTeam => per_set * team_count.max(1),
        }
    }
}

/// DTO for creating a round, either stand-alone or inline in a quiz.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateRoundRequest {
    /// Ignored inside a quiz, where rounds are numbered by position.
    #[validate(range(min = 1, max = 1000))]
    pub round_number: Option<i32>,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub category: RoundCategory,
    pub rules: RoundRules,
    #[validate(length(max = 5000))]
    pub regulation: Option<String>,
    #[serde(default)]
    pub questions: Vec<i64>,
}

/// DTO for updating a round. Rules and questions are fixed once created.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRoundRequest {
    #[validate(range(min = 1, max = 1000))]
    pub round_number: Option<i32>,
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 5000))]
    pub regulation: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RoundRules {
        RoundRules {
            enable_timer: false,
            timer_type: None,
            time_limit_seconds: None,
            enable_negative: false,
            negative_points: 0,
            enable_pass: false,
            pass_condition: None,
            pass_limit: None,
            passed_points: 0,
            passed_time_seconds: None,
            assign_question_type: AssignQuestionType::ForAllTeams,
            number_of_questions: 3,
            points: 10,
        }
    }

    #[test]
    fn minimal_rules_are_valid() {
        assert!(rules().check().is_ok());
    }

    #[test]
    fn timer_is_rejected_for_all_teams() {
        let r = RoundRules {
            enable_timer: true,
            timer_type: Some(TimerType::PerQuestion),
            time_limit_seconds: Some(30),
            ..rules()
        };
        assert!(r.check().unwrap_err().contains("for_all_teams"));
    }

    #[test]
    fn timer_needs_a_limit() {
        let r = RoundRules {
            enable_timer: true,
            timer_type: Some(TimerType::PerRound),
            time_limit_seconds: None,
            assign_question_type: AssignQuestionType::ForEachTeam,
            ..rules()
        };
        assert!(r.check().is_err());
    }

    #[test]
    fn negative_marking_needs_a_magnitude() {
        let r = RoundRules { enable_negative: true, ..rules() };
        assert!(r.check().is_err());
        let r = RoundRules { enable_negative: true, negative_points: 5, ..rules() };
        assert!(r.check().is_ok());
    }

    #[test]
    fn pass_needs_a_condition() {
        let r = RoundRules { enable_pass: true, ..rules() };
        assert!(r.check().is_err());
        let r = RoundRules {
            enable_pass: true,
            pass_condition: Some(PassCondition::OnceToNextTeam),
            passed_points: 5,
            ..rules()
        };
        assert!(r.check().is_ok());
    }

    #[test]
    fn zero_points_or_questions_rejected() {
        assert!(RoundRules { points: 0, ..rules() }.check().is_err());
        assert!(RoundRules { number_of_questions: 0, ..rules() }.check().is_err());
    }

    #[test]
    fn required_questions_scale_with_teams_for_each_team() {
        let all = rules();
        assert_eq!(all.required_questions(4), 3);

        let each = RoundRules { assign_question_type: AssignQuestionType::ForEachTeam, ..rules() };
        assert_eq!(each.required_questions(4), 12);
        assert_eq!(each.required_questions(0), 3);
    }

    #[test]
    fn rules_deserialize_with_defaults() {
        let r: RoundRules = serde_json::from_value(serde_json::json!({
            "assign_question_type": "for_each_team",
            "number_of_questions": 2,
            "points": 20
        }))
        .unwrap();
        assert!(!r.enable_negative);
        assert_eq!(r.passed_points, 0);
        assert_eq!(r.required_questions(3), 6);
    }
}
