// src/models/history.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::question::parse_number;

/// Represents the 'quiz_history' table: one row per (quiz, round, team).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizHistory {
    pub id: i64,
    pub quiz_id: i64,
    pub round_id: i64,
    pub team_id: i64,
    pub total_points: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'history_answers' table. Rows are only ever appended,
/// except that an estimation guess is marked correct once the question is scored.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HistoryAnswer {
    pub id: i64,
    pub history_id: i64,
    pub question_id: i64,
    pub given_answer: String,
    pub points_earned: i64,
    pub is_correct: bool,
    pub is_passed: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// An answer as submitted: JSON string or number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GivenAnswer {
    Number(f64),
    Text(String),
}

impl GivenAnswer {
    pub fn as_text(&self) -> String {
        match self {
            GivenAnswer::Number(n) => n.to_string(),
            GivenAnswer::Text(s) => s.trim().to_string(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            GivenAnswer::Number(n) if n.is_finite() => Some(*n),
            GivenAnswer::Number(_) => None,
            GivenAnswer::Text(s) => parse_number(s),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, GivenAnswer::Text(s) if s.trim().is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EstimationGuess {
    pub team_id: i64,
    pub given_answer: GivenAnswer,
}

/// DTO for `POST /api/quiz/submit-answer`.
///
/// Normal rounds use `team_id` + `given_answer` (+ `is_passed`);
/// estimation rounds use `answers`.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    pub quiz_id: i64,
    pub round_id: i64,
    pub question_id: i64,
    pub team_id: Option<i64>,
    pub given_answer: Option<GivenAnswer>,
    #[serde(default)]
    pub is_passed: bool,
    #[validate(length(max = 200))]
    pub answers: Option<Vec<EstimationGuess>>,
}

/// One answer joined with its team and round, as read for the history report.
#[derive(Debug, Clone, FromRow)]
pub struct AnswerFact {
    pub team_id: i64,
    pub round_id: i64,
    pub round_number: i32,
    pub round_name: String,
    pub points_earned: i64,
    pub is_correct: bool,
    pub is_passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundStats {
    pub round_id: i64,
    pub round_number: i32,
    pub round_name: String,
    pub attempted: usize,
    pub correct: usize,
    pub wrong: usize,
    pub passed: usize,
    pub points_earned: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamStats {
    pub team_id: i64,
    pub team_name: String,
    pub total_points: i64,
    pub rounds: Vec<RoundStats>,
}

/// Folds answer rows into per-team, per-round statistics.
///
/// Every team in `teams` appears in the output, in the given order, even without answers.
/// Rounds are ordered by round number.
pub fn summarize_history(teams: &[(i64, String)], facts: &[AnswerFact]) -> Vec<TeamStats> {
    let mut per_team: BTreeMap<i64, BTreeMap<(i32, i64), RoundStats>> = BTreeMap::new();

    for f in facts {
        let stats = per_team
            .entry(f.team_id)
            .or_default()
            .entry((f.round_number, f.round_id))
            .or_insert_with(|| RoundStats {
                round_id: f.round_id,
                round_number: f.round_number,
                round_name: f.round_name.clone(),
                attempted: 0,
                correct: 0,
                wrong: 0,
                passed: 0,
                points_earned: 0,
            });

        stats.attempted += 1;
        if f.is_correct {
            stats.correct += 1;
        } else {
            stats.wrong += 1;
        }
        if f.is_passed {
            stats.passed += 1;
        }
        stats.points_earned += f.points_earned;
    }

    teams
        .iter()
        .map(|(id, name)| {
            let rounds: Vec<RoundStats> = per_team
                .remove(id)
                .map(|m| m.into_values().collect())
                .unwrap_or_default();
            TeamStats {
                team_id: *id,
                team_name: name.clone(),
                total_points: rounds.iter().map(|r| r.points_earned).sum(),
                rounds,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(team_id: i64, round_id: i64, round_number: i32, points: i64, correct: bool, passed: bool) -> AnswerFact {
        AnswerFact {
            team_id,
            round_id,
            round_number,
            round_name: format!("Round {}", round_number),
            points_earned: points,
            is_correct: correct,
            is_passed: passed,
        }
    }

    #[test]
    fn folds_answers_per_team_and_round() {
        let teams = vec![(1, "Owls".to_string()), (2, "Foxes".to_string())];
        let facts = vec![
            fact(1, 20, 2, 10, true, false),
            fact(1, 10, 1, 10, true, false),
            fact(1, 10, 1, -5, false, false),
            fact(2, 10, 1, 5, true, true),
        ];

        let stats = summarize_history(&teams, &facts);
        assert_eq!(stats.len(), 2);

        let owls = &stats[0];
        assert_eq!(owls.team_name, "Owls");
        assert_eq!(owls.total_points, 15);
        assert_eq!(owls.rounds.len(), 2);
        assert_eq!(owls.rounds[0].round_number, 1);
        assert_eq!(owls.rounds[0].attempted, 2);
        assert_eq!(owls.rounds[0].correct, 1);
        assert_eq!(owls.rounds[0].wrong, 1);
        assert_eq!(owls.rounds[0].points_earned, 5);
        assert_eq!(owls.rounds[1].round_number, 2);

        let foxes = &stats[1];
        assert_eq!(foxes.rounds[0].passed, 1);
        assert_eq!(foxes.total_points, 5);
    }

    #[test]
    fn teams_without_answers_are_listed() {
        let teams = vec![(7, "Late".to_string())];
        let stats = summarize_history(&teams, &[]);
        assert_eq!(stats.len(), 1);
        assert!(stats[0].rounds.is_empty());
        assert_eq!(stats[0].total_points, 0);
    }

    #[test]
    fn given_answer_accepts_strings_and_numbers() {
        let n: GivenAnswer = serde_json::from_value(serde_json::json!(42.5)).unwrap();
        assert_eq!(n.as_number(), Some(42.5));
        assert_eq!(n.as_text(), "42.5");

        let s: GivenAnswer = serde_json::from_value(serde_json::json!(" 17 ")).unwrap();
        assert_eq!(s.as_text(), "17");
        assert_eq!(s.as_number(), Some(17.0));

        let word: GivenAnswer = serde_json::from_value(serde_json::json!("lots")).unwrap();
        assert_eq!(word.as_number(), None);
        assert!(!word.is_blank());
    }

    #[test]
    fn whole_numbers_render_without_fraction() {
        assert_eq!(GivenAnswer::Number(300.0).as_text(), "300");
    }
}
