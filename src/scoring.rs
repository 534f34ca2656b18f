// src/scoring.rs

//! Point rules for submitted answers.

use std::collections::HashSet;

use serde::Serialize;

use crate::models::{
    history::EstimationGuess,
    question::{Question, QuestionOption, answer_key},
    round::{PassCondition, RoundRules},
};

/// Relative tolerance when comparing estimation differences.
const TIE_TOLERANCE: f64 = 1e-9;

/// Checks a submitted answer against the stored correct answer.
///
/// Accepts either the correct option id or the option text (case-insensitive).
/// For short-answer questions, numbers compare numerically and text compares case-insensitively.
pub fn is_correct_answer(given: &str, correct: &str, options: &[QuestionOption]) -> bool {
    let given = given.trim();
    if given.is_empty() {
        return false;
    }

    if options.is_empty() {
        return match (given.parse::<f64>(), correct.trim().parse::<f64>()) {
            (Ok(a), Ok(b)) => a == b,
            _ => answer_key(given) == answer_key(correct),
        };
    }

    let key = answer_key(given);
    options
        .iter()
        .find(|o| o.id == correct)
        .map(|o| o.id == given || answer_key(&o.text) == key)
        .unwrap_or(false)
}

/// Convenience wrapper taking the question row.
pub fn check_question(question: &Question, given: &str) -> bool {
    is_correct_answer(given, &question.correct_answer, &question.options)
}

/// Point delta for a normal-round answer.
///
/// * correct, first hand: `points`
/// * correct, passed: `passed_points`
/// * wrong, first hand with negative marking: `-negative_points`
/// * anything else: 0
pub fn answer_points(rules: &RoundRules, is_correct: bool, is_passed: bool) -> i64 {
    match (is_correct, is_passed) {
        (true, false) => rules.points,
        (true, true) => rules.passed_points,
        (false, false) if rules.enable_negative => -rules.negative_points,
        (false, _) => 0,
    }
}

/// How many times one question may be passed, `None` meaning unbounded.
/// Returns `Some(0)` when the round does not allow passing.
pub fn pass_allowance(rules: &RoundRules) -> Option<u32> {
    if !rules.enable_pass {
        return Some(0);
    }
    match rules.pass_condition {
        Some(PassCondition::OnceToNextTeam) => Some(rules.pass_limit.map_or(1, |l| l.min(1))),
        Some(PassCondition::AllTeams) | None => rules.pass_limit,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Guess {
    pub team_id: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimationWinner {
    pub team_id: i64,
    pub guess: f64,
    pub difference: f64,
}

/// Teams whose guess is nearest to `target`. Every team tied at the minimum wins.
pub fn closest_guesses(target: f64, guesses: &[Guess]) -> Vec<EstimationWinner> {
    let scored: Vec<EstimationWinner> = guesses
        .iter()
        .filter(|g| g.value.is_finite())
        .map(|g| EstimationWinner {
            team_id: g.team_id,
            guess: g.value,
            difference: (target - g.value).abs(),
        })
        .collect();

    let Some(min) = scored.iter().map(|w| w.difference).reduce(f64::min) else {
        return Vec::new();
    };

    let tolerance = TIE_TOLERANCE * min.abs().max(1.0);
    scored
        .into_iter()
        .filter(|w| w.difference - min <= tolerance)
        .collect()
}

/// A guess that was not recorded, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedGuess {
    pub team_id: i64,
    pub reason: &'static str,
}

/// Splits submitted estimation guesses into ones to record and ones to skip.
///
/// Skips teams outside the quiz, teams that already answered (earlier or
/// earlier in the same batch), and answers that are not numbers.
pub fn partition_guesses(
    quiz_teams: &HashSet<i64>,
    already_answered: &HashSet<i64>,
    submitted: &[EstimationGuess],
) -> (Vec<Guess>, Vec<SkippedGuess>) {
    let mut accepted = Vec::new();
    let mut skipped = Vec::new();
    let mut seen: HashSet<i64> = already_answered.clone();

    for g in submitted {
        let reason = if !quiz_teams.contains(&g.team_id) {
            Some("team is not part of this quiz")
        } else if seen.contains(&g.team_id) {
            Some("team has already answered this question")
        } else {
            None
        };
        if let Some(reason) = reason {
            skipped.push(SkippedGuess { team_id: g.team_id, reason });
            continue;
        }

        match g.given_answer.as_number() {
            Some(value) => {
                seen.insert(g.team_id);
                accepted.push(Guess { team_id: g.team_id, value });
            }
            None => skipped.push(SkippedGuess {
                team_id: g.team_id,
                reason: "answer is not a number",
            }),
        }
    }

    (accepted, skipped)
}
