// src/models/question.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use url::Url;
use validator::Validate;

use crate::error::AppError;

/// Column list shared by every query that loads a `Question`.
/// Expects `questions` aliased as `q` and a LEFT JOIN on `round_questions rq`.
pub const QUESTION_COLUMNS: &str = "q.id, q.admin_id, q.text, q.options, q.correct_answer, \
     q.category, q.points, q.media, rq.round_id, q.created_at";

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub admin_id: i64,

    pub text: String,

    /// Answer options. Empty for short-answer (e.g. estimation) questions.
    pub options: Json<Vec<QuestionOption>>,

    /// Identifier of the correct option, or the literal answer when there are no options.
    pub correct_answer: String,

    pub category: String,

    pub points: i64,

    pub media: Option<Json<Media>>,

    /// Round this question is assigned to, if any.
    pub round_id: Option<i64>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Question {
    /// Human readable form of the correct answer.
    pub fn correct_answer_text(&self) -> &str {
        self.options
            .iter()
            .find(|o| o.id == self.correct_answer)
            .map(|o| o.text.as_str())
            .unwrap_or(&self.correct_answer)
    }

    /// Numeric target of an estimation question.
    pub fn numeric_answer(&self) -> Option<f64> {
        parse_number(self.correct_answer_text())
    }
}

/// A multiple-choice option with its generated identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    File,
}

/// Descriptor of media attached to a question. Only the URL is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Media {
    pub kind: MediaKind,
    #[validate(length(min = 1, max = 1000), custom(function = validate_url_string))]
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Physics,
    Maths,
    Chemistry,
    Biology,
    Zoology,
    Botany,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Physics => "Physics",
            Category::Maths => "Maths",
            Category::Chemistry => "Chemistry",
            Category::Biology => "Biology",
            Category::Zoology => "Zoology",
            Category::Botany => "Botany",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Physics" => Ok(Category::Physics),
            "Maths" => Ok(Category::Maths),
            "Chemistry" => Ok(Category::Chemistry),
            "Biology" => Ok(Category::Biology),
            "Zoology" => Ok(Category::Zoology),
            "Botany" => Ok(Category::Botany),
            other => Err(AppError::BadRequest(format!("Unknown category '{}'", other))),
        }
    }
}

/// DTO for sending a question to players (excludes the correct answer).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    pub options: Json<Vec<QuestionOption>>,
    pub category: String,
    pub points: i64,
    pub media: Option<Json<Media>>,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            text: q.text,
            options: q.options,
            category: q.category,
            points: q.points,
            media: q.media,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    #[serde(default)]
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(length(min = 1, max = 500))]
    pub correct_answer: String,
    pub category: Category,
    #[validate(range(min = 0, max = 1000))]
    pub points: Option<i64>,
    #[validate(nested)]
    pub media: Option<Media>,
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: Option<String>,
    #[validate(custom(function = validate_options))]
    pub options: Option<Vec<String>>,
    #[validate(length(min = 1, max = 500))]
    pub correct_answer: Option<String>,
    pub category: Option<Category>,
    #[validate(range(min = 0, max = 1000))]
    pub points: Option<i64>,
    #[validate(nested)]
    pub media: Option<Media>,
}

impl UpdateQuestionRequest {
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.options.is_none()
            && self.correct_answer.is_none()
            && self.category.is_none()
            && self.points.is_none()
            && self.media.is_none()
    }
}

/// Query parameters for listing questions.
#[derive(Debug, Deserialize)]
pub struct QuestionListParams {
    pub category: Option<Category>,
    /// Only questions that are not part of any round.
    pub unassigned: Option<bool>,
}

/// Assigns a fresh identifier to each option text.
pub fn new_options(texts: &[String]) -> Vec<QuestionOption> {
    texts
        .iter()
        .map(|t| QuestionOption {
            id: uuid::Uuid::new_v4().to_string(),
            text: t.trim().to_string(),
        })
        .collect()
}

/// Resolves the submitted correct answer against the options.
///
/// With options, the answer must match one option text (case-insensitive) and the
/// option id is returned. Without options the trimmed answer itself is stored.
pub fn resolve_correct_answer(options: &[QuestionOption], answer: &str) -> Result<String, AppError> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(AppError::BadRequest("Correct answer is required".to_string()));
    }

    if options.is_empty() {
        return Ok(answer.to_string());
    }

    let key = answer_key(answer);
    options
        .iter()
        .find(|o| o.id == answer || answer_key(&o.text) == key)
        .map(|o| o.id.clone())
        .ok_or_else(|| {
            AppError::BadRequest("Correct answer must match one of the options".to_string())
        })
}

/// Comparison key for answers and option texts: trimmed, Unicode lowercase.
pub fn answer_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Parses a finite number from a trimmed string.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() > 10 {
        return Err(validator::ValidationError::new("too_many_options"));
    }
    let mut seen = std::collections::HashSet::new();
    for opt in options {
        let key = answer_key(opt);
        if key.is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
        if !seen.insert(key) {
            return Err(validator::ValidationError::new("duplicate_option"));
        }
    }
    Ok(())
}

/// Validates that a string is a correctly formatted URL.
fn validate_url_string(url: &str) -> Result<(), validator::ValidationError> {
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn correct_answer_resolves_to_option_id() {
        let options = new_options(&texts(&["Newton", "Einstein", "Bohr"]));
        let id = resolve_correct_answer(&options, "  einstein ").unwrap();
        assert_eq!(id, options[1].id);
    }

    #[test]
    fn correct_answer_must_match_an_option() {
        let options = new_options(&texts(&["Newton", "Einstein"]));
        let err = resolve_correct_answer(&options, "Curie").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn correct_answer_matches_non_ascii_option_case_insensitively() {
        let options = new_options(&texts(&["Ärger", "Freude"]));
        let id = resolve_correct_answer(&options, "ärger").unwrap();
        assert_eq!(id, options[0].id);
        assert_eq!(answer_key(" ÉTÉ "), answer_key("été"));
    }

    #[test]
    fn short_answer_is_stored_verbatim() {
        assert_eq!(resolve_correct_answer(&[], " 299792 ").unwrap(), "299792");
    }

    #[test]
    fn option_ids_are_unique() {
        let options = new_options(&texts(&["a", "b", "c"]));
        assert_ne!(options[0].id, options[1].id);
        assert_ne!(options[1].id, options[2].id);
    }

    #[test]
    fn duplicate_options_are_rejected() {
        let req = CreateQuestionRequest {
            text: "Pick one".into(),
            options: texts(&["Yes", " yes "]),
            correct_answer: "Yes".into(),
            category: Category::Maths,
            points: Some(10),
            media: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn media_url_must_parse() {
        let media = Media { kind: MediaKind::Image, url: "not a url".into() };
        assert!(media.validate().is_err());
        let media = Media { kind: MediaKind::Video, url: "https://cdn.example.com/clip.mp4".into() };
        assert!(media.validate().is_ok());
    }

    #[test]
    fn category_round_trips_through_str() {
        for c in [Category::Physics, Category::Botany] {
            assert_eq!(c.as_str().parse::<Category>().unwrap(), c);
        }
        assert!("History".parse::<Category>().is_err());
    }

    #[test]
    fn numeric_answer_reads_option_text() {
        let options = new_options(&texts(&["8848", "8611"]));
        let q = Question {
            id: 1,
            admin_id: 1,
            text: "Height of Everest?".into(),
            correct_answer: options[0].id.clone(),
            options: Json(options),
            category: "Maths".into(),
            points: 10,
            media: None,
            round_id: None,
            created_at: chrono::Utc::now(),
        };
        assert_eq!(q.correct_answer_text(), "8848");
        assert_eq!(q.numeric_answer(), Some(8848.0));
    }
}
