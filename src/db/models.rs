use std::collections::BTreeMap;

use crate::error::BotError;

/// The four fixed answer-option symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AnswerTag {
    A,
    B,
    V,
    G,
}

impl AnswerTag {
    pub const ALL: [AnswerTag; 4] = [AnswerTag::A, AnswerTag::B, AnswerTag::V, AnswerTag::G];

    pub fn label(self) -> &'static str {
        match self {
            AnswerTag::A => "А",
            AnswerTag::B => "Б",
            AnswerTag::V => "В",
            AnswerTag::G => "Г",
        }
    }

    /// Exact match against the Cyrillic labels, whitespace trimmed.
    pub fn parse(text: &str) -> Option<AnswerTag> {
        match text.trim() {
            "А" => Some(AnswerTag::A),
            "Б" => Some(AnswerTag::B),
            "В" => Some(AnswerTag::V),
            "Г" => Some(AnswerTag::G),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub tg_id: i64,
    pub name: Option<String>,
    pub total_mark: i64,
    /// subject id -> accumulated points
    pub marks_by_subject: BTreeMap<i64, i64>,
    /// theme id -> accumulated error count
    pub errors_by_theme: BTreeMap<i64, i64>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Subject {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Theme {
    pub id: i64,
    pub subject_id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub id: i64,
    pub theme_id: i64,
    pub subject_id: i64,
    pub name: String,
    pub question: String,
    /// Option texts in А, Б, В, Г order.
    pub answers: [String; 4],
    pub point: i64,
    pub correct_answer: AnswerTag,
}

/// A fully collected question-entry form, not yet persisted.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub theme_id: i64,
    pub subject_id: i64,
    pub name: String,
    pub question: String,
    pub answers: [String; 4],
    pub point: i64,
    pub correct_answer: AnswerTag,
}

// Deletion flows resolve entities by case-sensitive exact name equality
// over the full candidate list, never by partial match.

pub fn find_subject<'a>(subjects: &'a [Subject], name: &str) -> Option<&'a Subject> {
    subjects.iter().find(|s| s.name == name)
}

pub fn find_theme<'a>(themes: &'a [Theme], name: &str) -> Option<&'a Theme> {
    themes.iter().find(|t| t.name == name)
}

pub fn find_question<'a>(questions: &'a [Question], name: &str) -> Option<&'a Question> {
    questions.iter().find(|q| q.name == name)
}

pub fn parse_map_column(raw: Option<String>) -> Result<BTreeMap<i64, i64>, BotError> {
    match raw {
        Some(json) if !json.is_empty() => Ok(serde_json::from_str(&json)?),
        _ => Ok(BTreeMap::new()),
    }
}
