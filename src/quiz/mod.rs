pub mod score;

use crate::db::models::{AnswerTag, Question};

/// A quiz never presents more than this many questions.
pub const MAX_QUESTIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum QuizScope {
    /// Full quiz over every question of a subject; scores are persisted.
    Subject(i64),
    /// Focused follow-up quiz over one weak theme; scores are shown only.
    Theme(i64),
}

/// One quiz in progress. The question list is frozen at construction and
/// never mutated mid-quiz; the answer log grows by one per submission.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QuizRun {
    pub scope: QuizScope,
    pub questions: Vec<Question>,
    pub answers: Vec<AnswerTag>,
}

impl QuizRun {
    pub fn new(scope: QuizScope, mut questions: Vec<Question>) -> Self {
        questions.truncate(MAX_QUESTIONS);
        Self {
            scope,
            questions,
            answers: Vec::new(),
        }
    }

    /// The question awaiting an answer, if any remain.
    pub fn current(&self) -> Option<&Question> {
        self.questions.get(self.answers.len())
    }

    /// 1-based number of the question awaiting an answer.
    pub fn current_number(&self) -> usize {
        self.answers.len() + 1
    }

    pub fn record_answer(&mut self, tag: AnswerTag) {
        if self.answers.len() < self.questions.len() {
            self.answers.push(tag);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.answers.len() >= self.questions.len()
    }

    /// Scores the answers collected so far. Valid at any point, so an
    /// early "finish" simply grades a shorter log.
    pub fn grade(&self) -> score::QuizReport {
        score::grade(&self.questions, &self.answers)
    }
}
