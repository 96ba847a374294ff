//! Scoring and weak-topic analysis.

use std::collections::BTreeMap;

use crate::db::models::{AnswerTag, Question};

/// Every correct answer is worth a flat 10 points; the per-question
/// `point` column is stored but deliberately not consulted here.
pub const POINTS_PER_CORRECT: i64 = 10;

/// Result of grading one quiz run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizReport {
    pub answered: usize,
    pub correct_count: usize,
    pub points_earned: i64,
    /// Per-theme error counts, descending; ties keep the order in which
    /// the theme's first error was encountered.
    pub theme_errors: Vec<(i64, i64)>,
}

impl QuizReport {
    pub fn has_errors(&self) -> bool {
        !self.theme_errors.is_empty()
    }

    /// Theme ids of the worst `n` themes, for the follow-up quiz offer.
    pub fn worst_themes(&self, n: usize) -> Vec<i64> {
        self.theme_errors.iter().take(n).map(|&(id, _)| id).collect()
    }
}

/// Grades the collected answers against the frozen question list. The
/// answer log may be shorter than the list (early finish); the unanswered
/// remainder is excluded from scoring.
pub fn grade(questions: &[Question], answers: &[AnswerTag]) -> QuizReport {
    let mut correct_count = 0;
    let mut theme_errors: Vec<(i64, i64)> = Vec::new();

    for (answer, question) in answers.iter().zip(questions) {
        if *answer == question.correct_answer {
            correct_count += 1;
        } else if let Some(entry) = theme_errors
            .iter_mut()
            .find(|(id, _)| *id == question.theme_id)
        {
            entry.1 += 1;
        } else {
            theme_errors.push((question.theme_id, 1));
        }
    }
    // stable sort keeps first-encounter order among equal counts
    theme_errors.sort_by(|a, b| b.1.cmp(&a.1));

    QuizReport {
        answered: answers.len().min(questions.len()),
        correct_count,
        points_earned: correct_count as i64 * POINTS_PER_CORRECT,
        theme_errors,
    }
}

/// Ranks a user's persisted error map descending by count. Ties break on
/// ascending theme id, so repeated queries return the same list.
pub fn rank_weak_themes(errors: &BTreeMap<i64, i64>) -> Vec<(i64, i64)> {
    let mut ranked: Vec<(i64, i64)> = errors
        .iter()
        .filter(|&(_, &count)| count > 0)
        .map(|(&id, &count)| (id, count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: i64, theme_id: i64, correct: AnswerTag) -> Question {
        Question {
            id,
            theme_id,
            subject_id: 1,
            name: format!("Вопрос {id}"),
            question: "?".into(),
            answers: ["1".into(), "2".into(), "3".into(), "4".into()],
            point: 5,
            correct_answer: correct,
        }
    }

    // Theme "Алгебра" (id=1), correct tags [А, Б, В], submitted [А, Б, Г]:
    // 2 correct, 20 points, one error against theme 1.
    #[test]
    fn scenario_three_questions_one_wrong() {
        let questions = vec![
            question(1, 1, AnswerTag::A),
            question(2, 1, AnswerTag::B),
            question(3, 1, AnswerTag::V),
        ];
        let report = grade(&questions, &[AnswerTag::A, AnswerTag::B, AnswerTag::G]);
        assert_eq!(report.correct_count, 2);
        assert_eq!(report.points_earned, 20);
        assert_eq!(report.theme_errors, vec![(1, 1)]);
    }

    #[test]
    fn perfect_run_has_no_recommendation() {
        let questions = (0..10)
            .map(|i| question(i, 1 + i % 3, AnswerTag::A))
            .collect::<Vec<_>>();
        let answers = vec![AnswerTag::A; 10];
        let report = grade(&questions, &answers);
        assert_eq!(report.correct_count, 10);
        assert_eq!(report.points_earned, 100);
        assert!(!report.has_errors());
        assert!(report.worst_themes(3).is_empty());
    }

    #[test]
    fn early_finish_scores_collected_answers_only() {
        let questions = (0..10)
            .map(|i| question(i, 1, AnswerTag::A))
            .collect::<Vec<_>>();
        let report = grade(&questions, &[AnswerTag::A, AnswerTag::B]);
        assert_eq!(report.answered, 2);
        assert_eq!(report.correct_count, 1);
        assert_eq!(report.points_earned, 10);
        assert!(report.correct_count <= report.answered);
        assert!(report.answered <= questions.len());
    }

    #[test]
    fn theme_errors_sorted_descending_with_stable_ties() {
        // theme 5: 1 error (first encountered), theme 2: 2 errors, theme 9: 1 error
        let questions = vec![
            question(1, 5, AnswerTag::A),
            question(2, 2, AnswerTag::A),
            question(3, 2, AnswerTag::A),
            question(4, 9, AnswerTag::A),
        ];
        let answers = vec![AnswerTag::B; 4];
        let report = grade(&questions, &answers);
        assert_eq!(report.theme_errors, vec![(2, 2), (5, 1), (9, 1)]);
        assert_eq!(report.worst_themes(2), vec![2, 5]);
    }

    #[test]
    fn weak_ranking_is_deterministic() {
        let mut errors = BTreeMap::new();
        errors.insert(4_i64, 2_i64);
        errors.insert(1, 5);
        errors.insert(9, 2);
        errors.insert(3, 0);
        let first = rank_weak_themes(&errors);
        assert_eq!(first, vec![(1, 5), (4, 2), (9, 2)]);
        // idempotent without an intervening quiz
        assert_eq!(rank_weak_themes(&errors), first);
    }
}
