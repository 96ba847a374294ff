//! End-to-end scenarios across the content store and the quiz engine,
//! following the same persistence steps the handlers take.

use std::sync::Arc;

use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::types::ChatId;

use crate::client;
use crate::db::models::{find_subject, AnswerTag, NewQuestion};
use crate::db::Db;
use crate::quiz::{score, QuizRun, QuizScope};
use crate::state::{BotDialogue, State};

async fn add_question(db: &Db, theme_id: i64, subject_id: i64, name: &str, correct: AnswerTag) {
    db.add_question(&NewQuestion {
        theme_id,
        subject_id,
        name: name.into(),
        question: "?".into(),
        answers: ["1".into(), "2".into(), "3".into(), "4".into()],
        point: 5,
        correct_answer: correct,
    })
    .await
    .unwrap();
}

/// Subject "Математика", theme "Алгебра" with correct tags [А, Б, В];
/// the user submits [А, Б, Г]: 2 correct, 20 points, one theme error.
#[tokio::test]
async fn subject_quiz_scores_and_records_weakness() {
    let db = Db::open_in_memory().unwrap();
    db.set_user(100).await.unwrap();
    let subject_id = db.add_subject("Математика").await.unwrap();
    let theme_id = db.add_theme(subject_id, "Алгебра", "Основы").await.unwrap();
    add_question(&db, theme_id, subject_id, "В1", AnswerTag::A).await;
    add_question(&db, theme_id, subject_id, "В2", AnswerTag::B).await;
    add_question(&db, theme_id, subject_id, "В3", AnswerTag::V).await;

    let questions = db.get_questions_by_subject(subject_id).await.unwrap();
    let mut run = QuizRun::new(QuizScope::Subject(subject_id), questions);
    for tag in [AnswerTag::A, AnswerTag::B, AnswerTag::G] {
        run.record_answer(tag);
    }
    assert!(run.is_finished());

    let report = run.grade();
    assert_eq!(report.correct_count, 2);
    assert_eq!(report.points_earned, 20);
    assert_eq!(report.theme_errors, vec![(theme_id, 1)]);

    let total = db
        .apply_subject_marks(100, subject_id, report.points_earned)
        .await
        .unwrap();
    db.merge_theme_errors(100, &report.theme_errors).await.unwrap();
    assert_eq!(total, 20);

    let user = db.get_user(100).await.unwrap().unwrap();
    assert_eq!(user.total_mark, 20);
    assert_eq!(
        user.total_mark,
        user.marks_by_subject.values().sum::<i64>()
    );
    assert_eq!(user.errors_by_theme.get(&theme_id), Some(&1));
}

/// A fresh user answering all ten questions correctly earns 100 points
/// and gets no weak-theme recommendation.
#[tokio::test]
async fn perfect_ten_question_quiz() {
    let db = Db::open_in_memory().unwrap();
    db.set_user(200).await.unwrap();
    let subject_id = db.add_subject("Химия").await.unwrap();
    let theme_id = db.add_theme(subject_id, "Электроны", "...").await.unwrap();
    for i in 0..10 {
        add_question(&db, theme_id, subject_id, &format!("В{i}"), AnswerTag::G).await;
    }

    let questions = db.get_questions_by_subject(subject_id).await.unwrap();
    let mut run = QuizRun::new(QuizScope::Subject(subject_id), questions);
    while !run.is_finished() {
        run.record_answer(AnswerTag::G);
    }
    let report = run.grade();
    assert_eq!(report.correct_count, 10);
    assert_eq!(report.points_earned, 100);
    assert!(!report.has_errors());
    assert!(report.worst_themes(3).is_empty());

    let total = db
        .apply_subject_marks(200, subject_id, report.points_earned)
        .await
        .unwrap();
    db.merge_theme_errors(200, &report.theme_errors).await.unwrap();
    assert_eq!(total, 100);
    assert!(db.get_user(200).await.unwrap().unwrap().errors_by_theme.is_empty());
}

/// A theme-focused follow-up quiz computes points but never writes marks
/// back; the persisted user row stays exactly as it was.
#[tokio::test]
async fn focused_quiz_leaves_marks_untouched() {
    let db = Db::open_in_memory().unwrap();
    db.set_user(300).await.unwrap();
    let subject_id = db.add_subject("Математика").await.unwrap();
    let theme_id = db.add_theme(subject_id, "Алгебра", "...").await.unwrap();
    add_question(&db, theme_id, subject_id, "В1", AnswerTag::A).await;
    add_question(&db, theme_id, subject_id, "В2", AnswerTag::B).await;
    db.apply_subject_marks(300, subject_id, 40).await.unwrap();
    let before = db.get_user(300).await.unwrap().unwrap();

    let questions = db.get_questions_by_theme(theme_id).await.unwrap();
    let mut run = QuizRun::new(QuizScope::Theme(theme_id), questions);
    run.record_answer(AnswerTag::A);
    run.record_answer(AnswerTag::B);
    let report = run.grade();
    assert_eq!(report.points_earned, 20);

    // focused scope: no apply_subject_marks, no merge_theme_errors
    let after = db.get_user(300).await.unwrap().unwrap();
    assert_eq!(after.total_mark, before.total_mark);
    assert_eq!(after.marks_by_subject, before.marks_by_subject);
    assert_eq!(after.errors_by_theme, before.errors_by_theme);
}

/// The weak-places ranking is a pure read: asking twice without an
/// intervening quiz returns the same list.
#[tokio::test]
async fn weak_query_is_idempotent() {
    let db = Db::open_in_memory().unwrap();
    db.set_user(400).await.unwrap();
    db.merge_theme_errors(400, &[(1, 3), (2, 1), (5, 3)]).await.unwrap();

    let user = db.get_user(400).await.unwrap().unwrap();
    let first = score::rank_weak_themes(&user.errors_by_theme);
    let user = db.get_user(400).await.unwrap().unwrap();
    let second = score::rank_weak_themes(&user.errors_by_theme);
    assert_eq!(first, second);
    assert_eq!(first, vec![(1, 3), (5, 3), (2, 1)]);
}

/// Finishing a subject quiz moves the dialogue to the menu in the same
/// step that persists the score, so a failed result message cannot lead
/// to the run being graded again on the user's next tap.
#[tokio::test]
async fn settled_quiz_cannot_be_graded_twice() {
    let db = Arc::new(Db::open_in_memory().unwrap());
    db.set_user(500).await.unwrap();
    let subject_id = db.add_subject("Математика").await.unwrap();
    let theme_id = db.add_theme(subject_id, "Алгебра", "...").await.unwrap();
    add_question(&db, theme_id, subject_id, "В1", AnswerTag::A).await;
    add_question(&db, theme_id, subject_id, "В2", AnswerTag::B).await;

    let questions = db.get_questions_by_subject(subject_id).await.unwrap();
    let mut run = QuizRun::new(QuizScope::Subject(subject_id), questions);
    run.record_answer(AnswerTag::A);
    run.record_answer(AnswerTag::G);
    let report = run.grade();

    let dialogue = BotDialogue::new(InMemStorage::<State>::new(), ChatId(500));
    dialogue
        .update(State::QuizInProgress { run })
        .await
        .unwrap();

    let total = client::settle_subject_score(&dialogue, &db, 500, subject_id, &report)
        .await
        .unwrap();
    assert_eq!(total, 10);
    // the quiz state is gone before any message could fail to send
    assert!(matches!(dialogue.get().await.unwrap(), Some(State::Menu)));

    let user = db.get_user(500).await.unwrap().unwrap();
    assert_eq!(user.marks_by_subject.get(&subject_id), Some(&10));
    assert_eq!(user.errors_by_theme.get(&theme_id), Some(&1));
}

/// Deleting subject "Physics" follows the handler path: an exact-match
/// lookup, delete only on a hit. The miss leaves the catalogue untouched;
/// the hit removes the one matching subject.
#[tokio::test]
async fn delete_missing_subject_changes_nothing() {
    let db = Db::open_in_memory().unwrap();
    db.add_subject("Математика").await.unwrap();

    let subjects = db.get_subjects().await.unwrap();
    if let Some(subject) = find_subject(&subjects, "Physics") {
        db.delete_subject(subject.id).await.unwrap();
    }
    let after = db.get_subjects().await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].name, "Математика");

    let matched = find_subject(&after, "Математика").expect("exact name matches");
    db.delete_subject(matched.id).await.unwrap();
    assert!(db.get_subjects().await.unwrap().is_empty());
}
