use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::Dialogue;

use crate::quiz::QuizRun;

pub type BotDialogue = Dialogue<State, InMemStorage<State>>;
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// One named state per expected input; every flow's already-collected
/// fields ride along in the variant payload, so a half-entered theme or
/// question can never be read back with fields missing.
#[derive(Clone, Default)]
pub enum State {
    #[default]
    Start,
    ReceiveRegistrationName,
    Menu,

    // studying
    ChooseSubjectForStudy,
    ChooseThemeForStudy {
        subject_id: i64,
    },

    // quizzes
    ChooseSubjectForQuiz,
    QuizInProgress {
        run: QuizRun,
    },
    OfferWeakQuiz {
        theme_ids: Vec<i64>,
    },

    // admin: administrators
    AddAdminReceiveId,
    RemoveAdminReceiveId,

    // admin: subjects
    AddSubjectReceiveName,
    DeleteSubjectReceiveName,

    // admin: themes
    AddThemeChooseSubject,
    AddThemeReceiveName {
        subject_id: i64,
    },
    AddThemeReceiveDescription {
        subject_id: i64,
        name: String,
    },
    DeleteThemeReceiveName,

    // admin: questions
    AddQuestionChooseSubject,
    AddQuestionChooseTheme {
        subject_id: i64,
    },
    AddQuestionReceiveName {
        subject_id: i64,
        theme_id: i64,
    },
    AddQuestionReceiveText {
        draft: QuestionDraft,
    },
    AddQuestionReceiveOption {
        draft: QuestionDraft,
    },
    AddQuestionReceivePoints {
        draft: QuestionDraft,
    },
    AddQuestionReceiveCorrect {
        draft: QuestionDraft,
    },
    DeleteQuestionReceiveName,
}

/// Accumulator for the multi-step question-entry flow. `options` fills
/// А..Г in order, one per turn.
#[derive(Debug, Clone, Default)]
pub struct QuestionDraft {
    pub subject_id: i64,
    pub theme_id: i64,
    pub name: String,
    pub question: String,
    pub options: Vec<String>,
    pub points: i64,
}

impl QuestionDraft {
    pub fn new(subject_id: i64, theme_id: i64, name: String) -> Self {
        Self {
            subject_id,
            theme_id,
            name,
            ..Default::default()
        }
    }
}
