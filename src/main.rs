mod admin;
mod client;
mod db;
mod error;
mod keyboards;
mod notify;
mod quiz;
#[cfg(test)]
mod scenarios;
mod state;

use std::sync::Arc;

use dotenv::dotenv;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;

use db::Db;
use state::State;

#[tokio::main]
async fn main() {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting quiz bot...");

    let bot = Bot::from_env();

    let db_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "quiz.db".to_string());
    let db = Arc::new(Db::open(&db_path).expect("Failed to open the content database"));
    log::info!("Content database ready at {db_path}");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![InMemStorage::<State>::new(), db])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    Update::filter_message()
        .enter_dialogue::<Message, InMemStorage<State>, State>()
        .branch(dptree::case![State::Start].endpoint(client::start))
        .branch(dptree::case![State::ReceiveRegistrationName].endpoint(client::receive_registration_name))
        .branch(dptree::case![State::Menu].endpoint(client::menu))
        // studying
        .branch(dptree::case![State::ChooseSubjectForStudy].endpoint(client::choose_subject_for_study))
        .branch(
            dptree::case![State::ChooseThemeForStudy { subject_id }]
                .endpoint(client::choose_theme_for_study),
        )
        // quizzes
        .branch(dptree::case![State::ChooseSubjectForQuiz].endpoint(client::choose_subject_for_quiz))
        .branch(dptree::case![State::QuizInProgress { run }].endpoint(client::quiz_answer))
        .branch(dptree::case![State::OfferWeakQuiz { theme_ids }].endpoint(client::offer_weak_quiz))
        // admin: administrators
        .branch(dptree::case![State::AddAdminReceiveId].endpoint(admin::add_admin_receive_id))
        .branch(dptree::case![State::RemoveAdminReceiveId].endpoint(admin::remove_admin_receive_id))
        // admin: subjects
        .branch(dptree::case![State::AddSubjectReceiveName].endpoint(admin::add_subject_receive_name))
        .branch(
            dptree::case![State::DeleteSubjectReceiveName]
                .endpoint(admin::delete_subject_receive_name),
        )
        // admin: themes
        .branch(dptree::case![State::AddThemeChooseSubject].endpoint(admin::add_theme_choose_subject))
        .branch(
            dptree::case![State::AddThemeReceiveName { subject_id }]
                .endpoint(admin::add_theme_receive_name),
        )
        .branch(
            dptree::case![State::AddThemeReceiveDescription { subject_id, name }]
                .endpoint(admin::add_theme_receive_description),
        )
        .branch(dptree::case![State::DeleteThemeReceiveName].endpoint(admin::delete_theme_receive_name))
        // admin: questions
        .branch(
            dptree::case![State::AddQuestionChooseSubject]
                .endpoint(admin::add_question_choose_subject),
        )
        .branch(
            dptree::case![State::AddQuestionChooseTheme { subject_id }]
                .endpoint(admin::add_question_choose_theme),
        )
        .branch(
            dptree::case![State::AddQuestionReceiveName { subject_id, theme_id }]
                .endpoint(admin::add_question_receive_name),
        )
        .branch(
            dptree::case![State::AddQuestionReceiveText { draft }]
                .endpoint(admin::add_question_receive_text),
        )
        .branch(
            dptree::case![State::AddQuestionReceiveOption { draft }]
                .endpoint(admin::add_question_receive_option),
        )
        .branch(
            dptree::case![State::AddQuestionReceivePoints { draft }]
                .endpoint(admin::add_question_receive_points),
        )
        .branch(
            dptree::case![State::AddQuestionReceiveCorrect { draft }]
                .endpoint(admin::add_question_receive_correct),
        )
        .branch(
            dptree::case![State::DeleteQuestionReceiveName]
                .endpoint(admin::delete_question_receive_name),
        )
}
