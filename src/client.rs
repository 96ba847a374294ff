use std::sync::Arc;

use teloxide::prelude::*;

use crate::admin;
use crate::db::models::{find_subject, find_theme, AnswerTag, Theme};
use crate::db::Db;
use crate::error::BotError;
use crate::keyboards as kb;
use crate::quiz::{score, QuizRun, QuizScope};
use crate::state::{BotDialogue, HandlerResult, State};

pub async fn start(bot: Bot, dialogue: BotDialogue, msg: Message, db: Arc<Db>) -> HandlerResult {
    let registered = db.set_user(msg.chat.id.0).await?;
    if registered {
        show_menu(&bot, &msg, &db, "👋 С возвращением!\n\nВыберите действие:").await?;
        dialogue.update(State::Menu).await?;
    } else {
        bot.send_message(msg.chat.id, "🎓 Добро пожаловать в систему тестирования!")
            .await?;
        bot.send_message(
            msg.chat.id,
            "Эта система поможет вам:\n\
             ✅ Проверить знания по разным предметам\n\
             ✅ Определить слабые места\n\
             ✅ Получить персональные рекомендации\n\
             ✅ Улучшить свой балл\n\n\
             Введите ваше имя для начала работы:",
        )
        .await?;
        dialogue.update(State::ReceiveRegistrationName).await?;
    }
    Ok(())
}

pub async fn receive_registration_name(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    db: Arc<Db>,
) -> HandlerResult {
    let name = match msg.text() {
        Some(text) if !text.trim().is_empty() => capitalize(text.trim()),
        _ => {
            bot.send_message(msg.chat.id, "Пожалуйста, введите ваше имя (текстом)")
                .await?;
            return Ok(());
        }
    };
    db.update_user_name(msg.chat.id.0, &name).await?;
    let greeting = format!(
        "✅ Регистрация завершена, {name}!\n\nТеперь вы можете начать обучение. Выберите действие:"
    );
    show_menu(&bot, &msg, &db, &greeting).await?;
    dialogue.update(State::Menu).await?;
    Ok(())
}

pub async fn menu(bot: Bot, dialogue: BotDialogue, msg: Message, db: Arc<Db>) -> HandlerResult {
    let Some(text) = msg.text() else {
        show_menu(&bot, &msg, &db, "Выберите действие с клавиатуры:").await?;
        return Ok(());
    };
    match text {
        kb::BTN_STUDY => {
            let subjects = db.get_subjects().await?;
            if subjects.is_empty() {
                bot.send_message(msg.chat.id, "📚 Предметов пока нет").await?;
                return Ok(());
            }
            bot.send_message(msg.chat.id, "📖 Выберите предмет для изучения тем:")
                .reply_markup(kb::subjects(&subjects))
                .await?;
            dialogue.update(State::ChooseSubjectForStudy).await?;
        }
        kb::BTN_TEST => {
            let subjects = db.get_subjects().await?;
            if subjects.is_empty() {
                bot.send_message(msg.chat.id, "📚 Предметов пока нет").await?;
                return Ok(());
            }
            bot.send_message(msg.chat.id, "✏️ Выберите предмет для прохождения теста:")
                .reply_markup(kb::subjects(&subjects))
                .await?;
            dialogue.update(State::ChooseSubjectForQuiz).await?;
        }
        kb::BTN_STATS => my_statistics(&bot, &msg, &db).await?,
        kb::BTN_WEAK => weak_places(&bot, &msg, &db).await?,
        kb::BTN_RATING => my_rating(&bot, &msg, &db).await?,
        "/start" => show_menu(&bot, &msg, &db, "👋 С возвращением!\n\nВыберите действие:").await?,
        other => admin::menu_action(&bot, &dialogue, &msg, &db, other).await?,
    }
    Ok(())
}

pub async fn choose_subject_for_study(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    db: Arc<Db>,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Выберите предмет с клавиатуры")
            .await?;
        return Ok(());
    };
    if text == kb::BTN_BACK {
        return back_to_menu(&bot, &dialogue, &msg, &db).await;
    }
    let subjects = db.get_subjects().await?;
    let Some(subject) = find_subject(&subjects, text) else {
        bot.send_message(
            msg.chat.id,
            format!("⚠️ Предмет '{text}' не найден. Выберите предмет с клавиатуры"),
        )
        .await?;
        return Ok(());
    };
    let themes = db.get_themes_by_subject(subject.id).await?;
    if themes.is_empty() {
        bot.send_message(msg.chat.id, "📖 По этому предмету пока нет тем")
            .await?;
        return Ok(());
    }
    bot.send_message(msg.chat.id, "📖 Выберите тему для изучения:")
        .reply_markup(kb::themes(&themes))
        .await?;
    dialogue
        .update(State::ChooseThemeForStudy {
            subject_id: subject.id,
        })
        .await?;
    Ok(())
}

pub async fn choose_theme_for_study(
    bot: Bot,
    dialogue: BotDialogue,
    subject_id: i64,
    msg: Message,
    db: Arc<Db>,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Выберите тему с клавиатуры")
            .await?;
        return Ok(());
    };
    if text == kb::BTN_BACK {
        let subjects = db.get_subjects().await?;
        bot.send_message(msg.chat.id, "📖 Выберите предмет для изучения тем:")
            .reply_markup(kb::subjects(&subjects))
            .await?;
        dialogue.update(State::ChooseSubjectForStudy).await?;
        return Ok(());
    }
    let themes = db.get_themes_by_subject(subject_id).await?;
    let Some(theme) = find_theme(&themes, text) else {
        bot.send_message(msg.chat.id, format!("⚠️ Тема '{text}' не найдена"))
            .await?;
        return Ok(());
    };
    let content = format!(
        "📚 {}\n{}\n\n{}\n\n{}\n💡 Совет: Прочитайте материал и попробуйте пройти тест на эту тему!",
        theme.name,
        "=".repeat(50),
        theme.description,
        "=".repeat(50),
    );
    // stays in this state so the next tap opens another theme
    bot.send_message(msg.chat.id, content)
        .reply_markup(kb::themes(&themes))
        .await?;
    Ok(())
}

pub async fn choose_subject_for_quiz(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    db: Arc<Db>,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Выберите предмет с клавиатуры")
            .await?;
        return Ok(());
    };
    if text == kb::BTN_BACK {
        return back_to_menu(&bot, &dialogue, &msg, &db).await;
    }
    let subjects = db.get_subjects().await?;
    let Some(subject) = find_subject(&subjects, text) else {
        bot.send_message(
            msg.chat.id,
            format!("⚠️ Предмет '{text}' не найден. Выберите предмет с клавиатуры"),
        )
        .await?;
        return Ok(());
    };
    let questions = db.get_questions_by_subject(subject.id).await?;
    if questions.is_empty() {
        bot.send_message(msg.chat.id, "❌ Тестов для этого предмета не найдено")
            .await?;
        return Ok(());
    }
    let run = QuizRun::new(QuizScope::Subject(subject.id), questions);
    send_question(&bot, msg.chat.id, &run).await?;
    dialogue.update(State::QuizInProgress { run }).await?;
    Ok(())
}

pub async fn quiz_answer(
    bot: Bot,
    dialogue: BotDialogue,
    mut run: QuizRun,
    msg: Message,
    db: Arc<Db>,
) -> HandlerResult {
    match msg.text() {
        Some(kb::BTN_FINISH) => finish_quiz(&bot, &dialogue, &msg, &db, run).await,
        Some(text) => match AnswerTag::parse(text) {
            Some(tag) => {
                run.record_answer(tag);
                if run.is_finished() {
                    finish_quiz(&bot, &dialogue, &msg, &db, run).await
                } else {
                    send_question(&bot, msg.chat.id, &run).await?;
                    dialogue.update(State::QuizInProgress { run }).await?;
                    Ok(())
                }
            }
            None => {
                bot.send_message(msg.chat.id, "Ответьте кнопкой А, Б, В или Г")
                    .reply_markup(kb::answers())
                    .await?;
                Ok(())
            }
        },
        None => {
            bot.send_message(msg.chat.id, "Ответьте кнопкой А, Б, В или Г")
                .reply_markup(kb::answers())
                .await?;
            Ok(())
        }
    }
}

pub async fn offer_weak_quiz(
    bot: Bot,
    dialogue: BotDialogue,
    theme_ids: Vec<i64>,
    msg: Message,
    db: Arc<Db>,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Выберите тему с клавиатуры")
            .await?;
        return Ok(());
    };
    if text == kb::BTN_SKIP_WEAK {
        show_menu(
            &bot,
            &msg,
            &db,
            "✅ Рекомендационный тест пропущен.\n\nВыберите действие:",
        )
        .await?;
        dialogue.update(State::Menu).await?;
        return Ok(());
    }
    for theme_id in &theme_ids {
        let theme = theme_or_fault(&db, *theme_id).await?;
        if theme.name != text {
            continue;
        }
        let questions = db.get_questions_by_theme(*theme_id).await?;
        if questions.is_empty() {
            bot.send_message(msg.chat.id, "❌ Тестов для этой темы не найдено")
                .await?;
            show_menu(&bot, &msg, &db, "Выберите действие:").await?;
            dialogue.update(State::Menu).await?;
            return Ok(());
        }
        let run = QuizRun::new(QuizScope::Theme(*theme_id), questions);
        send_question(&bot, msg.chat.id, &run).await?;
        dialogue.update(State::QuizInProgress { run }).await?;
        return Ok(());
    }
    bot.send_message(msg.chat.id, "Выберите тему с клавиатуры")
        .await?;
    Ok(())
}

async fn send_question(bot: &Bot, chat_id: ChatId, run: &QuizRun) -> HandlerResult {
    let Some(question) = run.current() else {
        return Ok(());
    };
    let header = match run.scope {
        QuizScope::Subject(_) => "Вопрос",
        QuizScope::Theme(_) => "Рекомендационный тест",
    };
    let options = AnswerTag::ALL
        .iter()
        .zip(&question.answers)
        .map(|(tag, text)| format!("{}) {}", tag.label(), text))
        .collect::<Vec<_>>()
        .join("\n");
    let text = format!(
        "❓ {} {}/{}\n\n{}\n\n{}\n\n{}",
        header,
        run.current_number(),
        run.questions.len(),
        question.name,
        question.question,
        options,
    );
    bot.send_message(chat_id, text)
        .reply_markup(kb::answers())
        .await?;
    Ok(())
}

async fn finish_quiz(
    bot: &Bot,
    dialogue: &BotDialogue,
    msg: &Message,
    db: &Arc<Db>,
    run: QuizRun,
) -> HandlerResult {
    let report = run.grade();
    let tg_id = msg.chat.id.0;

    match run.scope {
        QuizScope::Subject(subject_id) => {
            let total = settle_subject_score(dialogue, db, tg_id, subject_id, &report).await?;

            let mut text = format!(
                "📊 РЕЗУЛЬТАТЫ ТЕСТА\n━━━━━━━━━━━━━━━━━━━━━━\n\n\
                 ✅ Правильных ответов: {}/{}\n\
                 ⭐ Баллов за этот тест: {}\n\
                 🏆 Общий балл: {}\n",
                report.correct_count, report.answered, report.points_earned, total,
            );
            if report.has_errors() {
                text.push_str("\n❌ ОШИБКИ ПО ТЕМАМ:\n");
                for (theme_id, count) in &report.theme_errors {
                    let theme = theme_or_fault(db, *theme_id).await?;
                    text += &format!("• {}: {} ошибок\n", theme.name, count);
                }
                let worst = theme_or_fault(db, report.theme_errors[0].0).await?;
                text += &format!("\n💡 РЕКОМЕНДАЦИЯ: Повторите тему \"{}\"", worst.name);
                bot.send_message(msg.chat.id, text).await?;

                let theme_ids = report.worst_themes(3);
                let mut names = Vec::new();
                for theme_id in &theme_ids {
                    names.push(theme_or_fault(db, *theme_id).await?.name);
                }
                bot.send_message(msg.chat.id, "🎯 Хотите пройти тест для повторения слабых тем?")
                    .reply_markup(kb::weak_themes(&names))
                    .await?;
                dialogue.update(State::OfferWeakQuiz { theme_ids }).await?;
            } else {
                text.push_str("\n✅ Отлично! Все ответы правильные!");
                bot.send_message(msg.chat.id, text).await?;
                show_menu(bot, msg, db, "Выберите действие:").await?;
            }
        }
        QuizScope::Theme(theme_id) => {
            // Focused quizzes report points without writing them back.
            let theme = theme_or_fault(db, theme_id).await?;
            let user = db
                .get_user(tg_id)
                .await?
                .ok_or_else(|| BotError::Integrity(format!("user {tg_id} has no row")))?;
            let text = format!(
                "📊 РЕЗУЛЬТАТЫ РЕКОМЕНДАЦИОННОГО ТЕСТА\n━━━━━━━━━━━━━━━━━━━━━━\n\n\
                 📚 Тема: {}\n\
                 ✅ Правильных ответов: {}/{}\n\
                 ⭐ Баллов за этот тест: {}\n\
                 🏆 Общий балл: {}\n",
                theme.name, report.correct_count, report.answered, report.points_earned,
                user.total_mark,
            );
            bot.send_message(msg.chat.id, text).await?;
            show_menu(bot, msg, db, "Выберите действие:").await?;
            dialogue.update(State::Menu).await?;
        }
    }
    Ok(())
}

/// Writes the run's marks and error counts to the store and leaves the
/// quiz state in the same step. Once the score is on disk, a retried
/// update lands in the menu instead of grading the run a second time;
/// rendering failures after this point cannot touch the scoring.
pub(crate) async fn settle_subject_score(
    dialogue: &BotDialogue,
    db: &Arc<Db>,
    tg_id: i64,
    subject_id: i64,
    report: &score::QuizReport,
) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
    let total = db
        .apply_subject_marks(tg_id, subject_id, report.points_earned)
        .await?;
    db.merge_theme_errors(tg_id, &report.theme_errors).await?;
    dialogue.update(State::Menu).await?;
    Ok(total)
}

async fn my_statistics(bot: &Bot, msg: &Message, db: &Arc<Db>) -> HandlerResult {
    let user = user_or_fault(db, msg.chat.id.0).await?;
    let mut stats = format!(
        "📊 ВАША СТАТИСТИКА\n━━━━━━━━━━━━━━━━━━━━━━\n\nОбщий балл: {} баллов\n\nПо предметам:\n",
        user.total_mark,
    );
    let subjects = db.get_subjects().await?;
    if subjects.is_empty() {
        stats.push_str("📚 Нет предметов в системе\n");
    } else {
        for subject in &subjects {
            let mark = user.marks_by_subject.get(&subject.id).copied().unwrap_or(0);
            stats += &format!("• {}: {} баллов ({} тестов)\n", subject.name, mark, mark / 10);
        }
    }
    bot.send_message(msg.chat.id, stats).await?;
    Ok(())
}

async fn weak_places(bot: &Bot, msg: &Message, db: &Arc<Db>) -> HandlerResult {
    let user = user_or_fault(db, msg.chat.id.0).await?;
    let ranked = score::rank_weak_themes(&user.errors_by_theme);
    if ranked.is_empty() {
        bot.send_message(
            msg.chat.id,
            "✅ Отлично! У вас пока нет слабых мест.\n\
             Продолжайте решать тесты, чтобы система могла анализировать ваш прогресс.",
        )
        .await?;
        return Ok(());
    }
    let mut text = String::from("🎯 ВАШИ СЛАБЫЕ МЕСТА\n━━━━━━━━━━━━━━━━━━━━━━\n\n");
    for (theme_id, count) in ranked.iter().take(5) {
        let theme = theme_or_fault(db, *theme_id).await?;
        text += &format!("• {}: {} ошибок\n", theme.name, count);
    }
    text.push_str("\n💡 Рекомендация: Повторите эти темы в разделе \"Изучить темы\"");
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn my_rating(bot: &Bot, msg: &Message, db: &Arc<Db>) -> HandlerResult {
    let user = user_or_fault(db, msg.chat.id.0).await?;
    let mark = user.total_mark;
    let (level, progress) = if mark < 50 {
        ("🔴 Начинающий", format!("{mark}/100"))
    } else if mark < 150 {
        ("🟡 Практикант", format!("{mark}/200"))
    } else if mark < 300 {
        ("🟢 Учащийся", format!("{mark}/300"))
    } else if mark < 500 {
        ("🔵 Отличник", format!("{mark}/500"))
    } else {
        ("⭐ Мастер", format!("{mark}/500+"))
    };
    let text = format!(
        "⭐ ВАШ РЕЙТИНГ\n━━━━━━━━━━━━━━━━━━━━━━\n\n\
         Уровень: {level}\nБаллов: {progress}\n\n\
         Совет: Решайте больше тестов, чтобы увеличить свой рейтинг!"
    );
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

pub async fn show_menu(bot: &Bot, msg: &Message, db: &Arc<Db>, text: &str) -> HandlerResult {
    let is_admin = db.is_admin(msg.chat.id.0).await?;
    bot.send_message(msg.chat.id, text)
        .reply_markup(kb::main_menu(is_admin))
        .await?;
    Ok(())
}

pub async fn back_to_menu(
    bot: &Bot,
    dialogue: &BotDialogue,
    msg: &Message,
    db: &Arc<Db>,
) -> HandlerResult {
    show_menu(bot, msg, db, "👈 Вы вернулись в главное меню.\n\nВыберите действие:").await?;
    dialogue.update(State::Menu).await?;
    Ok(())
}

async fn user_or_fault(db: &Arc<Db>, tg_id: i64) -> Result<crate::db::models::User, BotError> {
    db.get_user(tg_id)
        .await?
        .ok_or_else(|| BotError::Integrity(format!("user {tg_id} has no row")))
}

async fn theme_or_fault(db: &Arc<Db>, theme_id: i64) -> Result<Theme, BotError> {
    db.get_theme(theme_id)
        .await?
        .ok_or_else(|| BotError::Integrity(format!("theme {theme_id} no longer exists")))
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
