use std::sync::Arc;

use teloxide::prelude::*;

use crate::client::{back_to_menu, show_menu};
use crate::db::models::{find_question, find_subject, find_theme, AnswerTag, NewQuestion};
use crate::db::Db;
use crate::error::BotError;
use crate::keyboards as kb;
use crate::notify;
use crate::state::{BotDialogue, HandlerResult, QuestionDraft, State};

/// Entry points for the admin flows, reached from the main menu. The
/// privilege check happens here; non-admins never leave the menu state.
pub async fn menu_action(
    bot: &Bot,
    dialogue: &BotDialogue,
    msg: &Message,
    db: &Arc<Db>,
    text: &str,
) -> HandlerResult {
    if !db.is_admin(msg.chat.id.0).await? {
        bot.send_message(msg.chat.id, "Выберите действие с клавиатуры")
            .await?;
        return Ok(());
    }
    match text {
        kb::BTN_ADD_ADMIN => {
            bot.send_message(msg.chat.id, "👤 Введите Telegram ID нового администратора:")
                .await?;
            dialogue.update(State::AddAdminReceiveId).await?;
        }
        kb::BTN_DEL_ADMIN => {
            bot.send_message(msg.chat.id, "🗑️ Введите Telegram ID администратора для удаления:")
                .await?;
            dialogue.update(State::RemoveAdminReceiveId).await?;
        }
        kb::BTN_ADD_SUBJECT => {
            let subjects = db.get_subjects().await?;
            let prompt = format!(
                "📚 Введите название предмета:{}",
                listing(subjects.iter().map(|s| s.name.as_str())),
            );
            bot.send_message(msg.chat.id, prompt).await?;
            dialogue.update(State::AddSubjectReceiveName).await?;
        }
        kb::BTN_DEL_SUBJECT => {
            let subjects = db.get_subjects().await?;
            let prompt = format!(
                "🗑️ Введите название предмета для удаления:{}",
                listing(subjects.iter().map(|s| s.name.as_str())),
            );
            bot.send_message(msg.chat.id, prompt).await?;
            dialogue.update(State::DeleteSubjectReceiveName).await?;
        }
        kb::BTN_ADD_THEME => {
            let subjects = db.get_subjects().await?;
            if subjects.is_empty() {
                bot.send_message(msg.chat.id, "⚠️ Сначала добавьте предмет")
                    .await?;
                return Ok(());
            }
            bot.send_message(msg.chat.id, "📚 Выберите предмет для новой темы:")
                .reply_markup(kb::subjects(&subjects))
                .await?;
            dialogue.update(State::AddThemeChooseSubject).await?;
        }
        kb::BTN_DEL_THEME => {
            let themes = db.get_themes().await?;
            let prompt = format!(
                "🗑️ Введите название темы для удаления:{}",
                listing(themes.iter().map(|t| t.name.as_str())),
            );
            bot.send_message(msg.chat.id, prompt).await?;
            dialogue.update(State::DeleteThemeReceiveName).await?;
        }
        kb::BTN_ADD_QUESTION => {
            let subjects = db.get_subjects().await?;
            if subjects.is_empty() {
                bot.send_message(msg.chat.id, "⚠️ Сначала добавьте предмет")
                    .await?;
                return Ok(());
            }
            bot.send_message(msg.chat.id, "📚 Выберите предмет для вопроса:")
                .reply_markup(kb::subjects(&subjects))
                .await?;
            dialogue.update(State::AddQuestionChooseSubject).await?;
        }
        kb::BTN_DEL_QUESTION => {
            let questions = db.get_questions().await?;
            let prompt = format!(
                "🗑️ Введите название вопроса для удаления:{}",
                listing(questions.iter().map(|q| q.name.as_str())),
            );
            bot.send_message(msg.chat.id, prompt).await?;
            dialogue.update(State::DeleteQuestionReceiveName).await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Выберите действие с клавиатуры")
                .await?;
        }
    }
    Ok(())
}

pub async fn add_admin_receive_id(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    db: Arc<Db>,
) -> HandlerResult {
    let Some(tg_id) = numeric_id(&msg) else {
        bot.send_message(msg.chat.id, "⚠️ Введите числовой Telegram ID")
            .await?;
        return Ok(());
    };
    if db.is_admin(tg_id).await? {
        bot.send_message(
            msg.chat.id,
            format!("⚠️ Пользователь с TG ID \"{tg_id}\" уже является администратором."),
        )
        .await?;
    } else {
        db.add_admin(tg_id).await?;
        bot.send_message(
            msg.chat.id,
            format!("✅ Пользователь с TG ID \"{tg_id}\" успешно добавлен в администраторы."),
        )
        .await?;
    }
    finish_flow(&bot, &dialogue, &msg, &db).await
}

pub async fn remove_admin_receive_id(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    db: Arc<Db>,
) -> HandlerResult {
    let Some(tg_id) = numeric_id(&msg) else {
        bot.send_message(msg.chat.id, "⚠️ Введите числовой Telegram ID")
            .await?;
        return Ok(());
    };
    if db.is_admin(tg_id).await? {
        db.delete_admin(tg_id).await?;
        bot.send_message(
            msg.chat.id,
            format!("✅ Пользователь с TG ID \"{tg_id}\" успешно удалён из администраторов."),
        )
        .await?;
        notify::notify_admins(
            &bot,
            &db,
            &format!("⚠️ Администратор с TG ID \"{tg_id}\" был удалён из списка администраторов."),
        )
        .await?;
    } else {
        bot.send_message(
            msg.chat.id,
            format!("⚠️ Пользователь с TG ID \"{tg_id}\" не является администратором."),
        )
        .await?;
    }
    finish_flow(&bot, &dialogue, &msg, &db).await
}

pub async fn add_subject_receive_name(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    db: Arc<Db>,
) -> HandlerResult {
    let Some(name) = text_field(&msg) else {
        bot.send_message(msg.chat.id, "⚠️ Введите название текстом")
            .await?;
        return Ok(());
    };
    db.add_subject(&name).await?;
    bot.send_message(msg.chat.id, format!("✅ Предмет '{name}' успешно добавлен!"))
        .await?;
    notify::broadcast_users(
        &bot,
        &db,
        &format!(
            "🚀 <b>Новый предмет!</b>\n\n📚 <code>{name}</code>\n\n⚡ Начните изучение прямо сейчас!"
        ),
    )
    .await?;
    finish_flow(&bot, &dialogue, &msg, &db).await
}

pub async fn delete_subject_receive_name(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    db: Arc<Db>,
) -> HandlerResult {
    let Some(name) = text_field(&msg) else {
        bot.send_message(msg.chat.id, "⚠️ Введите название текстом")
            .await?;
        return Ok(());
    };
    let subjects = db.get_subjects().await?;
    match find_subject(&subjects, &name) {
        Some(subject) => {
            db.delete_subject(subject.id).await?;
            bot.send_message(msg.chat.id, format!("✅ Предмет '{name}' успешно удалён!"))
                .await?;
            notify::notify_admins(
                &bot,
                &db,
                &format!("⚠️ Предмет \"{name}\" был удалён из базы данных."),
            )
            .await?;
        }
        None => {
            bot.send_message(msg.chat.id, format!("⚠️ Предмет '{name}' не найден."))
                .await?;
        }
    }
    finish_flow(&bot, &dialogue, &msg, &db).await
}

pub async fn add_theme_choose_subject(
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
        bot.send_message(msg.chat.id, format!("⚠️ Предмет '{text}' не найден"))
            .await?;
        return Ok(());
    };
    let themes = db.get_themes_by_subject(subject.id).await?;
    let prompt = format!(
        "📖 Введите название темы:{}",
        listing(themes.iter().map(|t| t.name.as_str())),
    );
    bot.send_message(msg.chat.id, prompt).await?;
    dialogue
        .update(State::AddThemeReceiveName {
            subject_id: subject.id,
        })
        .await?;
    Ok(())
}

pub async fn add_theme_receive_name(
    bot: Bot,
    dialogue: BotDialogue,
    subject_id: i64,
    msg: Message,
) -> HandlerResult {
    let Some(name) = text_field(&msg) else {
        bot.send_message(msg.chat.id, "⚠️ Введите название текстом")
            .await?;
        return Ok(());
    };
    bot.send_message(msg.chat.id, "📝 Введите описание темы:")
        .await?;
    dialogue
        .update(State::AddThemeReceiveDescription { subject_id, name })
        .await?;
    Ok(())
}

pub async fn add_theme_receive_description(
    bot: Bot,
    dialogue: BotDialogue,
    (subject_id, name): (i64, String),
    msg: Message,
    db: Arc<Db>,
) -> HandlerResult {
    let Some(description) = text_field(&msg) else {
        bot.send_message(msg.chat.id, "⚠️ Введите описание текстом")
            .await?;
        return Ok(());
    };
    match db.add_theme(subject_id, &name, &description).await {
        Ok(_) => {
            bot.send_message(msg.chat.id, format!("✅ Тема '{name}' успешно добавлена!"))
                .await?;
            notify::broadcast_users(
                &bot,
                &db,
                &format!(
                    "⭐ <b>Новая тема!</b>\n\n📖 <code>{name}</code>\n\n📝 {description}\n\n🚀 Начните обучение сейчас!"
                ),
            )
            .await?;
        }
        Err(BotError::Validation(_)) => {
            bot.send_message(msg.chat.id, "⚠️ Предмет не найден, тема не сохранена.")
                .await?;
        }
        Err(err) => return Err(err.into()),
    }
    finish_flow(&bot, &dialogue, &msg, &db).await
}

pub async fn delete_theme_receive_name(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    db: Arc<Db>,
) -> HandlerResult {
    let Some(name) = text_field(&msg) else {
        bot.send_message(msg.chat.id, "⚠️ Введите название текстом")
            .await?;
        return Ok(());
    };
    let themes = db.get_themes().await?;
    match find_theme(&themes, &name) {
        Some(theme) => {
            db.delete_theme(theme.id).await?;
            bot.send_message(msg.chat.id, format!("✅ Тема '{name}' успешно удалена!"))
                .await?;
            notify::notify_admins(
                &bot,
                &db,
                &format!("⚠️ Тема \"{name}\" была удалена из базы данных."),
            )
            .await?;
        }
        None => {
            bot.send_message(msg.chat.id, format!("⚠️ Тема '{name}' не найдена."))
                .await?;
        }
    }
    finish_flow(&bot, &dialogue, &msg, &db).await
}

pub async fn add_question_choose_subject(
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
        bot.send_message(msg.chat.id, format!("⚠️ Предмет '{text}' не найден"))
            .await?;
        return Ok(());
    };
    let themes = db.get_themes_by_subject(subject.id).await?;
    if themes.is_empty() {
        bot.send_message(msg.chat.id, "⚠️ По этому предмету пока нет тем. Сначала добавьте тему.")
            .await?;
        return finish_flow(&bot, &dialogue, &msg, &db).await;
    }
    bot.send_message(msg.chat.id, "📖 Выберите тему для вопроса:")
        .reply_markup(kb::themes(&themes))
        .await?;
    dialogue
        .update(State::AddQuestionChooseTheme {
            subject_id: subject.id,
        })
        .await?;
    Ok(())
}

pub async fn add_question_choose_theme(
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
        bot.send_message(msg.chat.id, "📚 Выберите предмет для вопроса:")
            .reply_markup(kb::subjects(&subjects))
            .await?;
        dialogue.update(State::AddQuestionChooseSubject).await?;
        return Ok(());
    }
    let themes = db.get_themes_by_subject(subject_id).await?;
    let Some(theme) = find_theme(&themes, text) else {
        bot.send_message(msg.chat.id, format!("⚠️ Тема '{text}' не найдена"))
            .await?;
        return Ok(());
    };
    let questions = db.get_questions_by_theme(theme.id).await?;
    let prompt = format!(
        "❓ Введите название вопроса:{}",
        listing(questions.iter().map(|q| q.name.as_str())),
    );
    bot.send_message(msg.chat.id, prompt).await?;
    dialogue
        .update(State::AddQuestionReceiveName {
            subject_id,
            theme_id: theme.id,
        })
        .await?;
    Ok(())
}

pub async fn add_question_receive_name(
    bot: Bot,
    dialogue: BotDialogue,
    (subject_id, theme_id): (i64, i64),
    msg: Message,
) -> HandlerResult {
    let Some(name) = text_field(&msg) else {
        bot.send_message(msg.chat.id, "⚠️ Введите название текстом")
            .await?;
        return Ok(());
    };
    bot.send_message(msg.chat.id, "❓ Введите текст вопроса:")
        .await?;
    dialogue
        .update(State::AddQuestionReceiveText {
            draft: QuestionDraft::new(subject_id, theme_id, name),
        })
        .await?;
    Ok(())
}

pub async fn add_question_receive_text(
    bot: Bot,
    dialogue: BotDialogue,
    mut draft: QuestionDraft,
    msg: Message,
) -> HandlerResult {
    let Some(question) = text_field(&msg) else {
        bot.send_message(msg.chat.id, "⚠️ Введите текст вопроса")
            .await?;
        return Ok(());
    };
    draft.question = question;
    bot.send_message(msg.chat.id, "🅰️ Введите вариант ответа А:")
        .await?;
    dialogue
        .update(State::AddQuestionReceiveOption { draft })
        .await?;
    Ok(())
}

pub async fn add_question_receive_option(
    bot: Bot,
    dialogue: BotDialogue,
    mut draft: QuestionDraft,
    msg: Message,
) -> HandlerResult {
    let Some(option) = text_field(&msg) else {
        bot.send_message(msg.chat.id, "⚠️ Введите вариант ответа текстом")
            .await?;
        return Ok(());
    };
    draft.options.push(option);
    if draft.options.len() < 4 {
        let next = AnswerTag::ALL[draft.options.len()].label();
        bot.send_message(msg.chat.id, format!("Введите вариант ответа {next}:"))
            .await?;
        dialogue
            .update(State::AddQuestionReceiveOption { draft })
            .await?;
    } else {
        bot.send_message(msg.chat.id, "⭐ Введите количество баллов за вопрос:")
            .await?;
        dialogue
            .update(State::AddQuestionReceivePoints { draft })
            .await?;
    }
    Ok(())
}

pub async fn add_question_receive_points(
    bot: Bot,
    dialogue: BotDialogue,
    mut draft: QuestionDraft,
    msg: Message,
) -> HandlerResult {
    let points = match msg.text().and_then(|t| t.trim().parse::<i64>().ok()) {
        Some(points) if points >= 0 => points,
        _ => {
            bot.send_message(msg.chat.id, "⚠️ Введите количество баллов числом")
                .await?;
            return Ok(());
        }
    };
    draft.points = points;
    bot.send_message(msg.chat.id, "✅ Введите правильный ответ (А, Б, В или Г):")
        .await?;
    dialogue
        .update(State::AddQuestionReceiveCorrect { draft })
        .await?;
    Ok(())
}

pub async fn add_question_receive_correct(
    bot: Bot,
    dialogue: BotDialogue,
    draft: QuestionDraft,
    msg: Message,
    db: Arc<Db>,
) -> HandlerResult {
    let Some(correct) = msg.text().and_then(AnswerTag::parse) else {
        bot.send_message(msg.chat.id, "⚠️ Правильный ответ должен быть одним из: А, Б, В, Г")
            .await?;
        return Ok(());
    };
    let answers: [String; 4] = draft
        .options
        .clone()
        .try_into()
        .map_err(|_| BotError::Validation("question draft must hold four options".into()))?;
    let new = NewQuestion {
        theme_id: draft.theme_id,
        subject_id: draft.subject_id,
        name: draft.name.clone(),
        question: draft.question.clone(),
        answers,
        point: draft.points,
        correct_answer: correct,
    };
    match db.add_question(&new).await {
        Ok(_) => {
            bot.send_message(
                msg.chat.id,
                format!("✅ Вопрос '{}' успешно добавлен!", draft.name),
            )
            .await?;
            let subject = db
                .get_subject(draft.subject_id)
                .await?
                .ok_or_else(|| BotError::Integrity(format!("subject {} missing", draft.subject_id)))?;
            let theme = db
                .get_theme(draft.theme_id)
                .await?
                .ok_or_else(|| BotError::Integrity(format!("theme {} missing", draft.theme_id)))?;
            notify::broadcast_users(
                &bot,
                &db,
                &format!(
                    "🧠 <b>Новый вопрос!</b>\n\n📚 Предмет: <code>{}</code>\n📖 Тема: <code>{}</code>\n\n🚀 Проверьте свои знания!",
                    subject.name, theme.name,
                ),
            )
            .await?;
        }
        Err(BotError::Validation(_)) => {
            bot.send_message(
                msg.chat.id,
                "⚠️ Тема не соответствует выбранному предмету, вопрос не сохранён.",
            )
            .await?;
        }
        Err(err) => return Err(err.into()),
    }
    finish_flow(&bot, &dialogue, &msg, &db).await
}

pub async fn delete_question_receive_name(
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
    db: Arc<Db>,
) -> HandlerResult {
    let Some(name) = text_field(&msg) else {
        bot.send_message(msg.chat.id, "⚠️ Введите название текстом")
            .await?;
        return Ok(());
    };
    let questions = db.get_questions().await?;
    match find_question(&questions, &name) {
        Some(question) => {
            db.delete_question(question.id).await?;
            bot.send_message(msg.chat.id, format!("✅ Вопрос '{name}' успешно удалён!"))
                .await?;
            notify::notify_admins(
                &bot,
                &db,
                &format!("⚠️ Вопрос \"{name}\" был удалён из базы данных."),
            )
            .await?;
        }
        None => {
            bot.send_message(msg.chat.id, format!("⚠️ Вопрос '{name}' не найден."))
                .await?;
        }
    }
    finish_flow(&bot, &dialogue, &msg, &db).await
}

async fn finish_flow(
    bot: &Bot,
    dialogue: &BotDialogue,
    msg: &Message,
    db: &Arc<Db>,
) -> HandlerResult {
    show_menu(bot, msg, db, "Выберите действие:").await?;
    dialogue.update(State::Menu).await?;
    Ok(())
}

fn numeric_id(msg: &Message) -> Option<i64> {
    msg.text().and_then(|t| t.trim().parse::<i64>().ok())
}

fn text_field(msg: &Message) -> Option<String> {
    msg.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn listing<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let names: Vec<&str> = names.collect();
    if names.is_empty() {
        return String::new();
    }
    let lines = names
        .iter()
        .map(|name| format!("• {name}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("\n📋 Уже существуют:\n{lines}")
}
