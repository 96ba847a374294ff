use teloxide::types::{KeyboardButton, KeyboardMarkup};

use crate::db::models::{AnswerTag, Subject, Theme};

pub const BTN_STUDY: &str = "📖 Изучить темы";
pub const BTN_TEST: &str = "✏️ Сдать тест";
pub const BTN_STATS: &str = "📊 Моя статистика";
pub const BTN_WEAK: &str = "🎯 Слабые места";
pub const BTN_RATING: &str = "⭐ Мой рейтинг";
pub const BTN_BACK: &str = "← Назад";
pub const BTN_FINISH: &str = "Завершить тест";
pub const BTN_SKIP_WEAK: &str = "Пропустить";

pub const BTN_ADD_ADMIN: &str = "👤 Добавить администратора";
pub const BTN_DEL_ADMIN: &str = "❌ Удалить администратора";
pub const BTN_ADD_SUBJECT: &str = "📚 Добавить предмет";
pub const BTN_DEL_SUBJECT: &str = "🗑️ Удалить предмет";
pub const BTN_ADD_THEME: &str = "📖 Добавить тему";
pub const BTN_DEL_THEME: &str = "🗑️ Удалить тему";
pub const BTN_ADD_QUESTION: &str = "❓ Добавить вопрос";
pub const BTN_DEL_QUESTION: &str = "🗑️ Удалить вопрос";

pub fn main_menu(is_admin: bool) -> KeyboardMarkup {
    let mut rows = vec![
        vec![KeyboardButton::new(BTN_STUDY), KeyboardButton::new(BTN_TEST)],
        vec![
            KeyboardButton::new(BTN_STATS),
            KeyboardButton::new(BTN_WEAK),
            KeyboardButton::new(BTN_RATING),
        ],
    ];
    if is_admin {
        rows.push(vec![
            KeyboardButton::new(BTN_ADD_ADMIN),
            KeyboardButton::new(BTN_DEL_ADMIN),
        ]);
        rows.push(vec![
            KeyboardButton::new(BTN_ADD_SUBJECT),
            KeyboardButton::new(BTN_DEL_SUBJECT),
        ]);
        rows.push(vec![
            KeyboardButton::new(BTN_ADD_THEME),
            KeyboardButton::new(BTN_DEL_THEME),
        ]);
        rows.push(vec![
            KeyboardButton::new(BTN_ADD_QUESTION),
            KeyboardButton::new(BTN_DEL_QUESTION),
        ]);
    }
    KeyboardMarkup::new(rows)
}

/// One subject per row, with a back button at the bottom.
pub fn subjects(subjects: &[Subject]) -> KeyboardMarkup {
    named_rows(subjects.iter().map(|s| s.name.as_str()))
}

pub fn themes(themes: &[Theme]) -> KeyboardMarkup {
    named_rows(themes.iter().map(|t| t.name.as_str()))
}

fn named_rows<'a>(names: impl Iterator<Item = &'a str>) -> KeyboardMarkup {
    let mut rows: Vec<Vec<KeyboardButton>> =
        names.map(|name| vec![KeyboardButton::new(name)]).collect();
    rows.push(vec![KeyboardButton::new(BTN_BACK)]);
    KeyboardMarkup::new(rows)
}

pub fn answers() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        AnswerTag::ALL
            .iter()
            .map(|tag| KeyboardButton::new(tag.label()))
            .collect(),
        vec![KeyboardButton::new(BTN_FINISH)],
    ])
}

pub fn weak_themes(names: &[String]) -> KeyboardMarkup {
    let mut rows: Vec<Vec<KeyboardButton>> = names
        .iter()
        .map(|name| vec![KeyboardButton::new(name.clone())])
        .collect();
    rows.push(vec![KeyboardButton::new(BTN_SKIP_WEAK)]);
    KeyboardMarkup::new(rows)
}
