//! Best-effort fan-out after content mutations. A recipient that blocked
//! the bot or deleted their account must never abort the admin's flow, so
//! per-recipient send failures are logged and swallowed.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::db::Db;
use crate::state::HandlerResult;

pub async fn broadcast_users(bot: &Bot, db: &Arc<Db>, text: &str) -> HandlerResult {
    for user in db.get_users().await? {
        if let Err(err) = bot
            .send_message(ChatId(user.tg_id), text)
            .parse_mode(ParseMode::Html)
            .await
        {
            log::warn!("broadcast to user {} failed: {}", user.tg_id, err);
        }
    }
    Ok(())
}

pub async fn notify_admins(bot: &Bot, db: &Arc<Db>, text: &str) -> HandlerResult {
    for tg_id in db.get_admins().await? {
        if let Err(err) = bot.send_message(ChatId(tg_id), text).await {
            log::warn!("notification to admin {} failed: {}", tg_id, err);
        }
    }
    Ok(())
}
