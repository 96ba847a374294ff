pub mod models;

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::error::BotError;
use models::{parse_map_column, AnswerTag, NewQuestion, Question, Subject, Theme, User};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    tg_id INTEGER NOT NULL UNIQUE,
    name TEXT,
    total_mark INTEGER NOT NULL DEFAULT 0,
    marks_by_subject TEXT,
    errors_by_theme TEXT
);
CREATE TABLE IF NOT EXISTS admins (
    id INTEGER PRIMARY KEY,
    tg_id INTEGER NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS subjects (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS themes (
    id INTEGER PRIMARY KEY,
    subject_id INTEGER NOT NULL REFERENCES subjects(id),
    name TEXT NOT NULL,
    description TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS tests (
    id INTEGER PRIMARY KEY,
    theme_id INTEGER NOT NULL REFERENCES themes(id),
    subject_id INTEGER NOT NULL REFERENCES subjects(id),
    name TEXT NOT NULL,
    question TEXT NOT NULL,
    answer1 TEXT NOT NULL,
    answer2 TEXT NOT NULL,
    answer3 TEXT NOT NULL,
    answer4 TEXT NOT NULL,
    point INTEGER NOT NULL,
    correct_answer TEXT NOT NULL
);
";

/// Content store over a single SQLite connection.
///
/// The mutex serializes every operation, so a read-modify-write of one
/// user's marks or error map can never interleave with another write to
/// the same row.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BotError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, BotError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, BotError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // -- users --

    /// Creates the user row on first contact. Returns whether the user
    /// had already completed registration (has a name).
    pub async fn set_user(&self, tg_id: i64) -> Result<bool, BotError> {
        let conn = self.conn.lock().await;
        let name: Option<Option<String>> = conn
            .query_row("SELECT name FROM users WHERE tg_id = ?1", [tg_id], |row| {
                row.get(0)
            })
            .optional()?;
        match name {
            Some(name) => Ok(name.is_some()),
            None => {
                conn.execute("INSERT INTO users (tg_id) VALUES (?1)", [tg_id])?;
                Ok(false)
            }
        }
    }

    pub async fn get_user(&self, tg_id: i64) -> Result<Option<User>, BotError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT tg_id, name, total_mark, marks_by_subject, errors_by_theme
                 FROM users WHERE tg_id = ?1",
                [tg_id],
                user_columns,
            )
            .optional()?;
        row.map(user_from_columns).transpose()
    }

    pub async fn get_users(&self) -> Result<Vec<User>, BotError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT tg_id, name, total_mark, marks_by_subject, errors_by_theme FROM users",
        )?;
        let rows = stmt
            .query_map([], user_columns)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(user_from_columns).collect()
    }

    pub async fn update_user_name(&self, tg_id: i64, name: &str) -> Result<(), BotError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE users SET name = ?1 WHERE tg_id = ?2",
            params![name, tg_id],
        )?;
        Ok(())
    }

    /// Adds quiz points to one subject's mark and recomputes the total as
    /// the sum over all subjects. Returns the new total.
    pub async fn apply_subject_marks(
        &self,
        tg_id: i64,
        subject_id: i64,
        points: i64,
    ) -> Result<i64, BotError> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT marks_by_subject FROM users WHERE tg_id = ?1",
                [tg_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| BotError::Integrity(format!("user {tg_id} has no row")))?;
        let mut marks = parse_map_column(raw)?;
        *marks.entry(subject_id).or_insert(0) += points;
        let total: i64 = marks.values().sum();
        conn.execute(
            "UPDATE users SET total_mark = ?1, marks_by_subject = ?2 WHERE tg_id = ?3",
            params![total, serde_json::to_string(&marks)?, tg_id],
        )?;
        Ok(total)
    }

    /// Merge-adds per-theme error counts into the user's persisted map.
    /// Existing counts are never decreased or reset.
    pub async fn merge_theme_errors(
        &self,
        tg_id: i64,
        new_errors: &[(i64, i64)],
    ) -> Result<(), BotError> {
        if new_errors.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT errors_by_theme FROM users WHERE tg_id = ?1",
                [tg_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| BotError::Integrity(format!("user {tg_id} has no row")))?;
        let mut errors = parse_map_column(raw)?;
        for &(theme_id, count) in new_errors {
            *errors.entry(theme_id).or_insert(0) += count;
        }
        conn.execute(
            "UPDATE users SET errors_by_theme = ?1 WHERE tg_id = ?2",
            params![serde_json::to_string(&errors)?, tg_id],
        )?;
        Ok(())
    }

    // -- admins --

    pub async fn get_admins(&self) -> Result<Vec<i64>, BotError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT tg_id FROM admins")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    pub async fn is_admin(&self, tg_id: i64) -> Result<bool, BotError> {
        let conn = self.conn.lock().await;
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM admins WHERE tg_id = ?1", [tg_id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    pub async fn add_admin(&self, tg_id: i64) -> Result<(), BotError> {
        let conn = self.conn.lock().await;
        conn.execute("INSERT OR IGNORE INTO admins (tg_id) VALUES (?1)", [tg_id])?;
        Ok(())
    }

    pub async fn delete_admin(&self, tg_id: i64) -> Result<(), BotError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM admins WHERE tg_id = ?1", [tg_id])?;
        Ok(())
    }

    // -- subjects --

    pub async fn get_subjects(&self) -> Result<Vec<Subject>, BotError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id, name FROM subjects ORDER BY id")?;
        let subjects = stmt
            .query_map([], |row| {
                Ok(Subject {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(subjects)
    }

    pub async fn get_subject(&self, id: i64) -> Result<Option<Subject>, BotError> {
        let conn = self.conn.lock().await;
        let subject = conn
            .query_row("SELECT id, name FROM subjects WHERE id = ?1", [id], |row| {
                Ok(Subject {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .optional()?;
        Ok(subject)
    }

    pub async fn add_subject(&self, name: &str) -> Result<i64, BotError> {
        let conn = self.conn.lock().await;
        conn.execute("INSERT INTO subjects (name) VALUES (?1)", [name])?;
        Ok(conn.last_insert_rowid())
    }

    /// Removes the subject together with its themes and their questions.
    pub async fn delete_subject(&self, id: i64) -> Result<(), BotError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM tests WHERE subject_id = ?1", [id])?;
        tx.execute("DELETE FROM themes WHERE subject_id = ?1", [id])?;
        tx.execute("DELETE FROM subjects WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(())
    }

    // -- themes --

    pub async fn get_themes(&self) -> Result<Vec<Theme>, BotError> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT id, subject_id, name, description FROM themes ORDER BY id")?;
        let themes = stmt
            .query_map([], theme_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(themes)
    }

    pub async fn get_themes_by_subject(&self, subject_id: i64) -> Result<Vec<Theme>, BotError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, subject_id, name, description FROM themes
             WHERE subject_id = ?1 ORDER BY id",
        )?;
        let themes = stmt
            .query_map([subject_id], theme_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(themes)
    }

    pub async fn get_theme(&self, id: i64) -> Result<Option<Theme>, BotError> {
        let conn = self.conn.lock().await;
        let theme = conn
            .query_row(
                "SELECT id, subject_id, name, description FROM themes WHERE id = ?1",
                [id],
                theme_from_row,
            )
            .optional()?;
        Ok(theme)
    }

    /// Rejects a theme whose subject does not exist.
    pub async fn add_theme(
        &self,
        subject_id: i64,
        name: &str,
        description: &str,
    ) -> Result<i64, BotError> {
        let conn = self.conn.lock().await;
        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM subjects WHERE id = ?1", [subject_id], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(BotError::Validation(format!(
                "subject {subject_id} does not exist"
            )));
        }
        conn.execute(
            "INSERT INTO themes (subject_id, name, description) VALUES (?1, ?2, ?3)",
            params![subject_id, name, description],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Removes the theme together with its questions.
    pub async fn delete_theme(&self, id: i64) -> Result<(), BotError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM tests WHERE theme_id = ?1", [id])?;
        tx.execute("DELETE FROM themes WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(())
    }

    // -- questions --

    pub async fn get_questions(&self) -> Result<Vec<Question>, BotError> {
        self.query_questions("SELECT * FROM tests ORDER BY id", None)
            .await
    }

    pub async fn get_questions_by_subject(
        &self,
        subject_id: i64,
    ) -> Result<Vec<Question>, BotError> {
        self.query_questions(
            "SELECT * FROM tests WHERE subject_id = ?1 ORDER BY id",
            Some(subject_id),
        )
        .await
    }

    pub async fn get_questions_by_theme(&self, theme_id: i64) -> Result<Vec<Question>, BotError> {
        self.query_questions(
            "SELECT * FROM tests WHERE theme_id = ?1 ORDER BY id",
            Some(theme_id),
        )
        .await
    }

    async fn query_questions(
        &self,
        sql: &str,
        filter: Option<i64>,
    ) -> Result<Vec<Question>, BotError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(sql)?;
        let questions = match filter {
            Some(id) => stmt
                .query_map([id], question_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map([], question_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(questions)
    }

    /// Rejects a question whose theme does not exist or whose theme
    /// belongs to a different subject than the one chosen mid-flow.
    pub async fn add_question(&self, new: &NewQuestion) -> Result<i64, BotError> {
        let conn = self.conn.lock().await;
        let theme_subject: Option<i64> = conn
            .query_row(
                "SELECT subject_id FROM themes WHERE id = ?1",
                [new.theme_id],
                |row| row.get(0),
            )
            .optional()?;
        match theme_subject {
            None => {
                return Err(BotError::Validation(format!(
                    "theme {} does not exist",
                    new.theme_id
                )))
            }
            Some(subject_id) if subject_id != new.subject_id => {
                return Err(BotError::Validation(format!(
                    "theme {} belongs to subject {subject_id}, not {}",
                    new.theme_id, new.subject_id
                )))
            }
            Some(_) => {}
        }
        conn.execute(
            "INSERT INTO tests
             (theme_id, subject_id, name, question, answer1, answer2, answer3, answer4, point, correct_answer)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                new.theme_id,
                new.subject_id,
                new.name,
                new.question,
                new.answers[0],
                new.answers[1],
                new.answers[2],
                new.answers[3],
                new.point,
                new.correct_answer.label(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn delete_question(&self, id: i64) -> Result<(), BotError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM tests WHERE id = ?1", [id])?;
        Ok(())
    }
}

type UserColumns = (i64, Option<String>, i64, Option<String>, Option<String>);

fn user_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn user_from_columns(
    (tg_id, name, total_mark, marks, errors): UserColumns,
) -> Result<User, BotError> {
    Ok(User {
        tg_id,
        name,
        total_mark,
        marks_by_subject: parse_map_column(marks)?,
        errors_by_theme: parse_map_column(errors)?,
    })
}

fn theme_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Theme> {
    Ok(Theme {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
    })
}

fn question_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Question> {
    let raw_tag: String = row.get(10)?;
    let correct_answer = AnswerTag::parse(&raw_tag).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            rusqlite::types::Type::Text,
            format!("unknown correct-answer tag {raw_tag:?}").into(),
        )
    })?;
    Ok(Question {
        id: row.get(0)?,
        theme_id: row.get(1)?,
        subject_id: row.get(2)?,
        name: row.get(3)?,
        question: row.get(4)?,
        answers: [row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?],
        point: row.get(9)?,
        correct_answer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotError;

    async fn seeded() -> (Db, i64, i64) {
        let db = Db::open_in_memory().unwrap();
        let subject_id = db.add_subject("Математика").await.unwrap();
        let theme_id = db
            .add_theme(subject_id, "Алгебра", "Основы алгебры")
            .await
            .unwrap();
        (db, subject_id, theme_id)
    }

    fn question(theme_id: i64, subject_id: i64, name: &str) -> NewQuestion {
        NewQuestion {
            theme_id,
            subject_id,
            name: name.into(),
            question: "2 + 2 = ?".into(),
            answers: ["3".into(), "4".into(), "5".into(), "6".into()],
            point: 5,
            correct_answer: AnswerTag::B,
        }
    }

    #[tokio::test]
    async fn user_registration_lifecycle() {
        let db = Db::open_in_memory().unwrap();
        assert!(!db.set_user(42).await.unwrap());
        // row exists but the name is still missing
        assert!(!db.set_user(42).await.unwrap());
        db.update_user_name(42, "Иван").await.unwrap();
        assert!(db.set_user(42).await.unwrap());
        let user = db.get_user(42).await.unwrap().unwrap();
        assert_eq!(user.name.as_deref(), Some("Иван"));
        assert_eq!(user.total_mark, 0);
    }

    #[tokio::test]
    async fn theme_requires_existing_subject() {
        let db = Db::open_in_memory().unwrap();
        let err = db.add_theme(99, "Алгебра", "...").await.unwrap_err();
        assert!(matches!(err, BotError::Validation(_)));
    }

    #[tokio::test]
    async fn question_rejects_theme_subject_mismatch() {
        let (db, subject_id, theme_id) = seeded().await;
        let other_subject = db.add_subject("Химия").await.unwrap();

        // theme belongs to "Математика", not "Химия"
        let err = db
            .add_question(&question(theme_id, other_subject, "В1"))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Validation(_)));

        let err = db
            .add_question(&question(500, subject_id, "В2"))
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Validation(_)));

        assert!(db.get_questions().await.unwrap().is_empty());
        db.add_question(&question(theme_id, subject_id, "В3"))
            .await
            .unwrap();
        assert_eq!(db.get_questions_by_theme(theme_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_subject_removes_its_themes_and_questions() {
        let (db, subject_id, theme_id) = seeded().await;
        db.add_question(&question(theme_id, subject_id, "В1"))
            .await
            .unwrap();
        let other = db.add_subject("Химия").await.unwrap();
        let other_theme = db.add_theme(other, "Кислоты", "...").await.unwrap();
        db.add_question(&question(other_theme, other, "В2"))
            .await
            .unwrap();

        db.delete_subject(subject_id).await.unwrap();
        assert!(db.get_subject(subject_id).await.unwrap().is_none());
        assert!(db
            .get_themes_by_subject(subject_id)
            .await
            .unwrap()
            .is_empty());
        assert!(db
            .get_questions_by_subject(subject_id)
            .await
            .unwrap()
            .is_empty());
        // the other subject's catalogue is untouched
        assert_eq!(db.get_themes_by_subject(other).await.unwrap().len(), 1);
        assert_eq!(db.get_questions_by_theme(other_theme).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_theme_removes_its_questions() {
        let (db, subject_id, theme_id) = seeded().await;
        db.add_question(&question(theme_id, subject_id, "В1"))
            .await
            .unwrap();

        db.delete_theme(theme_id).await.unwrap();
        assert!(db.get_theme(theme_id).await.unwrap().is_none());
        assert!(db.get_questions_by_theme(theme_id).await.unwrap().is_empty());
        assert!(db.get_subject(subject_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn marks_accumulate_and_total_is_sum() {
        let db = Db::open_in_memory().unwrap();
        db.set_user(7).await.unwrap();
        assert_eq!(db.apply_subject_marks(7, 1, 20).await.unwrap(), 20);
        assert_eq!(db.apply_subject_marks(7, 2, 50).await.unwrap(), 70);
        assert_eq!(db.apply_subject_marks(7, 1, 10).await.unwrap(), 80);
        let user = db.get_user(7).await.unwrap().unwrap();
        assert_eq!(user.total_mark, 80);
        assert_eq!(user.marks_by_subject.get(&1), Some(&30));
        assert_eq!(user.marks_by_subject.get(&2), Some(&50));
        assert_eq!(
            user.total_mark,
            user.marks_by_subject.values().sum::<i64>()
        );
    }

    #[tokio::test]
    async fn theme_errors_merge_add_only() {
        let db = Db::open_in_memory().unwrap();
        db.set_user(7).await.unwrap();
        db.merge_theme_errors(7, &[(1, 2), (3, 1)]).await.unwrap();
        db.merge_theme_errors(7, &[(1, 1)]).await.unwrap();
        db.merge_theme_errors(7, &[]).await.unwrap();
        let user = db.get_user(7).await.unwrap().unwrap();
        assert_eq!(user.errors_by_theme.get(&1), Some(&3));
        assert_eq!(user.errors_by_theme.get(&3), Some(&1));
    }

    #[tokio::test]
    async fn admin_membership() {
        let db = Db::open_in_memory().unwrap();
        assert!(!db.is_admin(1).await.unwrap());
        db.add_admin(1).await.unwrap();
        db.add_admin(1).await.unwrap();
        assert!(db.is_admin(1).await.unwrap());
        assert_eq!(db.get_admins().await.unwrap(), vec![1]);
        db.delete_admin(1).await.unwrap();
        assert!(!db.is_admin(1).await.unwrap());
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quiz.db");
        {
            let db = Db::open(&path).unwrap();
            let subject_id = db.add_subject("Физика").await.unwrap();
            db.add_theme(subject_id, "Оптика", "Свет").await.unwrap();
        }
        let db = Db::open(&path).unwrap();
        let subjects = db.get_subjects().await.unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].name, "Физика");
        assert_eq!(
            db.get_themes_by_subject(subjects[0].id).await.unwrap().len(),
            1
        );
    }
}
