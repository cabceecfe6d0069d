// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite pool wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (account, Google Calendar and Plaid links)
//! - Syllabi (parsed course records, owned by one user)
//!
//! Every syllabus query is scoped by the owning user id.

use crate::db::tables;
use crate::error::AppError;
use crate::models::{GradingCategory, KeyDate, NewSyllabus, Syllabus, User};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::SqliteConnection;
use std::str::FromStr;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL,
        google_access_token TEXT,
        google_refresh_token TEXT,
        google_token_expiry TEXT,
        selected_calendar_id TEXT DEFAULT 'primary',
        plaid_access_token TEXT,
        plaid_item_id TEXT,
        plaid_institution TEXT
    )",
    "CREATE TABLE IF NOT EXISTS syllabi (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        course_id TEXT NOT NULL,
        course_name TEXT NOT NULL,
        instructor TEXT,
        semester TEXT,
        key_dates TEXT NOT NULL DEFAULT '[]',
        topics TEXT NOT NULL DEFAULT '[]',
        grading_breakdown TEXT NOT NULL DEFAULT '[]',
        vector_ids TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_syllabi_user_id ON syllabi(user_id)",
];

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at, \
     google_access_token, google_refresh_token, google_token_expiry, selected_calendar_id, \
     plaid_access_token, plaid_item_id, plaid_institution";

const SYLLABUS_COLUMNS: &str = "id, user_id, course_id, course_name, instructor, semester, \
     key_dates, topics, grading_breakdown, vector_ids, created_at, updated_at";

/// Raw syllabus row with JSON columns still wrapped.
#[derive(sqlx::FromRow)]
struct SyllabusRow {
    id: i64,
    user_id: i64,
    course_id: String,
    course_name: String,
    instructor: Option<String>,
    semester: Option<String>,
    key_dates: Json<Vec<KeyDate>>,
    topics: Json<Vec<String>>,
    grading_breakdown: Json<Vec<GradingCategory>>,
    vector_ids: Json<Vec<String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SyllabusRow> for Syllabus {
    fn from(row: SyllabusRow) -> Self {
        Syllabus {
            id: row.id,
            user_id: row.user_id,
            course_id: row.course_id,
            course_name: row.course_name,
            instructor: row.instructor,
            semester: row.semester,
            key_dates: row.key_dates.0,
            topics: row.topics.0,
            grading_breakdown: row.grading_breakdown.0,
            vector_ids: row.vector_ids.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// SQLite database handle.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at `url`.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::Database(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to open database: {}", e)))?;

        tracing::info!(url, "Connected to SQLite");
        Ok(Self { pool })
    }

    /// Private in-memory database for tests.
    ///
    /// Uses a single connection that is never recycled; each new connection
    /// to `sqlite::memory:` would see an empty database.
    pub async fn new_in_memory() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::Database(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Create tables and indices if they do not exist.
    pub async fn migrate(&self) -> Result<(), AppError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!("Database schema ready");
        Ok(())
    }

    /// Liveness check.
    pub async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Create a user. Duplicate username or email is a conflict.
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await?;

        let username_taken: Option<i64> =
            sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&mut *tx)
                .await?;
        if username_taken.is_some() {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }

        let email_taken: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&mut *tx)
            .await?;
        if email_taken.is_some() {
            return Err(AppError::Conflict("Email already exists".to_string()));
        }

        let query = format!(
            "INSERT INTO {} (username, email, password_hash, created_at) \
             VALUES (?, ?, ?, ?) RETURNING {}",
            tables::USERS,
            USER_COLUMNS
        );
        let user: User = sqlx::query_as(&query)
            .bind(username)
            .bind(email)
            .bind(password_hash)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(user_id = user.id, "Created user");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>, AppError> {
        let query = format!("SELECT {} FROM {} WHERE id = ?", USER_COLUMNS, tables::USERS);
        Ok(sqlx::query_as(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Look up by username, falling back to email.
    pub async fn find_user_by_login(&self, login: &str) -> Result<Option<User>, AppError> {
        let query = format!(
            "SELECT {} FROM {} WHERE username = ? OR email = ? \
             ORDER BY (username = ?) DESC LIMIT 1",
            USER_COLUMNS,
            tables::USERS
        );
        Ok(sqlx::query_as(&query)
            .bind(login)
            .bind(login)
            .bind(login)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Delete a user and all their syllabi in one transaction.
    ///
    /// Returns false if the user did not exist.
    pub async fn delete_user(&self, user_id: i64) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let syllabi = sqlx::query("DELETE FROM syllabi WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let users = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        tracing::info!(user_id, syllabi, "Deleted user data");
        Ok(users > 0)
    }

    /// Store Google tokens after the OAuth exchange.
    ///
    /// An existing refresh token is kept when Google does not send a new one.
    pub async fn set_google_tokens(
        &self,
        user_id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET google_access_token = ?, \
             google_refresh_token = COALESCE(?, google_refresh_token), \
             google_token_expiry = ? WHERE id = ?",
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expiry)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a refreshed access token.
    pub async fn update_google_access_token(
        &self,
        user_id: i64,
        access_token: &str,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET google_access_token = ?, google_token_expiry = ? WHERE id = ?")
            .bind(access_token)
            .bind(expiry)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Forget Google credentials and reset the calendar selection.
    pub async fn clear_google_tokens(&self, user_id: i64) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET google_access_token = NULL, google_refresh_token = NULL, \
             google_token_expiry = NULL, selected_calendar_id = 'primary' WHERE id = ?",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_selected_calendar(
        &self,
        user_id: i64,
        calendar_id: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET selected_calendar_id = ? WHERE id = ?")
            .bind(calendar_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_plaid_link(
        &self,
        user_id: i64,
        access_token: &str,
        item_id: &str,
        institution: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET plaid_access_token = ?, plaid_item_id = ?, plaid_institution = ? \
             WHERE id = ?",
        )
        .bind(access_token)
        .bind(item_id)
        .bind(institution)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ─── Syllabus Operations ─────────────────────────────────────

    pub async fn insert_syllabus(
        &self,
        user_id: i64,
        syllabus: &NewSyllabus,
    ) -> Result<Syllabus, AppError> {
        let mut conn = self.pool.acquire().await?;
        insert_syllabus_on(&mut conn, user_id, syllabus).await
    }

    /// Insert several syllabi atomically. Either all rows land or none do.
    pub async fn insert_syllabi(
        &self,
        user_id: i64,
        syllabi: &[NewSyllabus],
    ) -> Result<Vec<Syllabus>, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut saved = Vec::with_capacity(syllabi.len());
        for syllabus in syllabi {
            saved.push(insert_syllabus_on(&mut tx, user_id, syllabus).await?);
        }
        tx.commit().await?;
        Ok(saved)
    }

    /// All syllabi owned by the user, oldest first.
    pub async fn list_syllabi(&self, user_id: i64) -> Result<Vec<Syllabus>, AppError> {
        let query = format!(
            "SELECT {} FROM {} WHERE user_id = ? ORDER BY created_at ASC, id ASC",
            SYLLABUS_COLUMNS,
            tables::SYLLABI
        );
        let rows: Vec<SyllabusRow> = sqlx::query_as(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Syllabus::from).collect())
    }

    pub async fn get_syllabus(
        &self,
        user_id: i64,
        syllabus_id: i64,
    ) -> Result<Option<Syllabus>, AppError> {
        let query = format!(
            "SELECT {} FROM {} WHERE id = ? AND user_id = ?",
            SYLLABUS_COLUMNS,
            tables::SYLLABI
        );
        let row: Option<SyllabusRow> = sqlx::query_as(&query)
            .bind(syllabus_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Syllabus::from))
    }

    /// Delete a syllabus the user owns, returning the removed row.
    pub async fn delete_syllabus(
        &self,
        user_id: i64,
        syllabus_id: i64,
    ) -> Result<Option<Syllabus>, AppError> {
        let query = format!(
            "DELETE FROM {} WHERE id = ? AND user_id = ? RETURNING {}",
            tables::SYLLABI,
            SYLLABUS_COLUMNS
        );
        let row: Option<SyllabusRow> = sqlx::query_as(&query)
            .bind(syllabus_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Syllabus::from))
    }

    /// Replace the grading breakdown and bump `updated_at`.
    pub async fn update_grading(
        &self,
        user_id: i64,
        syllabus_id: i64,
        breakdown: &[GradingCategory],
    ) -> Result<Option<Syllabus>, AppError> {
        let query = format!(
            "UPDATE {} SET grading_breakdown = ?, updated_at = ? \
             WHERE id = ? AND user_id = ? RETURNING {}",
            tables::SYLLABI,
            SYLLABUS_COLUMNS
        );
        let row: Option<SyllabusRow> = sqlx::query_as(&query)
            .bind(Json(breakdown))
            .bind(Utc::now())
            .bind(syllabus_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Syllabus::from))
    }
}

async fn insert_syllabus_on(
    conn: &mut SqliteConnection,
    user_id: i64,
    syllabus: &NewSyllabus,
) -> Result<Syllabus, AppError> {
    let now = Utc::now();
    let query = format!(
        "INSERT INTO {} (user_id, course_id, course_name, instructor, semester, \
         key_dates, topics, grading_breakdown, vector_ids, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
        tables::SYLLABI,
        SYLLABUS_COLUMNS
    );
    let row: SyllabusRow = sqlx::query_as(&query)
        .bind(user_id)
        .bind(&syllabus.course_id)
        .bind(&syllabus.course_name)
        .bind(&syllabus.instructor)
        .bind(&syllabus.semester)
        .bind(Json(&syllabus.key_dates))
        .bind(Json(&syllabus.topics))
        .bind(Json(&syllabus.grading_breakdown))
        .bind(Json(&syllabus.vector_ids))
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

    tracing::debug!(user_id, syllabus_id = row.id, course_id = %row.course_id, "Inserted syllabus");
    Ok(row.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(course: &str) -> NewSyllabus {
        NewSyllabus {
            course_id: crate::models::syllabus::course_id_for(course),
            course_name: course.to_string(),
            key_dates: vec![KeyDate {
                date: "2025-10-01".to_string(),
                event: "Midterm".to_string(),
                kind: "exam".to_string(),
                note: None,
            }],
            topics: vec!["Recursion".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_user_conflicts() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_user("alice", "alice@example.com", "hash").await.unwrap();

        let err = db
            .create_user("alice", "other@example.com", "hash")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = db
            .create_user("bob", "alice@example.com", "hash")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_find_user_by_login() {
        let db = Database::new_in_memory().await.unwrap();
        let user = db.create_user("alice", "alice@example.com", "hash").await.unwrap();

        let by_name = db.find_user_by_login("alice").await.unwrap().unwrap();
        let by_email = db.find_user_by_login("alice@example.com").await.unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
        assert_eq!(by_email.id, user.id);
        assert!(db.find_user_by_login("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_syllabus_roundtrip_and_scoping() {
        let db = Database::new_in_memory().await.unwrap();
        let alice = db.create_user("alice", "a@example.com", "h").await.unwrap();
        let bob = db.create_user("bob", "b@example.com", "h").await.unwrap();

        let saved = db.insert_syllabus(alice.id, &sample("CSCE 120")).await.unwrap();
        assert_eq!(saved.course_id, "csce_120");
        assert_eq!(saved.key_dates.len(), 1);

        assert!(db.get_syllabus(bob.id, saved.id).await.unwrap().is_none());
        assert!(db.delete_syllabus(bob.id, saved.id).await.unwrap().is_none());
        assert_eq!(db.list_syllabi(alice.id).await.unwrap().len(), 1);

        let deleted = db.delete_syllabus(alice.id, saved.id).await.unwrap().unwrap();
        assert_eq!(deleted.id, saved.id);
        assert!(db.list_syllabi(alice.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_google_tokens_keep_refresh_token() {
        let db = Database::new_in_memory().await.unwrap();
        let user = db.create_user("alice", "a@example.com", "h").await.unwrap();

        db.set_google_tokens(user.id, "access1", Some("refresh1"), None)
            .await
            .unwrap();
        db.set_google_tokens(user.id, "access2", None, None).await.unwrap();

        let user = db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.google_access_token.as_deref(), Some("access2"));
        assert_eq!(user.google_refresh_token.as_deref(), Some("refresh1"));

        db.set_selected_calendar(user.id, "work").await.unwrap();
        db.clear_google_tokens(user.id).await.unwrap();
        let user = db.get_user(user.id).await.unwrap().unwrap();
        assert!(user.google_access_token.is_none());
        assert_eq!(user.calendar_id(), "primary");
    }
}
