// src/database.rs
//! Repositories over the interview tables

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::info;

use crate::types::{
    ChatMessage, InterviewSession, InterviewStyle, Language, NewInterviewSession,
    SessionStatus, User, UserAssessment,
};

const USER_COLUMNS: &str =
    "id, email, password_hash, full_name, created_at, updated_at, is_active";

const SESSION_COLUMNS: &str = "id, user_id, mode, position, industry, style, language, \
     uploaded_files_info, custom_questions, status, evaluation, created_at, started_at, completed_at";

/// Whether a repository error came from a UNIQUE constraint
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::Database(db_err)) if db_err.is_unique_violation()
    )
}

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    pub async fn create(&self, email: &str, password_hash: &str, full_name: &str) -> Result<User> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, full_name, created_at, updated_at, is_active)
            VALUES (?, ?, ?, ?, ?, TRUE)
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(full_name)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        info!("Created user: {}", email);

        Ok(User {
            id: result.last_insert_rowid(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            full_name: full_name.to_string(),
            created_at: now,
            updated_at: now,
            is_active: true,
        })
    }

    pub async fn list_all(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY email ASC",
            USER_COLUMNS
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(users)
    }

    /// Activate or deactivate an account
    pub async fn set_active(&self, email: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE email = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(email)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Session row joined with its owner, for listings
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SessionOverview {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub position: Option<String>,
    pub industry: Option<String>,
    pub style: InterviewStyle,
    pub language: Language,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

pub struct SessionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SessionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new_session: &NewInterviewSession) -> Result<InterviewSession> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO interview_sessions
                (user_id, mode, position, industry, style, language,
                 uploaded_files_info, custom_questions, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_session.user_id)
        .bind(new_session.mode)
        .bind(&new_session.position)
        .bind(&new_session.industry)
        .bind(new_session.style)
        .bind(new_session.language)
        .bind(&new_session.uploaded_files_info)
        .bind(&new_session.custom_questions)
        .bind(SessionStatus::Pending)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(InterviewSession {
            id: result.last_insert_rowid(),
            user_id: new_session.user_id,
            mode: new_session.mode,
            position: new_session.position.clone(),
            industry: new_session.industry.clone(),
            style: new_session.style,
            language: new_session.language,
            uploaded_files_info: new_session.uploaded_files_info.clone(),
            custom_questions: new_session.custom_questions.clone(),
            status: SessionStatus::Pending,
            evaluation: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        })
    }

    pub async fn find(&self, id: i64) -> Result<Option<InterviewSession>> {
        let session = sqlx::query_as::<_, InterviewSession>(&format!(
            "SELECT {} FROM interview_sessions WHERE id = ?",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(session)
    }

    /// Find a session only if it belongs to the given user
    pub async fn find_for_user(&self, id: i64, user_id: i64) -> Result<Option<InterviewSession>> {
        let session = sqlx::query_as::<_, InterviewSession>(&format!(
            "SELECT {} FROM interview_sessions WHERE id = ? AND user_id = ?",
            SESSION_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(session)
    }

    /// All sessions of a user, newest first
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<InterviewSession>> {
        let sessions = sqlx::query_as::<_, InterviewSession>(&format!(
            "SELECT {} FROM interview_sessions WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(sessions)
    }

    pub async fn list_evaluated_for_user(&self, user_id: i64) -> Result<Vec<InterviewSession>> {
        let sessions = sqlx::query_as::<_, InterviewSession>(&format!(
            "SELECT {} FROM interview_sessions \
             WHERE user_id = ? AND evaluation IS NOT NULL \
             ORDER BY created_at DESC, id DESC",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(sessions)
    }

    /// Move a pending session to in_progress. Returns false when it was not pending.
    pub async fn mark_started(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE interview_sessions SET status = ?, started_at = ? WHERE id = ? AND status = ?",
        )
        .bind(SessionStatus::InProgress)
        .bind(Utc::now())
        .bind(id)
        .bind(SessionStatus::Pending)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_completed(&self, id: i64) -> Result<InterviewSession> {
        sqlx::query("UPDATE interview_sessions SET status = ?, completed_at = ? WHERE id = ?")
            .bind(SessionStatus::Completed)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await?;

        self.find(id)
            .await?
            .with_context(|| format!("Session {} disappeared while completing", id))
    }

    pub async fn save_evaluation(&self, id: i64, evaluation: &str) -> Result<()> {
        sqlx::query("UPDATE interview_sessions SET evaluation = ? WHERE id = ?")
            .bind(evaluation)
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Every session with its owner, newest first, optionally for one email
    pub async fn list_overviews(&self, email: Option<&str>) -> Result<Vec<SessionOverview>> {
        let overviews = sqlx::query_as::<_, SessionOverview>(
            r#"
            SELECT s.id, u.email, u.full_name, s.position, s.industry, s.style,
                   s.language, s.status, s.created_at
            FROM interview_sessions s
            JOIN users u ON u.id = s.user_id
            WHERE (?1 IS NULL OR u.email = ?1)
            ORDER BY s.created_at DESC, s.id DESC
            "#,
        )
        .bind(email)
        .fetch_all(self.pool)
        .await?;

        Ok(overviews)
    }
}

pub struct ConversationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ConversationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn load(&self, session_id: i64) -> Result<Option<Vec<ChatMessage>>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT messages_json FROM conversations WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(self.pool)
                .await?;

        row.map(|(json,)| {
            serde_json::from_str(&json).with_context(|| {
                format!("Corrupt conversation blob for session {}", session_id)
            })
        })
        .transpose()
    }

    /// Replace the stored conversation of a session, creating the row if needed
    pub async fn upsert(&self, session_id: i64, messages: &[ChatMessage]) -> Result<()> {
        let json = serde_json::to_string(messages).context("Failed to serialize conversation")?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO conversations (session_id, messages_json, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                messages_json = excluded.messages_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(session_id)
        .bind(json)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Conversations of all sessions owned by a user, keyed by session id
    pub async fn load_for_user(&self, user_id: i64) -> Result<HashMap<i64, Vec<ChatMessage>>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT c.session_id, c.messages_json
            FROM conversations c
            JOIN interview_sessions s ON s.id = c.session_id
            WHERE s.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|(session_id, json)| {
                let messages = serde_json::from_str(&json).with_context(|| {
                    format!("Corrupt conversation blob for session {}", session_id)
                })?;
                Ok((session_id, messages))
            })
            .collect()
    }
}

pub struct AssessmentRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AssessmentRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_user(&self, user_id: i64) -> Result<Option<UserAssessment>> {
        let assessment = sqlx::query_as::<_, UserAssessment>(
            r#"
            SELECT id, user_id, assessment_content, created_at, updated_at
            FROM user_assessments
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(assessment)
    }

    /// Store the single assessment of a user, replacing any previous one
    pub async fn upsert(&self, user_id: i64, content: &str) -> Result<UserAssessment> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO user_assessments (user_id, assessment_content, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                assessment_content = excluded.assessment_content,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(content)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        self.find_by_user(user_id)
            .await?
            .context("Assessment missing right after upsert")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Database;
    use crate::types::{InterviewMode, InterviewStyle, Language, Role};

    async fn setup() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("test.db")).await.unwrap();
        (dir, db)
    }

    fn standard_session(user_id: i64) -> NewInterviewSession {
        NewInterviewSession {
            user_id,
            mode: InterviewMode::Standard,
            position: Some("Junior".to_string()),
            industry: Some("IT".to_string()),
            style: InterviewStyle::Friendly,
            language: Language::Vi,
            uploaded_files_info: None,
            custom_questions: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_a_unique_violation() {
        let (_dir, db) = setup().await;
        let users = UserRepository::new(db.pool());
        users.create("dup@example.com", "hash", "Dup").await.unwrap();

        let err = users.create("dup@example.com", "hash", "Dup").await.unwrap_err();
        assert!(is_unique_violation(&err));

        let other = anyhow::anyhow!("connection reset");
        assert!(!is_unique_violation(&other));
    }

    #[tokio::test]
    async fn test_session_lifecycle_round_trips_typed_columns() {
        let (_dir, db) = setup().await;
        let user = UserRepository::new(db.pool())
            .create("lan@example.com", "hash", "Lan")
            .await
            .unwrap();

        let sessions = SessionRepository::new(db.pool());
        let created = sessions.create(&standard_session(user.id)).await.unwrap();

        let loaded = sessions.find_for_user(created.id, user.id).await.unwrap().unwrap();
        assert_eq!(loaded.style, InterviewStyle::Friendly);
        assert_eq!(loaded.status, SessionStatus::Pending);
        assert!(sessions.find_for_user(created.id, user.id + 1).await.unwrap().is_none());

        assert!(sessions.mark_started(created.id).await.unwrap());
        assert!(!sessions.mark_started(created.id).await.unwrap());

        let completed = sessions.mark_completed(created.id).await.unwrap();
        assert_eq!(completed.status, SessionStatus::Completed);
        assert!(completed.started_at.is_some());
        assert!(completed.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_conversation_upsert_keeps_single_row() {
        let (_dir, db) = setup().await;
        let user = UserRepository::new(db.pool())
            .create("minh@example.com", "hash", "Minh")
            .await
            .unwrap();
        let session = SessionRepository::new(db.pool())
            .create(&standard_session(user.id))
            .await
            .unwrap();

        let conversations = ConversationRepository::new(db.pool());
        assert!(conversations.load(session.id).await.unwrap().is_none());

        conversations
            .upsert(session.id, &[ChatMessage::user("Hello")])
            .await
            .unwrap();
        conversations
            .upsert(
                session.id,
                &[ChatMessage::user("Hello"), ChatMessage::assistant("Hi there")],
            )
            .await
            .unwrap();

        let stored = conversations.load(session.id).await.unwrap().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].role, Role::Assistant);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        let by_user = conversations.load_for_user(user.id).await.unwrap();
        assert_eq!(by_user.get(&session.id).map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_assessment_upsert_replaces_content() {
        let (_dir, db) = setup().await;
        let user = UserRepository::new(db.pool())
            .create("hoa@example.com", "hash", "Hoa")
            .await
            .unwrap();

        let assessments = AssessmentRepository::new(db.pool());
        assert!(assessments.find_by_user(user.id).await.unwrap().is_none());

        let first = assessments.upsert(user.id, "first").await.unwrap();
        let second = assessments.upsert(user.id, "second").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.assessment_content, "second");
    }

    #[tokio::test]
    async fn test_overviews_filter_by_email() {
        let (_dir, db) = setup().await;
        let users = UserRepository::new(db.pool());
        let a = users.create("a@example.com", "hash", "A").await.unwrap();
        let b = users.create("b@example.com", "hash", "B").await.unwrap();

        let sessions = SessionRepository::new(db.pool());
        sessions.create(&standard_session(a.id)).await.unwrap();
        sessions.create(&standard_session(b.id)).await.unwrap();
        sessions.create(&standard_session(b.id)).await.unwrap();

        assert_eq!(sessions.list_overviews(None).await.unwrap().len(), 3);
        let only_b = sessions.list_overviews(Some("b@example.com")).await.unwrap();
        assert_eq!(only_b.len(), 2);
        assert!(only_b.iter().all(|o| o.full_name == "B"));
    }
}
