// src/interview_ai/turns.rs
//! Chat turn steps shared by the streaming endpoint and the real-time channel

use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::conversation_cache::ConversationStore;
use crate::core::rooms::RoomHub;
use crate::core::Database;
use crate::database::SessionRepository;
use crate::interview_ai::interviewer::Interviewer;
use crate::interview_ai::prompts;
use crate::interview_ai::types::{CandidateProfile, PersonalizedQuestion};
use crate::question_bank::QuestionBank;
use crate::types::conversation::has_system_prompt;
use crate::types::{ChatMessage, InterviewSession, SessionStatus};

/// Shared chat state managed by the web server
#[derive(Clone)]
pub struct ChatServices {
    pub conversations: ConversationStore,
    pub rooms: RoomHub,
    pub interviewer: Interviewer,
    pub chunk_delay: Duration,
}

impl ChatServices {
    pub fn new(db: Database, interviewer: Interviewer, chunk_delay: Duration) -> Self {
        Self {
            conversations: ConversationStore::new(db),
            rooms: RoomHub::new(),
            interviewer,
            chunk_delay,
        }
    }
}

/// The stored user message and the conversation to send to the model
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    pub user_message: ChatMessage,
    pub conversation: Vec<ChatMessage>,
}

/// Start the session if needed, make sure the conversation has a system
/// prompt and persist the user's message
pub async fn begin_turn(
    db: &Database,
    services: &ChatServices,
    session: &InterviewSession,
    content: &str,
) -> Result<PreparedTurn> {
    if session.status == SessionStatus::Pending
        && SessionRepository::new(db.pool())
            .mark_started(session.id)
            .await?
    {
        info!("Session {} is now in progress", session.id);
    }

    let existing = services.conversations.history(session.id).await?;
    let system = if has_system_prompt(&existing) {
        None
    } else {
        Some(ChatMessage::system(build_system_prompt(db, session).await))
    };

    let user_message = ChatMessage::user(content);
    let conversation = services
        .conversations
        .record_user_turn(session.id, system, user_message.clone())
        .await?;

    Ok(PreparedTurn {
        user_message,
        conversation,
    })
}

/// Store the accumulated reply of the model
pub async fn finish_turn(
    services: &ChatServices,
    session_id: i64,
    reply: String,
) -> Result<ChatMessage> {
    let message = ChatMessage::assistant(reply);
    services
        .conversations
        .append(session_id, message.clone())
        .await?;
    Ok(message)
}

pub async fn end_session(
    db: &Database,
    services: &ChatServices,
    session_id: i64,
) -> Result<InterviewSession> {
    let session = SessionRepository::new(db.pool())
        .mark_completed(session_id)
        .await?;
    services.conversations.evict(session_id).await;

    info!("Session {} completed", session_id);
    Ok(session)
}

/// Evaluate the conversation of a session and store the result on it
pub async fn evaluate_session(
    db: &Database,
    services: &ChatServices,
    session: &InterviewSession,
) -> Result<String> {
    let conversation = services.conversations.history(session.id).await?;
    let evaluation = services
        .interviewer
        .evaluate(session, &conversation)
        .await?;

    SessionRepository::new(db.pool())
        .save_evaluation(session.id, &evaluation)
        .await?;
    Ok(evaluation)
}

pub async fn build_system_prompt(db: &Database, session: &InterviewSession) -> String {
    let mut prompt = prompts::interview_system_prompt(session);

    let extra = if session.is_personalized() {
        personalized_section(session)
    } else {
        QuestionBank::new(db.pool())
            .context_for(session.industry_or_default(), session.position_or_default())
            .await
    };

    if let Some(extra) = extra {
        prompt.push_str("\n\n");
        prompt.push_str(&extra);
    }
    prompt
}

fn personalized_section(session: &InterviewSession) -> Option<String> {
    let profile = session.uploaded_files_info.as_deref().and_then(|raw| {
        serde_json::from_str::<CandidateProfile>(raw)
            .map_err(|e| warn!("Session {} has an unreadable profile: {}", session.id, e))
            .ok()
    });

    let questions: Vec<PersonalizedQuestion> = session
        .custom_questions
        .as_deref()
        .and_then(|raw| {
            serde_json::from_str(raw)
                .map_err(|e| warn!("Session {} has unreadable questions: {}", session.id, e))
                .ok()
        })
        .unwrap_or_default();

    if profile.is_none() && questions.is_empty() {
        return None;
    }
    Some(prompts::personalized_context(profile.as_ref(), &questions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::UserRepository;
    use crate::interview_ai::interviewer::testing::ScriptedCompletion;
    use crate::types::{InterviewMode, InterviewStyle, Language, NewInterviewSession, Role};
    use std::sync::Arc;

    async fn setup(
        mode: InterviewMode,
        llm: ScriptedCompletion,
    ) -> (tempfile::TempDir, Database, ChatServices, InterviewSession) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("turns.db")).await.unwrap();
        let user = UserRepository::new(db.pool())
            .create("turns@example.com", "hash", "Turns")
            .await
            .unwrap();

        let (uploaded_files_info, custom_questions) = match mode {
            InterviewMode::Personalized => (
                Some(r#"{"position": "Data Engineer", "skills": ["Spark"]}"#.to_string()),
                Some(r#"[{"question": "Describe a pipeline you built"}]"#.to_string()),
            ),
            InterviewMode::Standard => (None, None),
        };

        let session = SessionRepository::new(db.pool())
            .create(&NewInterviewSession {
                user_id: user.id,
                mode,
                position: Some("Junior".to_string()),
                industry: Some("IT".to_string()),
                style: InterviewStyle::Friendly,
                language: Language::En,
                uploaded_files_info,
                custom_questions,
            })
            .await
            .unwrap();

        let services = ChatServices::new(
            db.clone(),
            Interviewer::new(Arc::new(llm)),
            Duration::from_millis(0),
        );
        (dir, db, services, session)
    }

    #[tokio::test]
    async fn test_first_turn_starts_session_and_stores_system_prompt() {
        let (_dir, db, services, session) =
            setup(InterviewMode::Standard, ScriptedCompletion::default()).await;

        let turn = begin_turn(&db, &services, &session, "Hello").await.unwrap();
        assert_eq!(turn.conversation.len(), 2);
        assert_eq!(turn.conversation[0].role, Role::System);
        assert!(turn.conversation[0].content.contains("Position: Junior"));
        assert_eq!(turn.user_message.content, "Hello");

        let stored = SessionRepository::new(db.pool())
            .find(session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, SessionStatus::InProgress);
        assert!(stored.started_at.is_some());

        finish_turn(&services, session.id, "Hi, introduce yourself".to_string())
            .await
            .unwrap();
        let second = begin_turn(&db, &services, &stored, "I am Lan").await.unwrap();
        let system_count = second.conversation.iter().filter(|m| m.is_system()).count();
        assert_eq!(system_count, 1);
        assert_eq!(second.conversation.len(), 4);
    }

    #[tokio::test]
    async fn test_personalized_prompt_includes_profile_and_questions() {
        let (_dir, db, _services, session) =
            setup(InterviewMode::Personalized, ScriptedCompletion::default()).await;

        let prompt = build_system_prompt(&db, &session).await;
        assert!(prompt.contains("=== CANDIDATE PROFILE ==="));
        assert!(prompt.contains("Data Engineer"));
        assert!(prompt.contains("Question 1: Describe a pipeline you built"));
    }

    #[tokio::test]
    async fn test_evaluate_and_end_session() {
        let (_dir, db, services, session) = setup(
            InterviewMode::Standard,
            ScriptedCompletion::with_replies(&["### 1. Strengths\n**Score: 8/10**"]),
        )
        .await;

        begin_turn(&db, &services, &session, "Hello").await.unwrap();
        let evaluation = evaluate_session(&db, &services, &session).await.unwrap();
        assert!(evaluation.contains("Score: 8/10"));

        let ended = end_session(&db, &services, session.id).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Completed);
        assert_eq!(ended.evaluation.as_deref(), Some(evaluation.as_str()));
    }
}
