// src/interview_ai/interviewer.rs
//! Interviewer operations on top of the chat-completion client

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::core::document_processor::ProcessedDocument;
use crate::core::llm_client::{ChatCompletion, TokenStream};
use crate::interview_ai::prompts;
use crate::interview_ai::types::{CandidateProfile, PersonalizedQuestion, QuestionList};
use crate::types::completion::{CompletionRequest, ContentPart, PromptMessage};
use crate::types::conversation::without_system;
use crate::types::{ChatMessage, InterviewSession, InterviewStyle, Language, Role};

#[derive(Clone)]
pub struct Interviewer {
    llm: Arc<dyn ChatCompletion>,
}

impl Interviewer {
    pub fn new(llm: Arc<dyn ChatCompletion>) -> Self {
        Self { llm }
    }

    /// Stream the interviewer's next reply to the conversation
    pub async fn stream_reply(&self, conversation: &[ChatMessage]) -> Result<TokenStream> {
        let messages = conversation.iter().map(PromptMessage::from).collect();
        self.llm.stream(CompletionRequest::new(messages)).await
    }

    /// Markdown evaluation of a finished interview
    pub async fn evaluate(
        &self,
        session: &InterviewSession,
        conversation: &[ChatMessage],
    ) -> Result<String> {
        let mut messages: Vec<PromptMessage> = without_system(conversation)
            .iter()
            .map(PromptMessage::from)
            .collect();
        messages.push(PromptMessage::text(
            Role::User,
            prompts::evaluation_prompt(session.language),
        ));

        let evaluation = self
            .llm
            .complete(CompletionRequest::new(messages))
            .await
            .context("Evaluation request failed")?;

        info!("Generated evaluation for session {}", session.id);
        Ok(evaluation)
    }

    /// Let the vision model read a file that had no inline text
    pub async fn extract_text(&self, document: &ProcessedDocument) -> Result<String> {
        let mut parts = vec![ContentPart::Text {
            text: prompts::vision_extraction_prompt(&document.filename),
        }];
        parts.extend(document.attachments.iter().cloned());

        let request =
            CompletionRequest::new(vec![PromptMessage::parts(Role::User, parts)]).with_temperature(0.0);
        let text = self.llm.complete(request).await?;

        let text = text.trim().to_string();
        if text.is_empty() {
            anyhow::bail!("No text could be read from {}", document.filename);
        }
        Ok(text)
    }

    pub async fn analyze_profile(
        &self,
        texts: &[String],
        language: Language,
    ) -> Result<CandidateProfile> {
        let prompt = prompts::profile_analysis_prompt(texts, language);
        let reply = self
            .llm
            .complete(
                CompletionRequest::new(vec![PromptMessage::text(Role::User, prompt)])
                    .with_temperature(0.0),
            )
            .await?;

        prompts::parse_json_reply(&reply).context("Failed to read candidate profile")
    }

    pub async fn generate_questions(
        &self,
        profile: &CandidateProfile,
        style: InterviewStyle,
        language: Language,
    ) -> Result<Vec<PersonalizedQuestion>> {
        let prompt = prompts::question_generation_prompt(profile, style, language)?;
        let reply = self
            .llm
            .complete(CompletionRequest::new(vec![PromptMessage::text(
                Role::User,
                prompt,
            )]))
            .await?;

        let questions = prompts::parse_json_reply::<QuestionList>(&reply)
            .context("Failed to read generated questions")?
            .into_vec();
        if questions.is_empty() {
            anyhow::bail!("The model returned no questions");
        }
        Ok(questions)
    }

    /// One report over every evaluation, deterministic sampling
    pub async fn overall_assessment(
        &self,
        evaluations: &[(InterviewSession, String)],
    ) -> Result<String> {
        let prompt = prompts::assessment_prompt(evaluations);
        self.llm
            .complete(
                CompletionRequest::new(vec![PromptMessage::text(Role::User, prompt)])
                    .with_temperature(0.0),
            )
            .await
            .context("Assessment request failed")
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use rocket::futures::stream::{self, StreamExt};
    use std::sync::Mutex;

    /// Replays canned replies and records every request
    #[derive(Default)]
    pub struct ScriptedCompletion {
        pub replies: Mutex<Vec<String>>,
        pub chunks: Vec<String>,
        pub requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedCompletion {
        pub fn with_replies(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
                ..Default::default()
            }
        }

        pub fn with_chunks(chunks: &[&str]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_string()).collect(),
                ..Default::default()
            }
        }
    }

    #[rocket::async_trait]
    impl ChatCompletion for ScriptedCompletion {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .context("no scripted reply left")
        }

        async fn stream(&self, request: CompletionRequest) -> Result<TokenStream> {
            self.requests.lock().unwrap().push(request);
            let chunks: Vec<Result<String>> = self.chunks.iter().cloned().map(Ok).collect();
            Ok(stream::iter(chunks).boxed())
        }
    }
}
