// src/types/mod.rs
pub mod completion;
pub mod conversation;
pub mod events;
pub mod interview;

pub use conversation::{ChatMessage, Role};
pub use interview::{
    Industry, InterviewMode, InterviewSession, InterviewStyle, JobLevel, Language,
    NewInterviewSession, SessionStatus, User, UserAssessment,
};
