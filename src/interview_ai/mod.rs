// src/interview_ai/mod.rs
//! AI interviewer: prompts, model operations and chat turns

pub mod interviewer;
pub mod prompts;
pub mod turns;
pub mod types;

pub use interviewer::Interviewer;
pub use turns::ChatServices;
pub use types::{CandidateProfile, PersonalizedQuestion};
