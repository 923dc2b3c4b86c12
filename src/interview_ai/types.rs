// src/interview_ai/types.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What the model learned about the candidate from the uploaded documents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Any further keys the model chose to return
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CandidateProfile {
    /// Position for the session row; blank answers count as missing
    pub fn position_or_na(&self) -> String {
        non_blank(&self.position).unwrap_or_else(|| "N/A".to_string())
    }

    pub fn industry_or_na(&self) -> String {
        non_blank(&self.industry).unwrap_or_else(|| "N/A".to_string())
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizedQuestion {
    pub question: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub question_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The model may answer with a bare array or wrap it in an object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum QuestionList {
    Bare(Vec<PersonalizedQuestion>),
    Wrapped { questions: Vec<PersonalizedQuestion> },
}

impl QuestionList {
    pub(crate) fn into_vec(self) -> Vec<PersonalizedQuestion> {
        match self {
            QuestionList::Bare(questions) | QuestionList::Wrapped { questions } => questions,
        }
    }
}
