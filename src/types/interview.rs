// src/types/interview.rs
//! Interview configuration values and the persisted session/user/assessment rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job level offered by the standard interview setup (stored in `position`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobLevel {
    Intern,
    Junior,
    Senior,
    Manager,
}

impl JobLevel {
    pub const ALL: [JobLevel; 4] = [
        JobLevel::Intern,
        JobLevel::Junior,
        JobLevel::Senior,
        JobLevel::Manager,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobLevel::Intern => "Intern",
            JobLevel::Junior => "Junior",
            JobLevel::Senior => "Senior",
            JobLevel::Manager => "Manager",
        }
    }
}

impl FromStr for JobLevel {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == value)
            .ok_or_else(|| anyhow::anyhow!("Unknown position: {}", value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Industry {
    #[serde(rename = "IT")]
    It,
    Marketing,
    Sales,
    Finance,
    #[serde(rename = "HR")]
    Hr,
}

impl Industry {
    pub const ALL: [Industry; 5] = [
        Industry::It,
        Industry::Marketing,
        Industry::Sales,
        Industry::Finance,
        Industry::Hr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Industry::It => "IT",
            Industry::Marketing => "Marketing",
            Industry::Sales => "Sales",
            Industry::Finance => "Finance",
            Industry::Hr => "HR",
        }
    }
}

impl FromStr for Industry {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|industry| industry.as_str() == value)
            .ok_or_else(|| anyhow::anyhow!("Unknown industry: {}", value))
    }
}

/// Interviewer tone. Values are the Vietnamese labels the frontend sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum InterviewStyle {
    #[serde(rename = "Nghiêm túc")]
    #[sqlx(rename = "Nghiêm túc")]
    Serious,
    #[serde(rename = "Thân thiện")]
    #[sqlx(rename = "Thân thiện")]
    Friendly,
    #[serde(rename = "Khó tính")]
    #[sqlx(rename = "Khó tính")]
    Demanding,
}

impl InterviewStyle {
    pub const ALL: [InterviewStyle; 3] = [
        InterviewStyle::Serious,
        InterviewStyle::Friendly,
        InterviewStyle::Demanding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewStyle::Serious => "Nghiêm túc",
            InterviewStyle::Friendly => "Thân thiện",
            InterviewStyle::Demanding => "Khó tính",
        }
    }
}

impl FromStr for InterviewStyle {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|style| style.as_str() == value)
            .ok_or_else(|| anyhow::anyhow!("Unknown interview style: {}", value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Language {
    Vi,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Vi => "vi",
            Language::En => "en",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Vi => "Tiếng Việt",
            Language::En => "English",
        }
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "vi" => Ok(Language::Vi),
            "en" => Ok(Language::En),
            other => anyhow::bail!("Unsupported language: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum InterviewMode {
    Standard,
    Personalized,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InterviewSession {
    pub id: i64,
    pub user_id: i64,
    pub mode: InterviewMode,
    pub position: Option<String>,
    pub industry: Option<String>,
    pub style: InterviewStyle,
    pub language: Language,
    pub uploaded_files_info: Option<String>,
    pub custom_questions: Option<String>,
    pub status: SessionStatus,
    pub evaluation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl InterviewSession {
    pub fn is_personalized(&self) -> bool {
        self.mode == InterviewMode::Personalized
    }

    pub fn position_or_default(&self) -> &str {
        self.position.as_deref().unwrap_or("N/A")
    }

    pub fn industry_or_default(&self) -> &str {
        self.industry.as_deref().unwrap_or("N/A")
    }
}

/// Values needed to insert a new session row
#[derive(Debug, Clone)]
pub struct NewInterviewSession {
    pub user_id: i64,
    pub mode: InterviewMode,
    pub position: Option<String>,
    pub industry: Option<String>,
    pub style: InterviewStyle,
    pub language: Language,
    pub uploaded_files_info: Option<String>,
    pub custom_questions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserAssessment {
    pub id: i64,
    pub user_id: i64,
    pub assessment_content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard_setup_values() {
        assert_eq!("Senior".parse::<JobLevel>().unwrap(), JobLevel::Senior);
        assert_eq!("HR".parse::<Industry>().unwrap(), Industry::Hr);
        assert_eq!(
            "Khó tính".parse::<InterviewStyle>().unwrap(),
            InterviewStyle::Demanding
        );
        assert_eq!("en".parse::<Language>().unwrap(), Language::En);
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert!("senior".parse::<JobLevel>().is_err());
        assert!("it".parse::<Industry>().is_err());
        assert!("EN".parse::<Language>().is_err());
        assert!("Relaxed".parse::<InterviewStyle>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SessionStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(SessionStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn test_user_json_hides_password_hash() {
        let user = User {
            id: 1,
            email: "an@example.com".to_string(),
            password_hash: "$2b$secret".to_string(),
            full_name: "An Nguyen".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            is_active: true,
        };

        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("password_hash").is_none());
        assert_eq!(value["email"], "an@example.com");
    }
}
