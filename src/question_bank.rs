// src/question_bank.rs
//! Read-only access to the question bank and its prompt rendering

use anyhow::Result;
use sqlx::SqlitePool;
use std::fmt::Write;
use tracing::{debug, error};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PositionRow {
    pub id: i64,
    pub name: String,
    pub language: String,
    pub total_duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SectionRow {
    pub id: i64,
    pub section_number: i64,
    pub section_name: Option<String>,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuestionRow {
    pub id: i64,
    pub question_number: Option<i64>,
    pub question_text: String,
    pub question_type_text: Option<String>,
    pub pressure_level_text: Option<String>,
    pub purpose: Option<String>,
    pub expected_duration_minutes: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct QuestionBlock {
    pub question: QuestionRow,
    pub popups: Vec<String>,
    pub must_have: Vec<String>,
    pub should_avoid: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SectionBlock {
    pub section: SectionRow,
    pub questions: Vec<QuestionBlock>,
}

/// Everything the interviewer needs to follow a prepared question plan
#[derive(Debug, Clone)]
pub struct QuestionStructure {
    pub position: PositionRow,
    pub sections: Vec<SectionBlock>,
}

pub struct QuestionBank<'a> {
    pool: &'a SqlitePool,
}

impl<'a> QuestionBank<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Rendered question plan for an industry and job level, if the bank has one.
    /// Lookup failures are logged and treated as no plan.
    pub async fn context_for(&self, industry: &str, job_level: &str) -> Option<String> {
        match self.load_structure(industry, job_level).await {
            Ok(Some(structure)) => Some(structure.render()),
            Ok(None) => {
                debug!("No question plan for {} / {}", industry, job_level);
                None
            }
            Err(e) => {
                error!("Failed to load question plan for {} / {}: {:#}", industry, job_level, e);
                None
            }
        }
    }

    pub async fn load_structure(
        &self,
        industry: &str,
        job_level: &str,
    ) -> Result<Option<QuestionStructure>> {
        let position = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT p.id, p.name, p.language, p.total_duration_minutes
            FROM positions p
            JOIN industries i ON i.id = p.industry_id
            JOIN job_levels j ON j.id = p.job_level_id
            WHERE lower(i.name) = lower(?) AND lower(j.name) = lower(?)
            ORDER BY p.id
            LIMIT 1
            "#,
        )
        .bind(industry)
        .bind(job_level)
        .fetch_optional(self.pool)
        .await?;

        let Some(position) = position else {
            return Ok(None);
        };

        let sections = sqlx::query_as::<_, SectionRow>(
            r#"
            SELECT id, section_number, section_name, duration_minutes
            FROM question_sections
            WHERE position_id = ?
            ORDER BY section_number, id
            "#,
        )
        .bind(position.id)
        .fetch_all(self.pool)
        .await?;

        if sections.is_empty() {
            return Ok(None);
        }

        let mut blocks = Vec::with_capacity(sections.len());
        for section in sections {
            let questions = self.questions_for_section(section.id).await?;
            blocks.push(SectionBlock { section, questions });
        }

        Ok(Some(QuestionStructure {
            position,
            sections: blocks,
        }))
    }

    async fn questions_for_section(&self, section_id: i64) -> Result<Vec<QuestionBlock>> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, question_number, question_text, question_type_text,
                   pressure_level_text, purpose, expected_duration_minutes
            FROM interview_questions
            WHERE section_id = ?
            ORDER BY question_number, id
            "#,
        )
        .bind(section_id)
        .fetch_all(self.pool)
        .await?;

        let mut blocks = Vec::with_capacity(rows.len());
        for question in rows {
            let popups: Vec<(String,)> = sqlx::query_as(
                "SELECT popup_text FROM popup_questions WHERE question_id = ? ORDER BY order_number, id",
            )
            .bind(question.id)
            .fetch_all(self.pool)
            .await?;

            let guidelines: Vec<(String, String)> = sqlx::query_as(
                "SELECT guideline_type, content FROM question_guidelines WHERE question_id = ? ORDER BY id",
            )
            .bind(question.id)
            .fetch_all(self.pool)
            .await?;

            let (must_have, should_avoid) = guidelines.into_iter().fold(
                (Vec::new(), Vec::new()),
                |(mut must, mut avoid), (kind, content)| {
                    match kind.as_str() {
                        "must_have" => must.push(content),
                        "should_avoid" => avoid.push(content),
                        _ => {}
                    }
                    (must, avoid)
                },
            );

            blocks.push(QuestionBlock {
                question,
                popups: popups.into_iter().map(|(text,)| text).collect(),
                must_have,
                should_avoid,
            });
        }

        Ok(blocks)
    }
}

fn or_na<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "N/A".to_string())
}

impl QuestionStructure {
    pub fn render(&self) -> String {
        let mut out = String::from("=== INTERVIEW QUESTIONS STRUCTURE ===\n\n");
        let language = if self.position.language == "vi" {
            "Tiếng Việt"
        } else {
            "English"
        };

        // Writing into a String cannot fail
        let _ = writeln!(out, "Position: {}", self.position.name);
        let _ = writeln!(
            out,
            "Total Duration: {} minutes",
            or_na(&self.position.total_duration_minutes)
        );
        let _ = writeln!(out, "Language: {}\n", language);

        for block in &self.sections {
            let section = &block.section;
            let _ = writeln!(
                out,
                "SECTION {}: {}",
                section.section_number,
                or_na(&section.section_name)
            );
            let _ = writeln!(out, "Duration: {} minutes\n", or_na(&section.duration_minutes));

            for q in &block.questions {
                let question = &q.question;
                let _ = writeln!(
                    out,
                    "Question {}: {}",
                    or_na(&question.question_number),
                    question.question_text
                );
                let _ = writeln!(out, "Type: {}", or_na(&question.question_type_text));
                let _ = writeln!(out, "Pressure: {}", or_na(&question.pressure_level_text));
                let _ = writeln!(out, "Purpose: {}", or_na(&question.purpose));
                let _ = writeln!(
                    out,
                    "Expected Duration: {} min",
                    or_na(&question.expected_duration_minutes)
                );

                if !q.popups.is_empty() {
                    out.push_str("POP-UP follow-ups:\n");
                    for popup in &q.popups {
                        let _ = writeln!(out, "  - {}", popup);
                    }
                }
                if !q.must_have.is_empty() {
                    out.push_str("Must have in answer:\n");
                    for item in &q.must_have {
                        let _ = writeln!(out, "  ✓ {}", item);
                    }
                }
                if !q.should_avoid.is_empty() {
                    out.push_str("Should avoid:\n");
                    for item in &q.should_avoid {
                        let _ = writeln!(out, "  ✗ {}", item);
                    }
                }
                out.push('\n');
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Database;

    async fn seeded() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("bank.db")).await.unwrap();

        let statements = [
            "INSERT INTO industries (id, name) VALUES (1, 'it'), (2, 'finance')",
            "INSERT INTO job_levels (id, name) VALUES (1, 'junior'), (2, 'senior')",
            "INSERT INTO positions (id, name, industry_id, job_level_id, language, total_duration_minutes) \
             VALUES (1, 'Junior Backend Developer', 1, 1, 'vi', 30), \
                    (2, 'Senior Analyst', 2, 2, 'en', 45)",
            "INSERT INTO question_sections (id, position_id, section_number, section_name, duration_minutes) \
             VALUES (11, 1, 2, 'Technical', 20), (10, 1, 1, 'Warm-up', 10)",
            "INSERT INTO interview_questions (id, section_id, question_text, question_type_text, \
             pressure_level_text, purpose, expected_duration_minutes, question_number) \
             VALUES (100, 10, 'Giới thiệu bản thân', 'Behavioral', 'Low', 'Break the ice', 3, 1), \
                    (101, 11, 'Explain REST', 'Technical', 'Medium', 'Check basics', 5, 1)",
            "INSERT INTO popup_questions (question_id, popup_text, order_number) \
             VALUES (101, 'What about idempotency?', 2), (101, 'Name the HTTP verbs', 1)",
            "INSERT INTO question_guidelines (question_id, guideline_type, content) \
             VALUES (101, 'must_have', 'Statelessness'), (101, 'should_avoid', 'Confusing REST with RPC')",
        ];
        for statement in statements {
            sqlx::query(statement).execute(db.pool()).await.unwrap();
        }

        (dir, db)
    }

    #[tokio::test]
    async fn test_context_renders_sections_in_order() {
        let (_dir, db) = seeded().await;
        let context = QuestionBank::new(db.pool())
            .context_for("IT", "Junior")
            .await
            .unwrap();

        assert!(context.starts_with("=== INTERVIEW QUESTIONS STRUCTURE ===\n\n"));
        assert!(context.contains("Position: Junior Backend Developer\n"));
        assert!(context.contains("Total Duration: 30 minutes\n"));
        assert!(context.contains("Language: Tiếng Việt\n"));

        let warm_up = context.find("SECTION 1: Warm-up").unwrap();
        let technical = context.find("SECTION 2: Technical").unwrap();
        assert!(warm_up < technical);

        let verbs = context.find("  - Name the HTTP verbs").unwrap();
        let idempotency = context.find("  - What about idempotency?").unwrap();
        assert!(verbs < idempotency);

        assert!(context.contains("Must have in answer:\n  ✓ Statelessness\n"));
        assert!(context.contains("Should avoid:\n  ✗ Confusing REST with RPC\n"));
        assert!(context.contains("Expected Duration: 5 min\n"));
    }

    #[tokio::test]
    async fn test_no_match_or_no_sections_gives_none() {
        let (_dir, db) = seeded().await;
        let bank = QuestionBank::new(db.pool());

        assert!(bank.context_for("Marketing", "Junior").await.is_none());
        // Position exists but has no sections
        assert!(bank.context_for("Finance", "Senior").await.is_none());
    }
}
