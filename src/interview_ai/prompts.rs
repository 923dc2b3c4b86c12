// src/interview_ai/prompts.rs
//! Prompt texts sent to the model

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use crate::interview_ai::types::{CandidateProfile, PersonalizedQuestion};
use crate::types::{InterviewSession, InterviewStyle, Language};

fn style_instruction(style: InterviewStyle) -> &'static str {
    match style {
        InterviewStyle::Serious => {
            "Be professional and formal. Keep a neutral tone, ask precise questions and \
             expect structured answers."
        }
        InterviewStyle::Friendly => {
            "Be warm and encouraging. Put the candidate at ease, acknowledge good points \
             and guide them gently when they struggle."
        }
        InterviewStyle::Demanding => {
            "Be strict and challenging. Probe every vague answer, ask for concrete \
             examples and push back on weak reasoning."
        }
    }
}

fn language_instruction(language: Language) -> &'static str {
    match language {
        Language::Vi => "Conduct the whole interview in Vietnamese (Tiếng Việt).",
        Language::En => "Conduct the whole interview in English.",
    }
}

/// System prompt of an interview session
pub fn interview_system_prompt(session: &InterviewSession) -> String {
    format!(
        "You are TrueMirror, an experienced recruiter running a mock job interview.\n\
         Position: {position}\n\
         Industry: {industry}\n\
         Interview style: {style}\n\
         Language: {language}\n\n\
         {style_instruction}\n\
         {language_instruction}\n\n\
         Rules:\n\
         - Ask exactly one question at a time and wait for the answer.\n\
         - Start by greeting the candidate and asking them to introduce themselves.\n\
         - Ask follow-up questions when an answer is incomplete.\n\
         - Never answer your own questions or reveal an evaluation during the interview.\n\
         - Keep each message short, like a real interviewer speaking.",
        position = session.position_or_default(),
        industry = session.industry_or_default(),
        style = session.style.as_str(),
        language = session.language.display_name(),
        style_instruction = style_instruction(session.style),
        language_instruction = language_instruction(session.language),
    )
}

/// Extra system prompt section for a personalized session
pub fn personalized_context(
    profile: Option<&CandidateProfile>,
    questions: &[PersonalizedQuestion],
) -> String {
    let mut context = String::from("=== CANDIDATE PROFILE ===\n");
    match profile.and_then(|p| serde_json::to_string_pretty(p).ok()) {
        Some(json) => context.push_str(&json),
        None => context.push_str("(not available)"),
    }

    context.push_str("\n\n=== PERSONALIZED QUESTIONS ===\n");
    for (index, question) in questions.iter().enumerate() {
        context.push_str(&format!("Question {}: {}\n", index + 1, question.question));
        if let Some(kind) = &question.question_type {
            context.push_str(&format!("Type: {}\n", kind));
        }
        if let Some(purpose) = &question.purpose {
            context.push_str(&format!("Purpose: {}\n", purpose));
        }
    }
    context.push_str(
        "\nWork through these questions in order, adapting follow-ups to the candidate's answers.",
    );
    context
}

/// Final instruction appended after the conversation when evaluating it
pub fn evaluation_prompt(language: Language) -> &'static str {
    match language {
        Language::Vi => {
            "Dựa trên cuộc phỏng vấn vừa rồi, hãy tạo đánh giá tổng kết chi tiết theo định dạng markdown **chặt chẽ**.\n\
             Yêu cầu kết quả gồm đúng 4 phần sau với nội dung rõ ràng:\n\
             ### 1. ĐIỂM MẠNH (Strengths)\n\
             Liệt kê 3–5 điểm mạnh nổi bật của ứng viên. Mỗi điểm bắt đầu bằng \"- \".\n\
             ### 2. ĐIỂM CẦN PHÁT TRIỂN (Areas for Improvement)\n\
             Liệt kê 2–4 điểm cần cải thiện. Mỗi điểm bắt đầu bằng \"- \".\n\
             ### 3. ĐÁNH GIÁ TỔNG QUAN (Overall Assessment)\n\
             Viết 1–2 đoạn ngắn gọn về tổng quan hiệu suất và gợi ý cho lần phỏng vấn tiếp theo. Không dùng list trong phần này.\n\
             ### 4. ĐIỂM SỐ (Score)\n\
             Cho điểm theo thang X/10, ghi rõ ở đầu dòng dạng \"**Score: X/10**\".\n\n\
             **Luôn giữ đúng markdown format với các tiêu đề và dấu đầu dòng như trên.** Viết ngắn gọn, cụ thể, tránh lặp lại."
        }
        Language::En => {
            "Based on the interview above, write a detailed final evaluation in **strict** markdown.\n\
             The result must contain exactly these 4 sections:\n\
             ### 1. Strengths\n\
             List 3-5 notable strengths of the candidate. Start each item with \"- \".\n\
             ### 2. Areas for Improvement\n\
             List 2-4 points to improve. Start each item with \"- \".\n\
             ### 3. Overall Assessment\n\
             Write 1-2 short paragraphs on overall performance and advice for the next interview. Do not use a list here.\n\
             ### 4. Score\n\
             Give a score out of 10 at the start of the line as \"**Score: X/10**\".\n\n\
             **Always keep the markdown headings and bullets exactly as above.** Be concise and specific."
        }
    }
}

pub fn vision_extraction_prompt(filename: &str) -> String {
    format!(
        "Extract all readable text from the attached document \"{}\". \
         It is a CV or a job description. Return only the text, keeping the original \
         language and a sensible reading order. Do not add commentary.",
        filename
    )
}

pub fn profile_analysis_prompt(texts: &[String], language: Language) -> String {
    let documents = texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("--- Document {} ---\n{}", i + 1, text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Analyze the following documents (a CV and possibly a job description) and \
         return a JSON object with these keys:\n\
         \"position\" (target job title), \"industry\", \"level\" (Intern, Junior, Senior or Manager), \
         \"skills\" (array of strings), \"experience\" (short text), \"summary\" (2-3 sentences).\n\
         Write text values in {}. Return only the JSON object.\n\n{}",
        language.display_name(),
        documents
    )
}

pub fn question_generation_prompt(
    profile: &CandidateProfile,
    style: InterviewStyle,
    language: Language,
) -> Result<String> {
    let profile_json =
        serde_json::to_string_pretty(profile).context("Failed to serialize candidate profile")?;

    Ok(format!(
        "Create 8 to 10 interview questions tailored to this candidate profile:\n{}\n\n\
         Interview style: {} ({})\n\
         Write the questions in {}.\n\
         Return only a JSON array of objects with the keys \"question\", \"type\" \
         (introduction, technical, behavioral, situational or closing) and \"purpose\".",
        profile_json,
        style.as_str(),
        style_instruction(style),
        language.display_name()
    ))
}

/// Ask for one report across all evaluated sessions
pub fn assessment_prompt(evaluations: &[(InterviewSession, String)]) -> String {
    let mut prompt = String::from(
        "You are a career coach. Below are the evaluations of a candidate's mock interviews, \
         newest first. Write an overall assessment in markdown with these sections:\n\
         ### 1. Consistent Strengths\n\
         ### 2. Recurring Weaknesses\n\
         ### 3. Progress Over Time\n\
         ### 4. Recommendations\n\
         Finish with \"**Average Score: X/10**\".\n\n",
    );

    for (index, (session, evaluation)) in evaluations.iter().enumerate() {
        prompt.push_str(&format!(
            "=== Interview {} (position: {}, industry: {}, date: {}) ===\n{}\n\n",
            index + 1,
            session.position_or_default(),
            session.industry_or_default(),
            session.created_at.format("%Y-%m-%d"),
            evaluation
        ));
    }

    prompt
}

/// Remove a surrounding ```json ... ``` fence if present
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

pub fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let body = strip_code_fences(reply);
    serde_json::from_str(body).with_context(|| format!("Model reply is not valid JSON: {}", body))
}
