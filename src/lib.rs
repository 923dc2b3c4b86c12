//! TrueMirror: AI mock-interview backend

pub mod admin_cli;
pub mod auth;
pub mod core;
pub mod database;
pub mod interview_ai;
pub mod question_bank;
pub mod types;
pub mod utils;
pub mod web;

pub use web::{build_rocket, start_web_server};
