// src/core/mod.rs
//! Services shared by the HTTP routes, the real-time channel and the admin CLI

pub mod config_manager;
pub mod conversation_cache;
pub mod database;
pub mod document_processor;
pub mod llm_client;
pub mod rooms;

pub use config_manager::ConfigManager;
pub use database::Database;
