// src/admin_cli.rs
use crate::core::{ConfigManager, Database};
use crate::database::{SessionRepository, UserRepository};
use crate::utils::normalize_email;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "truemirror-admin")]
#[command(about = "Inspect interview sessions and manage TrueMirror accounts")]
pub struct AdminCli {
    #[command(subcommand)]
    pub command: AdminCommand,

    /// Database file; defaults to the configured one
    #[arg(long)]
    pub database_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum AdminCommand {
    /// List interview sessions, newest first
    Sessions {
        /// Only sessions of this account
        #[arg(long)]
        email: Option<String>,
    },
    /// List all accounts
    Users,
    /// Block an account from logging in
    Deactivate { email: String },
    /// Re-enable a deactivated account
    Activate { email: String },
}

pub async fn handle_admin_command(cli: AdminCli) -> Result<()> {
    let database_path = match cli.database_path {
        Some(path) => path,
        None => ConfigManager::load()?.server.database_path,
    };
    let db = Database::new(&database_path).await?;

    match cli.command {
        AdminCommand::Sessions { email } => {
            let email = email.as_deref().map(normalize_email);
            let sessions = SessionRepository::new(db.pool())
                .list_overviews(email.as_deref())
                .await?;

            if sessions.is_empty() {
                info!("No interview sessions found.");
                return Ok(());
            }

            info!(
                "{:<5} {:<28} {:<14} {:<12} {:<12} {:<4} {:<12} {:<16}",
                "ID", "Email", "Position", "Industry", "Style", "Lang", "Status", "Created"
            );
            info!("{}", "-".repeat(110));
            for session in &sessions {
                info!(
                    "{:<5} {:<28} {:<14} {:<12} {:<12} {:<4} {:<12} {:<16}",
                    session.id,
                    session.email,
                    session.position.as_deref().unwrap_or("N/A"),
                    session.industry.as_deref().unwrap_or("N/A"),
                    session.style.as_str(),
                    session.language.as_str(),
                    session.status,
                    session.created_at.format("%Y-%m-%d %H:%M")
                );
            }
            info!("Total: {} sessions", sessions.len());
        }

        AdminCommand::Users => {
            let users = UserRepository::new(db.pool()).list_all().await?;
            if users.is_empty() {
                info!("No accounts found.");
                return Ok(());
            }

            info!(
                "{:<5} {:<30} {:<25} {:<8} {:<16}",
                "ID", "Email", "Full name", "Active", "Created"
            );
            info!("{}", "-".repeat(88));
            for user in &users {
                info!(
                    "{:<5} {:<30} {:<25} {:<8} {:<16}",
                    user.id,
                    user.email,
                    user.full_name,
                    if user.is_active { "yes" } else { "no" },
                    user.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }

        AdminCommand::Deactivate { email } => set_active(&db, &email, false).await?,
        AdminCommand::Activate { email } => set_active(&db, &email, true).await?,
    }

    Ok(())
}

async fn set_active(db: &Database, email: &str, active: bool) -> Result<()> {
    let email = normalize_email(email);
    let action = if active { "activated" } else { "deactivated" };

    match UserRepository::new(db.pool()).set_active(&email, active).await {
        Ok(true) => info!("✅ Account {}: {}", action, email),
        Ok(false) => info!("❌ No account found for email: {}", email),
        Err(e) => {
            error!("Failed to update account {}: {}", email, e);
            return Err(e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sessions_filter() {
        let cli = AdminCli::parse_from([
            "truemirror-admin",
            "--database-path",
            "/tmp/tm.db",
            "sessions",
            "--email",
            "lan@example.com",
        ]);
        assert_eq!(cli.database_path, Some(PathBuf::from("/tmp/tm.db")));
        match cli.command {
            AdminCommand::Sessions { email } => assert_eq!(email.as_deref(), Some("lan@example.com")),
            _ => panic!("expected sessions command"),
        }
    }

    #[tokio::test]
    async fn test_deactivate_and_activate_account() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.db");
        let db = Database::new(&path).await.unwrap();
        UserRepository::new(db.pool())
            .create("lan@example.com", "hash", "Lan")
            .await
            .unwrap();

        handle_admin_command(AdminCli {
            command: AdminCommand::Deactivate {
                email: " Lan@Example.com ".to_string(),
            },
            database_path: Some(path.clone()),
        })
        .await
        .unwrap();

        let user = UserRepository::new(db.pool())
            .find_by_email("lan@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(!user.is_active);

        handle_admin_command(AdminCli {
            command: AdminCommand::Activate {
                email: "lan@example.com".to_string(),
            },
            database_path: Some(path),
        })
        .await
        .unwrap();

        let user = UserRepository::new(db.pool())
            .find_by_email("lan@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(user.is_active);
    }
}
