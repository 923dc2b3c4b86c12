use anyhow::Result;
use clap::Parser;
use truemirror::admin_cli::{handle_admin_command, AdminCli};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .without_time()
        .init();

    handle_admin_command(AdminCli::parse()).await
}
