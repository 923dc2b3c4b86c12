use anyhow::Result;
use truemirror::{core::ConfigManager, start_web_server};

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[rocket::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("truemirror=info,rocket::server=off"));

    // LOG_FORMAT=json switches to structured lines for log shipping
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");
    if json {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    let config = ConfigManager::load()?;

    info!("Starting TrueMirror");
    info!("Environment: {}", config.environment);

    start_web_server(config).await
}
