use anyhow::Result;
use auth_gateway::{config::Config, server, telemetry};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    telemetry::init(&config.telemetry);

    info!("Starting {}", config.telemetry.service_name);
    info!(
        "Keycloak realm '{}' at {}",
        config.keycloak.realm, config.keycloak.url
    );

    server::run(config).await
}
