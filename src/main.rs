use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use secrecy::SecretString;
use tracing::{info, warn};

use agora_engine::{DebateEngine, EngineConfig};
use agora_judge::{ChatCompletionsJudge, ChatJudgeConfig, Judge};
use agora_settings::{AgoraSettings, JudgeSettings};
use agora_store::Database;
use agora_telemetry::TelemetryConfig;

/// Debate orchestrator: pairs two bots per session and referees the exchange.
#[derive(Debug, Parser)]
#[command(name = "agora", version)]
struct Cli {
    /// Settings file (defaults to ~/.agora/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    host: Option<String>,
    /// SQLite database path.
    #[arg(long)]
    db: Option<PathBuf>,
    /// Log JSON lines instead of compact text.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn apply(&self, settings: &mut AgoraSettings) {
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(db) = &self.db {
            settings.database.path = db.display().to_string();
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings =
        agora_settings::load_settings(cli.config.as_deref()).context("failed to load settings")?;
    cli.apply(&mut settings);

    let _ = agora_telemetry::init_telemetry(&TelemetryConfig {
        level: settings.logging.level.clone(),
        json: settings.logging.json,
    });
    let metrics = match agora_telemetry::install_recorder() {
        Ok(handle) => Some(handle),
        Err(error) => {
            warn!(%error, "metrics recorder not installed");
            None
        }
    };

    let db_path = PathBuf::from(&settings.database.path);
    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    info!(path = %db_path.display(), "database opened");

    let judge = build_judge(&settings.judge);
    let engine = DebateEngine::new(db, judge, EngineConfig::from_settings(&settings));
    let report = engine.recover().context("startup recovery failed")?;
    info!(
        resumed = report.resumed,
        interrupted = report.interrupted,
        "recovered persisted debates"
    );

    let server_config = agora_server::ServerConfig::from_settings(&settings.server);
    let handle = agora_server::start(server_config, engine, metrics)
        .await
        .context("failed to start server")?;
    info!(port = handle.port(), "agora ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    if !handle.shutdown().await {
        warn!("forced exit with connections still open");
    }
    info!("stopped");
    Ok(())
}

/// The external judge, when enabled and keyed. Otherwise results are
/// scored locally.
fn build_judge(settings: &JudgeSettings) -> Option<Arc<dyn Judge>> {
    if !settings.is_usable() {
        info!("external judge disabled, using fallback scoring");
        return None;
    }
    let api_key = settings.api_key.clone().unwrap_or_default();
    let config = ChatJudgeConfig {
        api_url: settings.api_url.clone(),
        api_key: SecretString::from(api_key),
        model: settings.model.clone(),
        timeout: Duration::from_secs(settings.timeout_secs),
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
    };
    match ChatCompletionsJudge::new(config) {
        Ok(judge) => {
            info!(model = %settings.model, "external judge enabled");
            Some(Arc::new(judge))
        }
        Err(error) => {
            warn!(%error, "external judge unavailable, using fallback scoring");
            None
        }
    }
}
