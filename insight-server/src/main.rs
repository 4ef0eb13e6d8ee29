use clap::Parser;
use insight_core::{Credentials, InsightConfig};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use insight_server::http::{start_http_server, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "insight.toml")]
    config: String,

    /// Validate config and credentials, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience, production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match InsightConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging: RUST_LOG wins, otherwise the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let credentials = match Credentials::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if args.check {
        println!("✅ Config loaded from {}", args.config);
        println!("   Listen:     http://{}", config.bind_addr());
        println!("   CMS:        {}", config.cms.endpoint);
        println!("   Session:    {}", config.cms.session_id);
        println!("   Vision:     {}", config.openai.vision_model);
        println!("   Speech:     {} ({})", config.openai.speech_model, config.openai.voice);
        println!("✅ Credentials present");
        return Ok(());
    }

    tracing::info!(
        cms = %config.cms.endpoint,
        session_id = %config.cms.session_id,
        "Starting WorkLink Insight aggregation service"
    );

    let state = HttpState::connect(config, &credentials)?;

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
