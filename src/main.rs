use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use drive_assistant::{
    app_config::{AssistantAppConfig, AssistantAppExt, AssistantConfig, StorageConfig},
    assistant::Assistant,
    summary::AnthropicSummarizer,
};

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Server listening port
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Server binding address
    #[arg(short = 'b', long, default_value = "127.0.0.1")]
    host: String,

    /// JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Serve this local directory instead of Google Drive
    #[arg(long)]
    local_root: Option<PathBuf>,

    /// API key for document summaries
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();

    env_logger::init_from_env(Env::default().default_filter_or("info"));
    info!("🚀 Starting Drive Assistant...");

    let mut config = AssistantConfig::from_file(&args.config).unwrap_or_else(|e| {
        warn!("{:#}; using default configuration", e);
        AssistantConfig::default()
    });
    if let Some(root) = args.local_root {
        config.storage = StorageConfig::Local { root };
    }
    if args.anthropic_api_key.is_some() {
        config.summary.api_key = args.anthropic_api_key;
    }
    if config.summary.api_key.is_none() {
        warn!("⚠️  ANTHROPIC_API_KEY not set; SUMMARY replies will use the fallback text");
    }

    let storage = config.connect_storage().await;
    let summarizer = AnthropicSummarizer::new(config.summary.api_key.clone())
        .with_model(&config.summary.model);

    let assistant = Arc::new(Assistant::new(
        storage,
        Arc::new(summarizer),
        config.summary.max_tokens,
        config.temp_dir(),
    ));
    let app_config = AssistantAppConfig::new(assistant).with_webhook_path(&config.webhook_path);

    info!(
        "Listening for messages on http://{}:{}{}",
        args.host, args.port, config.webhook_path
    );

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .configure_assistant(app_config.clone())
    })
    .bind(format!("{}:{}", args.host, args.port))?
    .run()
    .await
}
