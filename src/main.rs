use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use course_server::api::{self, AppState};
use course_server::config::{AiConfig, EngineConfig};
use course_server::engine::LearningEngine;
use course_server::generator::AiContentGenerator;
use course_server::store::Store;
use course_server::utils::init_log;

#[derive(Debug, Parser)]
#[command(author, version, about = "Personalized-curriculum learning server")]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value = "./database/courses.db")]
    database: PathBuf,

    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Optional engine config (TOML); defaults apply otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log to daily-rotated files in this directory instead of stdout
    #[arg(short, long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = init_log(args.log_dir.clone());
    let _ = dotenvy::dotenv();

    let engine_config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    if let Some(parent) = args.database.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = Store::connect(&args.database.to_string_lossy()).await?;

    let ai_config = AiConfig::from_env()?;
    let model = ai_config.model.clone();
    let generator = Arc::new(AiContentGenerator::new(
        ai_config,
        engine_config.generation_timeout(),
    ));
    let engine = Arc::new(LearningEngine::new(
        store,
        generator,
        engine_config,
        Some(model),
    ));

    let app = api::router(AppState { engine });
    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    println!("Starting server at http://{}:{}", args.host, args.port);
    println!(
        "OpenAPI document at http://{}:{}/api-docs/openapi.json",
        args.host, args.port
    );
    axum::serve(listener, app).await?;

    Ok(())
}
