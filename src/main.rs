use chargify_export::utils::logger;
use chargify_export::{router, AppConfig, AppState, CliArgs};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 本機開發時從 .env 讀取金鑰
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    logger::init_logger(args.verbose, args.log_json);

    tracing::info!("🚀 Starting chargify-export");

    let config = match AppConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };
    tracing::debug!("Config: {:?}", config);

    let addr = config.socket_addr()?;
    let app = router(AppState::from_config(&config));

    tracing::info!("📡 Exporting from {}", config.base_url());
    tracing::info!("✅ Listening on http://{}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
