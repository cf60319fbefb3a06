use zendo::Config;
use zendo::app;

/// Main entry point for the web application
///
/// Reads `ZENDO_DATABASE_DIR` and `ZENDO_BIND_ADDR` from the environment and
/// serves the chat API. Logging is controlled with `RUST_LOG`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    app::run(config).await
}
