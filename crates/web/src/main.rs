use tracing::info;

use statehub_web::server::WebServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // STATEHUB_WEB_TOKENS=user:token,... fixes the accepted bearer tokens.
    // Without it a random development token is generated and printed.
    let cfg = WebServerConfig::from_env()?;

    info!("Starting StateHub backend on http://{}", cfg.addr);

    statehub_web::server::serve(cfg).await
}
