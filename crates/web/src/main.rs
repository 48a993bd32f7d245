use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::info;

use testdeck_runner::RunnerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::var("TESTDECK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| testdeck_common::default_store_path().join("config.toml"));
    let mut config = RunnerConfig::load(&config_path)?;

    if let Ok(project_root) = std::env::var("TESTDECK_PROJECT_ROOT") {
        config.project_root = PathBuf::from(project_root);
    }
    if let Ok(store_root) = std::env::var("TESTDECK_STORE_ROOT") {
        config.store_root = PathBuf::from(store_root);
    }
    if let Ok(listen) = std::env::var("TESTDECK_LISTEN") {
        config.listen = listen;
    }

    let addr: SocketAddr = config.listen.parse()?;

    info!(
        "starting testdeck web on http://{} (project: {}, store: {})",
        addr,
        config.project_root.display(),
        config.store_root.display()
    );

    testdeck_web::server::serve(addr, config).await
}
