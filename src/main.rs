use geonum::{Config, Geonum};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    // 建立 Redis 连接池
    let geonum = Geonum::connect(&config)
        .await
        .expect("Failed to connect to Redis");

    // 启动过期清理
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = geonum.spawn_sweeper(&config, shutdown_rx);
    tracing::info!(
        "Expiry sweeper running every {}s with a {}ms window",
        config.sweep_interval().as_secs(),
        config.expiration_window_ms
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }

    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::error!("Expiry sweeper task failed: {}", e);
    }
    if let Err(e) = geonum.settle().await {
        tracing::warn!("Pending writes not settled: {}", e);
    }
}
