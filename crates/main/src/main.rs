//! 主应用程序入口
//!
//! 加载配置，组装存储与用户目录，启动聊天中枢和 Axum Web 服务。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use application::{HistoryService, Hub, HubDependencies, SystemClock};
use config::AppConfig;
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，默认 info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("加载配置失败")?;
    tracing::info!(config = %config.sanitize(), "配置已加载");

    let infra = Infrastructure::connect(&config)
        .await
        .context("初始化基础设施失败")?;

    let (hub, hub_task) = Hub::spawn(
        &config.hub,
        HubDependencies {
            store: infra.store.clone(),
            directory: infra.directory.clone(),
            clock: Arc::new(SystemClock),
        },
    );

    let state = AppState::new(hub, HistoryService::new(infra.store));
    let app = router(state, &config.server.cors_origins);

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("无法监听 {}", config.bind_address()))?;
    tracing::info!("聊天服务启动在 http://{}", config.bind_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 所有中枢句柄释放后中枢任务自行退出；仍有 WebSocket 连接未断开时不再等待
    match tokio::time::timeout(Duration::from_secs(5), hub_task).await {
        Ok(Err(err)) => tracing::warn!(error = %err, "聊天中枢任务异常退出"),
        Ok(Ok(())) => {}
        Err(_) => tracing::warn!("等待聊天中枢退出超时"),
    }
    tracing::info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "监听退出信号失败");
        return;
    }
    tracing::info!("收到退出信号，开始优雅关闭");
}
