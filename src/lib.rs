//! XJP Hydro Agent - EPANET 水力模拟服务
//!
//! 上传 INP 文件，运行延时模拟，返回节点压力统计、Markdown 表格和压力曲线图

pub mod api;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod services;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::env::constants::{SERVICE_NAME, VERSION};
use crate::config::EnvConfig;
use crate::state::AppState;

/// 命令行覆盖项
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    /// 覆盖 PORT
    pub port_override: Option<u16>,
    /// 覆盖 HOST
    pub host_override: Option<String>,
}

/// 初始化 tracing，重复调用无副作用
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// 初始化日志、加载配置并运行 HTTP 服务直到收到关闭信号
pub async fn init_and_run_with_config(runtime: RuntimeConfig) -> std::io::Result<()> {
    init_tracing();

    let mut config = EnvConfig::from_env();
    if let Some(port) = runtime.port_override {
        config.port = port;
    }
    if let Some(host) = runtime.host_override {
        config.host = host;
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid listen address {}:{}: {}", config.host, config.port, e),
            )
        })?;

    std::fs::create_dir_all(&config.upload_dir)?;

    tracing::info!(
        service = SERVICE_NAME,
        version = VERSION,
        upload_dir = %config.upload_dir.display(),
        "Starting service"
    );

    let state = Arc::new(AppState::new(config));
    tracing::info!(engine = state.engine.name(), "Simulation engine ready");
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// 等待 Ctrl-C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, draining connections");
}
