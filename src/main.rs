pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod quota;
pub mod replicate;
pub mod util;

use anyhow::Context;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::load();

    init_tracing(&cfg);

    for warning in &cfg.warnings {
        tracing::warn!("{warning}");
    }

    if cfg.api_token.trim().is_empty() {
        tracing::warn!("未配置 REPLICATE_API_TOKEN，上游请求将返回 401");
    }

    let replicate =
        replicate::ReplicateClient::new(&cfg).context("初始化 ReplicateClient 失败")?;

    let gate = quota::QuotaGate::from_config(&cfg);
    if gate.enabled() {
        tracing::info!("每日配额已启用：每个客户端 {} 次/天（UTC）", gate.daily_max());
    } else {
        tracing::info!("每日配额已关闭");
    }
    quota::spawn_purge_task(gate.clone());

    tracing::info!("上游模型: {}", cfg.model);

    let app = gateway::router(&cfg, replicate, gate);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], cfg.port)));

    tracing::info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("绑定监听端口失败")?;

    // 需要连接地址作为配额 key 的兜底。
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("服务异常退出")?;

    Ok(())
}

fn init_tracing(cfg: &config::Config) {
    // 依赖库日志默认压到 warn，本项目日志至少为 info；DEBUG=off 只关闭详细请求日志，不关闭生命周期日志。
    let env = std::env::var("RUST_LOG").unwrap_or_default();
    let env = env.trim();
    let filter = if env.is_empty() {
        EnvFilter::new("warn,imgrelay=info")
    } else if env.contains("imgrelay") {
        EnvFilter::new(env)
    } else {
        EnvFilter::new(format!("{env},imgrelay=info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);
    let _ = if cfg.json_logs() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    tracing::debug!("详细日志等级: {:?}", cfg.log_level());
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("收到退出信号，准备关闭服务...");
}
