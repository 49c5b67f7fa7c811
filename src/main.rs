use photo_verifier::{api, ledger::SubmissionLedger, Config, Verifier};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photo_verifier=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ----------------------------------------------------------------
    // 0. 加载配置 (阈值非法直接在启动时失败)
    // ----------------------------------------------------------------
    let config = Config::from_env()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        cutoff = config.pipeline.policy.action_cutoff,
        dup_penalty = config.pipeline.policy.duplicate_penalty,
        dup_penalty_disabled = config.pipeline.policy.disable_duplicate_penalty,
        "⚙️  配置加载完成"
    );

    // ----------------------------------------------------------------
    // 1. 校验器 & 台账
    // ----------------------------------------------------------------
    let verifier = Verifier::from_config(&config);
    info!(backend = verifier.backend(), "🛡️ 打分后端就绪");

    let ledger = SubmissionLedger::new(config.ledger_capacity);

    // ----------------------------------------------------------------
    // 2. 启动 HTTP 服务
    // ----------------------------------------------------------------
    let state = Arc::new(api::AppState::new(verifier, ledger));
    let app = api::app(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("🚀 API 服务已运行在: http://{}", addr);
    info!("   - POST /verify            : 无状态校验 (调用方提供候选指纹)");
    info!("   - POST /submissions       : 校验并记入台账");
    info!("   - GET  /submissions/{{id}} : 查询提交结果");

    axum::serve(listener, app).await?;

    Ok(())
}
