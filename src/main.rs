use deepguard_core::{
    api,
    config::Config,
    history::UuidIdGenerator,
    session::DetectionRecorder,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ----------------------------------------------------------------
    // 0. 加载配置
    // ----------------------------------------------------------------
    let config = Config::from_env()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        export_dir = ?config.export_dir,
        model = %config.model.name,
        "⚙️  配置加载完成"
    );

    // ----------------------------------------------------------------
    // 1. 检测记录器 & 历史账本（仅内存，进程退出即清空）
    // ----------------------------------------------------------------
    let recorder = DetectionRecorder::new(Arc::new(UuidIdGenerator), config.model.clone());
    let shared_state = Arc::new(api::AppState::new(recorder, config.export_dir.clone()));

    // ----------------------------------------------------------------
    // 2. 启动 HTTP 服务
    // ----------------------------------------------------------------
    let app = api::app(shared_state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("🚀 API 服务已运行在: http://{}", addr);
    tracing::info!("   - POST   /detections               : 登记一次分析结果");
    tracing::info!("   - GET    /history                  : 检测历史（最新在前）");
    tracing::info!("   - DELETE /history                  : 清空历史");
    tracing::info!("   - GET    /history/stats            : 统计");
    tracing::info!("   - GET    /history/{{id}}             : 单条回放（含原始响应）");
    tracing::info!("   - GET    /history/export/{{format}} : 导出 CSV / JSON（管理员）");

    axum::serve(listener, app).await?;

    Ok(())
}
