pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod ui;

use crate::{
    classify::ClassificationPipeline,
    image::ImageStore,
    models::{LabelCatalog, ModelRegistry},
    utils::error::ClassifyError,
    Config, Result,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, services::ServeDir, timeout::TimeoutLayer,
};

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<ClassificationPipeline>,
    pub images: ImageStore,
}

impl AppState {
    /// 加载标签目录并按配置构建模型注册表
    pub fn from_config(config: Config) -> Result<Self> {
        let catalog = Arc::new(LabelCatalog::load(&config.labels_path)?);
        let registry = Arc::new(ModelRegistry::from_config(&config)?);

        if config.preload {
            tracing::info!("Preloading {} models...", registry.supported_models().len());
            for (model_id, e) in registry.preload_all() {
                tracing::warn!("Failed to preload model '{}': {}", model_id, e);
            }
        }

        let pipeline = Arc::new(ClassificationPipeline::new(registry, catalog));
        let images = ImageStore::new(config.images_dir.clone());

        Ok(Self {
            config: Arc::new(config),
            pipeline,
            images,
        })
    }
}

pub async fn serve(config: Config) -> Result<()> {
    let bind_addr = config.bind_addr.clone();
    let state = AppState::from_config(config)?;

    let app = create_app(state);

    let addr: SocketAddr = bind_addr.parse().map_err(|e| {
        ClassifyError::Config(format!("Invalid bind address {}: {}", bind_addr, e))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /classifications        - JSON (image_id or base64)");
    tracing::info!("  POST /classifications/upload - Multipart file upload");
    tracing::info!("  POST /transform              - Image enhancement (PNG)");
    tracing::info!("  GET  /info                   - Models and images");
    tracing::info!("  GET  /                       - Web UI");
    tracing::info!("  GET  /health                 - Health check");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        ClassifyError::Internal(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ClassifyError::Internal(format!("Server failed: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let max_request_size = state.config.server_config.max_request_size;
    let request_timeout = Duration::from_secs(state.config.server_config.request_timeout);
    let images_root = state.images.root().to_path_buf();

    Router::new()
        // 分类API路由
        .route("/classifications", post(handlers::classify_json_handler))
        .route("/classifications/upload", post(handlers::classify_upload_handler))
        .route("/transform", post(handlers::transform_handler))
        // Web UI路由
        .route("/", get(ui::index_handler))
        .nest_service("/images", ServeDir::new(images_root))
        // 系统路由
        .route("/health", get(health_handler))
        .route("/info", get(info_handler))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(RequestBodyLimitLayer::new(max_request_size))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 健康检查端点
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "models": state.pipeline.registry().get_stats(),
        "classes": state.pipeline.catalog().len(),
    }))
}

/// 可用模型与图像列表
async fn info_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let images = state.images.list()?;
    Ok(Json(json!({
        "models": state.pipeline.registry().supported_models(),
        "images": images,
    })))
}
