use crate::{
    classify::ClassificationResult,
    image::{EnhanceOptions, ImageEnhancer, ImageLoader},
    utils::error::ClassifyError,
    web::{
        extractors::{RequestId, ValidatedJson},
        AppState,
    },
    Result,
};
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// JSON请求体：引用受管图像或携带base64图像
#[derive(Debug, Deserialize)]
pub struct ClassifyJsonRequest {
    /// 模型标识
    pub model_id: String,

    /// 受管目录中的图像文件名
    #[serde(default)]
    pub image_id: Option<String>,

    /// Base64编码的图像数据
    #[serde(default)]
    pub image: Option<String>,
}

/// 图像增强请求
#[derive(Debug, Deserialize)]
pub struct TransformRequest {
    pub image_id: String,
    #[serde(default = "neutral_factor")]
    pub brightness: f32,
    #[serde(default = "neutral_factor")]
    pub contrast: f32,
    #[serde(default = "neutral_factor")]
    pub color: f32,
    #[serde(default = "neutral_factor")]
    pub sharpness: f32,
}

fn neutral_factor() -> f32 {
    1.0
}

impl TransformRequest {
    pub fn options(&self) -> EnhanceOptions {
        EnhanceOptions {
            brightness: self.brightness,
            contrast: self.contrast,
            color: self.color,
            sharpness: self.sharpness,
        }
    }
}

/// 分类响应数据
#[derive(Debug, Serialize)]
pub struct ClassificationResponse {
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    pub predictions: ClassificationResult,
    /// 处理耗时（秒）
    pub processing_time: f32,
}

/// JSON响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: String,
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    pub fn success(request_id: String, data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id,
        }
    }
}

/// 在阻塞线程池上执行CPU密集任务
async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ClassifyError::Internal(format!("Worker task failed: {}", e)))?
}

/// JSON分类处理器
pub async fn classify_json_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<ClassifyJsonRequest>,
) -> Result<Json<ApiResponse<ClassificationResponse>>> {
    let start_time = Instant::now();

    tracing::info!(
        "Processing JSON classification: request_id={}, model_id={}, image_id={:?}",
        request_id,
        request.model_id,
        request.image_id
    );

    let pipeline = state.pipeline.clone();
    let images = state.images.clone();
    let model_id = request.model_id.clone();
    let image_id = request.image_id.clone();

    let predictions = run_blocking(move || {
        let image = match (&request.image_id, &request.image) {
            (Some(image_id), _) => images.open(image_id)?,
            (None, Some(data)) => ImageLoader::from_base64(data)?,
            (None, None) => {
                return Err(ClassifyError::InvalidInput("No image provided".to_string()));
            }
        };
        pipeline.classify(&request.model_id, &image)
    })
    .await?;

    let processing_time = start_time.elapsed().as_secs_f32();
    tracing::info!(
        "JSON classification completed: request_id={}, time={:.3}s",
        request_id,
        processing_time
    );

    Ok(Json(ApiResponse::success(
        request_id,
        ClassificationResponse {
            model_id,
            image_id,
            predictions,
            processing_time,
        },
    )))
}

/// Multipart文件上传处理器
pub async fn classify_upload_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<ClassificationResponse>>> {
    let start_time = Instant::now();

    tracing::info!("Processing multipart classification: request_id={}", request_id);

    let mut image_data: Option<Bytes> = None;
    let mut model_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ClassifyError::InvalidInput(format!("Failed to read multipart field: {}", e))
    })? {
        let field_name = field.name().unwrap_or("unknown").to_string();

        match field_name.as_str() {
            "file" => {
                // 验证内容类型
                if let Some(content_type) = field.content_type() {
                    if !content_type.starts_with("image/") {
                        return Err(ClassifyError::UnsupportedFormat(content_type.to_string()));
                    }
                }

                let data = field.bytes().await.map_err(|e| {
                    ClassifyError::InvalidInput(format!("Failed to read file data: {}", e))
                })?;

                if data.is_empty() {
                    return Err(ClassifyError::InvalidInput("Empty file".to_string()));
                }

                tracing::debug!("Received file: {} bytes", data.len());
                image_data = Some(data);
            }
            "model_id" => {
                let value = field.text().await.map_err(|e| {
                    ClassifyError::InvalidInput(format!("Failed to read model_id: {}", e))
                })?;
                let value = value.trim();
                if !value.is_empty() {
                    model_id = Some(value.to_string());
                }
            }
            _ => {
                tracing::debug!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    let image_data =
        image_data.ok_or_else(|| ClassifyError::InvalidInput("No file uploaded".to_string()))?;
    let model_id =
        model_id.ok_or_else(|| ClassifyError::InvalidInput("No model selected".to_string()))?;

    let pipeline = state.pipeline.clone();
    let id = model_id.clone();
    let predictions = run_blocking(move || pipeline.classify_bytes(&id, &image_data)).await?;

    let processing_time = start_time.elapsed().as_secs_f32();
    tracing::info!(
        "Upload classification completed: request_id={}, time={:.3}s",
        request_id,
        processing_time
    );

    Ok(Json(ApiResponse::success(
        request_id,
        ClassificationResponse {
            model_id,
            image_id: None,
            predictions,
            processing_time,
        },
    )))
}

/// 图像增强处理器，返回PNG
pub async fn transform_handler(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<TransformRequest>,
) -> Result<Response> {
    tracing::info!(
        "Transforming image: image_id={}, options={:?}",
        request.image_id,
        request.options()
    );

    let images = state.images.clone();
    let png = run_blocking(move || {
        let image = images.open(&request.image_id)?;
        ImageEnhancer::enhance_to_png(&image, &request.options())
    })
    .await?;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}
