use serde::{Deserialize, Serialize};

/// `POST /api/generate` 请求体。字段缺失或为 null 时由生成逻辑返回 400。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    /// 图片 URL 或 data URI。
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    pub result: String,
}
