use serde::{Deserialize, Serialize};
use sonic_rs::JsonValueTrait;

/// `POST /models/{owner}/{name}/predictions` 请求体。
#[derive(Debug, Clone, Serialize)]
pub struct CreatePredictionRequest<'a> {
    pub input: PredictionInput<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionInput<'a> {
    /// 模型要求数组形式，即使只有一张图片。
    pub image_input: [&'a str; 1],
    pub prompt: &'a str,
    pub output_format: &'a str,
}

impl<'a> PredictionInput<'a> {
    pub fn new(prompt: &'a str, image: &'a str, output_format: &'a str) -> Self {
        Self {
            image_input: [image],
            prompt,
            output_format,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    /// 未识别的状态按“未结束”处理，由轮询截止时间兜底。
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PredictionUrls {
    #[serde(default)]
    pub get: Option<String>,
    #[serde(default)]
    pub cancel: Option<String>,
}

/// 模型输出：单个 URL 或数组。数组元素不强制为字符串，避免个别异常元素导致整个快照解码失败。
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    One(String),
    Many(Vec<sonic_rs::Value>),
}

impl PredictionOutput {
    /// 数组取第一个字符串元素，字符串原样返回。
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::One(s) => Some(s.as_str()),
            Self::Many(items) => items.iter().find_map(|v| v.as_str()),
        }
    }
}

/// 预测任务资源（创建与轮询返回同一结构）。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub urls: PredictionUrls,
    #[serde(default)]
    pub output: Option<PredictionOutput>,
    #[serde(default)]
    pub error: Option<sonic_rs::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_wraps_image_in_array() {
        let req = CreatePredictionRequest {
            input: PredictionInput::new("make it blue", "https://x/in.png", "jpg"),
        };
        let v = sonic_rs::to_value(&req).unwrap();
        assert_eq!(
            v,
            sonic_rs::json!({
                "input": {
                    "image_input": ["https://x/in.png"],
                    "prompt": "make it blue",
                    "output_format": "jpg"
                }
            })
        );
    }

    #[test]
    fn prediction_decodes_provider_shape() {
        let body = r#"{
            "id": "xyz123",
            "model": "google/nano-banana-pro",
            "status": "processing",
            "output": null,
            "error": null,
            "urls": {
                "get": "https://api.replicate.com/v1/predictions/xyz123",
                "cancel": "https://api.replicate.com/v1/predictions/xyz123/cancel"
            }
        }"#;
        let p: Prediction = sonic_rs::from_str(body).unwrap();
        assert_eq!(p.id, "xyz123");
        assert_eq!(p.status, PredictionStatus::Processing);
        assert!(!p.status.is_terminal());
        assert!(p.output.is_none());
        assert_eq!(
            p.urls.get.as_deref(),
            Some("https://api.replicate.com/v1/predictions/xyz123")
        );
    }

    #[test]
    fn output_accepts_string_or_array() {
        let many: PredictionOutput = sonic_rs::from_str(r#"["http://x/a.jpg","http://x/b.jpg"]"#).unwrap();
        assert_eq!(many.first(), Some("http://x/a.jpg"));

        let one: PredictionOutput = sonic_rs::from_str(r#""http://x/a.jpg""#).unwrap();
        assert_eq!(one.first(), Some("http://x/a.jpg"));

        let empty: PredictionOutput = sonic_rs::from_str("[]").unwrap();
        assert_eq!(empty.first(), None);
    }

    #[test]
    fn output_list_tolerates_non_string_items() {
        let p: Prediction = sonic_rs::from_str(
            r#"{"id":"a","status":"succeeded","output":[null,{"k":1},"http://x/a.jpg"]}"#,
        )
        .unwrap();
        assert_eq!(p.output.as_ref().and_then(PredictionOutput::first), Some("http://x/a.jpg"));

        let junk: PredictionOutput = sonic_rs::from_str("[null, 3]").unwrap();
        assert_eq!(junk.first(), None);
    }

    #[test]
    fn unknown_status_is_not_terminal() {
        let p: Prediction = sonic_rs::from_str(r#"{"id":"a","status":"queued"}"#).unwrap();
        assert_eq!(p.status, PredictionStatus::Unknown);
        assert!(!p.status.is_terminal());
        assert!(PredictionStatus::Canceled.is_terminal());
    }
}
