use super::types::GenerateRequest;
use crate::config::Config;
use crate::error::AppError;
use crate::replicate::{
    Prediction, PredictionInput, PredictionOutput, PredictionProvider, PredictionStatus,
};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub output_format: String,
    pub poll_interval: Duration,
    /// 从任务创建成功起算的轮询总时长上限。
    pub poll_timeout: Duration,
}

impl RelayOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            output_format: cfg.output_format.clone(),
            poll_interval: cfg.poll_interval(),
            poll_timeout: cfg.poll_timeout(),
        }
    }
}

/// 一次完整的生成：校验 → 创建任务 → 轮询至终态 → 取出图片地址。
///
/// 校验失败不会触发任何上游调用；轮询超时会尽力取消上游任务。
pub async fn generate<P: PredictionProvider>(
    provider: &P,
    req: &GenerateRequest,
    opts: &RelayOptions,
    request_id: &str,
) -> Result<String, AppError> {
    let prompt = required(req.prompt.as_deref(), "Prompt is required")?;
    let image = required(req.image.as_deref(), "Image is required")?;

    let input = PredictionInput::new(prompt, image, &opts.output_format);
    let created = provider.create_prediction(input).await.map_err(|e| {
        tracing::warn!(request_id, error = %e, "创建预测任务失败");
        AppError::from(e)
    })?;
    tracing::info!(
        request_id,
        prediction_id = %created.id,
        status = %created.status,
        "预测任务已创建"
    );

    let polled = tokio::time::timeout(
        opts.poll_timeout,
        poll_until_terminal(provider, created.clone(), opts.poll_interval, request_id),
    )
    .await;

    let finished = match polled {
        Ok(res) => res?,
        Err(_) => {
            tracing::warn!(
                request_id,
                prediction_id = %created.id,
                "轮询超过 {:?} 仍未结束，尝试取消任务",
                opts.poll_timeout
            );
            if let Err(e) = provider.cancel_prediction(&created).await {
                tracing::warn!(request_id, error = %e, "取消预测任务失败");
            }
            return Err(AppError::Timeout { id: created.id });
        }
    };

    resolve(finished, request_id)
}

fn required<'a>(value: Option<&'a str>, message: &str) -> Result<&'a str, AppError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::bad_request(message)),
    }
}

async fn poll_until_terminal<P: PredictionProvider>(
    provider: &P,
    mut prediction: Prediction,
    interval: Duration,
    request_id: &str,
) -> Result<Prediction, AppError> {
    let mut polls = 0u32;
    while !prediction.status.is_terminal() {
        tokio::time::sleep(interval).await;
        let next = provider.get_prediction(&prediction).await.map_err(|e| {
            tracing::warn!(request_id, prediction_id = %prediction.id, error = %e, "轮询预测任务失败");
            AppError::from(e)
        })?;
        polls += 1;
        if next.status != prediction.status {
            tracing::debug!(
                request_id,
                prediction_id = %next.id,
                "任务状态 {} -> {}（第 {polls} 次轮询）",
                prediction.status,
                next.status
            );
        }
        prediction = next;
    }
    Ok(prediction)
}

fn resolve(prediction: Prediction, request_id: &str) -> Result<String, AppError> {
    match prediction.status {
        PredictionStatus::Succeeded => {
            let result = prediction
                .output
                .as_ref()
                .and_then(PredictionOutput::first)
                .map(str::to_string);
            match result {
                Some(url) => {
                    tracing::info!(request_id, prediction_id = %prediction.id, "生成完成: {url}");
                    Ok(url)
                }
                None => {
                    tracing::warn!(request_id, prediction_id = %prediction.id, "任务成功但没有输出");
                    Err(AppError::EmptyOutput)
                }
            }
        }
        status => {
            let details = prediction.error.unwrap_or_else(sonic_rs::Value::new);
            tracing::warn!(
                request_id,
                prediction_id = %prediction.id,
                %status,
                "预测任务失败: {details}"
            );
            Err(AppError::PredictionFailed {
                status: status.to_string(),
                details,
            })
        }
    }
}
