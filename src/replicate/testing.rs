//! 测试用的内存 Provider：按脚本返回创建/轮询结果，并记录调用次数。

use super::{ApiError, Prediction, PredictionInput, PredictionOutput, PredictionProvider};
use super::PredictionStatus;
use super::types::PredictionUrls;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn prediction(status: PredictionStatus) -> Prediction {
    Prediction {
        id: "p-1".to_string(),
        status,
        urls: PredictionUrls {
            get: Some("https://api.replicate.test/v1/predictions/p-1".to_string()),
            cancel: Some("https://api.replicate.test/v1/predictions/p-1/cancel".to_string()),
        },
        output: None,
        error: None,
    }
}

/// 数组形式的输出。
pub fn urls(items: &[&str]) -> PredictionOutput {
    PredictionOutput::Many(items.iter().map(|s| sonic_rs::Value::from(*s)).collect())
}

pub fn succeeded(output: PredictionOutput) -> Prediction {
    Prediction {
        output: Some(output),
        ..prediction(PredictionStatus::Succeeded)
    }
}

pub fn failed(error: &str) -> Prediction {
    Prediction {
        error: Some(sonic_rs::Value::from(error)),
        ..prediction(PredictionStatus::Failed)
    }
}

#[derive(Debug, Default)]
pub struct MockProvider {
    create: Mutex<Option<Result<Prediction, ApiError>>>,
    polls: Mutex<VecDeque<Result<Prediction, ApiError>>>,
    /// 记录最近一次提交的 (prompt, image_input, output_format)。
    pub last_input: Mutex<Option<(String, Vec<String>, String)>>,
    pub create_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
}

impl MockProvider {
    /// 创建即返回 `created`，之后按顺序返回 `polls`；脚本耗尽后一直返回 processing。
    pub fn new(created: Result<Prediction, ApiError>, polls: Vec<Result<Prediction, ApiError>>) -> Self {
        Self {
            create: Mutex::new(Some(created)),
            polls: Mutex::new(polls.into()),
            ..Self::default()
        }
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

impl PredictionProvider for MockProvider {
    async fn create_prediction(&self, input: PredictionInput<'_>) -> Result<Prediction, ApiError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_input.lock().unwrap() = Some((
            input.prompt.to_string(),
            input.image_input.iter().map(|s| s.to_string()).collect(),
            input.output_format.to_string(),
        ));
        self.create
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok(prediction(PredictionStatus::Starting)))
    }

    async fn get_prediction(&self, _prediction: &Prediction) -> Result<Prediction, ApiError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(prediction(PredictionStatus::Processing)))
    }

    async fn cancel_prediction(&self, _prediction: &Prediction) -> Result<(), ApiError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
