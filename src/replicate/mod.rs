//! Replicate 预测 API 的客户端与数据结构。
//!
//! 生成流程通过 [`PredictionProvider`] 访问上游，便于在测试中替换为内存实现。

mod client;
mod types;

#[cfg(test)]
pub mod testing;

use std::future::Future;

pub use client::{ApiError, ReplicateClient};
pub use types::{Prediction, PredictionInput, PredictionOutput, PredictionStatus};

pub trait PredictionProvider: Send + Sync {
    /// 创建预测任务（对应一次 `POST .../predictions`）。
    fn create_prediction(
        &self,
        input: PredictionInput<'_>,
    ) -> impl Future<Output = Result<Prediction, ApiError>> + Send;

    /// 重新拉取任务当前状态。
    fn get_prediction(
        &self,
        prediction: &Prediction,
    ) -> impl Future<Output = Result<Prediction, ApiError>> + Send;

    fn cancel_prediction(
        &self,
        prediction: &Prediction,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}
