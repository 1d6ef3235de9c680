use super::client::client_key;
use crate::error::AppError;
use crate::quota::{QuotaDecision, QuotaGate, seconds_until_reset};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

/// 配额中间件状态。
#[derive(Debug, Clone)]
pub struct QuotaGuard {
    pub gate: QuotaGate,
    pub trust_forwarded_for: bool,
}

/// 在任何上游调用之前检查并扣减当日配额；被拒绝的请求不会进入生成逻辑。
pub async fn quota_middleware(
    State(guard): State<QuotaGuard>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request, guard.trust_forwarded_for);
    match guard.gate.check_and_consume(&key) {
        QuotaDecision::Allowed { used } => {
            tracing::debug!(
                client = %key,
                "配额检查通过：今日第 {used}/{} 次",
                guard.gate.daily_max()
            );
            next.run(request).await
        }
        QuotaDecision::Rejected => {
            tracing::warn!(client = %key, "今日生成次数已达上限，拒绝请求");
            AppError::QuotaExceeded {
                retry_after_secs: seconds_until_reset(Utc::now()),
            }
            .into_response()
        }
    }
}
