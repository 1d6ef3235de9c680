use super::relay::{self, RelayOptions};
use super::types::{GenerateRequest, GenerateResponse};
use crate::config::Config;
use crate::error::AppError;
use crate::logging;
use crate::replicate::PredictionProvider;
use crate::util::id;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Instant;

pub struct GenerateState<P> {
    pub cfg: Config,
    pub provider: P,
    pub relay: RelayOptions,
}

impl<P: PredictionProvider> GenerateState<P> {
    pub fn new(cfg: &Config, provider: P) -> Self {
        Self {
            cfg: cfg.clone(),
            provider,
            relay: RelayOptions::from_config(cfg),
        }
    }
}

pub async fn handle_generate<P: PredictionProvider + 'static>(
    State(state): State<Arc<GenerateState<P>>>,
    method: Method,
    uri: OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let log_level = state.cfg.log_level();
    logging::client_request(log_level, method.as_str(), uri.0.path(), &headers, &body);

    let request_id = id::request_id();
    let result = match sonic_rs::from_slice::<GenerateRequest>(&body) {
        Ok(req) => relay::generate(&state.provider, &req, &state.relay, &request_id).await,
        Err(e) => {
            tracing::debug!(request_id = %request_id, error = %e, "请求 JSON 解析失败");
            Err(AppError::bad_request("Invalid JSON body"))
        }
    };

    let (status, response) = match result {
        Ok(url) => {
            let out = GenerateResponse { result: url };
            if log_level.client_enabled()
                && let Ok(bytes) = sonic_rs::to_vec(&out)
            {
                logging::client_response(log_level, 200, start.elapsed(), &bytes);
            }
            (StatusCode::OK, (StatusCode::OK, Json(out)).into_response())
        }
        Err(err) => {
            if err.status().is_server_error() {
                tracing::error!(request_id = %request_id, "生成失败: {err}");
            }
            let status = err.status();
            if log_level.client_enabled()
                && let Ok(bytes) = sonic_rs::to_vec(&err.body())
            {
                logging::client_response(log_level, status.as_u16(), start.elapsed(), &bytes);
            }
            (status, err.into_response())
        }
    };

    tracing::info!(
        request_id = %request_id,
        status = status.as_u16(),
        "POST /api/generate 完成，耗时 {}ms",
        logging::format_duration_ms(start.elapsed())
    );
    response
}
