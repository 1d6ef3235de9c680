use super::PredictionProvider;
use super::types::{CreatePredictionRequest, Prediction, PredictionInput};
use crate::config::Config;
use crate::logging::{self, LogLevel};
use axum::body::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Replicate API 错误 {status}: {body}")]
    Http { status: u16, body: sonic_rs::Value },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] sonic_rs::Error),
}

#[derive(Debug, Clone)]
pub struct ReplicateClient {
    http: reqwest::Client,
    api_base: String,
    api_token: String,
    model: String,
    log_level: LogLevel,
}

impl ReplicateClient {
    pub fn new(cfg: &Config) -> Result<Self, anyhow::Error> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90));

        if cfg.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(cfg.timeout_ms));
        }
        if !cfg.proxy.trim().is_empty() {
            builder = builder.proxy(reqwest::Proxy::all(cfg.proxy.trim())?);
        }

        Ok(Self {
            http: builder.build()?,
            api_base: cfg.api_base.clone(),
            api_token: cfg.api_token.clone(),
            model: cfg.model.clone(),
            log_level: cfg.log_level(),
        })
    }

    pub fn create_url(&self) -> String {
        format!("{}/models/{}/predictions", self.api_base, self.model)
    }

    /// 轮询地址：优先使用响应里的 `urls.get`，缺失时按 id 拼接。
    pub fn get_url(&self, prediction: &Prediction) -> String {
        match prediction.urls.get.as_deref() {
            Some(url) if !url.trim().is_empty() => url.to_string(),
            _ => format!("{}/predictions/{}", self.api_base, prediction.id),
        }
    }

    pub fn cancel_url(&self, prediction: &Prediction) -> String {
        match prediction.urls.cancel.as_deref() {
            Some(url) if !url.trim().is_empty() => url.to_string(),
            _ => format!("{}/predictions/{}/cancel", self.api_base, prediction.id),
        }
    }

    fn build_headers(&self, with_body: bool) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(USER_AGENT, HeaderValue::from_static("imgrelay"));
        if let Ok(v) = HeaderValue::from_str(&format!("Bearer {}", self.api_token)) {
            h.insert(AUTHORIZATION, v);
        }
        if with_body {
            h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        h
    }

    async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, ApiError> {
        let headers = self.build_headers(body.is_some());
        logging::backend_request(
            self.log_level,
            method.as_str(),
            url,
            &headers,
            body.as_deref().unwrap_or_default(),
        );

        let start = Instant::now();
        let mut req = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            req = req.body(body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        logging::backend_response(self.log_level, status.as_u16(), start.elapsed(), &bytes);

        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: error_body(&bytes),
            });
        }
        Ok(bytes)
    }
}

impl PredictionProvider for ReplicateClient {
    async fn create_prediction(&self, input: PredictionInput<'_>) -> Result<Prediction, ApiError> {
        let body = sonic_rs::to_vec(&CreatePredictionRequest { input })?;
        let bytes = self
            .send(reqwest::Method::POST, &self.create_url(), Some(body))
            .await?;
        Ok(sonic_rs::from_slice::<Prediction>(&bytes)?)
    }

    async fn get_prediction(&self, prediction: &Prediction) -> Result<Prediction, ApiError> {
        let bytes = self
            .send(reqwest::Method::GET, &self.get_url(prediction), None)
            .await?;
        Ok(sonic_rs::from_slice::<Prediction>(&bytes)?)
    }

    async fn cancel_prediction(&self, prediction: &Prediction) -> Result<(), ApiError> {
        self.send(reqwest::Method::POST, &self.cancel_url(prediction), None)
            .await?;
        Ok(())
    }
}

/// 错误响应体尽量按 JSON 透传；非 JSON 时退化为字符串。
fn error_body(bytes: &[u8]) -> sonic_rs::Value {
    match sonic_rs::from_slice::<sonic_rs::Value>(bytes) {
        Ok(v) => v,
        Err(_) => sonic_rs::Value::from(String::from_utf8_lossy(bytes).as_ref()),
    }
}
