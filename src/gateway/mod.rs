pub mod common;
pub mod generate;

use crate::config::Config;
use crate::quota::QuotaGate;
use crate::replicate::PredictionProvider;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Router, middleware};
use common::quota::{QuotaGuard, quota_middleware};
use generate::{GenerateState, handle_generate};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// 组装全部路由：
/// - `GET /health`
/// - `POST /api/generate`（先过配额中间件，再进入生成逻辑）
pub fn router<P: PredictionProvider + 'static>(cfg: &Config, provider: P, gate: QuotaGate) -> Router {
    let guard = QuotaGuard {
        gate,
        trust_forwarded_for: cfg.trust_forwarded_for,
    };

    let generate_routes = Router::new()
        .route("/api/generate", post(handle_generate::<P>))
        .route_layer(middleware::from_fn_with_state(guard, quota_middleware))
        .with_state(Arc::new(GenerateState::new(cfg, provider)));

    Router::new()
        .route("/health", get(handle_health))
        .merge(generate_routes)
        .layer(DefaultBodyLimit::max(cfg.max_body_bytes()))
        .layer(CorsLayer::permissive())
}

async fn handle_health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MSG_QUOTA_EXCEEDED;
    use crate::quota::{MemoryQuotaStore, QuotaStore};
    use crate::replicate::testing::{MockProvider, prediction, succeeded, urls};
    use crate::replicate::PredictionStatus;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn cfg() -> Config {
        Config {
            poll_interval_ms: 10,
            quota_daily_limit: 2,
            ..Config::default()
        }
    }

    fn gate(enabled: bool, max: u32) -> QuotaGate {
        QuotaGate::new(enabled, max, Arc::new(MemoryQuotaStore::new()))
    }

    fn ok_provider() -> MockProvider {
        MockProvider::new(
            Ok(prediction(PredictionStatus::Starting)),
            vec![Ok(succeeded(urls(&["http://x/img.jpg"])))],
        )
    }

    fn generate_request(body: &str, client: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/generate")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", client)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = router(&cfg(), MockProvider::default(), gate(true, 1));
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn success_returns_result() {
        let app = router(&cfg(), ok_provider(), gate(true, 2));
        let resp = app
            .oneshot(generate_request(
                r#"{"prompt":"banana","image":"https://x/in.png"}"#,
                "198.51.100.1",
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            json_body(resp).await,
            serde_json::json!({"result": "http://x/img.jpg"})
        );
    }

    #[tokio::test]
    async fn missing_fields_are_bad_requests() {
        let app = router(&cfg(), MockProvider::default(), gate(false, 1));

        let resp = app
            .clone()
            .oneshot(generate_request(r#"{"image":"https://x/in.png"}"#, "a"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await,
            serde_json::json!({"error": "Prompt is required"})
        );

        let resp = app
            .clone()
            .oneshot(generate_request(r#"{"prompt":"banana","image":null}"#, "a"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await,
            serde_json::json!({"error": "Image is required"})
        );

        let resp = app
            .oneshot(generate_request("not json", "a"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn quota_rejects_after_daily_limit() {
        let app = router(&cfg(), MockProvider::default(), gate(true, 2));
        let body = r#"{"prompt":"","image":""}"#;

        // 配额在参数校验之前扣减：前两次 400，第三次 429。
        for _ in 0..2 {
            let resp = app
                .clone()
                .oneshot(generate_request(body, "203.0.113.9"))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }

        let resp = app
            .clone()
            .oneshot(generate_request(body, "203.0.113.9, 10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(resp.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(
            json_body(resp).await,
            serde_json::json!({"error": MSG_QUOTA_EXCEEDED})
        );

        // 其他客户端不受影响。
        let resp = app
            .oneshot(generate_request(body, "203.0.113.10"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn disabled_quota_never_rejects() {
        let store = Arc::new(MemoryQuotaStore::new());
        let gate = QuotaGate::new(false, 1, store.clone());
        let app = router(&cfg(), MockProvider::default(), gate);
        for _ in 0..5 {
            let resp = app
                .clone()
                .oneshot(generate_request("{}", "203.0.113.9"))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn failed_prediction_is_server_error_with_details() {
        let provider = MockProvider::new(
            Ok(prediction(PredictionStatus::Starting)),
            vec![Ok(crate::replicate::testing::failed("oom"))],
        );
        let app = router(&cfg(), provider, gate(false, 1));
        let resp = app
            .oneshot(generate_request(
                r#"{"prompt":"banana","image":"data:image/png;base64,AAAA"}"#,
                "a",
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(resp).await,
            serde_json::json!({"error": "Prediction failed", "details": "oom"})
        );
    }
}
