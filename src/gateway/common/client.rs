use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use std::net::SocketAddr;

pub const FORWARDED_FOR: &str = "x-forwarded-for";
const UNKNOWN_CLIENT: &str = "unknown";

/// 计算配额使用的客户端标识：
/// - 信任转发头时取 `X-Forwarded-For` 的第一个值（最初的客户端）
/// - 否则/缺失时回退到 TCP 连接地址（仅 IP，不含端口）
/// - 都拿不到时使用固定的 "unknown"，所有此类请求共享同一份配额
pub fn client_key<B>(req: &Request<B>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for && let Some(ip) = forwarded_client(req.headers()) {
        return ip;
    }
    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => addr.ip().to_string(),
        None => UNKNOWN_CLIENT.to_string(),
    }
}

fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(FORWARDED_FOR)?.to_str().ok()?;
    let first = raw.split(',').next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}
