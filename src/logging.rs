use axum::http::HeaderMap;
use sonic_rs::prelude::*;
use std::borrow::Cow;
use std::time::Duration;

/// 详细日志等级：
/// - off：只输出生命周期日志（任务创建、状态变化、失败）
/// - low：额外输出客户端请求/响应（格式化/脱敏）
/// - medium：额外输出 Replicate 请求/响应（格式化/脱敏）
/// - high：客户端 + Replicate 请求/响应，完全原始输出
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl LogLevel {
    pub fn parse(debug: &str) -> Self {
        match debug.trim().to_lowercase().as_str() {
            "low" | "client" => Self::Low,
            "medium" | "backend" => Self::Medium,
            "high" | "all" | "raw" => Self::High,
            _ => Self::Off,
        }
    }

    pub fn client_enabled(self) -> bool {
        self >= Self::Low
    }

    pub fn backend_enabled(self) -> bool {
        self >= Self::Medium
    }

    pub fn raw_enabled(self) -> bool {
        self >= Self::High
    }
}

pub fn format_duration_ms(d: Duration) -> i64 {
    d.as_millis().min(i64::MAX as u128) as i64
}

pub fn client_request(level: LogLevel, method: &str, path: &str, headers: &HeaderMap, body: &[u8]) {
    if !level.client_enabled() {
        return;
    }
    let (headers, body) = if level.raw_enabled() {
        (format_headers_raw(headers), format_bytes_raw(body))
    } else {
        (format_headers(headers), format_body_bytes(body))
    };
    tracing::info!(
        "\n===================== 客户端请求 ======================\n[客户端请求] {method} {path}\n[客户端请求头]\n{headers}\n{body}\n========================================================="
    );
}

pub fn client_response(level: LogLevel, status: u16, duration: Duration, body: &[u8]) {
    if !level.client_enabled() {
        return;
    }
    let body = if level.raw_enabled() {
        format_bytes_raw(body)
    } else {
        format_body_bytes(body)
    };
    tracing::info!(
        "\n===================== 客户端响应 ======================\n[客户端响应] {} {}ms\n{body}\n==========================================================",
        status,
        format_duration_ms(duration),
    );
}

pub fn backend_request(level: LogLevel, method: &str, url: &str, headers: &HeaderMap, body: &[u8]) {
    if !level.backend_enabled() {
        return;
    }
    let (headers, body) = if level.raw_enabled() {
        (format_headers_raw(headers), format_bytes_raw(body))
    } else {
        (format_headers(headers), format_body_bytes(body))
    };
    tracing::info!(
        "\n====================== 后端请求 ========================\n[后端请求] {method} {url}\n[后端请求头]\n{headers}\n{body}\n=========================================================="
    );
}

pub fn backend_response(level: LogLevel, status: u16, duration: Duration, body: &[u8]) {
    if !level.backend_enabled() {
        return;
    }
    let body = if level.raw_enabled() {
        format_bytes_raw(body)
    } else {
        format_body_bytes(body)
    };
    tracing::info!(
        "\n====================== 后端响应 ========================\n[后端响应] {} {}ms\n{body}\n==========================================================",
        status,
        format_duration_ms(duration),
    );
}

fn format_headers(headers: &HeaderMap) -> String {
    let mut obj = sonic_rs::Object::new();

    for (name, value) in headers.iter() {
        let key = name.as_str();
        let redacted = matches!(
            key.to_lowercase().as_str(),
            "authorization" | "proxy-authorization" | "cookie"
        );
        let v = if redacted {
            sonic_rs::Value::from("***")
        } else {
            match value.to_str() {
                Ok(s) => sonic_rs::Value::from(s),
                Err(_) => sonic_rs::Value::from("<binary>"),
            }
        };
        obj.insert(&key, v);
    }

    format_body_value(&obj.into_value())
}

fn format_body_value(v: &sonic_rs::Value) -> String {
    let sanitized = sanitize_json_for_log(v);
    sonic_rs::to_string_pretty(&sanitized).unwrap_or_else(|_| sanitized.to_string())
}

fn format_body_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }

    // 内联图片可达数十 MB：超过阈值不再解析，只输出首尾片段。
    const MAX_PARSE_BYTES: usize = 2 * 1024 * 1024;
    const HEAD_TAIL: usize = 4 * 1024;

    if bytes.len() > MAX_PARSE_BYTES {
        let head = String::from_utf8_lossy(&bytes[..HEAD_TAIL]);
        let tail = String::from_utf8_lossy(&bytes[bytes.len() - HEAD_TAIL..]);
        return format!(
            "(body too large: {} bytes, showing head/tail)\n--- head ---\n{}\n--- tail ---\n{}",
            bytes.len(),
            truncate_data_uri(&head),
            truncate_data_uri(&tail)
        );
    }

    match sonic_rs::from_slice::<sonic_rs::Value>(bytes) {
        Ok(v) => format_body_value(&v),
        Err(_) => truncate_data_uri(&String::from_utf8_lossy(bytes)).into_owned(),
    }
}

fn format_headers_raw(headers: &HeaderMap) -> String {
    let mut out = String::new();
    for (name, value) in headers.iter() {
        out.push_str(name.as_str());
        out.push_str(": ");
        out.push_str(value.to_str().unwrap_or("<non-utf8>"));
        out.push('\n');
    }
    out
}

fn format_bytes_raw(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// 递归脱敏：字符串中的 base64 data URI 只保留首尾。
fn sanitize_json_for_log(v: &sonic_rs::Value) -> sonic_rs::Value {
    if let Some(obj) = v.as_object() {
        let mut out = sonic_rs::Object::new();
        for (key, child) in obj.iter() {
            out.insert(&key, sanitize_json_for_log(child));
        }
        return out.into_value();
    }

    if let Some(arr) = v.as_array() {
        let items: Vec<sonic_rs::Value> = arr.iter().map(sanitize_json_for_log).collect();
        return sonic_rs::Value::from(items);
    }

    if let Some(s) = v.as_str() {
        return sonic_rs::Value::from(truncate_data_uri(s).as_ref());
    }

    v.to_owned()
}

fn truncate_data_uri(s: &str) -> Cow<'_, str> {
    const KEEP: usize = 20;
    const MARKER: &str = ";base64,";

    let Some(idx) = s.find(MARKER) else {
        return Cow::Borrowed(s);
    };
    let payload_start = idx + MARKER.len();
    let payload = &s[payload_start..];
    let payload_len = payload
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')))
        .unwrap_or(payload.len());
    if payload_len <= KEEP * 4 {
        return Cow::Borrowed(s);
    }

    let payload_end = payload_start + payload_len;
    let omitted = payload_len - KEEP * 2;
    Cow::Owned(format!(
        "{}{}...[TRUNCATED: {omitted} chars]...{}{}",
        &s[..payload_start],
        &s[payload_start..payload_start + KEEP],
        &s[payload_end - KEEP..payload_end],
        &s[payload_end..],
    ))
}
