use uuid::Uuid;

/// 每次生成请求的关联 id，贯穿该请求的所有日志。
pub fn request_id() -> String {
    let s = Uuid::new_v4().simple().to_string();
    format!("gen-{}", &s[..12])
}
