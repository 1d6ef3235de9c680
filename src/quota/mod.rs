//! 每日生成配额。
//!
//! 客户端标识来自 `X-Forwarded-For` 或连接地址，可被伪造：
//! 这里只是防滥用的尽力而为措施，不是鉴权。

mod gate;
mod store;

pub use gate::{QuotaGate, seconds_until_reset};
pub use store::{MemoryQuotaStore, QuotaDecision, QuotaStore};

use chrono::Utc;
use std::time::Duration;

const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// 后台定期清理过期（非当日）的配额记录，避免内存随历史客户端无限增长。
pub fn spawn_purge_task(gate: QuotaGate) {
    if !gate.enabled() {
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = gate.store().purge_expired(Utc::now().date_naive());
            if removed > 0 {
                tracing::debug!("清理过期配额记录 {removed} 条，剩余 {}", gate.store().len());
            }
        }
    });
}
