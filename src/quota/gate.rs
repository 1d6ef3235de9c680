use super::store::{MemoryQuotaStore, QuotaDecision, QuotaStore};
use crate::config::Config;
use chrono::{DateTime, Days, NaiveDate, Utc};
use std::sync::Arc;

/// 每客户端每日生成次数闸门（按 UTC 自然日计数）。
///
/// 开关只在这里判断：关闭时一律放行且不访问存储，调用方无需再检查 `enabled`。
#[derive(Debug, Clone)]
pub struct QuotaGate {
    enabled: bool,
    daily_max: u32,
    store: Arc<dyn QuotaStore>,
}

impl QuotaGate {
    pub fn new(enabled: bool, daily_max: u32, store: Arc<dyn QuotaStore>) -> Self {
        Self {
            enabled,
            daily_max: daily_max.max(1),
            store,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.quota_enabled,
            cfg.quota_daily_limit,
            Arc::new(MemoryQuotaStore::new()),
        )
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn daily_max(&self) -> u32 {
        self.daily_max
    }

    pub fn store(&self) -> &Arc<dyn QuotaStore> {
        &self.store
    }

    pub fn check_and_consume(&self, client_key: &str) -> QuotaDecision {
        self.check_and_consume_on(client_key, Utc::now().date_naive())
    }

    pub fn check_and_consume_on(&self, client_key: &str, today: NaiveDate) -> QuotaDecision {
        if !self.enabled {
            return QuotaDecision::Allowed { used: 0 };
        }
        self.store
            .check_and_consume(client_key, today, self.daily_max)
    }
}

/// 距离下一个 UTC 零点的秒数（用于 Retry-After），至少为 1。
pub fn seconds_until_reset(now: DateTime<Utc>) -> u64 {
    let next_midnight = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());
    match next_midnight {
        Some(reset) => (reset - now).num_seconds().max(1) as u64,
        None => 1,
    }
}
