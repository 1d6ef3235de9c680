use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

/// 单个客户端当天的使用记录。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaRecord {
    pub date: NaiveDate,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// 放行；`used` 为计入本次后的当日次数。
    Allowed { used: u32 },
    Rejected,
}

impl QuotaDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// 计数存储。实现方必须保证 `check_and_consume` 对同一 key 是原子的：
/// 读取与写入之间不得让出执行权，否则并发请求可能超出上限。
pub trait QuotaStore: Send + Sync + std::fmt::Debug {
    fn check_and_consume(&self, key: &str, today: NaiveDate, daily_max: u32) -> QuotaDecision;

    /// 清理日期早于 `today` 的记录，返回清理条数。
    fn purge_expired(&self, today: NaiveDate) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 进程内存储：重启即丢失，仅适用于单实例部署。
#[derive(Debug, Default)]
pub struct MemoryQuotaStore {
    records: Mutex<HashMap<String, QuotaRecord>>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<QuotaRecord> {
        self.lock().get(key).copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, QuotaRecord>> {
        // 临界区内没有会 panic 的逻辑；即便中毒，计数数据本身仍然可用。
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl QuotaStore for MemoryQuotaStore {
    fn check_and_consume(&self, key: &str, today: NaiveDate, daily_max: u32) -> QuotaDecision {
        let mut records = self.lock();
        match records.get_mut(key) {
            Some(rec) if rec.date == today => {
                if rec.count >= daily_max {
                    return QuotaDecision::Rejected;
                }
                rec.count += 1;
                QuotaDecision::Allowed { used: rec.count }
            }
            // 没有记录或记录属于之前的日期：视为新的一天，直接覆盖。
            _ => {
                records.insert(
                    key.to_string(),
                    QuotaRecord {
                        date: today,
                        count: 1,
                    },
                );
                QuotaDecision::Allowed { used: 1 }
            }
        }
    }

    fn purge_expired(&self, today: NaiveDate) -> usize {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|_, rec| rec.date >= today);
        before - records.len()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
