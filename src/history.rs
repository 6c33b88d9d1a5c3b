//! 模块：检测历史账本 (History Ledger)
//!
//! **职责**: 负责"档案管理"。
//! 按时间顺序保存每一次完成的检测记录，只追加、不修改，新记录排在最前面。
//!
//! - **追加优先 (Append-only)**: 记录一旦写入就不再变化，唯一的删除方式是整体 `clear()`。
//! - **仅进程内**: 不做持久化，进程退出即丢失。
//! - **ID 唯一性**: 由调用方通过 `IdGenerator` 保证，账本本身不去重。

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::analysis::{CanonicalResult, RawAnalysisDocument};

// ==========================================
// 1. 历史记录 (HistoryEntry)
// ==========================================

/// 一条不可变的审计记录。HTTP 负载统一 snake_case，与 `CanonicalResult`、`HistoryStats` 一致
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    /// ISO-8601，毫秒精度，`Z` 结尾
    #[serde(serialize_with = "serialize_iso")]
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub model_id: String,
    pub model_name: String,
    pub result_label: String,
    pub confidence: f64,
    pub preview_data_url: Option<String>,
    pub original_with_boxes: Option<String>,
    pub ela_heatmap: Option<String>,
    pub ela_with_boxes: Option<String>,
    /// 原始响应，只在单条回放接口里输出
    #[serde(skip)]
    pub raw_response: Option<RawAnalysisDocument>,
}

/// 生成记录时使用的模型信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

impl HistoryEntry {
    /// 由一次完成的检测构造记录
    ///
    /// 预览图优先取服务端的 `image_panel`，没有时退回调用方本地的预览。
    pub fn from_result(
        id: String,
        timestamp: DateTime<Utc>,
        user_id: impl Into<String>,
        model: &ModelInfo,
        result: &CanonicalResult,
        local_preview: Option<String>,
    ) -> Self {
        let doc = &result.raw_response;
        Self {
            id,
            timestamp,
            user_id: user_id.into(),
            model_id: model.id.clone(),
            model_name: model.name.clone(),
            result_label: result.label.clone(),
            confidence: result.confidence,
            preview_data_url: doc.preview().map(str::to_string).or(local_preview),
            original_with_boxes: doc.original_with_boxes().map(str::to_string),
            ela_heatmap: doc.heatmap().map(str::to_string),
            ela_with_boxes: doc.heatmap_with_boxes().map(str::to_string),
            raw_response: Some(doc.clone()),
        }
    }

    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// 标签里含 "real"（不区分大小写）即视为真实，包括 "likely real"
    pub fn is_real(&self) -> bool {
        self.result_label.to_lowercase().contains("real")
    }
}

fn serialize_iso<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

// ==========================================
// 2. ID 生成器 (IdGenerator)
// ==========================================

/// 记录 ID 的生成能力，可注入，测试里换成确定性的实现
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// 默认实现：随机 128 位 UUID v4
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// 退化实现：毫秒时间戳
///
/// 同一毫秒内的多次调用靠自增序号区分，保证进程内不冲突。
#[derive(Debug, Default)]
pub struct TimestampIdGenerator {
    seq: AtomicU64,
}

impl IdGenerator for TimestampIdGenerator {
    fn next_id(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", Utc::now().timestamp_millis(), seq)
    }
}

/// 确定性实现：`{prefix}-1`, `{prefix}-2`, ...
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}

// ==========================================
// 3. 账本 (HistoryLedger)
// ==========================================

/// 历史账本
///
/// 内部按追加顺序存放（push 是 O(1) 摊还），读取时反向迭代，对外呈现"最新在前"。
#[derive(Debug, Default, Clone)]
pub struct HistoryLedger {
    entries: Vec<HistoryEntry>,
}

/// 统计面板上的数字
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total: usize,
    pub real: usize,
    pub fake: usize,
    /// 真实占比 (%)，空账本时为 0
    pub real_ratio: f64,
    pub fake_ratio: f64,
}

/// 期间过滤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Daily,
    Weekly,
    Monthly,
}

impl TimeRange {
    pub fn window(self) -> Duration {
        match self {
            TimeRange::Daily => Duration::days(1),
            TimeRange::Weekly => Duration::days(7),
            TimeRange::Monthly => Duration::days(30),
        }
    }
}

impl std::str::FromStr for TimeRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(TimeRange::Daily),
            "weekly" => Ok(TimeRange::Weekly),
            "monthly" => Ok(TimeRange::Monthly),
            other => Err(anyhow::anyhow!("unknown time range: {other}")),
        }
    }
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条记录（逻辑上插到最前面）
    pub fn append(&mut self, entry: HistoryEntry) {
        tracing::info!(id = %entry.id, label = %entry.result_label, "history entry appended");
        self.entries.push(entry);
    }

    /// 清空账本
    pub fn clear(&mut self) {
        tracing::info!(removed = self.entries.len(), "history cleared");
        self.entries.clear();
    }

    /// 只读视图，最新在前；多次读取顺序一致
    pub fn all(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> + ExactSizeIterator {
        self.entries.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// 最近 `range` 时间窗口内的记录，最新在前
    pub fn within(&self, range: TimeRange, now: DateTime<Utc>) -> Vec<&HistoryEntry> {
        let since = now - range.window();
        self.all().filter(|e| e.timestamp >= since).collect()
    }

    pub fn stats(&self) -> HistoryStats {
        let total = self.entries.len();
        let real = self.entries.iter().filter(|e| e.is_real()).count();
        let real_ratio = if total > 0 {
            real as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        HistoryStats {
            total,
            real,
            fake: total - real,
            real_ratio,
            fake_ratio: 100.0 - real_ratio,
        }
    }
}
