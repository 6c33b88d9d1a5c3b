use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::analysis::{CanonicalResult, RawAnalysisDocument};
use crate::history::{HistoryEntry, HistoryLedger, IdGenerator, ModelInfo};
use crate::normalizer::normalize;
use crate::viewer::ExplainabilityImageSet;

/// 检测记录器
///
/// 把一次完成的分析串起来：归一化 → 生成记录 → 写入账本 → 交出图片集合给查看器。
/// 账本不归它所有，由调用方按引用传入（单写多读）。
pub struct DetectionRecorder {
    ids: Arc<dyn IdGenerator>,
    model: ModelInfo,
}

/// 一次检测的产出
#[derive(Debug, Clone, Serialize)]
pub struct DetectionOutcome {
    pub entry: HistoryEntry,
    pub result: CanonicalResult,
    pub images: ExplainabilityImageSet,
}

impl DetectionRecorder {
    pub fn new(ids: Arc<dyn IdGenerator>, model: ModelInfo) -> Self {
        Self { ids, model }
    }

    pub fn model(&self) -> &ModelInfo {
        &self.model
    }

    /// 记录一次完成的检测。`local_preview` 是上传端自己生成的预览，服务端没给预览时使用
    pub fn record(
        &self,
        ledger: &mut HistoryLedger,
        user_id: &str,
        document: RawAnalysisDocument,
        local_preview: Option<String>,
        now: DateTime<Utc>,
    ) -> DetectionOutcome {
        let result = normalize(&document);
        let entry = HistoryEntry::from_result(
            self.ids.next_id(),
            now,
            user_id,
            &self.model,
            &result,
            local_preview,
        );
        let images = ExplainabilityImageSet::from_document(&document);

        ledger.append(entry.clone());

        DetectionOutcome {
            entry,
            result,
            images,
        }
    }
}
