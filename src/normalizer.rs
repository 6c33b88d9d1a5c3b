//! 模块：响应归一化 (Response Normalizer)
//!
//! **职责**: 把形状不固定的分析响应折算成唯一的 `CanonicalResult`。
//! 这里永远不返回错误：字段缺失或类型错误时退化为文档化的默认值（0 置信度、占位标签）。
//!
//! 规则按固定顺序执行，每条规则"先命中先生效"：
//! 1. 标签：`is_fake` 布尔 → 判定文本关键词 → 原始标签 → `fake_probability` 50% 分界 → 占位符
//! 2. 置信度：`fake_probability` → `confidence` → `score` → 0
//! 3. 真/假占比：`probabilities` → `scores` → 由置信度推导
//! 4. 三个数值各自钳制到 [0, 100]

use serde_json::Value;

use crate::analysis::{AnalysisPanel, CanonicalResult, RawAnalysisDocument, RealFakePair, Verdict};

pub const LABEL_FAKE: &str = "fake";
pub const LABEL_REAL: &str = "real";
pub const LABEL_SUSPECTED_FAKE: &str = "suspected fake";
pub const LABEL_LIKELY_REAL: &str = "likely real";
pub const LABEL_PENDING: &str = "result pending";

/// 百分比钳制：结果落在 [0, 100]，NaN 视为 0。幂等。
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// 归一化入口
pub fn normalize(document: &RawAnalysisDocument) -> CanonicalResult {
    let panel_value = document
        .analysis_panel()
        .map(|map| Value::Object(map.clone()))
        .unwrap_or_else(|| Value::Object(Default::default()));
    let panel = document
        .analysis_panel()
        .map(AnalysisPanel::from_map)
        .unwrap_or_default();

    let mut result = normalize_panel(&panel);
    result.analysis_panel = panel_value;
    result.raw_response = document.clone();

    tracing::debug!(
        label = %result.label,
        confidence = result.confidence,
        real = result.real_percent,
        fake = result.fake_percent,
        "analysis response normalized"
    );
    result
}

/// 只针对 `analysis_panel` 的纯计算部分，便于脱离原始文档单独测试
pub fn normalize_panel(panel: &AnalysisPanel) -> CanonicalResult {
    let label = resolve_label(panel);
    let confidence = resolve_confidence(panel);
    let (real_percent, fake_percent) = resolve_split(panel, confidence);

    CanonicalResult {
        label,
        confidence: clamp_percent(confidence),
        real_percent: clamp_percent(real_percent),
        fake_percent: clamp_percent(fake_percent),
        is_fake: Verdict::from(panel.is_fake),
        analysis_panel: Value::Object(Default::default()),
        raw_response: RawAnalysisDocument::default(),
    }
}

fn resolve_label(panel: &AnalysisPanel) -> String {
    if let Some(is_fake) = panel.is_fake {
        let label = if is_fake { LABEL_FAKE } else { LABEL_REAL };
        return label.to_string();
    }

    let text = panel.verdict_text().unwrap_or_default().to_lowercase();
    // 顺序固定：fake → real → suspicion/high → low
    let keyword_label = if text.contains("fake") {
        Some(LABEL_FAKE)
    } else if text.contains("real") {
        Some(LABEL_REAL)
    } else if text.contains("suspicion") || text.contains("high") {
        Some(LABEL_SUSPECTED_FAKE)
    } else if text.contains("low") {
        Some(LABEL_LIKELY_REAL)
    } else {
        None
    };

    match (keyword_label, panel.label.as_deref()) {
        (Some(label), _) => label.to_string(),
        (None, Some(raw)) if !raw.is_empty() => raw.to_string(),
        // 只有概率时按 50% 分界，缺概率才是占位
        _ => match panel.fake_probability {
            Some(p) if clamp_percent(p * 100.0) >= 50.0 => LABEL_FAKE.to_string(),
            Some(_) => LABEL_REAL.to_string(),
            None => LABEL_PENDING.to_string(),
        },
    }
}

// fake_probability 命中时，占比的兜底推导 (100 - c, c) 恰好就是它预置的值
fn resolve_confidence(panel: &AnalysisPanel) -> f64 {
    if let Some(p) = panel.fake_probability {
        return p * 100.0;
    }
    if let Some(c) = panel.confidence {
        // 尺度歧义：<= 1 视为小数，否则已经是百分比
        return if c <= 1.0 { c * 100.0 } else { c };
    }
    panel.score.unwrap_or(0.0)
}

fn resolve_split(panel: &AnalysisPanel, confidence: f64) -> (f64, f64) {
    let pair = panel
        .probabilities
        .filter(|p| !p.is_zero())
        .or_else(|| panel.scores.filter(|p| !p.is_zero()));

    match pair {
        Some(pair) => scale_pair(pair),
        None => (100.0 - confidence, confidence),
    }
}

fn scale_pair(pair: RealFakePair) -> (f64, f64) {
    if pair.real <= 1.0 && pair.fake <= 1.0 {
        (pair.real * 100.0, pair.fake * 100.0)
    } else {
        (pair.real, pair.fake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(panel: Value) -> CanonicalResult {
        normalize(&RawAnalysisDocument::new(json!({ "analysis_panel": panel })))
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn clamp_bounds_and_idempotence() {
        assert_eq!(clamp_percent(-5.0), 0.0);
        assert_eq!(clamp_percent(140.0), 100.0);
        assert_eq!(clamp_percent(f64::NAN), 0.0);
        for v in [0.0, 12.5, 99.99, 100.0] {
            assert_eq!(clamp_percent(clamp_percent(v)), clamp_percent(v));
        }
    }

    #[test]
    fn fake_probability_seeds_everything() {
        let r = run(json!({ "fake_probability": 0.73, "verdict": "FAKE image" }));
        assert!(approx(r.confidence, 73.0));
        assert!(approx(r.fake_percent, 73.0));
        assert!(approx(r.real_percent, 27.0));
        assert_eq!(r.label, "fake");
        assert_eq!(r.is_fake, Verdict::Unknown);
    }

    #[test]
    fn confidence_scale_heuristic() {
        assert!(approx(run(json!({ "confidence": 0.4 })).confidence, 40.0));
        assert!(approx(run(json!({ "confidence": 85 })).confidence, 85.0));
        assert!(approx(run(json!({ "score": 0.5 })).confidence, 0.5));
    }

    #[test]
    fn first_confidence_field_wins() {
        let r = run(json!({ "confidence": 0.9, "score": 12 }));
        assert!(approx(r.confidence, 90.0));
    }

    #[test]
    fn probabilities_override_confidence() {
        let r = run(json!({
            "fake_probability": 0.1,
            "probabilities": { "real": 0.2, "fake": 0.8 }
        }));
        assert!(approx(r.real_percent, 20.0));
        assert!(approx(r.fake_percent, 80.0));
        assert!(approx(r.confidence, 10.0));
    }

    #[test]
    fn zero_probabilities_fall_back_to_scores() {
        let r = run(json!({
            "probabilities": { "real": 0, "fake": 0 },
            "scores": { "real": 35, "fake": 65 }
        }));
        assert!(approx(r.real_percent, 35.0));
        assert!(approx(r.fake_percent, 65.0));
    }

    #[test]
    fn split_derived_from_confidence_when_no_pair() {
        let r = run(json!({ "confidence": 60 }));
        assert!(approx(r.fake_percent, 60.0));
        assert!(approx(r.real_percent, 40.0));
    }

    #[test]
    fn out_of_range_values_are_clamped_independently() {
        let r = run(json!({
            "score": 140,
            "scores": { "real": -10, "fake": 250 }
        }));
        assert_eq!(r.confidence, 100.0);
        assert_eq!(r.real_percent, 0.0);
        assert_eq!(r.fake_percent, 100.0);
    }

    #[test]
    fn label_priority() {
        assert_eq!(run(json!({ "is_fake": false, "verdict": "fake" })).label, "real");
        assert_eq!(run(json!({ "is_fake": true })).is_fake, Verdict::Fake);
        assert_eq!(run(json!({ "verdict": "Real photo" })).label, "real");
        assert_eq!(run(json!({ "verdict": "High suspicion" })).label, "suspected fake");
        assert_eq!(run(json!({ "verdict": "LOW risk" })).label, "likely real");
        assert_eq!(run(json!({ "label": "Manipulated" })).label, "Manipulated");
        assert_eq!(
            run(json!({ "verdict": "inconclusive", "label": "Manipulated" })).label,
            "Manipulated"
        );
        assert_eq!(run(json!({})).label, "result pending");
    }

    #[test]
    fn probability_only_panel_derives_label() {
        assert_eq!(run(json!({ "fake_probability": 0.73 })).label, "fake");
        assert_eq!(run(json!({ "fake_probability": 0.5 })).label, "fake");
        assert_eq!(run(json!({ "fake_probability": 0.2 })).label, "real");
        // 文本和原始标签都排在概率前面
        assert_eq!(
            run(json!({ "fake_probability": 0.9, "verdict": "low risk" })).label,
            "likely real"
        );
        assert_eq!(
            run(json!({ "fake_probability": 0.9, "label": "Manipulated" })).label,
            "Manipulated"
        );
        assert_eq!(run(json!({ "confidence": 0.9 })).label, "result pending");
    }

    #[test]
    fn missing_panel_degrades_to_placeholder() {
        let doc = RawAnalysisDocument::new(json!({ "analysis_panel": [1, 2, 3] }));
        let r = normalize(&doc);
        assert_eq!(r.label, LABEL_PENDING);
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.fake_percent, 0.0);
        assert_eq!(r.real_percent, 100.0);
        assert_eq!(r.is_fake, Verdict::Unknown);
        assert_eq!(r.raw_response, doc);
    }

    #[test]
    fn panel_is_passed_through_unmodified() {
        let panel = json!({ "confidence": 0.5, "extra": { "nested": true } });
        let r = run(panel.clone());
        assert_eq!(r.analysis_panel, panel);
    }
}
