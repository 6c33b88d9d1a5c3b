use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 分析服务返回的原始文档
///
/// **职责**: 原样保存远端分类器的响应体。
/// 远端的 JSON 结构不受我们控制：任何字段都可能缺失、类型不对、或者用了意想不到的数值尺度。
/// 所以这里不做 `#[derive(Deserialize)]` 的强类型映射（类型不符会直接反序列化失败），
/// 而是保留整棵 `Value` 树，通过显式的访问器按需取值。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawAnalysisDocument(Value);

/// 可解释性图片的三个固定槽位对应的字段名（按优先级排列，前者优先）
const ORIGINAL_WITH_BOXES_KEYS: &[&str] = &["original_with_boxes"];
const HEATMAP_KEYS: &[&str] = &["ela_heatmap", "heatmap"];
const HEATMAP_WITH_BOXES_KEYS: &[&str] = &["ela_with_boxes", "heatmap_with_boxes"];

impl RawAnalysisDocument {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn model_id(&self) -> Option<&str> {
        self.0.get("model_id").and_then(Value::as_str)
    }

    /// `analysis_panel` 区域；不是对象时视为缺失
    pub fn analysis_panel(&self) -> Option<&Map<String, Value>> {
        self.0.get("analysis_panel").and_then(Value::as_object)
    }

    /// 原图 + 可疑区域框
    pub fn original_with_boxes(&self) -> Option<&str> {
        self.explainability_source(ORIGINAL_WITH_BOXES_KEYS)
    }

    /// ELA 热力图
    pub fn heatmap(&self) -> Option<&str> {
        self.explainability_source(HEATMAP_KEYS)
    }

    /// ELA 热力图 + 可疑区域框
    pub fn heatmap_with_boxes(&self) -> Option<&str> {
        self.explainability_source(HEATMAP_WITH_BOXES_KEYS)
    }

    /// 服务端预先缩放好的预览图
    pub fn preview(&self) -> Option<&str> {
        let panel = self.0.get("image_panel")?;
        ["preview_data_url", "preview"]
            .iter()
            .find_map(|key| non_empty_str(panel.get(*key)))
    }

    fn explainability_source(&self, keys: &[&str]) -> Option<&str> {
        let region = self.0.get("explainability")?;
        keys.iter().find_map(|key| non_empty_str(region.get(*key)))
    }
}

impl From<Value> for RawAnalysisDocument {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// 成对的 真/假 数值（`probabilities` 或 `scores` 字段）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RealFakePair {
    pub real: f64,
    pub fake: f64,
}

impl RealFakePair {
    /// 从 `{ "real": .., "fake": .. }` 读取。
    /// 成员缺失或者不是数字时按 0 处理；数字字符串（如 "0.3"）会被解析。
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            real: lenient_number(obj.get("real")),
            fake: lenient_number(obj.get("fake")),
        })
    }

    pub fn is_zero(&self) -> bool {
        self.real == 0.0 && self.fake == 0.0
    }
}

fn lenient_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0),
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    }
}

/// `analysis_panel` 的强类型视图
///
/// 每个字段都是 Option：只有类型完全正确的值才会被采纳，其余一律视为"不存在"。
/// 归一化算法只读这个结构，不再直接探测 JSON。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisPanel {
    /// 显式的布尔判定（必须是 JSON bool）
    pub is_fake: Option<bool>,
    /// 自由文本的判定描述
    pub verdict: Option<String>,
    /// 原始标签
    pub label: Option<String>,
    /// 伪造概率（约定 0~1）
    pub fake_probability: Option<f64>,
    /// 通用置信度（0~1 或 0~100，尺度不确定）
    pub confidence: Option<f64>,
    /// 通用分数（约定为百分比）
    pub score: Option<f64>,
    pub probabilities: Option<RealFakePair>,
    pub scores: Option<RealFakePair>,
}

impl AnalysisPanel {
    pub fn from_map(panel: &Map<String, Value>) -> Self {
        Self {
            is_fake: panel.get("is_fake").and_then(Value::as_bool),
            verdict: text_field(panel.get("verdict")),
            label: text_field(panel.get("label")),
            fake_probability: panel.get("fake_probability").and_then(Value::as_f64),
            confidence: panel.get("confidence").and_then(Value::as_f64),
            score: panel.get("score").and_then(Value::as_f64),
            probabilities: panel.get("probabilities").and_then(RealFakePair::from_value),
            scores: panel.get("scores").and_then(RealFakePair::from_value),
        }
    }

    /// 用于关键词匹配的判定文本：`verdict` 优先，其次 `label`
    pub fn verdict_text(&self) -> Option<&str> {
        self.verdict.as_deref().or(self.label.as_deref())
    }
}

// 字符串原样保留，数字转成文本；空串视为缺失
fn text_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 三态判定：缺失时保持中立，不默认为"真"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Fake,
    Real,
    #[default]
    Unknown,
}

impl From<Option<bool>> for Verdict {
    fn from(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Verdict::Fake,
            Some(false) => Verdict::Real,
            None => Verdict::Unknown,
        }
    }
}

/// 归一化后的检测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalResult {
    /// 展示用标签，永不为空
    pub label: String,
    /// 置信度，[0, 100]
    pub confidence: f64,
    /// 真实占比，[0, 100]；与 fake_percent 之和不保证为 100
    pub real_percent: f64,
    /// 伪造占比，[0, 100]
    pub fake_percent: f64,
    pub is_fake: Verdict,
    /// 原样透传的 analysis_panel，供下游展示
    pub analysis_panel: Value,
    /// 完整原始响应，供审计/回放
    #[serde(skip)]
    pub raw_response: RawAnalysisDocument,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accessors_tolerate_wrong_shapes() {
        let doc = RawAnalysisDocument::new(json!({
            "model_id": 42,
            "analysis_panel": "not an object",
            "explainability": ["nope"],
            "image_panel": { "preview": "" }
        }));
        assert_eq!(doc.model_id(), None);
        assert!(doc.analysis_panel().is_none());
        assert_eq!(doc.heatmap(), None);
        assert_eq!(doc.preview(), None);
    }

    #[test]
    fn explainability_accepts_both_key_families() {
        let doc = RawAnalysisDocument::new(json!({
            "explainability": {
                "original_with_boxes": "data:a",
                "heatmap": "data:b",
                "ela_with_boxes": "data:c"
            },
            "image_panel": { "preview_data_url": "data:p", "preview": "data:q" }
        }));
        assert_eq!(doc.original_with_boxes(), Some("data:a"));
        assert_eq!(doc.heatmap(), Some("data:b"));
        assert_eq!(doc.heatmap_with_boxes(), Some("data:c"));
        assert_eq!(doc.preview(), Some("data:p"));
    }

    #[test]
    fn panel_only_accepts_correctly_typed_fields() {
        let map = json!({
            "is_fake": "yes",
            "verdict": "",
            "label": 3,
            "fake_probability": "0.5",
            "confidence": 0.4,
            "probabilities": { "real": "0.25", "fake": null }
        });
        let panel = AnalysisPanel::from_map(map.as_object().unwrap());
        assert_eq!(panel.is_fake, None);
        assert_eq!(panel.verdict, None);
        assert_eq!(panel.label.as_deref(), Some("3"));
        assert_eq!(panel.verdict_text(), Some("3"));
        assert_eq!(panel.fake_probability, None);
        assert_eq!(panel.confidence, Some(0.4));
        assert_eq!(
            panel.probabilities,
            Some(RealFakePair { real: 0.25, fake: 0.0 })
        );
        assert_eq!(panel.scores, None);
    }
}
