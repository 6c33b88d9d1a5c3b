//! 模块：可解释性图片查看器 (Explainability Viewer)
//!
//! 放大查看框的纯状态机：图片集合、当前选中下标、缩放倍率。
//! 宿主 UI 负责点击事件，这里只负责状态和导航；不做任何持久化。

use serde::Serialize;

use crate::analysis::RawAnalysisDocument;
use crate::history::HistoryEntry;

pub const ZOOM_STEP: f64 = 0.25;
pub const ZOOM_MIN: f64 = 0.25;
pub const ZOOM_MAX: f64 = 3.0;
/// 打开时的缩放，缩略图入口和历史列表入口统一使用这个值
pub const DEFAULT_ZOOM: f64 = 1.0;

/// 三个固定槽位，声明顺序即展示顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainabilitySlot {
    OriginalWithBoxes,
    Heatmap,
    HeatmapWithBoxes,
}

impl ExplainabilitySlot {
    pub const ALL: [ExplainabilitySlot; 3] = [
        ExplainabilitySlot::OriginalWithBoxes,
        ExplainabilitySlot::Heatmap,
        ExplainabilitySlot::HeatmapWithBoxes,
    ];

    pub fn title(self) -> &'static str {
        match self {
            ExplainabilitySlot::OriginalWithBoxes => "Suspicious regions (original)",
            ExplainabilitySlot::Heatmap => "ELA heatmap",
            ExplainabilitySlot::HeatmapWithBoxes => "ELA + suspicious regions",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplainabilityImage {
    pub slot: ExplainabilitySlot,
    pub source: String,
    pub title: &'static str,
}

/// 有序图片集合，长度 0~3
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExplainabilityImageSet {
    images: Vec<ExplainabilityImage>,
}

impl ExplainabilityImageSet {
    /// 按固定模板过滤：只保留有图源的槽位
    pub fn from_sources<F>(mut source_of: F) -> Self
    where
        F: FnMut(ExplainabilitySlot) -> Option<String>,
    {
        let images = ExplainabilitySlot::ALL
            .into_iter()
            .filter_map(|slot| {
                source_of(slot)
                    .filter(|src| !src.is_empty())
                    .map(|source| ExplainabilityImage {
                        slot,
                        source,
                        title: slot.title(),
                    })
            })
            .collect();
        Self { images }
    }

    /// 新鲜检测结果的入口
    pub fn from_document(doc: &RawAnalysisDocument) -> Self {
        Self::from_sources(|slot| {
            let src = match slot {
                ExplainabilitySlot::OriginalWithBoxes => doc.original_with_boxes(),
                ExplainabilitySlot::Heatmap => doc.heatmap(),
                ExplainabilitySlot::HeatmapWithBoxes => doc.heatmap_with_boxes(),
            };
            src.map(str::to_string)
        })
    }

    /// 历史列表的入口
    pub fn from_entry(entry: &HistoryEntry) -> Self {
        Self::from_sources(|slot| match slot {
            ExplainabilitySlot::OriginalWithBoxes => entry.original_with_boxes.clone(),
            ExplainabilitySlot::Heatmap => entry.ela_heatmap.clone(),
            ExplainabilitySlot::HeatmapWithBoxes => entry.ela_with_boxes.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ExplainabilityImage> {
        self.images.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExplainabilityImage> {
        self.images.iter()
    }

    pub fn position(&self, source: &str) -> Option<usize> {
        self.images.iter().position(|img| img.source == source)
    }
}

/// 查看器状态
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainabilityViewer {
    images: ExplainabilityImageSet,
    /// None 表示关闭
    selected: Option<usize>,
    zoom: f64,
}

impl Default for ExplainabilityViewer {
    fn default() -> Self {
        Self::new(ExplainabilityImageSet::default())
    }
}

impl ExplainabilityViewer {
    pub fn new(images: ExplainabilityImageSet) -> Self {
        Self {
            images,
            selected: None,
            zoom: DEFAULT_ZOOM,
        }
    }

    /// 换成新结果的图片集合，同时关闭查看框
    pub fn replace_images(&mut self, images: ExplainabilityImageSet) {
        self.images = images;
        self.close();
    }

    pub fn images(&self) -> &ExplainabilityImageSet {
        &self.images
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn is_open(&self) -> bool {
        self.selected.is_some()
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// 缩放的百分比显示，例如 1.25 -> 125
    pub fn zoom_percent(&self) -> u32 {
        (self.zoom * 100.0).round() as u32
    }

    pub fn current(&self) -> Option<&ExplainabilityImage> {
        self.selected.and_then(|i| self.images.get(i))
    }

    /// 打开第 `index` 张；越界（含空集合）时忽略并返回 false
    pub fn open(&mut self, index: usize) -> bool {
        if index >= self.images.len() {
            return false;
        }
        self.selected = Some(index);
        self.zoom = DEFAULT_ZOOM;
        true
    }

    /// 缩略图点击入口：按图源定位，找不到时打开第一张
    pub fn open_source(&mut self, source: &str) -> bool {
        let index = self.images.position(source).unwrap_or(0);
        self.open(index)
    }

    pub fn next(&mut self) {
        self.step(1);
    }

    pub fn previous(&mut self) {
        let len = self.images.len();
        if len > 0 {
            self.step(len - 1);
        }
    }

    // 循环前进 `offset` 步；长度 0/1 或关闭时不动
    fn step(&mut self, offset: usize) {
        let len = self.images.len();
        if len <= 1 {
            return;
        }
        if let Some(i) = self.selected {
            self.selected = Some((i + offset) % len);
        }
    }

    pub fn zoom_in(&mut self) {
        self.zoom = (self.zoom + ZOOM_STEP).min(ZOOM_MAX);
    }

    pub fn zoom_out(&mut self) {
        self.zoom = (self.zoom - ZOOM_STEP).max(ZOOM_MIN);
    }

    pub fn reset_zoom(&mut self) {
        self.zoom = 1.0;
    }

    pub fn close(&mut self) {
        self.selected = None;
    }
}
