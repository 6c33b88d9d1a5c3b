//! 历史账本导出：CSV / JSON
//!
//! 两种格式都基于整本账本，顺序与 `HistoryLedger::all()` 一致（最新在前）。
//! 账本为空时不产生任何输出。

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::history::{HistoryEntry, HistoryLedger};

pub const FILE_PREFIX: &str = "deepguard_history";
pub const CSV_HEADER: [&str; 5] = ["timestamp", "user_id", "model", "result", "confidence"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv;charset=utf-8",
            ExportFormat::Json => "application/json;charset=utf-8",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(anyhow::anyhow!("unsupported export format: {other}")),
        }
    }
}

/// JSON 导出中的一行。字段顺序即输出的 key 顺序
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    id: &'a str,
    timestamp: String,
    user_id: &'a str,
    model: &'a str,
    result: &'a str,
    confidence: f64,
}

impl<'a> From<&'a HistoryEntry> for ExportRow<'a> {
    fn from(entry: &'a HistoryEntry) -> Self {
        Self {
            id: &entry.id,
            timestamp: entry.timestamp_iso(),
            user_id: &entry.user_id,
            model: &entry.model_name,
            result: &entry.result_label,
            confidence: entry.confidence,
        }
    }
}

/// 渲染 CSV：每个字段都加双引号，字段内的 `"` 写成 `""`，不做其它转义
pub fn render_csv(ledger: &HistoryLedger) -> anyhow::Result<Option<String>> {
    if ledger.is_empty() {
        return Ok(None);
    }

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER)?;
    for entry in ledger.all() {
        let confidence = format!("{:.2}", entry.confidence);
        writer.write_record([
            entry.timestamp_iso().as_str(),
            entry.user_id.as_str(),
            entry.model_name.as_str(),
            entry.result_label.as_str(),
            confidence.as_str(),
        ])?;
    }

    let bytes = writer.into_inner().context("failed to flush csv writer")?;
    Ok(Some(String::from_utf8(bytes)?))
}

/// 渲染 JSON：两空格缩进的数组
pub fn render_json(ledger: &HistoryLedger) -> anyhow::Result<Option<String>> {
    if ledger.is_empty() {
        return Ok(None);
    }
    let rows: Vec<ExportRow<'_>> = ledger.all().map(ExportRow::from).collect();
    Ok(Some(serde_json::to_string_pretty(&rows)?))
}

/// 一份待下载的导出文件
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFile {
    pub file_name: String,
    pub format: ExportFormat,
    pub contents: String,
}

impl ExportFile {
    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }

    /// 落盘到 `dir`，目录不存在时自动创建
    pub fn save_to(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create export dir {}", dir.display()))?;
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.contents)
            .with_context(|| format!("failed to write export file {}", path.display()))?;
        Ok(path)
    }
}

/// 文件名带生成时刻（毫秒），避免多次导出互相覆盖
pub fn export_file_name(format: ExportFormat, generated_at: DateTime<Utc>) -> String {
    format!(
        "{}_{}.{}",
        FILE_PREFIX,
        generated_at.timestamp_millis(),
        format.extension()
    )
}

/// 导出入口。空账本返回 `Ok(None)`：不生成文件，也不触发下载
pub fn export(
    ledger: &HistoryLedger,
    format: ExportFormat,
    generated_at: DateTime<Utc>,
) -> anyhow::Result<Option<ExportFile>> {
    let contents = match format {
        ExportFormat::Csv => render_csv(ledger)?,
        ExportFormat::Json => render_json(ledger)?,
    };

    let Some(contents) = contents else {
        tracing::debug!(?format, "export skipped: history is empty");
        return Ok(None);
    };

    let file = ExportFile {
        file_name: export_file_name(format, generated_at),
        format,
        contents,
    };
    tracing::info!(file = %file.file_name, rows = ledger.len(), "history exported");
    Ok(Some(file))
}
