pub mod analysis;
pub mod api;
pub mod config;
pub mod export;
pub mod history;
pub mod normalizer;
pub mod session;
pub mod viewer;

pub use analysis::{CanonicalResult, RawAnalysisDocument, Verdict};
pub use export::{export, ExportFile, ExportFormat};
pub use history::{HistoryEntry, HistoryLedger, IdGenerator, ModelInfo};
pub use normalizer::{clamp_percent, normalize};
pub use session::{DetectionOutcome, DetectionRecorder};
pub use viewer::{ExplainabilityImageSet, ExplainabilityViewer};
