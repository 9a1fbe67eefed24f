pub mod annotate;
pub mod compare;
pub mod core;
pub mod export;
pub mod metrics;
pub mod pipeline;
pub mod session;
pub mod source;

pub use core::model::{Document, DocumentResults, Page, Run, RunOutput, RunStatus};
pub use core::stage::StageId;
pub use pipeline::{ExportFormat, ReviewConfig};
pub use session::ReviewSession;
