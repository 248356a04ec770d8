//! Dispatch of file versions to analyzers.

mod pipeline;
mod types;

pub use pipeline::{DispatchError, DispatchOutcome, Dispatcher, PreparedAnalyzer, NO_TECHSTACK_TARGET};
pub use types::{
    AnalysisIndex, AnalysisResult, Content, FileVersion, Side, SubjectKey, ADDED_TOKEN,
    BINARY_TOKEN, DECODE_ERROR_TOKEN, DELETED_TOKEN, INVALID_TOKEN,
};
