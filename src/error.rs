//! Error types for the scaffold execution engine.

use crate::catalog::Stage;
use crate::recovery::FailureCategory;
use thiserror::Error;

/// Catalog load and lookup errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Frame not found: {0}")]
    FrameNotFound(String),

    #[error("Scaffold not found: {0}")]
    ScaffoldNotFound(String),

    #[error("Duplicate frame id: {0}")]
    DuplicateFrame(String),

    #[error("Duplicate scaffold id: {0}")]
    DuplicateScaffold(String),

    #[error("Frame {0} depends on itself")]
    SelfDependency(String),

    #[error("Frame {frame} depends on unknown frame {dependency}")]
    DependencyUnresolved { frame: String, dependency: String },

    #[error("Scaffold {scaffold} references unknown frame {frame} in stage {stage}")]
    UnknownStageReference {
        scaffold: String,
        stage: u8,
        frame: String,
    },

    #[error("Scaffold {scaffold} declares invalid stage {stage} (expected 1..=8)")]
    InvalidStage { scaffold: String, stage: u8 },

    #[error("Unsupported catalog format: {0}")]
    UnsupportedFormat(String),

    #[error("Catalog parse error: {0}")]
    Parse(String),

    #[error("Catalog I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the capability layer while resolving or invoking an entry point
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("Capability not registered: {0}")]
    NotRegistered(String),

    #[error("Invalid entry point for {kind} capability: {entry_point}")]
    InvalidEntryPoint { kind: String, entry_point: String },

    #[error("Capability invocation failed: {0}")]
    Invocation(String),

    #[error("Capability returned a non-object result: {0}")]
    MalformedResult(String),

    #[error("Capability process exited with status {status}: {stderr}")]
    ProcessExit { status: i32, stderr: String },

    #[error("Remote capability request failed: {0}")]
    Remote(String),
}

/// Failure of a single frame, either per attempt or terminal.
#[derive(Debug, Clone, Error)]
pub enum FrameError {
    #[error("Frame {frame_id} timed out after {timeout_secs}s")]
    Timeout { frame_id: String, timeout_secs: u64 },

    #[error("Success criteria unmet for frame {frame_id}: {detail}")]
    SuccessCriteriaUnmet { frame_id: String, detail: String },

    #[error("Resource unavailable for frame {frame_id}: {reason}")]
    ResourceUnavailable { frame_id: String, reason: String },

    #[error("Frame {frame_id} failed: {source}")]
    Capability {
        frame_id: String,
        #[source]
        source: CapabilityError,
    },

    #[error("Frame {frame_id} exhausted {attempts} attempts ({category}): {last_error}")]
    AttemptsExhausted {
        frame_id: String,
        attempts: u32,
        category: FailureCategory,
        last_error: String,
    },
}

impl FrameError {
    pub fn frame_id(&self) -> &str {
        match self {
            FrameError::Timeout { frame_id, .. }
            | FrameError::SuccessCriteriaUnmet { frame_id, .. }
            | FrameError::ResourceUnavailable { frame_id, .. }
            | FrameError::Capability { frame_id, .. }
            | FrameError::AttemptsExhausted { frame_id, .. } => frame_id,
        }
    }

    /// Terminal failures that halt a scaffold when the frame is load-bearing.
    pub fn is_halting(&self) -> bool {
        matches!(
            self,
            FrameError::AttemptsExhausted { .. } | FrameError::ResourceUnavailable { .. }
        )
    }

    /// The underlying failure message, without the frame id or prefix.
    pub fn cause(&self) -> String {
        match self {
            FrameError::Timeout { timeout_secs, .. } => format!("timed out after {}s", timeout_secs),
            FrameError::SuccessCriteriaUnmet { detail, .. } => detail.clone(),
            FrameError::ResourceUnavailable { reason, .. } => reason.clone(),
            FrameError::Capability { source, .. } => source.to_string(),
            FrameError::AttemptsExhausted { last_error, .. } => last_error.clone(),
        }
    }

    /// Failure category. Only the cause is classified, so keywords in a frame
    /// id never pick the category.
    pub fn category(&self) -> FailureCategory {
        match self {
            FrameError::Timeout { .. } => FailureCategory::Timeout,
            FrameError::ResourceUnavailable { .. } => FailureCategory::ResourceExhaustion,
            FrameError::AttemptsExhausted { category, .. } => *category,
            FrameError::SuccessCriteriaUnmet { .. } | FrameError::Capability { .. } => {
                FailureCategory::classify(&self.cause())
            }
        }
    }

    /// Stable taxonomy name used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FrameError::Timeout { .. } => "Timeout",
            FrameError::SuccessCriteriaUnmet { .. } => "SuccessCriteriaUnmet",
            FrameError::ResourceUnavailable { .. } => "ResourceUnavailable",
            FrameError::Capability { .. } => "CapabilityFailed",
            FrameError::AttemptsExhausted { .. } => "AttemptsExhausted",
        }
    }
}


/// Admission controller errors
#[derive(Debug, Clone, Error)]
pub enum AdmissionError {
    #[error("Request {request_id} denied: {reason}")]
    Denied { request_id: String, reason: String },

    #[error("Invalid resource request: {0}")]
    InvalidRequest(String),

    #[error("Allocation not found: {0}")]
    AllocationNotFound(String),
}

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Storage data error: {0}")]
    Data(String),
}

/// Top-level engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Stage {stage} halted: {reason}")]
    StageHalted { stage: Stage, reason: String },

    #[error("Report error: {0}")]
    Report(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Report(err.to_string())
    }
}
