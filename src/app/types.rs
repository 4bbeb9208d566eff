use std::fmt;

/// Component lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
}

/// Which units the process runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Ingestion and pipeline for every configured stream
    All,
    /// Ingestion only, for one stream
    Ingest(String),
    /// Pipeline only, for one stream
    Pipeline(String),
}

impl RunMode {
    /// Stream the mode is restricted to, if any
    pub fn stream(&self) -> Option<&str> {
        match self {
            RunMode::All => None,
            RunMode::Ingest(name) | RunMode::Pipeline(name) => Some(name),
        }
    }

    pub fn runs_ingest(&self) -> bool {
        matches!(self, RunMode::All | RunMode::Ingest(_))
    }

    pub fn runs_pipeline(&self) -> bool {
        matches!(self, RunMode::All | RunMode::Pipeline(_))
    }
}

/// The two kinds of per-stream unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Ingest,
    Pipeline,
}

impl UnitKind {
    /// Component name of this unit for a stream, e.g. `ingest:cam1`
    pub fn component(&self, stream: &str) -> String {
        format!("{}:{}", self, stream)
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Ingest => write!(f, "ingest"),
            UnitKind::Pipeline => write!(f, "pipeline"),
        }
    }
}
