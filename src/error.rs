//! Error type shared by the design pipeline.
//!
//! Filter rejections are **not** errors; they are ordinary outcomes reported
//! through [`crate::pool::TranscriptProbes::rejected`]. Everything here
//! either stops a single feature/group or the whole run.
use thiserror::Error;

/// Errors raised by configuration, primer design and pool assembly.
#[derive(Error, Debug)]
pub enum DesignError {
    /// A config line failed validation for the strategy it names.
    #[error("invalid config line `{line}`; expected: {grammar}")]
    Config { line: String, grammar: String },

    /// No strategy is registered under this category/name.
    #[error("unknown {category} `{name}`")]
    UnknownFeature { category: String, name: String },

    /// The set of config lines does not describe a usable pipeline.
    #[error("feature set: {0}")]
    FeatureSet(String),

    /// Pool settings outside their domain.
    #[error("invalid settings: {0}")]
    Settings(String),

    /// The primer3 executable could not be started.
    #[error("could not find primer3 executable '{executable}'")]
    ToolNotFound { executable: String },

    /// primer3 ran but exited unsuccessfully.
    #[error("primer3 failed: {executable} (status={status:?}, stderr='{stderr}')")]
    ToolFailed {
        executable: String,
        status: Option<i32>,
        stderr: String,
    },

    /// primer3 output could not be interpreted.
    #[error("unparseable primer3 output: {0}")]
    Primer3Output(String),

    /// Too many primer groups failed; the run is aborted.
    #[error("primer group {group} failed: {reason}")]
    PrimerGroup { group: String, reason: String },

    /// A pool-wide invariant does not hold. Always a logic defect.
    #[error("pool invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
