//! Error types for reconciliation and job submission

use thiserror::Error;

/// Error codes for programmatic handling and process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Configuration missing or invalid
    E001Validation,
    /// E002: Resource dependency graph has a cycle
    E002DependencyCycle,
    /// E003: Remote API call failed while reading state
    E003RemoteState,
    /// E004: Create/update action failed
    E004Apply,
    /// E005: Job run could not be started
    E005JobSubmission,
    /// E006: Remote job run reported failure
    E006JobFailed,
    /// E007: Local poll deadline exceeded
    E007Timeout,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E001Validation => "E001",
            Self::E002DependencyCycle => "E002",
            Self::E003RemoteState => "E003",
            Self::E004Apply => "E004",
            Self::E005JobSubmission => "E005",
            Self::E006JobFailed => "E006",
            Self::E007Timeout => "E007",
        }
    }

    /// Stable process exit code. 1 is left for unclassified failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::E001Validation => 2,
            Self::E002DependencyCycle => 3,
            Self::E003RemoteState => 4,
            Self::E004Apply => 5,
            Self::E005JobSubmission => 6,
            Self::E006JobFailed => 7,
            Self::E007Timeout => 8,
        }
    }
}

/// Errors that can occur while planning, applying or running jobs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GlueformError {
    /// Bad or missing configuration, unresolvable references
    #[error("[{code}] Invalid configuration: {message}")]
    Validation { code: &'static str, message: String },

    /// Dependency graph contains a cycle
    #[error("[{code}] Dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle {
        code: &'static str,
        /// Resource references forming the cycle, first repeated at the end
        cycle: Vec<String>,
    },

    /// Remote API call failed
    #[error("[{code}] Remote state error for '{resource}': {reason}")]
    RemoteState {
        code: &'static str,
        resource: String,
        reason: String,
    },

    /// Action failed after its dependencies succeeded
    #[error("[{code}] Apply failed for '{resource}': {reason}")]
    Apply {
        code: &'static str,
        resource: String,
        reason: String,
    },

    /// Starting the job run failed
    #[error("[{code}] Job submission failed for '{job}': {reason}")]
    JobSubmission {
        code: &'static str,
        job: String,
        reason: String,
    },

    /// Remote job run reported failure; `message` is the remote diagnostic verbatim
    #[error("[{code}] Job run {job}/{run_id} failed: {message}")]
    JobFailed {
        code: &'static str,
        job: String,
        run_id: String,
        message: String,
    },

    /// Poll deadline exceeded. The remote run is left running.
    #[error("[{code}] Job run {job}/{run_id} still running after {waited_secs}s; stopped waiting")]
    Timeout {
        code: &'static str,
        job: String,
        run_id: String,
        waited_secs: u64,
    },
}

impl GlueformError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            code: ErrorCode::E001Validation.as_str(),
            message: message.into(),
        }
    }

    pub fn dependency_cycle(cycle: Vec<String>) -> Self {
        Self::DependencyCycle {
            code: ErrorCode::E002DependencyCycle.as_str(),
            cycle,
        }
    }

    pub fn remote_state(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RemoteState {
            code: ErrorCode::E003RemoteState.as_str(),
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn apply(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Apply {
            code: ErrorCode::E004Apply.as_str(),
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn job_submission(job: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::JobSubmission {
            code: ErrorCode::E005JobSubmission.as_str(),
            job: job.into(),
            reason: reason.into(),
        }
    }

    pub fn job_failed(
        job: impl Into<String>,
        run_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::JobFailed {
            code: ErrorCode::E006JobFailed.as_str(),
            job: job.into(),
            run_id: run_id.into(),
            message: message.into(),
        }
    }

    pub fn timeout(job: impl Into<String>, run_id: impl Into<String>, waited_secs: u64) -> Self {
        Self::Timeout {
            code: ErrorCode::E007Timeout.as_str(),
            job: job.into(),
            run_id: run_id.into(),
            waited_secs,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::E001Validation,
            Self::DependencyCycle { .. } => ErrorCode::E002DependencyCycle,
            Self::RemoteState { .. } => ErrorCode::E003RemoteState,
            Self::Apply { .. } => ErrorCode::E004Apply,
            Self::JobSubmission { .. } => ErrorCode::E005JobSubmission,
            Self::JobFailed { .. } => ErrorCode::E006JobFailed,
            Self::Timeout { .. } => ErrorCode::E007Timeout,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.code().exit_code()
    }

    /// Human-readable cause without the code prefix, used in reports.
    pub fn reason(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::DependencyCycle { cycle, .. } => format!("cycle {}", cycle.join(" -> ")),
            Self::RemoteState { reason, .. }
            | Self::Apply { reason, .. }
            | Self::JobSubmission { reason, .. } => reason.clone(),
            Self::JobFailed { message, .. } => message.clone(),
            Self::Timeout { waited_secs, .. } => format!("timed out after {waited_secs}s"),
        }
    }
}

/// Result type alias for GlueformError
pub type Result<T> = std::result::Result<T, GlueformError>;
