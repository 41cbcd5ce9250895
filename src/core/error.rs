use thiserror::Error;

#[derive(Debug, Error)]
pub enum FreeGpusError {
    /// The diagnostics tool is missing, could not be spawned, or exited non-zero.
    #[error("external tool `{command}` failed: {reason}")]
    ExternalTool { command: String, reason: String },

    /// The diagnostics output did not have the expected shape.
    #[error("failed to parse diagnostics output: {0}")]
    Parse(String),

    /// A process id could not be mapped to a user; it may have exited in the meantime.
    #[error("failed to resolve owner of process {pid}: {reason}")]
    UserLookup { pid: u32, reason: String },
}

pub type Result<T, E = FreeGpusError> = std::result::Result<T, E>;
