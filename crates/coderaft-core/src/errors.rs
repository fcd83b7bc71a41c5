//! Error types and handling
//!
//! Domain-specific error types shared by every component.

use thiserror::Error;

/// Domain errors produced while orchestrating an island.
#[derive(Error, Debug)]
pub enum CoderaftError {
    /// The container engine daemon could not be reached.
    #[error("container engine unavailable: {message}")]
    EngineUnavailable { message: String },

    /// The desktop engine did not become ready before the deadline.
    #[error("container engine did not start within the allotted time")]
    EngineStartupTimeout,

    /// A referenced image does not exist.
    #[error("image not found: {reference}")]
    ImageNotFound { reference: String },

    /// `image_pull` failed.
    #[error("image pull failed for {reference}: {message}")]
    PullFailed { reference: String, message: String },

    /// Writing the build context failed.
    #[error("failed to write build context: {message}")]
    BuildContextError { message: String },

    /// The engine's build invocation exited non-zero.
    #[error("image build failed: {stderr}")]
    BuildFailed { stderr: String },

    /// A referenced container does not exist.
    #[error("container not found: {name}")]
    ContainerNotFound { name: String },

    /// `container_create` failed.
    #[error("failed to create container {name}: {message}")]
    CreateFailed { name: String, message: String },

    /// `container_start` failed.
    #[error("failed to start container {name}: {message}")]
    StartFailed { name: String, message: String },

    /// `container_stop` failed.
    #[error("failed to stop container {name}: {message}")]
    StopFailed { name: String, message: String },

    /// `container_remove` failed.
    #[error("failed to remove container {name}: {message}")]
    RemoveFailed { name: String, message: String },

    /// An in-container exec exited non-zero.
    #[error("command failed with exit code {exit_code}: {stderr}")]
    ExecFailed { exit_code: i64, stderr: String },

    /// `wait_ready` expired before the container reached `running`.
    #[error("container {name} did not become ready within the allotted time")]
    ReadyTimeout { name: String },

    /// A project name failed validation.
    #[error("invalid project name: {name}")]
    InvalidProjectName { name: String },

    /// A volume specification failed validation.
    #[error("invalid volume specification: {spec}")]
    InvalidVolume { spec: String },

    /// A shell command failed validation before it was executed.
    #[error("invalid command: {message}")]
    InvalidCommand { message: String },

    /// The project configuration could not be parsed.
    #[error("failed to parse project configuration: {message}")]
    ConfigParseError { message: String },

    /// Local I/O failure (build context, history file, wrapper scripts).
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Convenience alias for Results carrying a [`CoderaftError`].
pub type Result<T> = std::result::Result<T, CoderaftError>;
