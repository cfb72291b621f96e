//! Tool System
//!
//! The two file tools the model can call through markup, and the
//! dispatcher that runs them against the local file system.

use std::fs::{self, File};
use std::io::Read;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// Default cap on a single read (1 MiB)
pub const DEFAULT_MAX_READ_BYTES: u64 = 1024 * 1024;

/// Tool call requested by the model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolInvocation {
    ReadFile { path: String },
    WriteFile { path: String, content: String },
}

impl ToolInvocation {
    /// Tag name used in the markup
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ReadFile { .. } => "read_file",
            Self::WriteFile { .. } => "write_to_file",
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::ReadFile { path } | Self::WriteFile { path, .. } => path,
        }
    }
}

/// Result from tool execution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success { text: String },
    Failure { reason: String },
}

impl ToolResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self::Success { text: text.into() }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// File text, confirmation, or failure reason
    pub fn output(&self) -> &str {
        match self {
            Self::Success { text } => text,
            Self::Failure { reason } => reason,
        }
    }
}

/// An invocation together with what came of it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolExecution {
    pub invocation: ToolInvocation,
    pub result: ToolResult,
}

impl ToolExecution {
    /// Render as the tool message appended to the conversation
    pub fn to_message_content(&self) -> String {
        let verb = if self.result.is_success() { "returned" } else { "failed" };
        format!(
            "[{} '{}' {}]\n{}",
            self.invocation.name(),
            self.invocation.path(),
            verb,
            self.result.output()
        )
    }
}

/// Runs file tool invocations.
///
/// Paths are joined onto `root` exactly as given. With the default empty
/// root they resolve against the process working directory, and absolute
/// paths or `..` components are honored as-is: there is no containment.
#[derive(Clone, Debug)]
pub struct FileTools {
    root: PathBuf,
    max_read_bytes: u64,
}

impl Default for FileTools {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTools {
    pub fn new() -> Self {
        Self {
            root: PathBuf::new(),
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
        }
    }

    /// Resolve relative paths against `root` instead of the working directory
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub const fn with_max_read_bytes(mut self, limit: u64) -> Self {
        self.max_read_bytes = limit;
        self
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    /// Run one invocation. Never fails: errors come back as `Failure`.
    pub fn dispatch(&self, invocation: &ToolInvocation) -> ToolResult {
        let outcome = match invocation {
            ToolInvocation::ReadFile { path } => self.read(path),
            ToolInvocation::WriteFile { path, content } => self.write(path, content),
        };

        match outcome {
            Ok(text) => {
                tracing::debug!(
                    tool = invocation.name(),
                    path = invocation.path(),
                    "tool succeeded"
                );
                ToolResult::success(text)
            }
            Err(e) => {
                tracing::warn!(
                    tool = invocation.name(),
                    path = invocation.path(),
                    error = %e,
                    "tool failed"
                );
                ToolResult::failure(e.to_string())
            }
        }
    }

    /// Full text of the file at `path`.
    ///
    /// Never reads more than the limit plus one byte, so a file that grows
    /// after the size check, or reports no size at all, still fails.
    pub fn read(&self, path: &str) -> Result<String, ToolError> {
        let limit = self.max_read_bytes;
        let too_large = |size| ToolError::FileTooLarge {
            path: path.into(),
            size,
            limit,
        };

        let file = File::open(self.resolve(path)).map_err(|e| ToolError::from_io(path, e))?;
        let meta = file.metadata().map_err(|e| ToolError::from_io(path, e))?;
        if meta.is_dir() {
            return Err(ToolError::IsADirectory { path: path.into() });
        }
        if meta.len() > limit {
            return Err(too_large(meta.len()));
        }

        let mut bytes = Vec::new();
        file.take(limit.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|e| ToolError::from_io(path, e))?;
        let read = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        if read > limit {
            return Err(too_large(read.max(meta.len())));
        }

        String::from_utf8(bytes).map_err(|_| ToolError::EncodingError { path: path.into() })
    }

    /// Write `content` to `path`, creating parent directories and
    /// replacing any existing file
    pub fn write(&self, path: &str, content: &str) -> Result<String, ToolError> {
        let resolved = self.resolve(path);

        if let Some(parent) = resolved.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ToolError::from_io(path, e))?;
        }
        fs::write(&resolved, content).map_err(|e| ToolError::from_io(path, e))?;

        Ok(format!(
            "Wrote {} bytes ({} lines) to '{}'",
            content.len(),
            content.lines().count(),
            path
        ))
    }
}
