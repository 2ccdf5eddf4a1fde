//! ganttkit - task hierarchy and critical-path engine for Gantt dashboards
//!
//! Turns loosely-typed task records from a project-tracking REST API into an
//! ordered list of chart rows (project → task chain → assignee → task), with
//! critical-path marking. Upstream calls go through a request executor that
//! refreshes expired OAuth tokens once per session and retries once.

pub mod config;
pub mod core;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod session;
pub mod upstream;

// Re-exports
pub use config::Config;
pub use core::{GanttRow, Project, RenderRow, Task, TaskFilter, TaskStatus};
pub use error::{EngineError, ExecError};
pub use executor::{Executed, RequestExecutor};
pub use pipeline::{compute_gantt_rows, GanttPipeline, GanttView, RawDump};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore};
pub use upstream::{OAuthRefresher, TokenRefresher, UpstreamClient, UpstreamFailure};

/// Result type alias
pub type Result<T> = anyhow::Result<T>;
