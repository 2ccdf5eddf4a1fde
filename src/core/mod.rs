//! Core engine - normalization, critical path, row hierarchy, flattening

pub mod critical;
pub mod directory;
pub mod filter;
pub mod flatten;
pub mod hierarchy;
pub mod normalize;
pub mod task;

pub use critical::{analyze, mark_critical, CriticalPath};
pub use directory::{Department, Directory, User};
pub use filter::{SummaryStats, TaskFilter};
pub use flatten::{flatten, PresentationHints, RenderKind, RenderRow};
pub use hierarchy::{build_rows, CollapseState, GanttRow, HierarchyBuilder, RowKind};
pub use normalize::{normalize, NormalizedBatch, Normalizer};
pub use task::{Project, Task, TaskStatus, UNASSIGNED};
