// ============================================================================
// Concurrent Task Lists
// ============================================================================
//
// Groups of independent, non-interacting tasks (bootstrap and maintenance
// steps) that run sequentially or on a tokio blocking pool and complete
// jointly. Task failures are captured per task and never fail the group.
//
// ============================================================================

pub mod list;
pub mod task;

pub use list::{ConcurrentContext, ConcurrentTaskList};
pub use task::{ConcurrentTask, TaskOutcome, TaskState};
