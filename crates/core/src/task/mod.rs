//! Generation task state.
//!
//! Plain data describing one generation job plus the pure reducer that both
//! delivery channels funnel their snapshots through.

mod reducer;
mod types;

pub use reducer::{apply_snapshot, user_facing_error};
pub use types::{AnalyzedMuscle, GenerationTask, Snapshot, TaskStatus};
