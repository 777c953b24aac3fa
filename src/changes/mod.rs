//! Change sets and field-level diffs between flag snapshots.

mod change_set;
mod diff;

pub use change_set::{ChangeSet, FlagChange, FlagDefinition, FlagSnapshot};
pub use diff::{FieldChange, MAX_DIFF_DEPTH, field_diff};
