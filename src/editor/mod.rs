//! Anchor-based editing: matching pipeline, normalization ladder, fuzzy
//! paths, diffs, backups, and invertible batch application.

pub mod backup;
pub mod diff;
pub mod edit;
pub mod engine;
pub mod fuzzy;
pub mod matcher;
pub mod normalize;

pub use edit::{Edit, EditOperation, EditResult, ToolSuggestion};
pub use engine::{ApplyOptions, DiffMode, EditorEngine};
