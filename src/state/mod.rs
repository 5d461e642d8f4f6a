//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `SourceState`: the per-source crawl state machine
//! - `FailureType` and `classify`: the failure taxonomy every failed source is filed under

mod failure;
mod source_state;

// Re-export main types
pub use failure::{
    classify, FailureRecord, FailureType, MAX_DETAIL_CHARS, RENDER_INSUFFICIENT_BYTES,
};
pub use source_state::SourceState;
