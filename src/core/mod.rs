//! Core primitives for the Planfs state plane.
//!
//! Everything mutation-shaped flows through here: the frontmatter codec, the
//! diff engine, the instruction/plan model, the executor, receipts/journals,
//! and the saga composer object handlers build on.

pub mod diff;
pub mod document;
pub mod error;
pub mod executor;
pub mod plan;
pub mod receipt;
pub mod saga;
pub mod store;
pub mod time;
