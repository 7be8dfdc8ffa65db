//! Hierarchical function-region reconstruction.
//!
//! A tracker consumes the resolved token stream for one binary and maintains
//! a stack of open function regions, emitting `Start label` / `End label`
//! records with cycle spans. Returns, tail calls and inline-asm straddles are
//! handled by the stack discipline; tokens the matcher could not attribute
//! are folded into synthetic `USERSPACE_ALL` regions.

mod label;
mod tracker;

pub use label::LabelMeta;
pub use tracker::{TraceTracker, USERSPACE_ALL};
