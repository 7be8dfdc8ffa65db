//! Loader for disassembled binaries consumed by the trace pipeline.
//!
//! Each traced binary (the kernel image and every user program) is shipped as
//! a pre-generated `objdump -dl`-style listing. Parsing it yields a dense
//! per-byte instruction table so the matcher can resolve an arbitrary text
//! offset in O(1).

mod binary;
mod instr;
mod listing;

pub use binary::ObjdumpedBinary;
pub use instr::Instr;

use std::path::PathBuf;

use thiserror::Error;

/// Listing loader errors.
#[derive(Error, Debug)]
pub enum ObjError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no instructions found in listing {0}")]
    EmptyListing(PathBuf),
}

pub type Result<T> = std::result::Result<T, ObjError>;
