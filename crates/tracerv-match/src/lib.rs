//! Attribution of retired instructions to known binaries.
//!
//! User processes share virtual addresses, and the physical page backing a
//! virtual page changes over time, so a single `(address, instruction)`
//! observation is rarely conclusive. The matcher cross-checks each token
//! against its retired neighbors through a per-page reverse index and
//! back-propagates confirmed resolutions onto still-buffered tokens.

mod buffer;
mod index;
mod matcher;
mod store;
mod token;

pub use buffer::RetiredBuffer;
pub use index::{PageSite, ReverseIndex};
pub use matcher::{MatchStats, Matcher};
pub use store::BinaryStore;
pub use token::{BinRef, Resolution, Token, sign_extend_40};

use thiserror::Error;

/// Bytes per page of the simulated MMU.
pub const PAGE_SIZE: u64 = 4096;
/// Reverse-index slots per page (RISC-V instructions are 2-byte aligned).
pub const INSTR_SLOTS_PER_PAGE: usize = 2048;
/// Physical base of simulated DRAM; the kernel's identity-mapped alias.
pub const DRAM_ROOT: u64 = 0x8000_0000;
/// Privilege level of user-mode tokens.
pub const PRIV_USER: u8 = 0;

/// Matching pipeline errors.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("binary load error: {0}")]
    Obj(#[from] tracerv_obj::ObjError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MatchError>;
