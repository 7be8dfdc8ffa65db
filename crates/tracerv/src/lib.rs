//! Host-side trace bridge for a simulated RISC-V core.
//!
//! Ingests fixed-width beats from the simulation transport, attributes each
//! retired instruction to a known binary, and reconstructs per-binary
//! function-region logs.
//!
//! # Example
//!
//! ```ignore
//! use tracerv::{ClockInfo, NullMmio, FileReplay, TraceConfig, TracerBridge};
//!
//! let stream = FileReplay::open("beats.bin")?;
//! let mut bridge = TracerBridge::new(TraceConfig::default(), ClockInfo::default(), stream, NullMmio)?;
//! bridge.init();
//! while bridge.tick()? > 0 {}
//! bridge.flush()?;
//! ```

// Re-export from sub-crates
pub use tracerv_match::{
    BinRef, BinaryStore, MatchStats, Matcher, Resolution, RetiredBuffer, ReverseIndex, Token,
    sign_extend_40,
};
pub use tracerv_obj::{Instr, ObjdumpedBinary};
pub use tracerv_track::{LabelMeta, TraceTracker, USERSPACE_ALL};

mod bridge;
mod clock;
mod config;
mod files;
mod mmio;
mod stream;

pub use bridge::TracerBridge;
pub use clock::ClockInfo;
pub use config::{OutputFormat, TraceConfig, TriggerConfig};
pub use files::TraceOutputs;
pub use mmio::{MmioWrite, NullMmio, RecordingMmio, TracerReg};
pub use stream::{BeatStream, FileReplay, ReadStream, STREAM_WIDTH_BYTES, VALID_MASK};

use thiserror::Error;

/// Bridge errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("binary load error: {0}")]
    Obj(#[from] tracerv_obj::ObjError),
    #[error("matching pipeline error: {0}")]
    Match(#[from] tracerv_match::MatchError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
