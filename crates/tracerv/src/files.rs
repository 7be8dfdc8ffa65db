//! Output file management.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use tracing::debug;

use crate::Result;

/// The set of trace output files for one bridge instance.
///
/// A final file `<prefix>-C<n>` is opened up front; per-binary part files
/// `<prefix>-<name>-C<n>` are registered as they are opened and concatenated
/// into the final file, in registration order, at shutdown.
#[derive(Debug)]
pub struct TraceOutputs {
    prefix: String,
    tracer_id: u32,
    final_file: BufWriter<File>,
    parts: Vec<(String, PathBuf)>,
}

impl TraceOutputs {
    pub fn create(prefix: &str, tracer_id: u32) -> Result<Self> {
        let final_path = PathBuf::from(format!("{prefix}-C{tracer_id}"));
        let final_file = BufWriter::new(File::create(&final_path)?);
        Ok(Self {
            prefix: prefix.to_string(),
            tracer_id,
            final_file,
            parts: Vec::new(),
        })
    }

    /// Open a per-binary part file and register it for concatenation.
    pub fn open_part(&mut self, name: &str) -> Result<File> {
        let path = PathBuf::from(format!("{}-{}-C{}", self.prefix, name, self.tracer_id));
        let file = File::create(&path)?;
        self.parts.push((name.to_string(), path));
        Ok(file)
    }

    /// Writer for the non-fireperf output modes.
    pub fn final_writer(&mut self) -> &mut impl Write {
        &mut self.final_file
    }

    /// Concatenate the part files into the final file, in the order they were
    /// opened. Part writers must have been flushed by the caller.
    pub fn finalize(&mut self) -> Result<()> {
        for (name, path) in &self.parts {
            let mut part = File::open(path)?;
            let copied = io::copy(&mut part, &mut self.final_file)?;
            debug!(part = name, bytes = copied, "concatenated trace part");
        }
        self.final_file.flush()?;
        Ok(())
    }
}
