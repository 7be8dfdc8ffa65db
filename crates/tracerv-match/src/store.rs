//! Collection of the loaded binaries: one kernel image, zero or more user
//! programs.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::debug;

use tracerv_obj::ObjdumpedBinary;

use crate::{BinRef, Result};

/// All binaries the matcher can attribute instructions to.
///
/// User binaries are indexed by position; `BinRef::User(i)` handles refer to
/// that position and stay valid for the store's lifetime.
#[derive(Debug)]
pub struct BinaryStore {
    kernel: ObjdumpedBinary,
    user: Vec<ObjdumpedBinary>,
}

impl BinaryStore {
    /// Load the kernel and every user program from the on-disk layout:
    /// `<dwarf_dir>/kernel/<kernel_file>` plus `<dwarf_dir>/user/<prog>/dwarf`.
    ///
    /// User programs load in parallel; enumeration order is sorted by name so
    /// handles are stable across runs.
    pub fn load(dwarf_dir: &Path, kernel_file: &str) -> Result<Self> {
        let kernel = ObjdumpedBinary::load("kernel", &dwarf_dir.join("kernel").join(kernel_file))?;

        let user_root = dwarf_dir.join("user");
        let mut programs: Vec<(String, PathBuf)> = Vec::new();
        if user_root.is_dir() {
            for entry in std::fs::read_dir(&user_root)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    programs.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
                }
            }
            programs.sort();
        } else {
            debug!(path = %user_root.display(), "no user program directory");
        }

        let user = programs
            .par_iter()
            .map(|(name, path)| ObjdumpedBinary::load(name, &path.join("dwarf")))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { kernel, user })
    }

    /// Build a store from already-loaded binaries.
    #[must_use]
    pub const fn new(kernel: ObjdumpedBinary, user: Vec<ObjdumpedBinary>) -> Self {
        Self { kernel, user }
    }

    #[must_use]
    pub const fn kernel(&self) -> &ObjdumpedBinary {
        &self.kernel
    }

    #[must_use]
    pub fn user(&self, idx: usize) -> &ObjdumpedBinary {
        &self.user[idx]
    }

    #[must_use]
    pub fn user_binaries(&self) -> &[ObjdumpedBinary] {
        &self.user
    }

    #[must_use]
    pub fn get(&self, bin: BinRef) -> &ObjdumpedBinary {
        match bin {
            BinRef::Kernel => &self.kernel,
            BinRef::User(idx) => &self.user[idx],
        }
    }
}
