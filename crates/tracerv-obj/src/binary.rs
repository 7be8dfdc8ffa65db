//! Dense instruction table for one disassembled binary.

use std::path::Path;

use tracing::info;

use crate::listing;
use crate::{Instr, ObjError, Result};

/// A binary reconstructed from its disassembly listing.
///
/// `text` is indexed by byte offset from `base_addr`: instruction starts hold
/// `Some`, interior bytes `None`. The matcher computes offsets from page
/// arithmetic, so lookups must tolerate any in-range offset.
#[derive(Debug)]
pub struct ObjdumpedBinary {
    name: String,
    base_addr: u64,
    text: Vec<Option<Instr>>,
}

impl ObjdumpedBinary {
    /// Load a binary from a listing file on disk.
    pub fn load(name: &str, path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let bin = Self::from_listing(name, &contents)
            .ok_or_else(|| ObjError::EmptyListing(path.to_path_buf()))?;
        info!(
            name = %bin.name,
            base_addr = format_args!("{:#x}", bin.base_addr),
            text_bytes = bin.text.len(),
            instructions = bin.instruction_count(),
            "loaded binary"
        );
        Ok(bin)
    }

    /// Build a binary from listing text. Returns `None` if the listing holds
    /// no instructions.
    pub fn from_listing(name: &str, contents: &str) -> Option<Self> {
        let entries = listing::parse(contents);
        let first = entries.first()?;
        let base_addr = first.instr.addr;
        let last = entries.last()?;
        let text_len = (last.instr.addr + last.len - base_addr) as usize;

        let mut text = vec![None; text_len];
        for entry in entries {
            let offset = (entry.instr.addr - base_addr) as usize;
            if offset < text.len() {
                text[offset] = Some(entry.instr);
            }
        }

        Some(Self {
            name: name.to_string(),
            base_addr,
            text,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn base_addr(&self) -> u64 {
        self.base_addr
    }

    /// Text section length in bytes.
    pub fn text_len(&self) -> u64 {
        self.text.len() as u64
    }

    /// Whether `addr` falls inside the text section.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base_addr && addr - self.base_addr < self.text_len()
    }

    /// Instruction at a byte offset from `base_addr`, if one starts there.
    pub fn instr_at(&self, offset: u64) -> Option<&Instr> {
        self.text.get(offset as usize).and_then(Option::as_ref)
    }

    /// Instruction at a virtual address.
    pub fn lookup(&self, addr: u64) -> Option<&Instr> {
        if self.contains(addr) {
            self.instr_at(addr - self.base_addr)
        } else {
            None
        }
    }

    fn instruction_count(&self) -> usize {
        self.text.iter().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
1000 <boot>:
    1000:\t4285                \tli\tt0,1
    1002:\t00c000ef          \tjal\tra,1008 <helper>
    1006:\t0001                \tnop
1008 <helper>:
    1008:\t00008067          \tjalr\tzero,0(ra)
";

    #[test]
    fn test_dense_table_layout() {
        let bin = ObjdumpedBinary::from_listing("prog", LISTING).unwrap();
        assert_eq!(bin.base_addr(), 0x1000);
        assert_eq!(bin.text_len(), 0xc);

        assert!(bin.instr_at(0).is_some());
        assert!(bin.instr_at(1).is_none()); // interior byte
        assert_eq!(bin.instr_at(2).unwrap().function_name, "boot");
        assert_eq!(bin.instr_at(8).unwrap().function_name, "helper");
    }

    #[test]
    fn test_lookup_bounds() {
        let bin = ObjdumpedBinary::from_listing("prog", LISTING).unwrap();
        assert!(bin.lookup(0xfff).is_none());
        assert!(bin.lookup(0x1000).is_some());
        assert!(bin.lookup(0x100c).is_none());
        assert!(bin.contains(0x100b));
        assert!(!bin.contains(0x100c));
    }

    #[test]
    fn test_empty_listing_rejected() {
        assert!(ObjdumpedBinary::from_listing("prog", "no instructions here\n").is_none());
    }
}
