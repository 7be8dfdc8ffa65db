//! Parser for `objdump -dl`-style disassembly listings.
//!
//! Recognized line forms:
//! - symbol headers: `ffffffff80000000 <start_kernel>:`
//! - source locations: `/path/to/file.c:123` (optionally with a
//!   `(discriminator N)` suffix)
//! - instructions: `ffffffff80000004:\t00c000ef\tjal\tra,...`
//!
//! Anything else (section banners, `name():` lines, blank lines) is skipped.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::Instr;

/// Mnemonics that transfer control with linkage.
const CALLSITE_MNEMONICS: [&str; 6] = ["jal", "jalr", "c.jal", "c.jalr", "call", "tail"];

/// A parsed instruction line plus its byte length.
pub struct ListingEntry {
    pub instr: Instr,
    pub len: u64,
}

/// Parse a whole listing into instruction entries, in address order as they
/// appear. Instructions before the first symbol header are dropped.
pub fn parse(listing: &str) -> Vec<ListingEntry> {
    let symbol_re = SYMBOL_RE
        .get_or_init(|| Regex::new(r"^([0-9a-fA-F]+) <([^>]+)>:\s*$").expect("symbol regex"));
    let instr_re = INSTR_RE.get_or_init(|| {
        Regex::new(r"^\s*([0-9a-fA-F]+):\s+([0-9a-fA-F]+)\s+(\S+)").expect("instr regex")
    });
    let source_re = SOURCE_RE.get_or_init(|| {
        Regex::new(r"^\S+:\d+(?:\s+\(discriminator \d+\))?\s*$").expect("source regex")
    });

    let mut entries = Vec::new();
    let mut current_fn: Option<String> = None;
    let mut pending_entry = false;
    let mut saw_source = false;
    let mut skipped = 0usize;

    for line in listing.lines() {
        if let Some(caps) = symbol_re.captures(line) {
            current_fn = Some(caps[2].to_string());
            pending_entry = true;
            saw_source = false;
            continue;
        }
        if source_re.is_match(line) {
            saw_source = true;
            continue;
        }
        if let Some(caps) = instr_re.captures(line) {
            let Some(function_name) = current_fn.clone() else {
                skipped += 1;
                continue;
            };
            let Ok(addr) = u64::from_str_radix(&caps[1], 16) else {
                skipped += 1;
                continue;
            };
            let raw = &caps[2];
            let mnemonic = &caps[3];
            entries.push(ListingEntry {
                instr: Instr {
                    addr,
                    function_name,
                    is_fn_entry: pending_entry,
                    is_callsite: CALLSITE_MNEMONICS.contains(&mnemonic),
                    in_asm_sequence: !saw_source,
                },
                len: (raw.len() / 2) as u64,
            });
            pending_entry = false;
        }
    }

    if skipped > 0 {
        debug!(skipped, "dropped unattributable listing lines");
    }
    entries
}

static SYMBOL_RE: OnceLock<Regex> = OnceLock::new();
static INSTR_RE: OnceLock<Regex> = OnceLock::new();
static SOURCE_RE: OnceLock<Regex> = OnceLock::new();
