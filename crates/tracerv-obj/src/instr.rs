use std::fmt;

/// One decoded instruction of a binary's text section.
///
/// The flags drive the region tracker: `is_fn_entry` distinguishes a call
/// from sequential execution, `is_callsite` marks the jump-and-link forms,
/// and `in_asm_sequence` marks instructions with no source-level backing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instr {
    /// Virtual address of this instruction within its binary.
    pub addr: u64,
    /// Enclosing function symbol.
    pub function_name: String,
    /// First instruction of the enclosing function.
    pub is_fn_entry: bool,
    /// Jump-and-link instruction (`jal`, `jalr`, compressed or pseudo forms).
    pub is_callsite: bool,
    /// No source-location line preceded this instruction in the listing.
    pub in_asm_sequence: bool,
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {:x}, {}, {}",
            self.function_name, self.addr, self.is_callsite, self.is_fn_entry
        )
    }
}
