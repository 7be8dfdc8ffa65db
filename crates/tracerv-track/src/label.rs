use std::io::{self, Write};

/// One open function region on a tracker's label stack.
#[derive(Clone, Debug)]
pub struct LabelMeta {
    pub label: String,
    pub start_cycle: u64,
    pub end_cycle: u64,
    /// Stack depth at push time; printed with each record.
    pub indent: u64,
    /// The region was opened by an instruction with no source backing.
    pub asm_sequence: bool,
}

impl LabelMeta {
    pub fn write_start(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(
            out,
            "Indent: {}, Start label: {}, At cycle: {}",
            self.indent, self.label, self.start_cycle
        )
    }

    pub fn write_end(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(
            out,
            "Indent: {}, End label: {}, End cycle: {}",
            self.indent, self.label, self.end_cycle
        )
    }
}
