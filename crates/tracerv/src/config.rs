//! Bridge configuration.

use std::path::PathBuf;

/// Trace output format selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// One text line per valid slot.
    HumanReadable,
    /// Raw little-endian beat words, verbatim.
    Raw,
    /// Region-tracking pipeline (matcher + per-binary trackers).
    FirePerf,
}

impl OutputFormat {
    /// Map the numeric runtime selector. Must stay consistent with the
    /// simulation manager's `output_format` documentation.
    #[must_use]
    pub const fn from_selector(selector: u64) -> Option<Self> {
        match selector {
            0 => Some(Self::HumanReadable),
            1 => Some(Self::Raw),
            2 => Some(Self::FirePerf),
            _ => None,
        }
    }
}

/// FPGA-side trigger programming, decoded from the overloaded
/// `trace-start` / `trace-end` arguments.
///
/// The same argument strings serve three selector modes, so every
/// interpretation is computed eagerly: decimal for cycle counts, hex for PC
/// bounds, and `(mask << 32) | inst` for instruction matches.
#[derive(Clone, Debug)]
pub struct TriggerConfig {
    pub selector: u32,
    pub start_cycle: u64,
    pub end_cycle: u64,
    pub start_pc: u64,
    pub stop_pc: u64,
    pub start_insn: u32,
    pub start_insn_mask: u32,
    pub stop_insn: u32,
    pub stop_insn_mask: u32,
}

impl TriggerConfig {
    pub fn set_start(&mut self, raw: &str) {
        let (cycle, mask_and_insn) = Self::decode(raw);
        self.start_cycle = cycle;
        self.start_pc = mask_and_insn;
        self.start_insn = mask_and_insn as u32;
        self.start_insn_mask = (mask_and_insn >> 32) as u32;
    }

    pub fn set_end(&mut self, raw: &str) {
        let (cycle, mask_and_insn) = Self::decode(raw);
        self.end_cycle = cycle;
        self.stop_pc = mask_and_insn;
        self.stop_insn = mask_and_insn as u32;
        self.stop_insn_mask = (mask_and_insn >> 32) as u32;
    }

    fn decode(raw: &str) -> (u64, u64) {
        let cycle = raw.parse::<u64>().unwrap_or(0);
        let hex = u64::from_str_radix(raw.trim_start_matches("0x"), 16).unwrap_or(0);
        (cycle, hex)
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            selector: 0,
            start_cycle: 0,
            end_cycle: u64::MAX,
            start_pc: 0,
            stop_pc: 0,
            start_insn: 0,
            start_insn_mask: 0,
            stop_insn: 0,
            stop_insn_mask: 0,
        }
    }
}

/// Everything the bridge needs at construction.
#[derive(Clone, Debug)]
pub struct TraceConfig {
    /// Output file prefix. `None` disables tracing entirely: beats are pulled
    /// and discarded.
    pub tracefile: Option<String>,
    /// Root of the binary layout (`<dwarf_dir>/kernel`, `<dwarf_dir>/user`).
    pub dwarf_dir: PathBuf,
    /// Kernel listing file name under `<dwarf_dir>/kernel/`. Required in
    /// fireperf mode.
    pub dwarf_file_name: String,
    pub output_format: OutputFormat,
    pub trigger: TriggerConfig,
    /// Dump every beat as concatenated hex words for reference diffing.
    pub test_output: bool,
    /// Optional side-log of decoded tokens for offline iteration.
    pub fireperf_log: Option<PathBuf>,
    pub matching_depth: usize,
    pub buffer_size: usize,
    /// Userspace beat layout (slot 0 plus inst/satp/priv words) vs. the
    /// multi-slot machine layout.
    pub userspace: bool,
    pub max_core_ipc: usize,
    /// Beats pulled per tick.
    pub stream_depth: usize,
    /// Suffix for output file names (`-C<n>`).
    pub tracer_id: u32,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            tracefile: None,
            dwarf_dir: PathBuf::from("top"),
            dwarf_file_name: "dwarf".to_string(),
            output_format: OutputFormat::FirePerf,
            trigger: TriggerConfig::default(),
            test_output: false,
            fireperf_log: None,
            matching_depth: 3,
            buffer_size: 2048,
            userspace: true,
            max_core_ipc: 6,
            stream_depth: 128,
            tracer_id: 0,
        }
    }
}
