//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use tracerv::{OutputFormat, TraceConfig, TriggerConfig};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "tracerv")]
#[command(about = "Instruction trace bridge - resolves retired instructions and logs call regions")]
#[command(version)]
pub struct Cli {
    /// Raw beat capture to replay (output format 1)
    #[arg(value_name = "BEATS")]
    pub input: PathBuf,

    /// Output file prefix; omitting it disables tracing entirely
    #[arg(long)]
    pub tracefile: Option<String>,

    /// Root directory of the kernel/user binary layout
    #[arg(long, default_value = "top")]
    pub dwarf_dir: PathBuf,

    /// Kernel listing file name under <dwarf-dir>/kernel/
    #[arg(long, default_value = "dwarf")]
    pub dwarf_file_name: String,

    /// Trace output format
    #[arg(long, value_enum, default_value = "fireperf")]
    pub trace_output_format: FormatArg,

    /// Trigger source selector (0 = always on, 1 = cycle range, 2 = PC range,
    /// 3 = instruction match)
    #[arg(long, default_value_t = 0)]
    pub trace_select: u32,

    /// Trigger start: decimal cycles, hex PC, or (mask<<32)|inst per selector
    #[arg(long)]
    pub trace_start: Option<String>,

    /// Trigger end, interpreted like --trace-start
    #[arg(long)]
    pub trace_end: Option<String>,

    /// Dump every beat as concatenated hex words to the trace file
    #[arg(long)]
    pub trace_test_output: bool,

    /// Side-log of decoded tokens for offline iteration
    #[arg(long, value_name = "PATH")]
    pub fireperf_log: Option<PathBuf>,

    /// Neighbor tokens consulted to disambiguate a candidate site
    #[arg(long, default_value_t = 3)]
    pub matching_depth: usize,

    /// Retired-token buffer capacity
    #[arg(long, default_value_t = 2048)]
    pub buffer_size: usize,

    /// Decode the multi-slot machine-mode beat layout instead of the
    /// userspace layout
    #[arg(long)]
    pub machine_mode: bool,

    /// Retirement slots per beat in machine mode (at most 7)
    #[arg(long, default_value_t = 6)]
    pub max_core_ipc: usize,

    /// Beats pulled per tick
    #[arg(long, default_value_t = 128)]
    pub stream_depth: usize,

    /// Tracer instance number, used in output file names
    #[arg(long, default_value_t = 0)]
    pub tracer_id: u32,

    /// Trace clock domain multiplier
    #[arg(long, default_value_t = 1)]
    pub clock_multiplier: u32,

    /// Trace clock domain divisor
    #[arg(long, default_value_t = 1)]
    pub clock_divisor: u32,

    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FormatArg {
    /// One text line per valid slot
    HumanReadable,
    /// Raw little-endian beat words
    Raw,
    /// Region-tracking pipeline
    Fireperf,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::HumanReadable => Self::HumanReadable,
            FormatArg::Raw => Self::Raw,
            FormatArg::Fireperf => Self::FirePerf,
        }
    }
}

impl Cli {
    pub fn to_config(&self) -> TraceConfig {
        let mut trigger = TriggerConfig {
            selector: self.trace_select,
            ..TriggerConfig::default()
        };
        if let Some(raw) = &self.trace_start {
            trigger.set_start(raw);
        }
        if let Some(raw) = &self.trace_end {
            trigger.set_end(raw);
        }

        TraceConfig {
            tracefile: self.tracefile.clone(),
            dwarf_dir: self.dwarf_dir.clone(),
            dwarf_file_name: self.dwarf_file_name.clone(),
            output_format: self.trace_output_format.into(),
            trigger,
            test_output: self.trace_test_output,
            fireperf_log: self.fireperf_log.clone(),
            matching_depth: self.matching_depth,
            buffer_size: self.buffer_size,
            userspace: !self.machine_mode,
            max_core_ipc: self.max_core_ipc,
            stream_depth: self.stream_depth,
            tracer_id: self.tracer_id,
        }
    }
}
