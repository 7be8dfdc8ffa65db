//! Bridge driver: beat ingestion, token decode, resolution, routing.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use tracing::{debug, info};

use tracerv_match::{BinRef, BinaryStore, Matcher, ReverseIndex, Token, sign_extend_40};
use tracerv_track::{TraceTracker, USERSPACE_ALL};

use crate::clock::ClockInfo;
use crate::config::{OutputFormat, TraceConfig};
use crate::files::TraceOutputs;
use crate::mmio::{MmioWrite, TracerReg};
use crate::stream::{BeatStream, STREAM_WIDTH_BYTES, VALID_MASK};
use crate::{Error, Result};

/// Words per beat group.
const WORDS_PER_BEAT: usize = 8;
/// The beat layout carries at most this many retirement slots.
const MAX_SUPPORTED_IPC: usize = 7;

/// Tracker slots: kernel and misc first, user binaries after.
const KERNEL_TRACKER: usize = 0;
const MISC_TRACKER: usize = 1;
const USER_TRACKER_BASE: usize = 2;

/// Read little-endian u64 from bytes.
#[inline]
fn read_le64(data: &[u8]) -> u64 {
    u64::from_le_bytes([
        data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
    ])
}

/// The trace bridge driver.
///
/// Owns the transport, the MMIO register interface, the output files and (in
/// fireperf mode) the resolution pipeline. `tick` is driven by an outer loop;
/// everything runs synchronously on the caller's thread.
pub struct TracerBridge<S, M> {
    config: TraceConfig,
    clock: ClockInfo,
    stream: S,
    mmio: M,
    outputs: Option<TraceOutputs>,
    fireperf: Option<FirePerfPipeline>,
}

/// Matcher plus per-binary trackers for the region-tracking output mode.
struct FirePerfPipeline {
    matcher: Matcher,
    trackers: Vec<TraceTracker<BufWriter<File>>>,
    side_log: Option<BufWriter<File>>,
}

impl<S: BeatStream, M: MmioWrite> TracerBridge<S, M> {
    pub fn new(config: TraceConfig, clock: ClockInfo, stream: S, mmio: M) -> Result<Self> {
        if config.max_core_ipc > MAX_SUPPORTED_IPC {
            return Err(Error::Config(format!(
                "max_core_ipc {} exceeds the supported bound of {MAX_SUPPORTED_IPC}",
                config.max_core_ipc
            )));
        }
        if config.buffer_size == 0 {
            return Err(Error::Config("buffer size must be nonzero".to_string()));
        }

        let Some(prefix) = config.tracefile.clone() else {
            info!(
                tracer_id = config.tracer_id,
                "tracing disabled: no tracefile given"
            );
            return Ok(Self {
                config,
                clock,
                stream,
                mmio,
                outputs: None,
                fireperf: None,
            });
        };

        let mut outputs = TraceOutputs::create(&prefix, config.tracer_id)?;
        let fireperf = if config.output_format == OutputFormat::FirePerf {
            Some(FirePerfPipeline::new(&config, &mut outputs)?)
        } else {
            None
        };

        Ok(Self {
            config,
            clock,
            stream,
            mmio,
            outputs: Some(outputs),
            fireperf,
        })
    }

    #[must_use]
    pub const fn trace_enabled(&self) -> bool {
        self.outputs.is_some()
    }

    /// Program the FPGA-side trigger registers.
    pub fn init(&mut self) {
        if self.outputs.is_none() {
            // Keep the hardware from collecting tokens nobody will read.
            self.mmio.write(TracerReg::TraceEnable, 0);
        }

        let trigger = self.config.trigger.clone();
        self.mmio.write(TracerReg::TriggerSelector, trigger.selector);
        match trigger.selector {
            1 => {
                let start = self.clock.to_local_cycles(trigger.start_cycle);
                let end = self.clock.to_local_cycles(trigger.end_cycle);
                self.mmio
                    .write(TracerReg::CycleCountStartHigh, (start >> 32) as u32);
                self.mmio.write(TracerReg::CycleCountStartLow, start as u32);
                self.mmio
                    .write(TracerReg::CycleCountEndHigh, (end >> 32) as u32);
                self.mmio.write(TracerReg::CycleCountEndLow, end as u32);
                info!(start, end, "trigger enabled on cycle range");
            }
            2 => {
                self.mmio
                    .write(TracerReg::PcStartHigh, (trigger.start_pc >> 32) as u32);
                self.mmio
                    .write(TracerReg::PcStartLow, trigger.start_pc as u32);
                self.mmio
                    .write(TracerReg::PcEndHigh, (trigger.stop_pc >> 32) as u32);
                self.mmio.write(TracerReg::PcEndLow, trigger.stop_pc as u32);
                info!(
                    start_pc = format_args!("{:#x}", trigger.start_pc),
                    stop_pc = format_args!("{:#x}", trigger.stop_pc),
                    "trigger enabled on instruction address range"
                );
            }
            3 => {
                self.mmio.write(TracerReg::StartInst, trigger.start_insn);
                self.mmio
                    .write(TracerReg::StartInstMask, trigger.start_insn_mask);
                self.mmio.write(TracerReg::EndInst, trigger.stop_insn);
                self.mmio
                    .write(TracerReg::EndInstMask, trigger.stop_insn_mask);
                info!(
                    start_insn = format_args!("{:#x}", trigger.start_insn),
                    start_mask = format_args!("{:#x}", trigger.start_insn_mask),
                    stop_insn = format_args!("{:#x}", trigger.stop_insn),
                    stop_mask = format_args!("{:#x}", trigger.stop_insn_mask),
                    "trigger enabled on instruction match"
                );
            }
            _ => {
                // Selector 0 permanently enables the trigger.
                info!("no trigger selected; tracing runs for the whole simulation");
            }
        }
        self.mmio.write(TracerReg::InitDone, 1);
    }

    /// Pull and process one batch of beats. Returns the bytes received; zero
    /// means the stream is dry.
    pub fn tick(&mut self) -> Result<usize> {
        self.process_tokens(self.config.stream_depth, self.config.stream_depth)
    }

    /// Pull up to `num_beats` beats (blocking for at least `min_beats`) and
    /// process them according to the configured output mode.
    pub fn process_tokens(&mut self, num_beats: usize, min_beats: usize) -> Result<usize> {
        let mut buf = vec![0u8; num_beats * STREAM_WIDTH_BYTES];
        let received = self
            .stream
            .pull(&mut buf, min_beats * STREAM_WIDTH_BYTES)?;

        // Without a tracefile the bridge still drains the stream.
        if self.outputs.is_none() {
            return Ok(received);
        }

        let word_count = received / 8;
        let mut words = Vec::with_capacity(word_count);
        for chunk in buf[..word_count * 8].chunks_exact(8) {
            words.push(read_le64(chunk));
        }

        for group in words.chunks_exact(WORDS_PER_BEAT) {
            if self.config.test_output {
                self.write_test_output(group)?;
            } else {
                match self.config.output_format {
                    OutputFormat::HumanReadable => self.write_human_readable(group)?,
                    OutputFormat::Raw => self.write_raw(group)?,
                    OutputFormat::FirePerf => self.ingest_group(group)?,
                }
            }
        }
        Ok(received)
    }

    /// Drain the transport and the retired buffer, close every open region,
    /// and concatenate the per-binary files into the final output.
    pub fn flush(&mut self) -> Result<()> {
        if self.trace_enabled() {
            while self.process_tokens(self.config.stream_depth, 0)? > 0 {}
        }
        if let Some(fireperf) = self.fireperf.as_mut() {
            fireperf.flush()?;
            let stats = fireperf.matcher.stats();
            info!(
                matched_kernel = stats.matched_kernel,
                matched_user = stats.matched_user,
                unmatched = stats.unmatched,
                backprop_stamped = stats.backprop_stamped,
                "resolution totals"
            );
        }
        if let Some(outputs) = self.outputs.as_mut() {
            outputs.finalize()?;
        }
        Ok(())
    }

    /// Reference dump: all eight words of the beat, most significant first.
    fn write_test_output(&mut self, words: &[u64]) -> io::Result<()> {
        let Some(outputs) = self.outputs.as_mut() else {
            return Ok(());
        };
        let out = outputs.final_writer();
        for q in (0..WORDS_PER_BEAT).rev() {
            write!(out, "{:016x}", words[q])?;
        }
        writeln!(out)
    }

    fn write_human_readable(&mut self, words: &[u64]) -> io::Result<()> {
        let Some(outputs) = self.outputs.as_mut() else {
            return Ok(());
        };
        let out = outputs.final_writer();
        if self.config.userspace {
            if words[1] & VALID_MASK != 0 {
                writeln!(
                    out,
                    "Cycle: {:016} I0: {:016x} Inst: {:016x} satp: {:016x} priv: {:016x}",
                    words[0],
                    sign_extend_40(words[1]),
                    words[2],
                    words[3],
                    words[4]
                )?;
            }
        } else {
            for q in 0..self.config.max_core_ipc {
                let word = words[1 + q];
                if word & VALID_MASK == 0 {
                    break;
                }
                writeln!(out, "Cycle: {:016} I{q}: {:016x}", words[0], word & !VALID_MASK)?;
            }
        }
        Ok(())
    }

    /// Raw little-endian words, verbatim.
    fn write_raw(&mut self, words: &[u64]) -> io::Result<()> {
        let Some(outputs) = self.outputs.as_mut() else {
            return Ok(());
        };
        let out = outputs.final_writer();
        for word in words {
            out.write_all(&word.to_le_bytes())?;
        }
        Ok(())
    }

    /// Decode the beat's retirement slots into tokens and run them through
    /// the matcher.
    fn ingest_group(&mut self, words: &[u64]) -> Result<()> {
        let Some(fireperf) = self.fireperf.as_mut() else {
            return Ok(());
        };
        let cycle = words[0];
        if self.config.userspace {
            if words[1] & VALID_MASK != 0 {
                let token = Token::new(
                    cycle,
                    sign_extend_40(words[1]),
                    words[2],
                    words[3],
                    words[4] as u8,
                );
                fireperf.log_token(&token)?;
                if let Some(resolved) = fireperf.matcher.feed(token) {
                    fireperf.route(&resolved)?;
                }
            }
        } else {
            for q in 0..self.config.max_core_ipc {
                if words[1 + q] & VALID_MASK == 0 {
                    break;
                }
                let token = Token::new(cycle, sign_extend_40(words[1 + q]), 0, 0, 0);
                if let Some(resolved) = fireperf.matcher.feed(token) {
                    fireperf.route(&resolved)?;
                }
            }
        }
        Ok(())
    }
}

impl FirePerfPipeline {
    fn new(config: &TraceConfig, outputs: &mut TraceOutputs) -> Result<Self> {
        if config.dwarf_file_name.is_empty() {
            return Err(Error::Config(
                "fireperf output requires a kernel dwarf file name".to_string(),
            ));
        }

        let store = BinaryStore::load(&config.dwarf_dir, &config.dwarf_file_name)?;
        let index = ReverseIndex::build(&store, &config.dwarf_dir)?;

        let mut trackers = Vec::with_capacity(USER_TRACKER_BASE + store.user_binaries().len());
        trackers.push(TraceTracker::new(
            "kernel",
            BufWriter::new(outputs.open_part("kernel")?),
        ));
        trackers.push(TraceTracker::new(
            "misc",
            BufWriter::new(outputs.open_part("misc")?),
        ));
        for binary in store.user_binaries() {
            let name = binary.name();
            trackers.push(TraceTracker::new(
                name,
                BufWriter::new(outputs.open_part(name)?),
            ));
        }
        debug!(
            user_binaries = store.user_binaries().len(),
            "fireperf pipeline ready"
        );

        let side_log = match &config.fireperf_log {
            Some(path) => Some(BufWriter::new(File::create(path)?)),
            None => None,
        };

        Ok(Self {
            matcher: Matcher::new(store, index, config.buffer_size, config.matching_depth),
            trackers,
            side_log,
        })
    }

    /// Hand a resolved token to its tracker; anything unattributed goes to
    /// the misc tracker as a `USERSPACE_ALL` run. A token that does resolve
    /// closes any such run first.
    fn route(&mut self, token: &Token) -> io::Result<()> {
        if let Some(res) = token.resolution {
            if let Some(instr) = self
                .matcher
                .store()
                .get(res.bin)
                .instr_at(res.text_offset)
            {
                self.trackers[MISC_TRACKER].end_userspace_run()?;
                return self.trackers[tracker_slot(res.bin)].add_instruction(
                    token.cycle_count,
                    token.iaddr,
                    &instr.function_name,
                    Some(instr),
                );
            }
        }
        self.trackers[MISC_TRACKER].add_instruction(
            token.cycle_count,
            token.iaddr,
            USERSPACE_ALL,
            None,
        )
    }

    fn log_token(&mut self, token: &Token) -> io::Result<()> {
        if let Some(log) = &mut self.side_log {
            writeln!(
                log,
                "Cycle: {:016} I0: {:016x} Inst: {:016x} satp: {:016x} priv: {:016x}",
                token.cycle_count, token.iaddr, token.inst, token.satp, token.priv_level
            )?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        while let Some(token) = self.matcher.drain_one() {
            self.route(&token)?;
        }
        for tracker in &mut self.trackers {
            tracker.flush_stack()?;
        }
        if let Some(log) = &mut self.side_log {
            log.flush()?;
        }
        Ok(())
    }
}

const fn tracker_slot(bin: BinRef) -> usize {
    match bin {
        BinRef::Kernel => KERNEL_TRACKER,
        BinRef::User(idx) => USER_TRACKER_BASE + idx,
    }
}
