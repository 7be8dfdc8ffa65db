//! Per-binary region tracker.

use std::io::{self, Write};

use tracing::warn;

use tracerv_obj::Instr;

use crate::LabelMeta;

/// Synthetic label covering runs of instructions with no attribution.
pub const USERSPACE_ALL: &str = "USERSPACE_ALL";

/// Reconstructs the call-region hierarchy for one binary.
///
/// Tokens must arrive in retirement order. Every `Start label` record gains a
/// matching `End label` by the time [`TraceTracker::flush_stack`] completes.
#[derive(Debug)]
pub struct TraceTracker<W: Write> {
    name: String,
    out: W,
    label_stack: Vec<LabelMeta>,
    last_instr: Option<Instr>,
}

impl<W: Write> TraceTracker<W> {
    pub fn new(name: &str, out: W) -> Self {
        Self {
            name: name.to_string(),
            out,
            label_stack: Vec::new(),
            last_instr: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consume one resolved token. `instr` is `None` only on the synthetic
    /// `USERSPACE_ALL` path; an absent instruction behaves like a plain
    /// function entry.
    pub fn add_instruction(
        &mut self,
        cycle: u64,
        iaddr: u64,
        label: &str,
        instr: Option<&Instr>,
    ) -> io::Result<()> {
        let in_asm = instr.is_some_and(|i| i.in_asm_sequence);
        let is_return_like = instr.is_some_and(|i| i.is_callsite || !i.is_fn_entry);

        // A pending unattributed run ends as soon as a differently-labeled
        // token shows up.
        if self
            .top()
            .is_some_and(|top| top.label == USERSPACE_ALL && label != USERSPACE_ALL)
        {
            self.pop_and_end()?;
        }

        if let Some(top) = self.top_mut().filter(|top| top.label == label) {
            // Continuation of the open region.
            top.end_cycle = cycle;
        } else if in_asm && self.top().is_some_and(|top| top.asm_sequence) {
            // Adjacent asm sequences replace each other at the same depth
            // rather than nesting.
            self.pop_and_end()?;
            self.push_and_start(label, cycle, in_asm)?;
        } else if is_return_like && self.top().is_some() {
            self.unwind_to(label, cycle, iaddr, instr)?;
        } else {
            self.push_and_start(label, cycle, in_asm)?;
        }

        self.last_instr = instr.cloned();
        Ok(())
    }

    /// Close a pending `USERSPACE_ALL` region, if one is open. Called when a
    /// token resolves to some binary while this (misc) tracker has an
    /// unattributed run outstanding.
    pub fn end_userspace_run(&mut self) -> io::Result<()> {
        if self
            .top()
            .is_some_and(|top| top.label == USERSPACE_ALL)
        {
            self.pop_and_end()?;
        }
        Ok(())
    }

    /// Terminal flush: close every open region, innermost first.
    pub fn flush_stack(&mut self) -> io::Result<()> {
        while !self.label_stack.is_empty() {
            self.pop_and_end()?;
        }
        self.out.flush()
    }

    /// Pop until the top region matches `label`, ending each popped region at
    /// its recorded cycle and extending the survivor to `cycle`. An exhausted
    /// stack is a desync: report it and carry on empty.
    fn unwind_to(
        &mut self,
        label: &str,
        cycle: u64,
        iaddr: u64,
        instr: Option<&Instr>,
    ) -> io::Result<()> {
        let mut unwind_start_level = None;
        while let Some(top) = self.top() {
            if top.label == label {
                break;
            }
            let popped = self.pop_and_end()?;
            if unwind_start_level.is_none() {
                unwind_start_level = Some(popped.indent);
            }
            if let Some(top) = self.top_mut() {
                top.end_cycle = cycle;
            }
        }
        if self.label_stack.is_empty() {
            warn!(
                tracker = %self.name,
                label,
                iaddr = format_args!("{iaddr:#x}"),
                "label stack desync"
            );
            self.write_desync_report(label, iaddr, instr, unwind_start_level)?;
        }
        Ok(())
    }

    fn write_desync_report(
        &mut self,
        label: &str,
        iaddr: u64,
        instr: Option<&Instr>,
        unwind_start_level: Option<u64>,
    ) -> io::Result<()> {
        writeln!(
            self.out,
            "WARN: STACK ZEROED WHEN WE WERE LOOKING FOR LABEL: {label}, iaddr {iaddr:#x}"
        )?;
        if let Some(instr) = instr {
            writeln!(
                self.out,
                "WARN: is_callsite was: {}, is_fn_entry was: {}",
                u8::from(instr.is_callsite),
                u8::from(instr.is_fn_entry)
            )?;
        }
        if let Some(level) = unwind_start_level {
            writeln!(self.out, "WARN: Unwind started at level: dec {level}")?;
        }
        writeln!(self.out, "WARN: Last instr was")?;
        match &self.last_instr {
            Some(last) => writeln!(self.out, "WARN: {last}")?,
            None => writeln!(self.out, "WARN: (none)")?,
        }
        Ok(())
    }

    fn push_and_start(&mut self, label: &str, cycle: u64, asm_sequence: bool) -> io::Result<()> {
        let meta = LabelMeta {
            label: label.to_string(),
            start_cycle: cycle,
            end_cycle: cycle,
            indent: self.label_stack.len() as u64 + 1,
            asm_sequence,
        };
        meta.write_start(&mut self.out)?;
        self.label_stack.push(meta);
        Ok(())
    }

    fn pop_and_end(&mut self) -> io::Result<LabelMeta> {
        debug_assert!(!self.label_stack.is_empty());
        let meta = self
            .label_stack
            .pop()
            .ok_or_else(|| io::Error::other("pop from empty label stack"))?;
        meta.write_end(&mut self.out)?;
        Ok(meta)
    }

    fn top(&self) -> Option<&LabelMeta> {
        self.label_stack.last()
    }

    fn top_mut(&mut self) -> Option<&mut LabelMeta> {
        self.label_stack.last_mut()
    }
}
