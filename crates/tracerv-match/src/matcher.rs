//! Token resolution: kernel fast paths, candidate enumeration, k-deep
//! cross-verification against retired neighbors, and back-propagation.

use crate::index::PageSite;
use crate::{
    BinRef, BinaryStore, DRAM_ROOT, PAGE_SIZE, PRIV_USER, Resolution, RetiredBuffer, ReverseIndex,
    Token,
};

/// Running totals for end-of-run reporting.
#[derive(Clone, Copy, Debug, Default)]
pub struct MatchStats {
    pub matched_kernel: u64,
    pub matched_user: u64,
    pub unmatched: u64,
    pub backprop_stamped: u64,
}

/// Resolves tokens against the loaded binaries.
///
/// Owns the retired buffer: a token fed in is held until the buffer reaches
/// capacity, then the oldest token is resolved and handed back. Resolution is
/// deterministic; ambiguity is conservative (no resolution).
#[derive(Debug)]
pub struct Matcher {
    store: BinaryStore,
    index: ReverseIndex,
    buffer: RetiredBuffer,
    matching_depth: usize,
    stats: MatchStats,
}

impl Matcher {
    #[must_use]
    pub fn new(
        store: BinaryStore,
        index: ReverseIndex,
        buffer_size: usize,
        matching_depth: usize,
    ) -> Self {
        Self {
            store,
            index,
            buffer: RetiredBuffer::new(buffer_size),
            matching_depth,
            stats: MatchStats::default(),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &BinaryStore {
        &self.store
    }

    #[must_use]
    pub const fn stats(&self) -> MatchStats {
        self.stats
    }

    /// Number of tokens currently awaiting resolution.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append a retired token. Once the buffer is at capacity, resolves and
    /// returns the oldest token; before that, returns `None`.
    pub fn feed(&mut self, token: Token) -> Option<Token> {
        self.buffer.push(token);
        if self.buffer.is_full() {
            self.resolve_front()
        } else {
            None
        }
    }

    /// Resolve and return the oldest buffered token, if any. Used to drain
    /// the buffer at flush.
    pub fn drain_one(&mut self) -> Option<Token> {
        self.resolve_front()
    }

    fn resolve_front(&mut self) -> Option<Token> {
        let mut token = self.buffer.pop_front()?;
        self.resolve(&mut token);
        Some(token)
    }

    /// Resolution procedure. On success `token.resolution` holds a site whose
    /// text offset is guaranteed to name an instruction start.
    fn resolve(&mut self, token: &mut Token) {
        let kernel_base = self.store.kernel().base_addr();
        let kernel_len = self.store.kernel().text_len();

        // Kernel by base address.
        if token.iaddr >= kernel_base && token.iaddr - kernel_base < kernel_len {
            self.finish_kernel(token, token.iaddr - kernel_base);
            return;
        }
        // Kernel by DRAM root: the identity-mapped physical alias.
        let dram_offset = token.iaddr.wrapping_sub(DRAM_ROOT);
        if token.iaddr >= DRAM_ROOT && dram_offset < kernel_len {
            self.finish_kernel(token, dram_offset);
            return;
        }

        self.resolve_user(token);
    }

    fn finish_kernel(&mut self, token: &mut Token, text_offset: u64) {
        if self.store.kernel().instr_at(text_offset).is_some() {
            token.resolution = Some(Resolution {
                bin: BinRef::Kernel,
                page_base: (token.iaddr >> 12) << 12,
                text_offset,
            });
            self.stats.matched_kernel += 1;
        } else {
            token.resolution = None;
            self.stats.unmatched += 1;
        }
    }

    fn resolve_user(&mut self, token: &mut Token) {
        // A prior back-propagated resolution stays only if the index still
        // corroborates it.
        if let Some(res) = token.resolution.take() {
            if self.backprop_still_valid(token, res) {
                token.resolution = Some(res);
                self.stats.matched_user += 1;
                return;
            }
        }

        let sites = self.index.candidates(token.iaddr, token.inst);
        if sites.is_empty() {
            self.stats.unmatched += 1;
            return;
        }

        // Neighbors sharing the address space, oldest first, bounded by the
        // matching depth. Kernel-range retirements are not probative of a
        // user mapping.
        let kernel = self.store.kernel();
        let neighbors: Vec<(u64, u64)> = self
            .buffer
            .iter()
            .filter(|t| !kernel.contains(t.iaddr) && t.satp == token.satp)
            .take(self.matching_depth)
            .map(|t| (t.iaddr, t.inst))
            .collect();

        // A candidate survives only if every neighbor is also present in the
        // same binary at the page displacement implied by the candidate.
        let token_page = (token.iaddr >> 12) << 12;
        let matched: Vec<PageSite> = sites
            .iter()
            .copied()
            .filter(|site| {
                neighbors.iter().all(|&(m_iaddr, m_inst)| {
                    let page_base = ((m_iaddr >> 12) << 12)
                        .wrapping_sub(token_page)
                        .wrapping_add(site.page_base);
                    self.index.candidates(m_iaddr, m_inst).contains(&PageSite {
                        bin: site.bin,
                        page_base,
                    })
                })
            })
            .collect();

        match matched.as_slice() {
            [site] => self.finish_user(token, *site, token_page),
            // Zero survivors, or ambiguous even after cross-verification.
            // Multiple sites within one binary still leave the instruction
            // pointer unproven, so they stay unresolved too.
            _ => self.stats.unmatched += 1,
        }
    }

    fn backprop_still_valid(&self, token: &Token, res: Resolution) -> bool {
        let BinRef::User(bin) = res.bin else {
            return false;
        };
        self.index.candidates(token.iaddr, token.inst).contains(&PageSite {
            bin,
            page_base: res.page_base,
        }) && self.store.user(bin).instr_at(res.text_offset).is_some()
    }

    fn finish_user(&mut self, token: &mut Token, site: PageSite, token_page: u64) {
        let binary = self.store.user(site.bin);
        let base_addr = binary.base_addr();
        let text_len = binary.text_len();
        let text_offset = (token.iaddr % PAGE_SIZE)
            .wrapping_add(site.page_base)
            .wrapping_sub(base_addr);
        if text_offset >= text_len || binary.instr_at(text_offset).is_none() {
            self.stats.unmatched += 1;
            return;
        }
        token.resolution = Some(Resolution {
            bin: BinRef::User(site.bin),
            page_base: site.page_base,
            text_offset,
        });
        self.stats.matched_user += 1;

        // Back-propagate onto every buffered token of the same address space
        // still in user mode; the page displacement carries the resolution.
        let satp = token.satp;
        let mut stamped = 0u64;
        self.buffer.update_each(|t| {
            if t.satp != satp || t.priv_level != PRIV_USER {
                return;
            }
            let page_base = ((t.iaddr >> 12) << 12)
                .wrapping_add(site.page_base)
                .wrapping_sub(token_page);
            let offset = (t.iaddr % PAGE_SIZE)
                .wrapping_add(page_base)
                .wrapping_sub(base_addr);
            if offset < text_len {
                t.resolution = Some(Resolution {
                    bin: BinRef::User(site.bin),
                    page_base,
                    text_offset: offset,
                });
                stamped += 1;
            }
        });
        self.stats.backprop_stamped += stamped;
    }
}
