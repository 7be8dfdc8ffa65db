//! Beat transport.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Bytes per beat: eight 64-bit words.
pub const STREAM_WIDTH_BYTES: usize = 64;

/// Valid flag carried at bit 40 of each slot word.
pub const VALID_MASK: u64 = 1 << 40;

/// Source of beat bytes.
///
/// `pull` fills `dest` with as many bytes as are available, blocking until at
/// least `min_bytes` arrive; returning fewer than `min_bytes` (including 0)
/// signals end of stream.
pub trait BeatStream {
    fn pull(&mut self, dest: &mut [u8], min_bytes: usize) -> io::Result<usize>;
}

/// Replays captured beats from any byte source.
#[derive(Debug)]
pub struct ReadStream<R> {
    inner: R,
}

impl<R: Read> ReadStream<R> {
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> BeatStream for ReadStream<R> {
    fn pull(&mut self, dest: &mut [u8], _min_bytes: usize) -> io::Result<usize> {
        // A file replay is always "ready": read until the buffer is full or
        // the capture ends.
        let mut filled = 0;
        while filled < dest.len() {
            let n = self.inner.read(&mut dest[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

/// File-backed replay of a raw beat capture (output format 1).
pub type FileReplay = ReadStream<BufReader<File>>;

impl FileReplay {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}
