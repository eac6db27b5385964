//! Bounded output capture and result assembly.
//!
//! Each stream keeps only its first `cap` bytes. Anything past the cap is
//! counted and dropped, so a program printing in a tight loop costs at most
//! the cap in memory no matter how long it runs.

use crate::core_types::{ExecutionResult, OutputChunk, StreamKind};

/// Exit status reported for a killed run when the engine gives none (128 + SIGKILL).
pub const KILLED_EXIT_CODE: i64 = 137;

#[derive(Debug)]
struct BoundedBuffer {
    cap: usize,
    data: Vec<u8>,
    dropped: u64,
}

impl BoundedBuffer {
    fn new(cap: usize) -> Self {
        Self { cap, data: Vec::new(), dropped: 0 }
    }

    fn push(&mut self, bytes: &[u8]) {
        let room = self.cap.saturating_sub(self.data.len());
        let take = room.min(bytes.len());
        self.data.extend_from_slice(&bytes[..take]);
        self.dropped += (bytes.len() - take) as u64;
    }

    fn into_text(self) -> String {
        let text = String::from_utf8_lossy(&self.data).into_owned();
        truncate_to_boundary(text, self.cap)
    }
}

/// Ordered sink for a run's stdout and stderr.
#[derive(Debug)]
pub struct OutputCapture {
    stdout: BoundedBuffer,
    stderr: BoundedBuffer,
}

impl OutputCapture {
    pub fn new(stdout_cap: usize, stderr_cap: usize) -> Self {
        Self {
            stdout: BoundedBuffer::new(stdout_cap),
            stderr: BoundedBuffer::new(stderr_cap),
        }
    }

    pub fn push(&mut self, chunk: &OutputChunk) {
        match chunk.stream {
            StreamKind::Stdout => self.stdout.push(&chunk.data),
            StreamKind::Stderr => self.stderr.push(&chunk.data),
        }
    }

    /// Bytes discarded from (stdout, stderr) because the caps were reached.
    pub fn dropped(&self) -> (u64, u64) {
        (self.stdout.dropped, self.stderr.dropped)
    }

    /// Normalize into the caller-facing result.
    ///
    /// A missing exit code becomes 1 for a normal exit and
    /// [`KILLED_EXIT_CODE`] for a timed-out run.
    pub fn assemble(self, exit_code: Option<i64>, timed_out: bool) -> ExecutionResult {
        let (dropped_out, dropped_err) = self.dropped();
        if dropped_out > 0 || dropped_err > 0 {
            log::debug!(
                "Output truncated: {} stdout byte(s) and {} stderr byte(s) dropped",
                dropped_out,
                dropped_err
            );
        }

        let exit_code = match (exit_code, timed_out) {
            (Some(code), _) => code,
            (None, true) => KILLED_EXIT_CODE,
            (None, false) => 1,
        };

        ExecutionResult {
            stdout: self.stdout.into_text(),
            stderr: self.stderr.into_text(),
            exit_code,
            timed_out,
        }
    }
}

/// Keep at most `cap` bytes of `text`, backing off to a char boundary.
fn truncate_to_boundary(mut text: String, cap: usize) -> String {
    if text.len() > cap {
        let mut end = cap;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdout_over_cap_is_exactly_cap() {
        let mut capture = OutputCapture::new(8192, 4096);
        for _ in 0..100 {
            capture.push(&OutputChunk::stdout(vec![b'x'; 1000]));
        }
        assert_eq!(capture.dropped(), (100_000 - 8192, 0));

        let result = capture.assemble(Some(0), false);
        assert_eq!(result.stdout.len(), 8192);
        assert_eq!(result.stderr, "");
    }

    #[test]
    fn test_streams_are_capped_independently() {
        let mut capture = OutputCapture::new(4, 2);
        capture.push(&OutputChunk::stdout("ab"));
        capture.push(&OutputChunk::stderr("ERR"));
        capture.push(&OutputChunk::stdout("cdef"));

        let result = capture.assemble(Some(3), false);
        assert_eq!(result.stdout, "abcd");
        assert_eq!(result.stderr, "ER");
        assert_eq!(result.exit_code, 3);
    }

    #[test]
    fn test_split_multibyte_char_is_dropped_not_mangled() {
        let mut capture = OutputCapture::new(5, 10);
        // "abéé" is 6 bytes; the cap lands inside the second 'é'.
        capture.push(&OutputChunk::stdout("abéé".as_bytes()));
        let result = capture.assemble(Some(0), false);
        assert_eq!(result.stdout, "abé");
        assert!(result.stdout.len() <= 5);
    }

    #[test]
    fn test_invalid_utf8_never_exceeds_cap() {
        let mut capture = OutputCapture::new(4, 4);
        capture.push(&OutputChunk::stdout(vec![0xff, 0xfe, 0xfd, 0xfc, 0xfb]));
        let result = capture.assemble(Some(0), false);
        assert!(result.stdout.len() <= 4);
        assert!(result.stdout.starts_with('\u{FFFD}'));
    }

    #[test]
    fn test_missing_exit_code_defaults() {
        let result = OutputCapture::new(1, 1).assemble(None, false);
        assert_eq!(result.exit_code, 1);
        assert!(!result.timed_out);

        let result = OutputCapture::new(1, 1).assemble(None, true);
        assert_eq!(result.exit_code, KILLED_EXIT_CODE);
        assert!(result.timed_out);
    }
}
