/// Longest run of bytes kept waiting for a line feed before it is emitted anyway.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Splits an arbitrary chunked byte stream into lines.
///
/// A fragment without a terminating line feed stays buffered until the rest
/// of the line arrives, so a line cut at a read boundary comes out whole.
/// Empty lines are skipped and a trailing `\r` is dropped with the `\n`.
#[derive(Debug)]
pub struct LineFramer {
    pending: Vec<u8>,
    max_line: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(MAX_LINE_BYTES)
    }
}

impl LineFramer {
    pub fn new(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line: max_line.max(1),
        }
    }

    /// Feed a chunk, returning every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            rest = &rest[pos + 1..];
            let line = std::mem::take(&mut self.pending);
            lines.extend(decode(line));
        }

        self.pending.extend_from_slice(rest);
        while self.pending.len() > self.max_line {
            let cut = char_boundary(&self.pending, self.max_line);
            let tail = self.pending.split_off(cut);
            let head = std::mem::replace(&mut self.pending, tail);
            lines.extend(decode(head));
        }

        lines
    }

    /// Flush whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        decode(std::mem::take(&mut self.pending))
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Last index at or before `max` that does not fall inside a UTF-8 sequence.
fn char_boundary(bytes: &[u8], max: usize) -> usize {
    let is_continuation = |b: u8| b & 0b1100_0000 == 0b1000_0000;
    (1..=max)
        .rev()
        .take(4)
        .find(|&idx| !is_continuation(bytes[idx]))
        .unwrap_or(max)
}

fn decode(mut line: Vec<u8>) -> Option<String> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    if line.is_empty() {
        return None;
    }
    Some(match String::from_utf8(line) {
        Ok(line) => line,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}
