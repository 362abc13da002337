//! Byte-chunk to line framing
//!
//! Input arrives on arbitrary byte boundaries - mid-line, mid-UTF-8,
//! mid-escape. The framer buffers raw bytes, yields complete lines on `\n`,
//! and holds the trailing partial until more bytes arrive or the stream ends.

#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the complete lines it closed, in order.
    /// Trailing `\r` is dropped so CRLF input frames like LF input.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let mut end = line.len() - 1;
            if end > 0 && line[end - 1] == b'\r' {
                end -= 1;
            }
            lines.push(String::from_utf8_lossy(&line[..end]).into_owned());
        }
        lines
    }

    /// End-of-stream flush: the remaining buffer as a final line iff it is
    /// non-empty after trimming.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_newlines() {
        let mut f = LineFramer::new();
        assert_eq!(f.push(b"a\nb\nc"), vec!["a", "b"]);
        assert_eq!(f.finish(), Some("c".to_string()));
    }

    #[test]
    fn holds_partial_across_pushes() {
        let mut f = LineFramer::new();
        assert!(f.push(b"hel").is_empty());
        assert_eq!(f.push(b"lo\n"), vec!["hello"]);
    }

    #[test]
    fn crlf_and_lf_frame_identically() {
        let mut f = LineFramer::new();
        assert_eq!(f.push(b"one\r\ntwo\n"), vec!["one", "two"]);
    }

    #[test]
    fn multibyte_utf8_split_mid_char() {
        // é is 0xC3 0xA9; split between the two bytes
        let mut f = LineFramer::new();
        assert!(f.push(&[0xC3]).is_empty());
        assert_eq!(f.push(&[0xA9, b'\n']), vec!["é"]);
    }

    #[test]
    fn finish_drops_whitespace_only_tail() {
        let mut f = LineFramer::new();
        f.push(b"done\n   ");
        assert_eq!(f.finish(), None);
    }

    #[test]
    fn any_chunking_yields_same_lines() {
        let input = b"{\"a\":1}\nplain text\n{\"b\":\xc3\xa9}\n";
        let mut whole = LineFramer::new();
        let expected = whole.push(input);

        for split in 1..input.len() {
            let mut f = LineFramer::new();
            let mut got = f.push(&input[..split]);
            got.extend(f.push(&input[split..]));
            assert_eq!(got, expected, "split at byte {split}");
        }
    }
}
