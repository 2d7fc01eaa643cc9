//! Frame extraction for AT replies.
//!
//! The Audio Gateway frames every reply as `\r\n<reply>\r\n`. Replies are
//! recognised by a fixed catalogue of prefixes; anything else on the line is
//! an unsolicited code this HF does not care about and is skipped.
//!
//! Bytes are accumulated across reads, so a reply split over two transport
//! reads is reassembled instead of being lost.

use bytes::{Buf, BytesMut};

/// Upper bound on buffered, unterminated reply bytes.
pub const MAX_BUFFER_LENGTH: usize = 2048;

/// Line terminator used by the Audio Gateway.
pub const FRAME_DELIMITER: &[u8] = b"\r\n";

/// Terminator appended to every outbound command.
pub const COMMAND_TERMINATOR: u8 = b'\r';

/// Reply prefixes recognised at the head of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyPrefix {
    Ok,
    Error,
    CmeError,
    Busy,
    NoCarrier,
    NoAnswer,
    Blocklisted,
    Delayed,
    Ring,
    Ciev,
    Clip,
    Ccwa,
    Clcc,
    Bsir,
    Bvra,
    Cnum,
    Vgm,
    Vgs,
    Cops,
    Btrh,
    Brsf,
    Cind,
    Chld,
    Bind,
    Bcs,
}

/// Catalogue of reply heads. Matching is by prefix, first hit wins.
const PREFIX_CATALOGUE: &[(&str, ReplyPrefix)] = &[
    ("OK", ReplyPrefix::Ok),
    ("ERROR", ReplyPrefix::Error),
    ("+CME ERROR:", ReplyPrefix::CmeError),
    ("BUSY", ReplyPrefix::Busy),
    ("NO CARRIER", ReplyPrefix::NoCarrier),
    ("NO ANSWER", ReplyPrefix::NoAnswer),
    ("BLOCKLISTED", ReplyPrefix::Blocklisted),
    ("BLACKLISTED", ReplyPrefix::Blocklisted),
    ("DELAYED", ReplyPrefix::Delayed),
    ("RING", ReplyPrefix::Ring),
    ("+CIEV:", ReplyPrefix::Ciev),
    ("+CLIP:", ReplyPrefix::Clip),
    ("+CCWA:", ReplyPrefix::Ccwa),
    ("+CLCC:", ReplyPrefix::Clcc),
    ("+BSIR:", ReplyPrefix::Bsir),
    ("+BVRA:", ReplyPrefix::Bvra),
    ("+CNUM:", ReplyPrefix::Cnum),
    ("+VGM:", ReplyPrefix::Vgm),
    ("+VGM=", ReplyPrefix::Vgm),
    ("+VGS:", ReplyPrefix::Vgs),
    ("+VGS=", ReplyPrefix::Vgs),
    ("+COPS:", ReplyPrefix::Cops),
    ("+BTRH:", ReplyPrefix::Btrh),
    ("+BRSF:", ReplyPrefix::Brsf),
    ("+CIND:", ReplyPrefix::Cind),
    ("+CHLD:", ReplyPrefix::Chld),
    ("+BIND:", ReplyPrefix::Bind),
    ("+BCS:", ReplyPrefix::Bcs),
];

impl ReplyPrefix {
    /// Canonical text of the prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyPrefix::Ok => "OK",
            ReplyPrefix::Error => "ERROR",
            ReplyPrefix::CmeError => "+CME ERROR:",
            ReplyPrefix::Busy => "BUSY",
            ReplyPrefix::NoCarrier => "NO CARRIER",
            ReplyPrefix::NoAnswer => "NO ANSWER",
            ReplyPrefix::Blocklisted => "BLOCKLISTED",
            ReplyPrefix::Delayed => "DELAYED",
            ReplyPrefix::Ring => "RING",
            ReplyPrefix::Ciev => "+CIEV:",
            ReplyPrefix::Clip => "+CLIP:",
            ReplyPrefix::Ccwa => "+CCWA:",
            ReplyPrefix::Clcc => "+CLCC:",
            ReplyPrefix::Bsir => "+BSIR:",
            ReplyPrefix::Bvra => "+BVRA:",
            ReplyPrefix::Cnum => "+CNUM:",
            ReplyPrefix::Vgm => "+VGM:",
            ReplyPrefix::Vgs => "+VGS:",
            ReplyPrefix::Cops => "+COPS:",
            ReplyPrefix::Btrh => "+BTRH:",
            ReplyPrefix::Brsf => "+BRSF:",
            ReplyPrefix::Cind => "+CIND:",
            ReplyPrefix::Chld => "+CHLD:",
            ReplyPrefix::Bind => "+BIND:",
            ReplyPrefix::Bcs => "+BCS:",
        }
    }

    /// Match the head of a reply line against the catalogue.
    ///
    /// Returns the prefix and the byte length of the matched head.
    pub fn match_line(line: &str) -> Option<(ReplyPrefix, usize)> {
        PREFIX_CATALOGUE
            .iter()
            .find(|(head, _)| line.starts_with(head))
            .map(|(head, prefix)| (*prefix, head.len()))
    }

    /// Whether this prefix closes the command in flight.
    pub fn is_result_code(&self) -> bool {
        matches!(
            self,
            ReplyPrefix::Ok
                | ReplyPrefix::Error
                | ReplyPrefix::CmeError
                | ReplyPrefix::Busy
                | ReplyPrefix::NoCarrier
                | ReplyPrefix::NoAnswer
                | ReplyPrefix::Blocklisted
                | ReplyPrefix::Delayed
        )
    }
}

impl std::fmt::Display for ReplyPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reply extracted from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtFrame {
    /// Recognised reply head.
    pub prefix: ReplyPrefix,
    /// Text between the head and the terminator, whitespace trimmed.
    pub argument: String,
}

impl AtFrame {
    /// Create a frame from a prefix and argument text.
    pub fn new(prefix: ReplyPrefix, argument: impl Into<String>) -> Self {
        AtFrame {
            prefix,
            argument: argument.into(),
        }
    }
}

/// Reassembling parser for AT reply frames.
///
/// - Accumulates received bytes until a `\r\n` terminated line is found
/// - Skips NUL bytes and empty lines
/// - Ignores lines whose head is not in the catalogue
#[derive(Debug, Default)]
pub struct AtFrameParser {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
    /// Lines skipped because their head was not recognised.
    ignored_lines: u64,
    /// Bytes discarded because the buffer overflowed.
    discarded_bytes: u64,
}

impl AtFrameParser {
    /// Create a new frame parser.
    pub fn new() -> Self {
        AtFrameParser {
            buffer: BytesMut::with_capacity(MAX_BUFFER_LENGTH),
            ignored_lines: 0,
            discarded_bytes: 0,
        }
    }

    /// Add received data to the buffer, dropping NUL bytes.
    pub fn push(&mut self, data: &[u8]) {
        for chunk in data.split(|&b| b == 0) {
            self.buffer.extend_from_slice(chunk);
        }

        // Only the unterminated remainder is bounded; complete lines wait for decode.
        let tail_start = rfind_delimiter(&self.buffer).map_or(0, |end| end + FRAME_DELIMITER.len());
        let tail_len = self.buffer.len() - tail_start;
        if tail_len > MAX_BUFFER_LENGTH {
            let excess = tail_len - MAX_BUFFER_LENGTH;
            log::warn!(
                "AT parser buffer overflow: max {} bytes, got {}, discarding {}",
                MAX_BUFFER_LENGTH,
                tail_len,
                excess
            );
            let mut lines = self.buffer.split_to(tail_start);
            self.buffer.advance(excess);
            lines.unsplit(self.buffer.split());
            self.buffer = lines;
            self.discarded_bytes += excess as u64;
        }
    }

    /// Try to decode the next recognised reply from the buffer.
    ///
    /// Returns `None` when no complete recognised line is buffered.
    pub fn decode(&mut self) -> Option<AtFrame> {
        loop {
            let end = find_delimiter(&self.buffer)?;
            let line_data = self.buffer.split_to(end);
            self.buffer.advance(FRAME_DELIMITER.len());

            let line = String::from_utf8_lossy(&line_data);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match ReplyPrefix::match_line(line) {
                Some((prefix, head_len)) => {
                    let argument = line[head_len..].trim().to_string();
                    log::trace!("AT frame: {} '{}'", prefix, argument);
                    return Some(AtFrame { prefix, argument });
                }
                None => {
                    log::debug!("AT parser: ignoring unrecognised line '{}'", line);
                    self.ignored_lines += 1;
                }
            }
        }
    }

    /// Drain every complete frame currently buffered.
    pub fn decode_all(&mut self) -> Vec<AtFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.decode() {
            frames.push(frame);
        }
        frames
    }

    /// Encode a command for transmission.
    ///
    /// Appends the carriage return terminator.
    pub fn encode_command(cmd: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(cmd.len() + 1);
        buf.extend_from_slice(cmd.as_bytes());
        buf.push(COMMAND_TERMINATOR);
        buf
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of lines skipped because their head was unknown.
    pub fn ignored_lines(&self) -> u64 {
        self.ignored_lines
    }

    /// Number of bytes discarded on overflow.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded_bytes
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(FRAME_DELIMITER.len())
        .position(|window| window == FRAME_DELIMITER)
}

fn rfind_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(FRAME_DELIMITER.len())
        .rposition(|window| window == FRAME_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_command() {
        let encoded = AtFrameParser::encode_command("AT+CIND=?");
        assert_eq!(encoded, b"AT+CIND=?\r");
    }

    #[test]
    fn test_decode_ok() {
        let mut parser = AtFrameParser::new();
        parser.push(b"\r\nOK\r\n");

        assert_eq!(parser.decode(), Some(AtFrame::new(ReplyPrefix::Ok, "")));
        assert!(parser.decode().is_none());
    }

    #[test]
    fn test_decode_argument_trimmed() {
        let mut parser = AtFrameParser::new();
        parser.push(b"\r\n+CIEV:  3,1 \r\n");

        let frame = parser.decode().expect("should decode frame");
        assert_eq!(frame.prefix, ReplyPrefix::Ciev);
        assert_eq!(frame.argument, "3,1");
    }

    #[test]
    fn test_partial_frame_reassembled() {
        let mut parser = AtFrameParser::new();
        parser.push(b"\r\n+CLIP: \"555");

        assert!(parser.decode().is_none());

        parser.push(b"1234\",129\r\n");
        let frame = parser.decode().expect("should decode frame");
        assert_eq!(frame.prefix, ReplyPrefix::Clip);
        assert_eq!(frame.argument, "\"5551234\",129");
    }

    #[test]
    fn test_unknown_prefix_skipped() {
        let mut parser = AtFrameParser::new();
        parser.push(b"\r\n+XAPL=iPhone,7\r\n\r\nRING\r\n");

        assert_eq!(parser.decode(), Some(AtFrame::new(ReplyPrefix::Ring, "")));
        assert_eq!(parser.ignored_lines(), 1);
    }

    #[test]
    fn test_null_bytes_skipped() {
        let mut parser = AtFrameParser::new();
        parser.push(b"\r\n\0O\0K\r\n");

        assert_eq!(parser.decode(), Some(AtFrame::new(ReplyPrefix::Ok, "")));
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut parser = AtFrameParser::new();
        parser.push(b"\r\n+CIND: 1,0,0,0,5,0,5\r\n\r\nOK\r\n");

        let frames = parser.decode_all();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].prefix, ReplyPrefix::Cind);
        assert_eq!(frames[0].argument, "1,0,0,0,5,0,5");
        assert_eq!(frames[1].prefix, ReplyPrefix::Ok);
    }

    #[test]
    fn test_cme_error_and_equals_volume() {
        let mut parser = AtFrameParser::new();
        parser.push(b"\r\n+CME ERROR: 30\r\n\r\n+VGS=9\r\n");

        assert_eq!(parser.decode(), Some(AtFrame::new(ReplyPrefix::CmeError, "30")));
        assert_eq!(parser.decode(), Some(AtFrame::new(ReplyPrefix::Vgs, "9")));
    }

    #[test]
    fn test_overflow_keeps_tail() {
        let mut parser = AtFrameParser::new();
        parser.push(&vec![b'x'; MAX_BUFFER_LENGTH + 10]);

        assert_eq!(parser.buffered_len(), MAX_BUFFER_LENGTH);
        assert_eq!(parser.discarded_bytes(), 10);
    }

    #[test]
    fn test_large_read_of_complete_frames_kept() {
        let mut parser = AtFrameParser::new();
        let stream = "\r\n+CLCC: 1,1,4,0,0,\"5551234\",129\r\n".repeat(80);
        assert!(stream.len() > MAX_BUFFER_LENGTH);
        parser.push(stream.as_bytes());

        let frames = parser.decode_all();
        assert_eq!(frames.len(), 80);
        assert!(frames.iter().all(|f| f.prefix == ReplyPrefix::Clcc));
        assert_eq!(parser.discarded_bytes(), 0);
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_overflow_bounds_only_the_partial_tail() {
        let mut parser = AtFrameParser::new();
        let mut stream = b"\r\nOK\r\n".to_vec();
        stream.extend(vec![b'x'; MAX_BUFFER_LENGTH + 5]);
        parser.push(&stream);

        assert_eq!(parser.discarded_bytes(), 5);
        assert_eq!(parser.decode(), Some(AtFrame::new(ReplyPrefix::Ok, "")));
        assert_eq!(parser.buffered_len(), MAX_BUFFER_LENGTH);
    }

    #[test]
    fn test_result_code_classification() {
        assert!(ReplyPrefix::NoCarrier.is_result_code());
        assert!(ReplyPrefix::CmeError.is_result_code());
        assert!(!ReplyPrefix::Ring.is_result_code());
        assert!(!ReplyPrefix::Clcc.is_result_code());
    }
}
