use bytes::{Buf, Bytes, BytesMut};
use nom::IResult;

use crate::error::Result;
use crate::parser::parse_error;

use super::atm900::MAX_PAYLOAD_LEN;

/// Longest reply line accepted before the buffer is discarded.
pub const MAX_LINE_LEN: usize = MAX_PAYLOAD_LEN + 64;

fn line(data: &[u8]) -> IResult<&[u8], &[u8]> {
    nom::sequence::terminated(nom::bytes::streaming::take_until("\n"), nom::bytes::streaming::tag("\n"))(data)
}

/// Accumulates bytes read from the modem and splits them into lines.
///
/// After an overlong or abandoned line the buffer keeps `discarding` until
/// the rest of that line, up to its `\n`, has gone by.
pub(crate) struct LineBuffer {
    buffer: BytesMut,
    limit: usize,
    discarding: bool,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::with_limit(MAX_LINE_LEN)
    }

    pub(crate) fn with_limit(limit: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
            limit,
            discarding: false,
        }
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    pub(crate) fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// Drops everything buffered. A trailing unterminated piece means the
    /// rest of that line is still on its way, so it is dropped too once it
    /// arrives. Returns the number of bytes dropped now.
    pub(crate) fn discard_buffered(&mut self) -> usize {
        match self.buffer.iter().rposition(|&b| b == b'\n') {
            Some(end) => self.discarding = end + 1 < self.buffer.len(),
            None => self.discarding |= !self.buffer.is_empty(),
        }
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }

    /// Splits off the next complete line, trimmed of surrounding whitespace
    /// and its terminator. `Ok(None)` means more bytes are needed.
    pub(crate) fn next_line(&mut self) -> Result<Option<Bytes>> {
        if self.discarding {
            match self.buffer.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    self.buffer.advance(end + 1);
                    self.discarding = false;
                }
                None => {
                    self.buffer.clear();
                    return Ok(None);
                }
            }
        }

        let parsed = match line(&self.buffer) {
            Ok((remaining, line)) => Some((self.buffer.len() - remaining.len(), line.len())),
            Err(err) if err.is_incomplete() => None,
            Err(_) => {
                let err = parse_error(&self.buffer, "a terminated line");
                self.buffer.clear();
                return Err(err);
            }
        };

        match parsed {
            Some((consumed, length)) if length <= self.limit => {
                let mut line = self.buffer.split_to(consumed);
                line.truncate(length);
                Ok(Some(trim(line.freeze())))
            }
            Some((consumed, _)) => {
                let line = self.buffer.split_to(consumed);
                Err(parse_error(&line[..self.limit], "a line within the length limit"))
            }
            None if self.buffer.len() > self.limit => {
                let err = parse_error(&self.buffer[..self.limit], "a line within the length limit");
                self.buffer.clear();
                self.discarding = true;
                Err(err)
            }
            None => Ok(None),
        }
    }

    /// Called when the stream ends. Leftover bytes are a truncated line.
    pub(crate) fn end_of_stream(&mut self) -> Result<()> {
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            self.buffer.clear();
            return Ok(());
        }
        let err = parse_error(&self.buffer, "a line terminator before end of stream");
        self.buffer.clear();
        Err(err)
    }
}

fn trim(mut line: Bytes) -> Bytes {
    let start = line.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(line.len());
    let end = line.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    line.truncate(end);
    line.split_off(start)
}
