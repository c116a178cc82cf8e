use std::fmt;
use nom::{Finish, IResult};

use crate::error::ModemError;

/// Renders raw modem bytes for logs and errors, falling back to hex when
/// the modem sends something that is not UTF-8.
#[derive(Clone, Copy, Eq, PartialEq)]
pub enum StrOrByteSlice<'a> {
    Str(&'a str),
    Bytes(&'a [u8]),
}

impl<'a> From<&'a [u8]> for StrOrByteSlice<'a> {
    fn from(data: &'a [u8]) -> Self {
        std::str::from_utf8(data).map(Self::Str).unwrap_or(Self::Bytes(data))
    }
}

impl<'a> fmt::Debug for StrOrByteSlice<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => fmt::Debug::fmt(s, f),
            Self::Bytes(bs) => {
                f.debug_list()
                    .entries(bs.iter().map(|b| format!("{:#04X}", b)))
                    .finish()
            }
        }
    }
}

impl<'a> fmt::Display for StrOrByteSlice<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => fmt::Display::fmt(s, f),
            Self::Bytes(_) => fmt::Debug::fmt(self, f),
        }
    }
}

pub(crate) fn parse_error(reply: &[u8], expected: &'static str) -> ModemError {
    ModemError::Parse {
        reply: StrOrByteSlice::from(reply).to_string(),
        expected,
    }
}

/// Runs `parser` over a whole reply line. Trailing input is an error.
pub(crate) fn parse_complete<'a, O, P>(parser: P, line: &'a [u8], expected: &'static str) -> Result<O, ModemError>
where
    P: FnMut(&'a [u8]) -> IResult<&'a [u8], O>,
{
    nom::combinator::all_consuming(parser)(line)
        .finish()
        .map(|(_, output)| output)
        .map_err(|_| parse_error(line, expected))
}
