use aliri_braid::braid;
use std::borrow::Cow;
use std::fmt;
use lazy_regex::{Lazy, lazy_regex};
use regex::Regex;
use thiserror::Error;

use crate::error::ModemError;

static REGISTER: Lazy<Regex> = lazy_regex!(r#"^@?[A-Za-z][A-Za-z0-9]*$"#);

/// Serial rates the modem's host ports can be configured for.
pub const SUPPORTED_BAUD_RATES: [u32; 7] = [1200, 2400, 4800, 9600, 19200, 57600, 115200];

#[derive(Debug, Error)]
#[error("invalid property name")]
pub struct InvalidPropertyName;

impl From<std::convert::Infallible> for InvalidPropertyName {
    fn from(x: std::convert::Infallible) -> Self {
        match x {}
    }
}

/// A register name as a caller spells it, without the `@` prefix used on the wire.
#[braid(normalizer)]
pub struct PropertyName;

impl aliri_braid::Validator for PropertyName {
    type Error = InvalidPropertyName;

    fn validate(s: &str) -> Result<(), Self::Error> {
        if REGISTER.is_match(s) && !s.starts_with('@') {
            Ok(())
        } else {
            Err(InvalidPropertyName)
        }
    }
}

impl aliri_braid::Normalizer for PropertyName {
    fn normalize(s: &str) -> Result<Cow<str>, Self::Error> {
        if !REGISTER.is_match(s) {
            return Err(InvalidPropertyName);
        }
        match s.strip_prefix('@') {
            Some(bare) => Ok(Cow::Owned(bare.to_owned())),
            None => Ok(Cow::Borrowed(s)),
        }
    }
}

/// Acoustic address of a remote unit: 0-249, or 255 to broadcast.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct RemoteAddress(u8);

impl RemoteAddress {
    pub const BROADCAST: RemoteAddress = RemoteAddress(255);

    pub fn new(address: u32) -> crate::error::Result<Self> {
        match address {
            0..=249 | 255 => Ok(Self(address as u8)),
            _ => Err(ModemError::validation("remote address", address, "valid addresses are 0-249 or the broadcast address 255")),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

pub fn is_supported_baud(baud: u32) -> bool {
    SUPPORTED_BAUD_RATES.contains(&baud)
}
