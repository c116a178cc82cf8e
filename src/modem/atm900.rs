use std::fmt;
use std::time::Duration;
use bytes::{Bytes, BytesMut};
use nom::IResult;

use crate::error::{ModemError, Result};
use crate::parser::{parse_complete, StrOrByteSlice};
use crate::types::RemoteAddress;

/// Largest data frame the modem buffers for acoustic transmission.
pub const MAX_PAYLOAD_LEN: usize = 4096;

pub(crate) const LINE_ENDING: &[u8] = b"\r\n";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Data(Bytes),
    Attention,
    Dial(RemoteAddress),
    HangUp,
    Reboot,
    RemoteReset(RemoteAddress),
    WriteSettings,
    FactoryReset,
    RemoteBreak {
        address: RemoteAddress,
        port: SerialPortId,
    },
    SetRemote {
        property: RemoteProperty,
        address: RemoteAddress,
        value: u8,
    },
    LinkTest(RemoteAddress),
    SupplyReport,
    ReadRegister(&'static str),
    WriteRegister {
        register: &'static str,
        value: String,
    },
}

impl Command {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::Data(payload) => buf.extend_from_slice(payload),
            _ => buf.extend_from_slice(self.to_string().as_bytes()),
        }
        buf.extend_from_slice(LINE_ENDING);
    }

    /// Configuration commands are echoed back when the host port has echo
    /// enabled. Data frames are never skipped, a payload may look like a reply.
    pub(crate) fn may_echo(&self) -> bool {
        !matches!(self, Self::Data(_))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(payload) => fmt::Display::fmt(&StrOrByteSlice::from(&payload[..]), f)?,
            Self::Attention => f.write_str("AT")?,
            Self::Dial(address) => write!(f, "ATD{}", address)?,
            Self::HangUp => f.write_str("ATH")?,
            Self::Reboot => f.write_str("ATES")?,
            Self::RemoteReset(address) => write!(f, "AT$ES{}", address)?,
            Self::WriteSettings => f.write_str("AT&W")?,
            Self::FactoryReset => f.write_str("AT&F")?,
            Self::RemoteBreak { address, port } => write!(f, "AT$K{},{}", address, port)?,
            Self::SetRemote { property, address, value } => write!(f, "AT${}{},{}", property, address, value)?,
            Self::LinkTest(address) => write!(f, "ATX{}", address)?,
            Self::SupplyReport => f.write_str("ATV")?,
            Self::ReadRegister(register) => write!(f, "@{}", register)?,
            Self::WriteRegister { register, value } => write!(f, "@{}={}", register, value)?,
        }
        Ok(())
    }
}

/// Parameters that can be set on a remote unit over the acoustic link.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum RemoteProperty {
    /// Transmit power level, 1 (-21 dB) to 8 (0 dB).
    Power,
    /// Acoustic bit rate setting, 2 (140 bit/s) to 13 (15360 bit/s).
    Rate,
}

impl RemoteProperty {
    pub(crate) fn validate(self, value: u32) -> Result<u8> {
        let (range, allowed) = match self {
            Self::Power => (1..=8, "valid power levels are 1-8"),
            Self::Rate => (2..=13, "valid rate settings are 2-13"),
        };
        if range.contains(&value) {
            Ok(value as u8)
        } else {
            Err(ModemError::validation(self.parameter(), value, allowed))
        }
    }

    fn parameter(self) -> &'static str {
        match self {
            Self::Power => "remote power level",
            Self::Rate => "remote bit rate",
        }
    }
}

impl fmt::Display for RemoteProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::Power => "P",
            Self::Rate => "A",
        };
        f.write_str(code)
    }
}

/// One of the modem's two host serial ports.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct SerialPortId(u8);

impl SerialPortId {
    pub fn new(port: u32) -> Result<Self> {
        match port {
            1 | 2 => Ok(Self(port as u8)),
            _ => Err(ModemError::validation("serial port", port, "valid ports are 1 or 2")),
        }
    }
}

impl fmt::Display for SerialPortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A numeric register value with the modem's description of it, as in
/// `8 (0 dB)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub value: f64,
    pub description: Option<String>,
}

/// Label of the last reading in the `ATV` report.
pub(crate) const SUPPLY_REPORT_LAST: &str = "Temp";

/// The modem accepted the command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ack;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkTestReport {
    pub success: bool,
    pub quality: u16,
    pub round_trip: Option<Duration>,
}

impl LinkTestReport {
    fn from_fields(success: bool, fields: &[f64]) -> Option<Self> {
        let quality = match (success, fields.first()) {
            (_, Some(&q)) if q.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(&q) => q as u16,
            (false, None) => 0,
            _ => return None,
        };
        let round_trip = match fields.get(1) {
            Some(&ms) if ms >= 0.0 => Some(Duration::from_secs_f64(ms / 1000.0)),
            Some(_) => return None,
            None => None,
        };
        if fields.len() > 2 {
            return None;
        }
        Some(Self { success, quality, round_trip })
    }
}

fn ack(data: &[u8]) -> IResult<&[u8], Ack> {
    nom::combinator::value(Ack, nom::branch::alt((nom::bytes::complete::tag("OK"), nom::bytes::complete::tag("ACK"))))(data)
}

fn modem_error(data: &[u8]) -> IResult<&[u8], &[u8]> {
    nom::sequence::preceded(
        nom::bytes::complete::tag("ERROR"),
        nom::sequence::preceded(
            nom::bytes::complete::take_while(|c: u8| c == b' ' || c == b':'),
            nom::combinator::rest,
        ),
    )(data)
}

fn decimal(data: &[u8]) -> IResult<&[u8], f64> {
    nom::combinator::map_opt(nom::number::complete::recognize_float, |x: &[u8]| {
        std::str::from_utf8(x).ok()?.parse::<f64>().ok()
    })(data)
}

fn label(data: &[u8]) -> IResult<&[u8], &[u8]> {
    nom::sequence::terminated(
        nom::bytes::complete::take_while1(|c: u8| c.is_ascii_alphanumeric() || c == b' '),
        nom::sequence::pair(nom::character::complete::char('='), nom::character::complete::space0),
    )(data)
}

fn description(data: &[u8]) -> IResult<&[u8], &[u8]> {
    nom::sequence::delimited(
        nom::character::complete::char('('),
        nom::bytes::complete::take_while(|c: u8| c != b')'),
        nom::character::complete::char(')'),
    )(data)
}

fn unit(data: &[u8]) -> IResult<&[u8], &[u8]> {
    nom::bytes::complete::take_while1(|c: u8| c.is_ascii_alphabetic() || c == b'%')(data)
}

fn value(data: &[u8]) -> IResult<&[u8], Reading> {
    let (rest, value) = decimal(data)?;
    let (rest, description) = nom::combinator::opt(nom::sequence::preceded(
        nom::character::complete::space0,
        nom::branch::alt((
            nom::combinator::map(description, Some),
            nom::combinator::map(unit, |_| None),
        )),
    ))(rest)?;
    let (rest, _) = nom::character::complete::space0(rest)?;
    let description = description
        .flatten()
        .map(|d| StrOrByteSlice::from(d).to_string().trim().to_owned());
    Ok((rest, Reading { value, description }))
}

fn numeric(data: &[u8]) -> IResult<&[u8], Reading> {
    nom::sequence::preceded(nom::combinator::opt(label), value)(data)
}

fn labelled(data: &[u8]) -> IResult<&[u8], (&[u8], f64)> {
    nom::sequence::pair(label, nom::combinator::map(value, |r| r.value))(data)
}

fn flag(data: &[u8]) -> IResult<&[u8], bool> {
    let (rest, _) = nom::combinator::opt(label)(data)?;
    nom::sequence::terminated(
        nom::branch::alt((
            nom::combinator::value(true, nom::bytes::complete::tag("Ena")),
            nom::combinator::value(false, nom::bytes::complete::tag("Dis")),
        )),
        nom::bytes::complete::take_while(|c: u8| c.is_ascii_alphabetic()),
    )(rest)
}

fn link_status(data: &[u8]) -> IResult<&[u8], bool> {
    nom::branch::alt((
        nom::combinator::value(true, nom::bytes::complete::tag("OK")),
        nom::combinator::value(false, nom::bytes::complete::tag("FAIL")),
    ))(data)
}

fn link_test_report(data: &[u8]) -> IResult<&[u8], LinkTestReport> {
    let field = nom::sequence::preceded(
        nom::sequence::pair(nom::character::complete::char(','), nom::character::complete::space0),
        decimal,
    );
    nom::combinator::map_opt(
        nom::sequence::pair(link_status, nom::multi::many0(field)),
        |(success, fields)| LinkTestReport::from_fields(success, &fields),
    )(data)
}

/// Interprets one reply line. An `ERROR` line is reported as a rejection of
/// `command` no matter what reply was expected.
pub(crate) fn expect<'a, O, P>(command: &Command, line: &'a [u8], parser: P, expected: &'static str) -> Result<O>
where
    P: FnMut(&'a [u8]) -> IResult<&'a [u8], O>,
{
    if let Ok((_, detail)) = modem_error(line) {
        return Err(ModemError::Rejected {
            command: command.to_string(),
            reply: StrOrByteSlice::from(detail).to_string(),
        });
    }
    let output = parse_complete(parser, line, expected)?;
    tracing::debug!(reply = %StrOrByteSlice::from(line), "parsed reply");
    Ok(output)
}

pub(crate) fn expect_ack(command: &Command, line: &[u8]) -> Result<Ack> {
    expect(command, line, ack, "an acknowledgement (OK or ACK)")
}

pub(crate) fn expect_reading(command: &Command, line: &[u8]) -> Result<Reading> {
    expect(command, line, numeric, "a numeric value")
}

/// Interprets one line of the multi-line `ATV` report. Lines without a
/// `Label =` prefix carry no reading and come back as `None`.
pub(crate) fn expect_report_line(command: &Command, line: &[u8]) -> Result<Option<(String, f64)>> {
    if label(line).is_err() && modem_error(line).is_err() {
        return Ok(None);
    }
    let (name, value) = expect(command, line, labelled, "a labelled reading")?;
    Ok(Some((StrOrByteSlice::from(name).to_string().trim().to_owned(), value)))
}

pub(crate) fn expect_flag(command: &Command, line: &[u8]) -> Result<bool> {
    expect(command, line, flag, "Ena or Dis")
}

pub(crate) fn expect_link_test(command: &Command, line: &[u8]) -> Result<LinkTestReport> {
    expect(command, line, link_test_report, "a link test report (OK,<quality> or FAIL)")
}
