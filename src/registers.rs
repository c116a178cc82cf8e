//! The modem's local configuration registers.
//!
//! Settings are read with `@Name` and written with `@Name=value`. The
//! supply voltage and temperature are sensors, read from the labelled lines
//! of the modem's `ATV` report. Names are matched case-insensitively, so
//! `temp` finds `Temp`.

use crate::error::{ModemError, Result};
use crate::types::PropertyNameRef;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Domain {
    /// Read-only measurement, taken from the `ATV` report line labelled
    /// with the register's name.
    Sensor,
    /// Integer setting restricted to the listed inclusive ranges.
    Choices(&'static [(i64, i64)]),
    /// Decimal setting on a fixed grid. On the wire the value is multiplied
    /// by `wire_scale`; a scale other than 1 means the modem takes an integer.
    Stepped {
        min: f64,
        max: f64,
        step: f64,
        wire_scale: f64,
    },
    /// `Ena` / `Dis` switch.
    Flag,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Register {
    pub name: &'static str,
    pub domain: Domain,
    pub allowed: &'static str,
}

const fn choices(name: &'static str, ranges: &'static [(i64, i64)], allowed: &'static str) -> Register {
    Register { name, domain: Domain::Choices(ranges), allowed }
}

const fn stepped(name: &'static str, min: f64, max: f64, step: f64, wire_scale: f64, allowed: &'static str) -> Register {
    Register { name, domain: Domain::Stepped { min, max, step, wire_scale }, allowed }
}

const fn flag(name: &'static str) -> Register {
    Register { name, domain: Domain::Flag, allowed: "Ena or Dis" }
}

const fn sensor(name: &'static str) -> Register {
    Register { name, domain: Domain::Sensor, allowed: "read-only" }
}

const BAUD_RATES: &[(i64, i64)] = &[(1200, 1200), (2400, 2400), (4800, 4800), (9600, 9600), (19200, 19200), (57600, 57600), (115200, 115200)];
const BAUD_ALLOWED: &str = "valid rates are 1200, 2400, 4800, 9600, 19200, 57600, or 115200";

pub static REGISTERS: &[Register] = &[
    sensor("Temp"),
    sensor("Voltage"),
    // Host serial ports
    choices("P1Baud", BAUD_RATES, BAUD_ALLOWED),
    flag("P1EchoChar"),
    choices("P1FlowCtl", &[(0, 3)], "valid settings are 0-3"),
    choices("P1Protocol", &[(0, 1)], "valid protocols are 0 or 1"),
    flag("P1StripB7"),
    choices("P2Baud", BAUD_RATES, BAUD_ALLOWED),
    flag("P2EchoChar"),
    choices("P2FlowCtl", &[(0, 3)], "valid settings are 0-3"),
    flag("P2StripB7"),
    // System
    choices("SyncPPS", &[(0, 3)], "valid settings are 0-3"),
    choices("Verbose", &[(0, 4)], "valid settings are 0-4"),
    choices("Prompt", &[(0, 7)], "valid values are 0-7"),
    choices("CMWakeHib", &[(0, 9), (11, 11)], "valid values are 0-9 or 11"),
    flag("CMFastWake"),
    choices("CPBoard", &[(0, 3)], "valid settings are 0-3"),
    // Data logging
    choices("AcData", &[(0, 2)], "valid settings are 0-2"),
    choices("AcStats", &[(0, 1), (4, 5)], "valid settings are 0, 1, 4 or 5"),
    flag("RingBuf"),
    choices("SubBlks", &[(1, 15)], "valid counts are 1-15"),
    choices("LogMode", &[(0, 2)], "valid modes are 0-2"),
    choices("Sentinel", &[(0, 255)], "valid values are 0-255"),
    choices("ChrCount", &[(0, 4096)], "valid counts are 0-4096"),
    choices("LogStore", &[(0, 1)], "valid media are 0 or 1"),
    // Modem
    flag("DataRetry"),
    stepped("AcRspTmOut", 2.0, 99.5, 0.5, 1.0, "valid timeouts are 2-99.5 s in 0.5 s steps"),
    choices("OpMode", &[(0, 2)], "valid modes are 0-2"),
    choices("DevEnable", &[(0, 2)], "valid modes are 0-2"),
    stepped("FwdDelay", 0.0, 5.0, 0.05, 1.0, "valid delays are 0-5 s in 0.05 s steps"),
    choices("LocalAddr", &[(0, 249)], "valid addresses are 0-249"),
    choices("RemoteAddr", &[(0, 249), (255, 255)], "valid addresses are 0-249 or 255"),
    flag("ShowBadData"),
    flag("StartTones"),
    choices("TxRate", &[(2, 13)], "valid rates are 2-13"),
    choices("TxPower", &[(1, 8)], "valid levels are 1-8"),
    flag("WakeTones"),
    flag("PrintHex"),
    flag("StrictAT"),
    choices("InputMode", &[(1, 2)], "valid modes are 1 or 2"),
    choices("TimedRelease", &[(0, 999)], "valid values are 0-999"),
    choices("TPortMode", &[(0, 1)], "valid modes are 0 or 1"),
    // Routing
    choices("SrcP1", &[(1, 4)], "valid addresses are 1-4"),
    choices("SrcP2", &[(1, 4)], "valid addresses are 1-4"),
    choices("Dst1", &[(1, 2)], "valid ports are 1 or 2"),
    choices("Dst2", &[(1, 2)], "valid ports are 1 or 2"),
    choices("Dst3", &[(1, 2)], "valid ports are 1 or 2"),
    choices("Dst4", &[(1, 2)], "valid ports are 1 or 2"),
    // Test
    choices("SimAcDly", &[(0, 30000)], "valid delays are 0-30000 ms"),
    flag("PktEcho"),
    // Receiver
    choices("PktSize", &[(0, 7)], "valid sizes are 0-7"),
    flag("RcvAll"),
    stepped("RxFreq", 7000.0, 16000.0, 250.0, 1.0, "valid frequencies are 7000-16000 Hz in 250 Hz steps"),
    choices("RxThresh", &[(10, 256)], "valid thresholds are 10-256"),
    choices("RxToneDur", &[(0, 1), (5, 15)], "valid durations are 0, 1 or 5-15"),
    choices("RxLockout", &[(0, 1000)], "valid times are 0-1000 ms"),
    // Transmitter
    stepped("TxToneDur", 10.0, 25.0, 0.1, 10.0, "valid durations are 10.0-25.0 ms in 0.1 ms steps"),
    stepped("TAT", 0.0, 100.0, 0.1, 10.0, "valid times are 0-100.0 ms in 0.1 ms steps"),
];

const GRID_TOLERANCE: f64 = 1e-6;

/// Decimal places needed to write any multiple of `step` exactly.
fn decimals(step: f64) -> usize {
    (0..6)
        .find(|&places| {
            let scaled = step * 10f64.powi(places as i32);
            (scaled - scaled.round()).abs() < GRID_TOLERANCE
        })
        .unwrap_or(6)
}

pub fn lookup(name: &str) -> Result<&'static Register> {
    let name = PropertyNameRef::from_str(name)
        .map_err(|_| ModemError::validation("property name", name, "register names are alphanumeric, optionally prefixed with @"))?;
    REGISTERS
        .iter()
        .find(|r| r.name.eq_ignore_ascii_case(name.as_str()))
        .ok_or_else(|| ModemError::validation("property name", name.as_str(), "not a known modem register"))
}

impl Register {
    pub fn is_writable(&self) -> bool {
        !matches!(self.domain, Domain::Sensor)
    }

    pub fn is_flag(&self) -> bool {
        matches!(self.domain, Domain::Flag)
    }

    /// Checks `value` against the register's domain and renders it the way
    /// the modem expects it after the `=`.
    pub(crate) fn encode_value(&self, value: f64) -> Result<String> {
        let out_of_range = || ModemError::validation("property value", value, self.allowed);
        if !value.is_finite() {
            return Err(out_of_range());
        }
        match self.domain {
            Domain::Choices(ranges) => {
                if value.fract() != 0.0 {
                    return Err(out_of_range());
                }
                let value = value as i64;
                if ranges.iter().any(|&(low, high)| (low..=high).contains(&value)) {
                    Ok(value.to_string())
                } else {
                    Err(out_of_range())
                }
            }
            Domain::Stepped { min, max, step, wire_scale } => {
                let steps = (value - min) / step;
                if value < min - GRID_TOLERANCE || value > max + GRID_TOLERANCE || (steps - steps.round()).abs() > GRID_TOLERANCE {
                    return Err(out_of_range());
                }
                let snapped = min + steps.round() * step;
                if wire_scale == 1.0 {
                    Ok(format!("{:.*}", decimals(step), snapped))
                } else {
                    Ok(((snapped * wire_scale).round() as i64).to_string())
                }
            }
            Domain::Sensor => Err(ModemError::validation("property", self.name, "register is read-only")),
            Domain::Flag => Err(ModemError::validation("property", self.name, "register is an Ena/Dis flag")),
        }
    }

    pub(crate) fn encode_flag(&self, enabled: bool) -> Result<String> {
        if !self.is_flag() {
            return Err(ModemError::validation("property", self.name, "register is not an Ena/Dis flag"));
        }
        Ok(if enabled { "Ena" } else { "Dis" }.to_owned())
    }

    pub(crate) fn decode_value(&self, wire: f64) -> f64 {
        match self.domain {
            Domain::Stepped { wire_scale, .. } => wire / wire_scale,
            _ => wire,
        }
    }
}
