use std::io;
use std::time::Duration;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::LinkConfig;
use crate::error::{ModemError, Result};
use crate::parser::{parse_error, StrOrByteSlice};
use crate::registers::{self, Domain};
use crate::types::{is_supported_baud, RemoteAddress};

use super::atm900::{self, Ack, Command, LinkTestReport, Reading, RemoteProperty, SerialPortId, MAX_PAYLOAD_LEN};
use super::framing::LineBuffer;
use super::Connector;

/// A half-duplex command link to one ATM-900 series modem.
///
/// Every operation sends exactly one command line and waits for exactly one
/// reply line. Operations take `&mut self`, so a link can never have two
/// exchanges in flight. Callers that share a link need their own lock.
///
/// The link is `Open` from [`ModemLink::open`] until [`ModemLink::close`] or
/// drop. Dropping the link releases the port on every path.
///
/// After a timeout, or a reply of unknown length, input still waiting on the
/// port is dropped before the next command goes out.
pub struct ModemLink<S> {
    port: String,
    stream: Option<S>,
    lines: LineBuffer,
    frame: BytesMut,
    resync: bool,
    reply_timeout: Duration,
    link_test_timeout: Duration,
}

impl<S> ModemLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    #[tracing::instrument(skip(connector, config), fields(port = %config.port, baud = config.baud), err)]
    pub fn open<C>(connector: &C, config: &LinkConfig) -> Result<Self>
    where
        C: Connector<Stream = S>,
    {
        let connection_error = |source| ModemError::Connection {
            port: config.port.clone(),
            baud: config.baud,
            source,
        };
        if !is_supported_baud(config.baud) {
            return Err(connection_error(io::Error::new(io::ErrorKind::InvalidInput, "unsupported baud rate")));
        }
        let stream = connector.connect(&config.port, config.baud).map_err(connection_error)?;
        tracing::info!("modem link open");

        Ok(Self {
            port: config.port.clone(),
            stream: Some(stream),
            lines: LineBuffer::new(),
            frame: BytesMut::with_capacity(64),
            resync: false,
            reply_timeout: config.reply_timeout,
            link_test_timeout: config.link_test_timeout,
        })
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Releases the serial port. The link cannot be used afterwards.
    #[tracing::instrument(skip(self), fields(port = %self.port), err)]
    pub async fn close(&mut self) -> Result<()> {
        self.release().await?;
        tracing::info!("modem link closed");
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        let mut stream = self.stream.take().ok_or(ModemError::InvalidState)?;
        if let Err(err) = stream.shutdown().await {
            tracing::debug!(%err, "shutdown before close failed");
        }
        self.lines.clear();
        self.resync = false;
        Ok(())
    }

    /// Sends `payload` as a pass-through data frame for acoustic transmission.
    #[tracing::instrument(skip(self, payload), fields(len = payload.len()), err)]
    pub async fn write(&mut self, payload: &[u8]) -> Result<Ack> {
        self.ensure_open()?;
        if payload.is_empty() || payload.len() > MAX_PAYLOAD_LEN {
            return Err(ModemError::validation("payload length", payload.len(), "payloads are 1-4096 bytes"));
        }
        if payload.iter().any(|&b| b == b'\r' || b == b'\n') {
            return Err(ModemError::validation("payload", StrOrByteSlice::from(payload), "payloads cannot contain line endings"));
        }
        let command = Command::Data(Bytes::copy_from_slice(payload));
        let reply = self.transact(&command, self.reply_timeout).await?;
        atm900::expect_ack(&command, &reply)
    }

    /// Sets `property` on the remote unit at `address`.
    #[tracing::instrument(skip(self), err)]
    pub async fn set_remote_property(&mut self, property: RemoteProperty, address: u32, value: u32) -> Result<Ack> {
        self.ensure_open()?;
        let address = RemoteAddress::new(address)?;
        let value = property.validate(value)?;
        self.command(Command::SetRemote { property, address, value }).await
    }

    /// Sets the transmit power level (1-8) of a remote unit.
    pub async fn remote_power(&mut self, address: u32, level: u32) -> Result<Ack> {
        self.set_remote_property(RemoteProperty::Power, address, level).await
    }

    /// Sets the acoustic bit rate setting (2-13) of a remote unit.
    pub async fn remote_rate(&mut self, address: u32, rate: u32) -> Result<Ack> {
        self.set_remote_property(RemoteProperty::Rate, address, rate).await
    }

    /// Reads a numeric register, e.g. `temp` or `TxPower`.
    pub async fn get_property(&mut self, name: &str) -> Result<f64> {
        self.read_property(name).await.map(|r| r.value)
    }

    /// Reads a numeric register together with the modem's description of
    /// the value, e.g. `0 dB` for `TxPower` 8.
    #[tracing::instrument(skip(self), err)]
    pub async fn read_property(&mut self, name: &str) -> Result<Reading> {
        self.ensure_open()?;
        let register = registers::lookup(name)?;
        match register.domain {
            Domain::Flag => Err(ModemError::validation("property", register.name, "register is an Ena/Dis flag")),
            Domain::Sensor => {
                let value = self.read_sensor(register.name).await?;
                Ok(Reading { value, description: None })
            }
            Domain::Choices(_) | Domain::Stepped { .. } => {
                let command = Command::ReadRegister(register.name);
                let reply = self.transact(&command, self.reply_timeout).await?;
                let reading = atm900::expect_reading(&command, &reply)?;
                Ok(Reading {
                    value: register.decode_value(reading.value),
                    ..reading
                })
            }
        }
    }

    /// Picks the line labelled `label` out of the `ATV` report, reading up
    /// to the report's last line.
    async fn read_sensor(&mut self, label: &'static str) -> Result<f64> {
        let command = Command::SupplyReport;
        let mut wanted = None;
        let value = self
            .exchange(&command, self.reply_timeout, |line| {
                let (name, value) = match atm900::expect_report_line(&command, line)? {
                    Some(reading) => reading,
                    None => return Ok(None),
                };
                if name.eq_ignore_ascii_case(label) {
                    wanted = Some(value);
                }
                if name.eq_ignore_ascii_case(atm900::SUPPLY_REPORT_LAST) {
                    return wanted.map(Some).ok_or_else(|| parse_error(line, "a report line for the requested sensor"));
                }
                Ok(None)
            })
            .await?;
        // Firmware may append lines after the last reading.
        self.resync = true;
        Ok(value)
    }

    /// Writes a numeric register after checking its documented range.
    ///
    /// Writing `P1Baud` moves the host port to the new rate, so the link is
    /// closed once the modem acknowledges. [`ModemLink::change_baud`] reopens
    /// it in the same step.
    #[tracing::instrument(skip(self), err)]
    pub async fn set_property(&mut self, name: &str, value: f64) -> Result<Ack> {
        self.ensure_open()?;
        let register = registers::lookup(name)?;
        let value = register.encode_value(value)?;
        let ack = self.command(Command::WriteRegister { register: register.name, value }).await?;
        if register.name == HOST_BAUD_REGISTER {
            self.release().await?;
            tracing::info!("host port baud rate changed, modem link closed");
        }
        Ok(ack)
    }

    /// Moves the modem's host port to `baud` and reopens the link at that
    /// rate through `connector`. If the reopen fails the link stays closed.
    #[tracing::instrument(skip(self, connector), fields(port = %self.port), err)]
    pub async fn change_baud<C>(&mut self, connector: &C, baud: u32) -> Result<Ack>
    where
        C: Connector<Stream = S>,
    {
        let ack = self.set_property(HOST_BAUD_REGISTER, f64::from(baud)).await?;
        let stream = connector.connect(&self.port, baud).map_err(|source| ModemError::Connection {
            port: self.port.clone(),
            baud,
            source,
        })?;
        self.stream = Some(stream);
        tracing::info!("modem link reopened");
        Ok(ack)
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn get_flag(&mut self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        let register = registers::lookup(name)?;
        if !register.is_flag() {
            return Err(ModemError::validation("property", register.name, "register is not an Ena/Dis flag"));
        }
        let command = Command::ReadRegister(register.name);
        let reply = self.transact(&command, self.reply_timeout).await?;
        atm900::expect_flag(&command, &reply)
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn set_flag(&mut self, name: &str, enabled: bool) -> Result<Ack> {
        self.ensure_open()?;
        let register = registers::lookup(name)?;
        let value = register.encode_flag(enabled)?;
        self.command(Command::WriteRegister { register: register.name, value }).await
    }

    /// Runs an acoustic link test against the unit at `address`.
    #[tracing::instrument(skip(self), err)]
    pub async fn link_test(&mut self, address: u32) -> Result<LinkTestReport> {
        self.ensure_open()?;
        let command = Command::LinkTest(RemoteAddress::new(address)?);
        let reply = self.transact(&command, self.link_test_timeout).await?;
        let report = atm900::expect_link_test(&command, &reply)?;
        tracing::info!(success = report.success, quality = report.quality, "link test finished");
        Ok(report)
    }

    /// Resets the idle timer and checks that the modem answers.
    pub async fn attention(&mut self) -> Result<Ack> {
        self.command(Command::Attention).await
    }

    /// Goes online with the remote unit at `address`.
    pub async fn dial(&mut self, address: u32) -> Result<Ack> {
        self.ensure_open()?;
        self.command(Command::Dial(RemoteAddress::new(address)?)).await
    }

    /// Sends all remote units to their low power state.
    pub async fn hang_up(&mut self) -> Result<Ack> {
        self.command(Command::HangUp).await
    }

    /// Reboots the local modem firmware.
    pub async fn reboot(&mut self) -> Result<Ack> {
        self.command(Command::Reboot).await
    }

    pub async fn remote_reset(&mut self, address: u32) -> Result<Ack> {
        self.ensure_open()?;
        self.command(Command::RemoteReset(RemoteAddress::new(address)?)).await
    }

    /// Stores the current settings in flash.
    pub async fn write_settings(&mut self) -> Result<Ack> {
        self.command(Command::WriteSettings).await
    }

    pub async fn factory_reset(&mut self) -> Result<Ack> {
        self.command(Command::FactoryReset).await
    }

    /// Makes the remote unit send a break on its serial `port` and go online.
    pub async fn remote_break(&mut self, address: u32, port: u32) -> Result<Ack> {
        self.ensure_open()?;
        let address = RemoteAddress::new(address)?;
        let port = SerialPortId::new(port)?;
        self.command(Command::RemoteBreak { address, port }).await
    }

    /// Waits for the next line of inbound data from the modem.
    #[tracing::instrument(skip(self), err)]
    pub async fn read_line(&mut self) -> Result<Bytes> {
        let stream = self.stream.as_mut().ok_or(ModemError::InvalidState)?;
        let timeout = self.reply_timeout;
        match tokio::time::timeout(timeout, receive_line(stream, &mut self.lines, None)).await {
            Ok(line) => line,
            Err(_) => Err(ModemError::Timeout { command: String::from("<receive>"), waited: timeout }),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ModemError::InvalidState)
        }
    }

    async fn command(&mut self, command: Command) -> Result<Ack> {
        let reply = self.transact(&command, self.reply_timeout).await?;
        atm900::expect_ack(&command, &reply)
    }

    /// Sends one command line and returns the first reply line.
    async fn transact(&mut self, command: &Command, timeout: Duration) -> Result<Bytes> {
        self.exchange(command, timeout, |line| Ok(Some(Bytes::copy_from_slice(line)))).await
    }

    /// Sends one command line, then hands reply lines to `accept` until it
    /// returns a value. `timeout` bounds the whole exchange.
    async fn exchange<T, F>(&mut self, command: &Command, timeout: Duration, mut accept: F) -> Result<T>
    where
        F: FnMut(&[u8]) -> Result<Option<T>>,
    {
        let stream = self.stream.as_mut().ok_or(ModemError::InvalidState)?;
        if self.resync {
            drain(stream, &mut self.lines).await?;
            self.resync = false;
        }
        self.frame.clear();
        command.encode(&mut self.frame);
        let frame = &self.frame[..];
        let echo = if command.may_echo() {
            Some(&frame[..frame.len() - atm900::LINE_ENDING.len()])
        } else {
            None
        };
        tracing::trace!(%command, "sending command");

        let outcome = tokio::time::timeout(timeout, send_and_receive(stream, &mut self.lines, frame, echo, &mut accept)).await;
        match outcome {
            Ok(reply) => reply,
            Err(_) => {
                let dropped = self.lines.discard_buffered();
                self.resync = true;
                tracing::debug!(dropped, "reply timed out");
                Err(ModemError::Timeout { command: command.to_string(), waited: timeout })
            }
        }
    }
}

const HOST_BAUD_REGISTER: &str = "P1Baud";

async fn send_and_receive<S, T, F>(stream: &mut S, lines: &mut LineBuffer, frame: &[u8], echo: Option<&[u8]>, accept: &mut F) -> Result<T>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnMut(&[u8]) -> Result<Option<T>>,
{
    stream.write_all(frame).await?;
    stream.flush().await?;
    loop {
        let line = receive_line(stream, lines, echo).await?;
        if let Some(output) = accept(&line[..])? {
            return Ok(output);
        }
    }
}

/// Drops whatever the modem has already sent, without waiting for more.
async fn drain<S>(stream: &mut S, lines: &mut LineBuffer) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    loop {
        match tokio::time::timeout(Duration::ZERO, stream.read_buf(lines.buffer_mut())).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(_)) => {}
            Ok(Err(err)) => return Err(err.into()),
        }
    }
    let dropped = lines.discard_buffered();
    if dropped > 0 {
        tracing::debug!(dropped, "dropped stale input");
    }
    Ok(())
}

async fn receive_line<S>(stream: &mut S, lines: &mut LineBuffer, echo: Option<&[u8]>) -> Result<Bytes>
where
    S: AsyncRead + Unpin,
{
    loop {
        while let Some(line) = lines.next_line()? {
            if line.is_empty() {
                continue;
            }
            if echo == Some(&line[..]) {
                tracing::trace!("skipping command echo");
                continue;
            }
            tracing::trace!(line = %StrOrByteSlice::from(&line[..]), "received line");
            return Ok(line);
        }

        let bytes = stream.read_buf(lines.buffer_mut()).await?;
        if bytes == 0 {
            lines.end_of_stream()?;
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "modem closed the connection").into());
        }
        tracing::trace!(bytes, "received bytes from modem");
    }
}
