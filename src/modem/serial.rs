use std::io;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use super::Connector;

/// Opens real serial ports, 8N1 without flow control as the modem ships.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    type Stream = SerialStream;

    fn connect(&self, port: &str, baud: u32) -> io::Result<SerialStream> {
        let stream = tokio_serial::new(port, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()?;
        tracing::trace!(port, baud, "opened serial port");
        Ok(stream)
    }
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> io::Result<Vec<String>> {
    let ports = tokio_serial::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
