use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

pub mod atm900;
mod framing;
mod link;
pub mod serial;
#[cfg(test)]
pub(crate) mod sim;

pub use atm900::{Ack, Command, LinkTestReport, Reading, RemoteProperty, SerialPortId};
pub use link::ModemLink;
pub use serial::SerialConnector;

/// Opens the byte stream a [`ModemLink`] talks over.
pub trait Connector {
    type Stream: AsyncRead + AsyncWrite + Unpin;

    fn connect(&self, port: &str, baud: u32) -> io::Result<Self::Stream>;
}
