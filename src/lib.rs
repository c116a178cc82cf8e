//! Driver for Teledyne Benthos ATM-900 / UDB-9400 series acoustic modems.
//!
//! A [`ModemLink`] owns the serial connection to one modem and turns typed
//! operations into the modem's line-oriented command protocol:
//!
//! ```no_run
//! # async fn demo() -> Result<(), benthos_modem::ModemError> {
//! use benthos_modem::{LinkConfig, ModemLink, SerialConnector};
//!
//! let mut modem = ModemLink::open(&SerialConnector, &LinkConfig::new("/dev/ttyUSB0", 9600))?;
//! modem.write(b"Hello, World!").await?;
//! modem.remote_power(255, 8).await?;
//! let temp = modem.get_property("temp").await?;
//! let report = modem.link_test(255).await?;
//! println!("{temp} C, link quality {}", report.quality);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod modem;
pub mod registers;
mod parser;
mod types;

pub use config::LinkConfig;
pub use error::{ModemError, Result};
pub use modem::{Ack, Connector, LinkTestReport, ModemLink, Reading, RemoteProperty, SerialConnector};
pub use types::{InvalidPropertyName, PropertyName, PropertyNameRef, RemoteAddress, SUPPORTED_BAUD_RATES};
