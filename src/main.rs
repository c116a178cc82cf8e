use std::str::FromStr;
use std::time::Duration;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use benthos_modem::modem::serial::available_ports;
use benthos_modem::registers::{Domain, REGISTERS};
use benthos_modem::{LinkConfig, ModemLink, SerialConnector};

#[derive(Debug, StructOpt)]
#[structopt(name = "benthos-modem", about = "Talk to a Teledyne Benthos ATM-900 series acoustic modem")]
struct Opt {
    /// Serial port the modem is attached to
    #[structopt(short, long, env = "BENTHOS_PORT", default_value = "/dev/ttyUSB0")]
    port: String,

    /// Host port baud rate the modem is configured for
    #[structopt(short, long, env = "BENTHOS_BAUD", default_value = "9600")]
    baud: u32,

    /// How long to wait for ordinary replies, in milliseconds
    #[structopt(long, env = "BENTHOS_TIMEOUT_MS", default_value = "1000")]
    timeout_ms: u64,

    /// How long to wait for a link test to finish, in milliseconds
    #[structopt(long, env = "BENTHOS_LINK_TEST_TIMEOUT_MS", default_value = "30000")]
    link_test_timeout_ms: u64,

    /// Log filter, in `tracing_subscriber::EnvFilter` syntax
    #[structopt(long, env = "RUST_LOG", default_value = "info")]
    log: String,

    #[structopt(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, StructOpt)]
enum Cmd {
    /// List serial ports on this machine
    Ports,
    /// List the registers `get`, `set` and `flag` understand
    Properties,
    /// Transmit a line of text acoustically
    Write { text: String },
    /// Set the transmit power level (1-8) of a remote unit
    RemotePower { address: u32, level: u32 },
    /// Set the acoustic bit rate setting (2-13) of a remote unit
    RemoteRate { address: u32, rate: u32 },
    /// Read a numeric register, e.g. `temp`
    Get { name: String },
    /// Move the modem's host port to a new baud rate and reconnect at it
    Baud { rate: u32 },
    /// Write a numeric register
    Set { name: String, value: f64 },
    /// Read an Ena/Dis register, or set it to `on` or `off`
    Flag {
        name: String,
        state: Option<Switch>,
    },
    /// Test the acoustic link to a remote unit (255 broadcasts)
    LinkTest { address: u32 },
    /// Go online with a remote unit
    Dial { address: u32 },
    /// Send all remote units to low power
    HangUp,
    /// Reboot the local modem
    Reboot,
    /// Store the current settings in flash
    Save,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Switch {
    On,
    Off,
}

impl FromStr for Switch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" | "ena" | "true" | "1" => Ok(Self::On),
            "off" | "dis" | "false" | "0" => Ok(Self::Off),
            _ => Err(format!("expected on or off, got `{}`", s)),
        }
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenv::dotenv().ok();
    color_eyre::install()?;

    let opt: Opt = Opt::from_args();

    let env_filter = EnvFilter::try_new(&opt.log)?;
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(tracing_error::ErrorLayer::default())
        .init();

    match opt.cmd {
        Cmd::Ports => {
            for port in available_ports()? {
                println!("{}", port);
            }
            Ok(())
        }
        Cmd::Properties => {
            for register in REGISTERS {
                let kind = match register.domain {
                    Domain::Sensor => "sensor",
                    Domain::Flag => "flag",
                    Domain::Choices(_) | Domain::Stepped { .. } => "setting",
                };
                println!("{:<14} {:<8} {}", register.name, kind, register.allowed);
            }
            Ok(())
        }
        cmd => {
            let config = LinkConfig::new(opt.port, opt.baud)
                .with_reply_timeout(Duration::from_millis(opt.timeout_ms))
                .with_link_test_timeout(Duration::from_millis(opt.link_test_timeout_ms));
            let mut modem = ModemLink::open(&SerialConnector, &config)?;
            let result = run(&mut modem, cmd).await;
            if modem.is_open() {
                modem.close().await?;
            }
            result
        }
    }
}

async fn run(modem: &mut ModemLink<tokio_serial::SerialStream>, cmd: Cmd) -> color_eyre::Result<()> {
    match cmd {
        Cmd::Write { text } => {
            modem.write(text.as_bytes()).await?;
            println!("sent {} bytes", text.len());
        }
        Cmd::RemotePower { address, level } => {
            modem.remote_power(address, level).await?;
            println!("remote {} power level set to {}", address, level);
        }
        Cmd::RemoteRate { address, rate } => {
            modem.remote_rate(address, rate).await?;
            println!("remote {} bit rate set to {}", address, rate);
        }
        Cmd::Get { name } => {
            let reading = modem.read_property(&name).await?;
            match reading.description {
                Some(description) => println!("{} ({})", reading.value, description),
                None => println!("{}", reading.value),
            }
        }
        Cmd::Baud { rate } => {
            modem.change_baud(&SerialConnector, rate).await?;
            println!("host port now at {} baud", rate);
        }
        Cmd::Set { name, value } => {
            modem.set_property(&name, value).await?;
            println!("{} = {}", name, value);
        }
        Cmd::Flag { name, state: None } => {
            let enabled = modem.get_flag(&name).await?;
            println!("{}", if enabled { "on" } else { "off" });
        }
        Cmd::Flag { name, state: Some(switch) } => {
            let enabled = switch == Switch::On;
            modem.set_flag(&name, enabled).await?;
            println!("{} {}", name, if enabled { "on" } else { "off" });
        }
        Cmd::LinkTest { address } => {
            let report = modem.link_test(address).await?;
            let status = if report.success { "ok" } else { "failed" };
            match report.round_trip {
                Some(rtt) => println!("link {}: quality {}, round trip {:?}", status, report.quality, rtt),
                None => println!("link {}: quality {}", status, report.quality),
            }
        }
        Cmd::Dial { address } => {
            modem.dial(address).await?;
        }
        Cmd::HangUp => {
            modem.hang_up().await?;
        }
        Cmd::Reboot => {
            modem.reboot().await?;
        }
        Cmd::Save => {
            modem.write_settings().await?;
        }
        // Listed in `main` without opening the port.
        Cmd::Ports | Cmd::Properties => {}
    }
    Ok(())
}
