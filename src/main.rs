use std::{error::Error, path::PathBuf, thread, time::Duration};

use clap::{Args, Parser, Subcommand};

use rigeldome::{
    config::DomeConfig,
    dome_session::DomeSession,
    error::{DomeError, DomeResult},
    mock_controller::mock_controller::run_mock_controller,
    protocol::ProtocolVariant,
    transport::TransportKind,
};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const POLL_LIMIT: usize = 600;

#[derive(Parser)]
#[command(name = "rigeldome", about = "Drive a motorized observatory dome")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the simulated controller on a local TCP port.
    Mock {
        #[arg(long, default_value_t = 8887)]
        port: u16,
    },
    /// Connect and print the current dome state.
    Status(Link),
    /// Rotate to an azimuth and wait for the move to finish.
    Goto {
        #[arg(allow_hyphen_values = true)]
        azimuth: f64,
        #[command(flatten)]
        link: Link,
    },
    /// Find the home switch.
    Home(Link),
    /// Open the shutter.
    Open(Link),
    /// Close the shutter.
    Close(Link),
}

#[derive(Args)]
struct Link {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Serial device, or `host:port` with `--tcp`; overrides the configuration.
    #[arg(long)]
    port: Option<String>,
    /// Connect over TCP instead of a serial line.
    #[arg(long)]
    tcp: bool,
    /// Talk the extended protocol; overrides the configuration.
    #[arg(long)]
    extended: bool,
}

impl Link {
    fn load(&self) -> DomeResult<DomeConfig> {
        let mut config = match &self.config {
            Some(path) => DomeConfig::from_file(path)?,
            None => DomeConfig::default(),
        };
        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if self.tcp {
            config.transport = TransportKind::Tcp;
        }
        if self.extended {
            config.protocol = ProtocolVariant::Extended;
        }
        if config.port.is_empty() {
            return Err(DomeError::Config("No port given.".to_string()));
        }
        Ok(config)
    }

    fn connect(&self) -> DomeResult<DomeSession> {
        let config = self.load()?;
        let transport = config.transport.build();
        let port = config.port.clone();
        let mut session = DomeSession::new(transport, config)?;
        session.connect(&port)?;
        log::info!(
            "Connected to {port}, firmware {}, {} protocol.",
            session.firmware_version(),
            session.protocol_name()
        );
        Ok(session)
    }
}

/// Poll `done` until it reports completion, fails or runs out of attempts.
fn wait_for(
    session: &mut DomeSession,
    what: &str,
    done: fn(&mut DomeSession) -> DomeResult<bool>,
) -> DomeResult<()> {
    for _ in 0..POLL_LIMIT {
        if done(session)? {
            log::info!("{what} complete.");
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
    session.abort()?;
    log::error!("{what} did not complete.");
    Err(DomeError::Timeout)
}

fn print_status(session: &mut DomeSession) -> DomeResult<()> {
    let azimuth = session.query_azimuth()?;
    let shutter_state = session.query_shutter_state()?;
    let moving = session.is_moving()?;
    println!("firmware:  {}", session.firmware_version());
    println!("protocol:  {}", session.protocol_name());
    println!("azimuth:   {azimuth:.1}");
    println!("elevation: {:.1}", session.current_elevation());
    println!("home:      {:.1}", session.home_azimuth());
    println!("park:      {:.1}", session.park_azimuth());
    println!("shutter:   {shutter_state:?}");
    println!("moving:    {moving}");
    println!("state:     {:?}", session.dome_state());
    if session.has_shutter() {
        let battery = session.query_battery()?;
        println!("battery:   {:.0}% {:.2} V", battery.percent, battery.volts);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Mock { port } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_mock_controller(port))?;
        }
        Command::Status(link) => {
            let mut session = link.connect()?;
            print_status(&mut session)?;
            session.disconnect();
        }
        Command::Goto { azimuth, link } => {
            let mut session = link.connect()?;
            session.goto_azimuth(azimuth)?;
            wait_for(&mut session, "Goto", DomeSession::is_goto_complete)?;
            session.disconnect();
        }
        Command::Home(link) => {
            let mut session = link.connect()?;
            session.go_home()?;
            wait_for(&mut session, "Find home", DomeSession::is_find_home_complete)?;
            session.disconnect();
        }
        Command::Open(link) => {
            let mut session = link.connect()?;
            session.open_shutter()?;
            wait_for(&mut session, "Open shutter", DomeSession::is_open_complete)?;
            session.disconnect();
        }
        Command::Close(link) => {
            let mut session = link.connect()?;
            session.close_shutter()?;
            wait_for(&mut session, "Close shutter", DomeSession::is_close_complete)?;
            session.disconnect();
        }
    }

    Ok(())
}
