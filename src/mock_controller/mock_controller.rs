//! Simulated dome controller.
//!
//! Speaks the CR-terminated command set over TCP so a session can be driven
//! end to end without hardware. The rotator, shutter and calibration run is
//! emulated in a loop that ticks every 50 milliseconds.

use std::str;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Duration};

use crate::{
    dome_cmd_regex::DomeCmdRegex,
    error::DomeResult,
    motor_state::MotorState,
    protocol::{DomeCommand, ProtocolVariant},
    reply_parser::{normalize_azimuth, within_tolerance},
    status::{ExtendedStatus, ShutterState},
};

const CYCLE: Duration = Duration::from_millis(50);
const FIRMWARE_VERSION: &str = "1.27";
const ACK: &str = "A";
const NAK: &str = "E";

#[derive(Debug, Clone, Copy)]
pub struct MockControllerConfig {
    pub protocol: ProtocolVariant,
    /// How much the dome can move per cycle.
    pub degrees_per_cycle: f64,
    /// Cycles needed to open or close the shutter.
    pub shutter_cycles: u32,
    /// Cycles needed for a full calibration run.
    pub calibration_cycles: u32,
    pub has_shutter: bool,
    pub steps_per_revolution: i64,
}

impl Default for MockControllerConfig {
    fn default() -> MockControllerConfig {
        // 0.3 deg per cycle is 6 deg/s.
        MockControllerConfig {
            protocol: ProtocolVariant::Classic,
            degrees_per_cycle: 0.3,
            shutter_cycles: 40,
            calibration_cycles: 100,
            has_shutter: true,
            steps_per_revolution: 10240,
        }
    }
}

struct MockControllerCmd {
    pub dome_cmd: DomeCommand,
    pub tx: oneshot::Sender<String>,
}

/// Emulated state of the rotator and the shutter.
#[derive(Debug, Clone)]
struct MockDome {
    config: MockControllerConfig,
    azimuth: f64,
    target: f64,
    motor_state: MotorState,
    home_azimuth: f64,
    park_azimuth: f64,
    shutter_state: ShutterState,
    shutter_countdown: u32,
    calibration_countdown: u32,
    battery_percent: u32,
    battery_millivolts: u32,
}

impl MockDome {
    fn new(config: MockControllerConfig) -> MockDome {
        let shutter_state = if config.has_shutter {
            ShutterState::Closed
        } else {
            ShutterState::NotFitted
        };
        MockDome {
            config,
            azimuth: 180.0,
            target: 180.0,
            motor_state: MotorState::Idle,
            home_azimuth: 180.0,
            park_azimuth: 180.0,
            shutter_state,
            shutter_countdown: 0,
            calibration_countdown: 0,
            battery_percent: 85,
            battery_millivolts: 12400,
        }
    }

    fn at_home(&self) -> bool {
        !self.motor_state.is_moving() && within_tolerance(self.home_azimuth, self.azimuth)
    }

    fn at_park(&self) -> bool {
        !self.motor_state.is_moving() && within_tolerance(self.park_azimuth, self.azimuth)
    }

    fn start_move(&mut self, target: f64, motor_state: MotorState) {
        self.target = normalize_azimuth(target);
        self.motor_state = motor_state;
    }

    fn start_shutter(&mut self, moving: ShutterState, done: ShutterState) -> &'static str {
        match self.shutter_state {
            ShutterState::NotFitted => NAK,
            state if state == done => ACK,
            _ => {
                self.shutter_state = moving;
                self.shutter_countdown = self.config.shutter_cycles;
                ACK
            }
        }
    }

    fn status(&self) -> ExtendedStatus {
        ExtendedStatus {
            azimuth: self.azimuth,
            motor_state: Some(self.motor_state),
            motor_code: self.motor_state.code(),
            at_home: self.at_home(),
            at_park: self.at_park(),
            steps_per_revolution: self.config.steps_per_revolution,
            shutter_state: self.shutter_state,
        }
    }

    /// Reply payload for one command, without prompt or terminator.
    fn handle(&mut self, dome_cmd: DomeCommand) -> String {
        let flag = |value: bool| u8::from(value).to_string();
        match dome_cmd {
            DomeCommand::FirmwareVersion => FIRMWARE_VERSION.to_string(),
            DomeCommand::Position => format!("{:.1}", self.azimuth),
            DomeCommand::HomeAzimuth => format!("{:.1}", self.home_azimuth),
            DomeCommand::ParkAzimuth => format!("{:.1}", self.park_azimuth),
            DomeCommand::ShutterState => self.shutter_state.code().to_string(),
            DomeCommand::MotorState => self.motor_state.code().to_string(),
            DomeCommand::HomeSwitch => flag(self.at_home()),
            DomeCommand::AtPark => flag(self.at_park()),
            DomeCommand::StepsPerRevolution => self.config.steps_per_revolution.to_string(),
            DomeCommand::Battery => format!("{} {}", self.battery_percent, self.battery_millivolts),
            DomeCommand::Status => self.status().as_string(),
            DomeCommand::Sync(azimuth) => {
                if self.motor_state.is_moving() {
                    return NAK.to_string();
                }
                self.azimuth = normalize_azimuth(azimuth);
                self.target = self.azimuth;
                ACK.to_string()
            }
            DomeCommand::Goto(azimuth) => {
                if azimuth >= 360.0 {
                    return NAK.to_string();
                }
                self.start_move(azimuth, MotorState::MovingToTarget);
                ACK.to_string()
            }
            DomeCommand::GoHome => {
                self.start_move(self.home_azimuth, MotorState::GoingHome);
                ACK.to_string()
            }
            DomeCommand::Park => {
                self.start_move(self.park_azimuth, MotorState::MovingToTarget);
                ACK.to_string()
            }
            DomeCommand::Calibrate => {
                self.motor_state = MotorState::Calibrating;
                self.calibration_countdown = self.config.calibration_cycles;
                ACK.to_string()
            }
            DomeCommand::OpenShutter => self
                .start_shutter(ShutterState::Opening, ShutterState::Open)
                .to_string(),
            DomeCommand::CloseShutter => self
                .start_shutter(ShutterState::Closing, ShutterState::Closed)
                .to_string(),
            DomeCommand::Stop => {
                // Just a way to emulate the operation; there is no
                // deceleration.
                self.motor_state = MotorState::Idle;
                self.target = self.azimuth;
                self.calibration_countdown = 0;
                ACK.to_string()
            }
            DomeCommand::SetHomeAzimuth(azimuth) => {
                self.home_azimuth = normalize_azimuth(azimuth);
                ACK.to_string()
            }
            DomeCommand::SetParkAzimuth(azimuth) => {
                self.park_azimuth = normalize_azimuth(azimuth);
                ACK.to_string()
            }
        }
    }

    /// Advance the emulation by one cycle.
    fn step(&mut self) {
        match self.motor_state {
            MotorState::MovingToTarget | MotorState::GoingHome => {
                // Shortest way around, signed in (-180, 180].
                let mut delta_az = normalize_azimuth(self.target - self.azimuth);
                if delta_az > 180.0 {
                    delta_az -= 360.0;
                }
                if delta_az.abs() > self.config.degrees_per_cycle {
                    self.azimuth = normalize_azimuth(
                        self.azimuth + self.config.degrees_per_cycle.copysign(delta_az),
                    );
                } else {
                    self.azimuth = self.target;
                    self.motor_state = MotorState::Idle;
                }
            }
            MotorState::Calibrating => {
                if self.calibration_countdown > 0 {
                    self.calibration_countdown -= 1;
                    self.azimuth =
                        normalize_azimuth(self.azimuth + self.config.degrees_per_cycle);
                } else {
                    // The run ends on the home switch.
                    self.azimuth = self.home_azimuth;
                    self.target = self.home_azimuth;
                    self.motor_state = MotorState::Idle;
                }
            }
            MotorState::Idle
            | MotorState::MovingToVelocity
            | MotorState::MovingSidereal
            | MotorState::MovingCCW
            | MotorState::MovingCW => {}
        }

        if self.shutter_state.is_moving() {
            if self.shutter_countdown > 0 {
                self.shutter_countdown -= 1;
            } else {
                self.shutter_state = match self.shutter_state {
                    ShutterState::Opening => ShutterState::Open,
                    _ => ShutterState::Closed,
                };
            }
        }
    }
}

/// Frame a reply the way the configured firmware does.
fn frame_reply(protocol: ProtocolVariant, payload: &str) -> Vec<u8> {
    let mut reply = match protocol {
        ProtocolVariant::Classic => String::new(),
        ProtocolVariant::Extended => ">".to_string(),
    };
    reply.push_str(payload);
    reply.push('\r');
    reply.into_bytes()
}

/// Whether the emulated firmware revision has this command at all.
fn knows_command(protocol: ProtocolVariant, dome_cmd: &DomeCommand) -> bool {
    protocol.build().supports(dome_cmd)
}

pub async fn run_mock_controller(port: u16) -> DomeResult<()> {
    let listener = TcpListener::bind(&format!("127.0.0.1:{port}")).await?;
    log::info!("Mock dome controller listening on {}.", listener.local_addr()?);
    serve(listener, MockControllerConfig::default()).await
}

/// Run the controller on an already bound listener, serving one client at a
/// time.
pub async fn serve(listener: TcpListener, config: MockControllerConfig) -> DomeResult<()> {
    let (tx, mut rx) = mpsc::channel::<MockControllerCmd>(100);

    tokio::spawn(async move {
        let mut dome = MockDome::new(config);

        loop {
            match rx.try_recv() {
                Ok(cmd) => {
                    let reply = dome.handle(cmd.dome_cmd);
                    let _ = cmd.tx.send(reply);
                }
                Err(err) => match err {
                    TryRecvError::Empty => {}
                    TryRecvError::Disconnected => break,
                },
            };
            dome.step();
            sleep(CYCLE).await;
        }
    });

    let dome_cmd_regex = DomeCmdRegex::new()?;

    loop {
        let (socket, peer) = listener.accept().await?;
        log::debug!("Client {peer} connected.");
        if let Err(error) = serve_client(socket, &dome_cmd_regex, &tx, config.protocol).await {
            log::warn!("Client {peer} dropped: {error}");
        }
    }
}

async fn serve_client(
    mut socket: TcpStream,
    dome_cmd_regex: &DomeCmdRegex,
    tx: &mpsc::Sender<MockControllerCmd>,
    protocol: ProtocolVariant,
) -> DomeResult<()> {
    let mut buf = vec![0; 1024];
    let mut line: Vec<u8> = Vec::new();

    loop {
        let n_bytes = socket.read(&mut buf).await?;
        // Return value of `Ok(0)` signifies that the remote has closed.
        if n_bytes == 0 {
            return Ok(());
        }
        for &byte in &buf[..n_bytes] {
            match byte {
                b'\r' => {
                    let cmd = str::from_utf8(&line).unwrap_or_default().trim().to_string();
                    line.clear();
                    let payload = match dome_cmd_regex.into_dome_cmd(&cmd) {
                        Some(dome_cmd) if knows_command(protocol, &dome_cmd) => {
                            let (mock_controller_tx, mock_controller_rx) = oneshot::channel();
                            let mock_controller_cmd = MockControllerCmd {
                                dome_cmd,
                                tx: mock_controller_tx,
                            };
                            if tx.send(mock_controller_cmd).await.is_err() {
                                return Ok(());
                            }
                            match mock_controller_rx.await {
                                Ok(reply) => reply,
                                Err(_) => {
                                    log::error!(
                                        "Internal error when requesting response from controller loop."
                                    );
                                    return Ok(());
                                }
                            }
                        }
                        _ => {
                            log::warn!("Unknown dome command: {cmd}.");
                            NAK.to_string()
                        }
                    };
                    socket.write_all(&frame_reply(protocol, &payload)).await?;
                }
                b'\n' => {}
                _ => line.push(byte),
            }
        }
    }
}
