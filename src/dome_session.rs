//! Provide an interface to the Rigel dome controller.
//!
//! A [`DomeSession`] owns the serial conversation and the cached dome state.
//! Every exchange is a complete request/reply before the next one starts.
//! Long running operations are started by a command and then followed by
//! repeatedly calling the matching `is_*_complete` poller; the session never
//! sleeps or loops waiting for the dome to move.

use log::Level;

use crate::{
    config::DomeConfig,
    error::{DomeError, DomeResult},
    event_log::{EventLog, LogEventLog},
    motor_state::{is_moving_code, MotorState},
    protocol::{DomeCommand, DomeProtocol},
    reply_parser::{checked_azimuth, normalize_azimuth, within_tolerance, ReplyParser},
    status::{BatteryLevel, DomeState, ExtendedStatus, ShutterState},
    transceiver::CommandTransceiver,
    transport::Transport,
};

const DEFAULT_REFERENCE_AZIMUTH: f64 = 180.0;

pub struct DomeSession {
    transceiver: CommandTransceiver,
    protocol: Box<dyn DomeProtocol>,
    parser: ReplyParser,
    events: Box<dyn EventLog>,
    config: DomeConfig,
    connected: bool,
    firmware_version: String,
    current_azimuth: f64,
    target_azimuth: f64,
    home_azimuth: f64,
    park_azimuth: f64,
    shutter_state: ShutterState,
    has_shutter: bool,
    shutter_opened: bool,
    motor_state: Option<MotorState>,
    homed: bool,
    parked: bool,
    calibrating: bool,
    steps_per_revolution: i64,
    battery: BatteryLevel,
}

impl DomeSession {
    pub fn new(transport: Box<dyn Transport>, config: DomeConfig) -> DomeResult<DomeSession> {
        config.validate()?;
        let protocol = config.protocol.build();
        let transceiver = CommandTransceiver::new(
            transport,
            protocol.framing(),
            protocol.max_line_length(),
            config.read_timeout(),
        );
        Ok(DomeSession {
            transceiver,
            protocol,
            parser: ReplyParser::new()?,
            events: Box::new(LogEventLog),
            home_azimuth: config.home_azimuth.unwrap_or(DEFAULT_REFERENCE_AZIMUTH),
            park_azimuth: config.park_azimuth.unwrap_or(DEFAULT_REFERENCE_AZIMUTH),
            config,
            connected: false,
            firmware_version: String::new(),
            current_azimuth: 0.0,
            target_azimuth: 0.0,
            shutter_state: ShutterState::Unknown,
            has_shutter: false,
            shutter_opened: false,
            motor_state: None,
            homed: false,
            parked: false,
            calibrating: false,
            steps_per_revolution: 0,
            battery: BatteryLevel::default(),
        })
    }

    pub fn with_event_log(mut self, events: Box<dyn EventLog>) -> DomeSession {
        self.events = events;
        self
    }

    /// Replace the protocol picked from the configuration.
    pub fn with_protocol(mut self, protocol: Box<dyn DomeProtocol>) -> DomeSession {
        self.transceiver
            .set_framing(protocol.framing(), protocol.max_line_length());
        self.protocol = protocol;
        self
    }

    fn log(&self, level: Level, source: &str, message: &str) {
        self.events.record(level, source, message);
    }

    /// Open the link and perform the firmware handshake. A failed handshake
    /// closes the link again.
    pub fn connect(&mut self, port: &str) -> DomeResult<()> {
        if self.connected {
            self.disconnect();
        }

        if let Err(error) = self.transceiver.open(port, &self.config.link_settings()) {
            self.log(Level::Error, "connect", &format!("Cannot open {port}: {error}"));
            return Err(error);
        }
        self.connected = true;
        self.log(Level::Info, "connect", &format!("Connected to {port}."));

        match self.query_firmware_version() {
            Ok(version) => {
                self.log(Level::Info, "connect", &format!("Firmware {version}."));
            }
            Err(error) => {
                self.log(
                    Level::Error,
                    "connect",
                    &format!("Error getting firmware: {error}"),
                );
                self.disconnect();
                return Err(DomeError::TransportFailure(format!(
                    "Firmware handshake failed: {error}"
                )));
            }
        }

        if let Err(error) = self.initialize() {
            if error.is_fatal() {
                return Err(error);
            }
            self.log(
                Level::Warn,
                "connect",
                &format!("Dome initialization incomplete: {error}"),
            );
        }
        Ok(())
    }

    /// Each step runs even when an earlier one failed; only a lost link stops
    /// the sequence. Returns the first recoverable error, if any.
    fn initialize(&mut self) -> DomeResult<()> {
        let mut first_error = None;

        let home = match self.config.home_azimuth {
            Some(azimuth) => self.set_home_azimuth(azimuth),
            None => self.query_home_azimuth().map(|_| ()),
        };
        self.init_step("home position", home, &mut first_error)?;

        let park = match self.config.park_azimuth {
            Some(azimuth) => self.set_park_azimuth(azimuth),
            None => self.query_park_azimuth().map(|_| ()),
        };
        self.init_step("park position", park, &mut first_error)?;

        let shutter = self.read_shutter_state().map(|state| {
            self.has_shutter = !matches!(state, ShutterState::NotFitted | ShutterState::Unknown);
            self.log(
                Level::Debug,
                "connect",
                &format!("Shutter state {state:?}, has shutter {}.", self.has_shutter),
            );
        });
        self.init_step("shutter state", shutter, &mut first_error)?;

        if self.config.assume_parked_on_connect {
            let sync = self.send_sync(self.park_azimuth);
            if sync.is_ok() {
                self.parked = true;
            }
            self.init_step("park sync", sync, &mut first_error)?;
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn init_step(
        &self,
        step: &str,
        result: DomeResult<()>,
        first_error: &mut Option<DomeError>,
    ) -> DomeResult<()> {
        match result {
            Ok(()) => Ok(()),
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                self.log(
                    Level::Warn,
                    "connect",
                    &format!("Cannot initialize {step}: {error}"),
                );
                first_error.get_or_insert(error);
                Ok(())
            }
        }
    }

    /// Always leaves the session disconnected; safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if self.connected {
            self.log(Level::Info, "disconnect", "Disconnecting.");
        }
        self.transceiver.close();
        self.connected = false;
        self.calibrating = false;
    }

    fn ensure_connected(&self) -> DomeResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(DomeError::NotConnected)
        }
    }

    fn exchange(&mut self, command: &DomeCommand) -> DomeResult<String> {
        let wire = self.protocol.encode(command).ok_or_else(|| {
            DomeError::Config(format!(
                "The {} protocol has no {command:?} command.",
                self.protocol.name()
            ))
        })?;
        self.log(Level::Debug, "exchange", &format!("Sending {:?}", wire.trim_end()));

        match self.transceiver.send(&wire) {
            Ok(reply) => {
                self.log(Level::Debug, "exchange", &format!("Got {reply:?}"));
                Ok(reply)
            }
            Err(error) => {
                self.log(
                    Level::Warn,
                    "exchange",
                    &format!("{:?} failed: {error}", wire.trim_end()),
                );
                if error.is_fatal() {
                    self.log(Level::Error, "exchange", "Link lost, disconnecting.");
                    self.transceiver.close();
                    self.connected = false;
                    self.calibrating = false;
                }
                Err(error)
            }
        }
    }

    fn command_ack(&mut self, command: &DomeCommand) -> DomeResult<()> {
        let reply = self.exchange(command)?;
        if self.protocol.is_ack(&reply) {
            Ok(())
        } else {
            Err(DomeError::BadCommandResponse(format!(
                "{command:?} answered {reply:?}"
            )))
        }
    }

    pub fn query_firmware_version(&mut self) -> DomeResult<String> {
        self.ensure_connected()?;
        let reply = self.exchange(&DomeCommand::FirmwareVersion)?;
        let version = self.parser.parse_float(&reply)?;
        self.firmware_version = format!("{version:.2}");
        Ok(self.firmware_version.clone())
    }

    /// Current azimuth; the cached value while calibrating.
    pub fn query_azimuth(&mut self) -> DomeResult<f64> {
        self.ensure_connected()?;
        if self.calibrating {
            return Ok(self.current_azimuth);
        }
        self.read_azimuth()
    }

    fn read_azimuth(&mut self) -> DomeResult<f64> {
        let reply = self.exchange(&DomeCommand::Position)?;
        self.current_azimuth = self.parser.parse_float(&reply)?;
        Ok(self.current_azimuth)
    }

    pub fn query_home_azimuth(&mut self) -> DomeResult<f64> {
        self.ensure_connected()?;
        if self.calibrating {
            return Ok(self.home_azimuth);
        }
        let reply = self.exchange(&DomeCommand::HomeAzimuth)?;
        self.home_azimuth = self.parser.parse_float(&reply)?;
        Ok(self.home_azimuth)
    }

    pub fn query_park_azimuth(&mut self) -> DomeResult<f64> {
        self.ensure_connected()?;
        if self.calibrating {
            return Ok(self.park_azimuth);
        }
        let reply = self.exchange(&DomeCommand::ParkAzimuth)?;
        self.park_azimuth = self.parser.parse_float(&reply)?;
        Ok(self.park_azimuth)
    }

    pub fn query_shutter_state(&mut self) -> DomeResult<ShutterState> {
        self.ensure_connected()?;
        if self.calibrating {
            return Ok(self.shutter_state);
        }
        self.read_shutter_state()
    }

    fn read_shutter_state(&mut self) -> DomeResult<ShutterState> {
        let reply = self.exchange(&DomeCommand::ShutterState)?;
        let state = self.parser.parse_shutter_state(&reply)?;
        self.apply_shutter_state(state);
        Ok(state)
    }

    fn apply_shutter_state(&mut self, state: ShutterState) {
        self.shutter_state = state;
        self.shutter_opened = state == ShutterState::Open;
        if state == ShutterState::NotFitted {
            self.has_shutter = false;
        }
    }

    /// Raw motion-state code; also caches the decoded [`MotorState`].
    pub fn query_motor_state(&mut self) -> DomeResult<i32> {
        self.ensure_connected()?;
        let reply = self.exchange(&DomeCommand::MotorState)?;
        let code = i32::try_from(self.parser.parse_int(&reply)?)
            .map_err(|_| DomeError::ParseFailure(format!("Motor code out of range: {reply}")))?;
        self.motor_state = MotorState::from_code(code);
        Ok(code)
    }

    pub fn is_moving(&mut self) -> DomeResult<bool> {
        Ok(is_moving_code(self.query_motor_state()?))
    }

    pub fn is_at_home(&mut self) -> DomeResult<bool> {
        self.ensure_connected()?;
        let reply = self.exchange(&DomeCommand::HomeSwitch)?;
        self.parser.parse_flag(&reply)
    }

    /// Only answered by protocols with an at-park query.
    pub fn is_at_park(&mut self) -> DomeResult<bool> {
        self.ensure_connected()?;
        let reply = self.exchange(&DomeCommand::AtPark)?;
        self.parser.parse_flag(&reply)
    }

    pub fn query_steps_per_revolution(&mut self) -> DomeResult<i64> {
        self.ensure_connected()?;
        self.read_steps_per_revolution()
    }

    fn read_steps_per_revolution(&mut self) -> DomeResult<i64> {
        let reply = self.exchange(&DomeCommand::StepsPerRevolution)?;
        self.steps_per_revolution = self.parser.parse_int(&reply)?;
        Ok(self.steps_per_revolution)
    }

    pub fn query_battery(&mut self) -> DomeResult<BatteryLevel> {
        self.ensure_connected()?;
        if self.calibrating {
            return Ok(self.battery);
        }
        let reply = self.exchange(&DomeCommand::Battery)?;
        self.battery = self.parser.parse_battery(&reply)?;
        Ok(self.battery)
    }

    /// Composite status line; only answered by the extended protocol.
    pub fn query_status(&mut self) -> DomeResult<ExtendedStatus> {
        self.ensure_connected()?;
        let reply = self.exchange(&DomeCommand::Status)?;
        let status = self.parser.parse_extended_status(&reply)?;
        self.current_azimuth = status.azimuth;
        self.motor_state = status.motor_state;
        self.steps_per_revolution = status.steps_per_revolution;
        self.apply_shutter_state(status.shutter_state);
        Ok(status)
    }

    /// Tell the controller it is at `azimuth`. The cached position follows
    /// immediately and is rolled back if the controller refuses.
    pub fn sync(&mut self, azimuth: f64, _elevation: f64) -> DomeResult<()> {
        self.ensure_connected()?;
        let azimuth = checked_azimuth(azimuth)?;
        if self.calibrating {
            return Ok(());
        }
        self.send_sync(azimuth)
    }

    fn send_sync(&mut self, azimuth: f64) -> DomeResult<()> {
        let previous = self.current_azimuth;
        self.current_azimuth = normalize_azimuth(azimuth);
        if let Err(error) = self.command_ack(&DomeCommand::Sync(azimuth)) {
            self.current_azimuth = previous;
            return Err(error);
        }
        Ok(())
    }

    pub fn goto_azimuth(&mut self, azimuth: f64) -> DomeResult<()> {
        self.ensure_connected()?;
        let azimuth = checked_azimuth(azimuth)?;
        if self.calibrating {
            return Ok(());
        }
        self.command_ack(&DomeCommand::Goto(azimuth))?;
        self.target_azimuth = azimuth;
        Ok(())
    }

    /// Start moving to the park position. Protocols without a park command
    /// get a plain goto to the park azimuth.
    pub fn park_dome(&mut self) -> DomeResult<()> {
        self.ensure_connected()?;
        if self.calibrating {
            return Ok(());
        }
        if self.protocol.supports(&DomeCommand::Park) {
            self.command_ack(&DomeCommand::Park)?;
            self.target_azimuth = self.park_azimuth;
            Ok(())
        } else {
            self.goto_azimuth(self.park_azimuth)
        }
    }

    /// The rotator does not move; it is assumed to sit at the park position.
    pub fn unpark_dome(&mut self) -> DomeResult<()> {
        self.ensure_connected()?;
        if self.calibrating {
            return Ok(());
        }
        self.send_sync(self.park_azimuth)
    }

    pub fn open_shutter(&mut self) -> DomeResult<()> {
        self.shutter_command(DomeCommand::OpenShutter)
    }

    pub fn close_shutter(&mut self) -> DomeResult<()> {
        self.shutter_command(DomeCommand::CloseShutter)
    }

    fn shutter_command(&mut self, command: DomeCommand) -> DomeResult<()> {
        self.ensure_connected()?;
        if self.calibrating {
            return Ok(());
        }
        if !self.shutter_enabled() {
            self.log(
                Level::Debug,
                "shutter",
                &format!("No shutter control, ignoring {command:?}."),
            );
            return Ok(());
        }
        self.command_ack(&command)
    }

    pub fn go_home(&mut self) -> DomeResult<()> {
        self.ensure_connected()?;
        if self.calibrating {
            return Ok(());
        }
        self.command_ack(&DomeCommand::GoHome)?;
        self.target_azimuth = self.home_azimuth;
        Ok(())
    }

    pub fn calibrate(&mut self) -> DomeResult<()> {
        self.ensure_connected()?;
        if self.calibrating {
            return Ok(());
        }
        self.command_ack(&DomeCommand::Calibrate)?;
        self.calibrating = true;
        self.homed = false;
        self.log(Level::Info, "calibrate", "Calibration started.");
        Ok(())
    }

    /// Send the stop command. The calibrating flag is cleared whatever the
    /// controller answers; pollers stay the authority on physical state.
    pub fn abort(&mut self) -> DomeResult<()> {
        self.calibrating = false;
        self.ensure_connected()?;
        self.exchange(&DomeCommand::Stop).map(|_| ())
    }

    /// The cached value only changes once the controller acknowledges.
    pub fn set_home_azimuth(&mut self, azimuth: f64) -> DomeResult<()> {
        self.ensure_connected()?;
        let azimuth = checked_azimuth(azimuth)?;
        self.command_ack(&DomeCommand::SetHomeAzimuth(azimuth))?;
        self.home_azimuth = azimuth;
        Ok(())
    }

    /// The cached value only changes once the controller acknowledges.
    pub fn set_park_azimuth(&mut self, azimuth: f64) -> DomeResult<()> {
        self.ensure_connected()?;
        let azimuth = checked_azimuth(azimuth)?;
        self.command_ack(&DomeCommand::SetParkAzimuth(azimuth))?;
        self.park_azimuth = azimuth;
        Ok(())
    }

    /// `Ok(false)` while moving; an idle dome away from the target is a
    /// failed goto.
    pub fn is_goto_complete(&mut self) -> DomeResult<bool> {
        self.ensure_connected()?;
        let moving = self.is_moving()?;
        let azimuth = self.query_azimuth()?;
        if moving {
            return Ok(false);
        }

        if within_tolerance(self.target_azimuth, azimuth) {
            Ok(true)
        } else {
            self.log(
                Level::Warn,
                "goto",
                &format!(
                    "Stopped at {azimuth} while going to {}.",
                    self.target_azimuth
                ),
            );
            Err(DomeError::CommandFailed(format!(
                "Dome stopped at {azimuth}, target {}.",
                self.target_azimuth
            )))
        }
    }

    pub fn is_park_complete(&mut self) -> DomeResult<bool> {
        self.ensure_connected()?;
        let moving = self.is_moving()?;
        let azimuth = self.query_azimuth()?;
        if moving {
            return Ok(false);
        }

        let at_park = if self.protocol.supports(&DomeCommand::AtPark) {
            self.is_at_park()?
        } else {
            within_tolerance(self.park_azimuth, azimuth)
        };

        if at_park {
            self.parked = true;
            Ok(true)
        } else {
            self.homed = false;
            self.parked = false;
            self.log(
                Level::Warn,
                "park",
                &format!("Stopped at {azimuth}, park is {}.", self.park_azimuth),
            );
            Err(DomeError::CommandFailed(format!(
                "Dome stopped at {azimuth}, park {}.",
                self.park_azimuth
            )))
        }
    }

    pub fn is_unpark_complete(&mut self) -> DomeResult<bool> {
        self.ensure_connected()?;
        self.parked = false;
        Ok(true)
    }

    pub fn is_find_home_complete(&mut self) -> DomeResult<bool> {
        self.ensure_connected()?;
        if self.is_moving()? {
            self.homed = false;
            return Ok(false);
        }

        if self.is_at_home()? {
            self.homed = true;
            Ok(true)
        } else {
            self.homed = false;
            self.parked = false;
            self.log(Level::Warn, "home", "Not moving and not at home.");
            Err(DomeError::command_failed("Dome stopped away from the home switch."))
        }
    }

    /// Any outcome other than "still calibrating" ends the calibration,
    /// including errors.
    pub fn is_calibrating_complete(&mut self) -> DomeResult<bool> {
        self.ensure_connected()?;
        if !self.calibrating {
            return Ok(true);
        }

        let outcome = if self.protocol.supports(&DomeCommand::Status) {
            self.check_calibration_status()
        } else {
            self.check_calibration_position()
        };

        if !matches!(outcome, Ok(false)) {
            self.calibrating = false;
            self.log(
                Level::Info,
                "calibrate",
                &format!("Calibration finished: {outcome:?}"),
            );
        }
        outcome
    }

    fn check_calibration_status(&mut self) -> DomeResult<bool> {
        let status = self.query_status()?;
        match status.motor_state {
            Some(MotorState::Idle) => {
                self.homed = true;
                Ok(true)
            }
            Some(MotorState::Calibrating) => Ok(false),
            _ if is_moving_code(status.motor_code) => Ok(false),
            _ => Err(DomeError::CommandFailed(format!(
                "Calibration ended with motor code {}.",
                status.motor_code
            ))),
        }
    }

    fn check_calibration_position(&mut self) -> DomeResult<bool> {
        if self.is_moving()? {
            self.read_azimuth()?;
            self.homed = false;
            return Ok(false);
        }

        let azimuth = self.read_azimuth()?;
        if !within_tolerance(self.home_azimuth, azimuth) {
            // Calibration ends on the home switch; resync the position to it.
            self.log(
                Level::Info,
                "calibrate",
                &format!("Resyncing {azimuth} to home {}.", self.home_azimuth),
            );
            self.send_sync(self.home_azimuth)?;
        }
        self.read_steps_per_revolution()?;
        self.homed = true;
        Ok(true)
    }

    pub fn is_open_complete(&mut self) -> DomeResult<bool> {
        self.ensure_connected()?;
        if !self.shutter_enabled() {
            return Ok(true);
        }
        let state = self.query_shutter_state()?;
        let opened = state == ShutterState::Open;
        self.shutter_opened = opened;
        Ok(opened)
    }

    pub fn is_close_complete(&mut self) -> DomeResult<bool> {
        self.ensure_connected()?;
        if !self.shutter_enabled() {
            return Ok(true);
        }
        let state = self.query_shutter_state()?;
        let closed = state == ShutterState::Closed;
        self.shutter_opened = !closed;
        Ok(closed)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn firmware_version(&self) -> &str {
        &self.firmware_version
    }

    pub fn current_azimuth(&self) -> f64 {
        self.current_azimuth
    }

    /// 90 with the shutter open, 0 otherwise; the controller has no partial
    /// opening.
    pub fn current_elevation(&self) -> f64 {
        if self.has_shutter && self.shutter_opened {
            90.0
        } else {
            0.0
        }
    }

    pub fn target_azimuth(&self) -> f64 {
        self.target_azimuth
    }

    pub fn home_azimuth(&self) -> f64 {
        self.home_azimuth
    }

    pub fn park_azimuth(&self) -> f64 {
        self.park_azimuth
    }

    pub fn shutter_state(&self) -> ShutterState {
        self.shutter_state
    }

    pub fn has_shutter(&self) -> bool {
        self.has_shutter
    }

    pub fn shutter_enabled(&self) -> bool {
        self.config.shutter_control && self.has_shutter
    }

    pub fn motor_state(&self) -> Option<MotorState> {
        self.motor_state
    }

    pub fn is_homed(&self) -> bool {
        self.homed
    }

    pub fn is_parked(&self) -> bool {
        self.parked
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrating
    }

    pub fn steps_per_revolution(&self) -> i64 {
        self.steps_per_revolution
    }

    pub fn battery(&self) -> BatteryLevel {
        self.battery
    }

    pub fn protocol_name(&self) -> &'static str {
        self.protocol.name()
    }

    pub fn dome_state(&self) -> DomeState {
        if !self.connected {
            DomeState::Disconnected
        } else if self.calibrating {
            DomeState::Calibrating
        } else if self.motor_state.is_some_and(|state| state.is_moving()) {
            DomeState::Moving
        } else if self.shutter_state.is_moving() {
            DomeState::ShutterMoving
        } else {
            DomeState::Idle
        }
    }
}
