pub mod config;
pub mod dome_cmd_regex;
pub mod dome_session;
pub mod error;
pub mod event_log;
pub mod mock_controller;
pub mod motor_state;
pub mod protocol;
pub mod reply_parser;
pub mod response_reader;
pub mod status;
pub mod transceiver;
pub mod transport;
