use std::{thread, time::Duration};

use tokio::net::TcpListener;

use rigeldome::{
    config::DomeConfig,
    dome_session::DomeSession,
    error::DomeResult,
    mock_controller::mock_controller::{serve, MockControllerConfig},
    protocol::ProtocolVariant,
    reply_parser::within_tolerance,
    status::{DomeState, ShutterState},
    transport::tcp::TcpTransport,
};

async fn start_mock(protocol: ProtocolVariant) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let config = MockControllerConfig {
        protocol,
        degrees_per_cycle: 5.0,
        shutter_cycles: 2,
        calibration_cycles: 4,
        ..MockControllerConfig::default()
    };
    tokio::spawn(serve(listener, config));
    address
}

fn connect(address: &str, protocol: ProtocolVariant) -> DomeSession {
    let config = DomeConfig {
        port: address.to_string(),
        protocol,
        ..DomeConfig::default()
    };
    let mut session = DomeSession::new(Box::new(TcpTransport::new()), config).unwrap();
    session.connect(address).unwrap();
    session
}

fn poll(session: &mut DomeSession, done: fn(&mut DomeSession) -> DomeResult<bool>) {
    for _ in 0..200 {
        if done(session).unwrap() {
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("Operation did not complete.");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_classic_session_against_mock() {
    let address = start_mock(ProtocolVariant::Classic).await;

    tokio::task::spawn_blocking(move || {
        let mut session = connect(&address, ProtocolVariant::Classic);

        assert!(session.is_connected());
        assert_eq!(session.firmware_version(), "1.27");
        assert_eq!(session.home_azimuth(), 180.0);
        assert!(session.has_shutter());

        session.goto_azimuth(30.0).unwrap();
        poll(&mut session, DomeSession::is_goto_complete);
        assert!(within_tolerance(30.0, session.current_azimuth()));
        assert_eq!(session.dome_state(), DomeState::Idle);

        session.open_shutter().unwrap();
        poll(&mut session, DomeSession::is_open_complete);
        assert_eq!(session.shutter_state(), ShutterState::Open);
        assert_eq!(session.current_elevation(), 90.0);

        session.go_home().unwrap();
        poll(&mut session, DomeSession::is_find_home_complete);
        assert!(session.is_homed());

        session.calibrate().unwrap();
        assert!(session.is_calibrating());
        poll(&mut session, DomeSession::is_calibrating_complete);
        assert!(!session.is_calibrating());
        assert_eq!(session.steps_per_revolution(), 10240);

        let battery = session.query_battery().unwrap();
        assert_eq!(battery.percent, 85.0);

        session.disconnect();
        assert!(!session.is_connected());
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_extended_session_against_mock() {
    let address = start_mock(ProtocolVariant::Extended).await;

    tokio::task::spawn_blocking(move || {
        let mut session = connect(&address, ProtocolVariant::Extended);

        assert_eq!(session.protocol_name(), "extended");

        session.set_park_azimuth(90.0).unwrap();
        session.park_dome().unwrap();
        poll(&mut session, DomeSession::is_park_complete);
        assert!(session.is_parked());

        let status = session.query_status().unwrap();
        assert!(status.at_park);
        assert_eq!(status.shutter_state, ShutterState::Closed);

        session.unpark_dome().unwrap();
        assert!(session.is_unpark_complete().unwrap());
        assert!(!session.is_parked());

        session.calibrate().unwrap();
        poll(&mut session, DomeSession::is_calibrating_complete);
        assert!(session.is_homed());

        session.disconnect();
    })
    .await
    .unwrap();
}
