//! Send one command and collect its single reply line.

use std::time::Duration;

use crate::{
    error::{DomeError, DomeResult},
    protocol::Framing,
    response_reader::ResponseReader,
    transport::{LinkSettings, Transport},
};

pub struct CommandTransceiver {
    transport: Box<dyn Transport>,
    reader: ResponseReader,
    framing: Framing,
}

impl CommandTransceiver {
    pub fn new(
        transport: Box<dyn Transport>,
        framing: Framing,
        max_line_length: usize,
        timeout: Duration,
    ) -> CommandTransceiver {
        CommandTransceiver {
            transport,
            reader: ResponseReader::new(max_line_length, timeout),
            framing,
        }
    }

    pub fn set_framing(&mut self, framing: Framing, max_line_length: usize) {
        self.framing = framing;
        self.reader.set_capacity(max_line_length);
    }

    pub fn open(&mut self, port: &str, settings: &LinkSettings) -> DomeResult<()> {
        self.transport.open(port, settings)
    }

    pub fn close(&mut self) {
        if self.transport.is_open() {
            if let Err(error) = self.transport.purge() {
                log::debug!("Ignoring purge failure on close: {error}");
            }
            self.transport.close();
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Send `command`, which already carries its terminator, and return the
    /// reply payload. No retries happen here.
    pub fn send(&mut self, command: &str) -> DomeResult<String> {
        // A late reply to an earlier exchange must not answer this one.
        self.transport.purge()?;

        let n_bytes = self.transport.write(command.as_bytes())?;
        if n_bytes != command.len() {
            return Err(DomeError::TransportFailure(format!(
                "Wrote {n_bytes} of {} bytes.",
                command.len()
            )));
        }
        self.transport.flush()?;

        let line = self.reader.read_line(self.transport.as_mut())?;
        log::trace!("{:?} -> {line:?}", command.trim_end());
        self.framing.strip(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response_reader::{MAX_TIMEOUT, SERIAL_BUFFER_SIZE};
    use crate::transport::scripted::ScriptedTransport;

    fn make_transceiver(framing: Framing) -> (CommandTransceiver, ScriptedTransport) {
        let script = ScriptedTransport::new();
        let mut transceiver = CommandTransceiver::new(
            Box::new(script.clone()),
            framing,
            SERIAL_BUFFER_SIZE,
            MAX_TIMEOUT,
        );
        transceiver
            .open("scripted", &LinkSettings::default())
            .unwrap();
        (transceiver, script)
    }

    #[test]
    fn test_send_purges_stale_reply() {
        let (mut transceiver, script) = make_transceiver(Framing::Raw);
        script.inject_stale(b"A\r");
        script.push_reply("123.4");

        let reply = transceiver.send("ANGLE\r").unwrap();

        assert_eq!(reply, "123.4");
        assert_eq!(script.written(), vec!["ANGLE".to_string()]);
        assert_eq!(script.purges(), 1);
    }

    #[test]
    fn test_send_strips_prompt() {
        let (mut transceiver, script) = make_transceiver(Framing::Prompt(b'>'));
        script.push_reply(">A");

        assert_eq!(transceiver.send("GO 90.0\r").unwrap(), "A");
    }

    #[test]
    fn test_send_missing_prompt() {
        let (mut transceiver, script) = make_transceiver(Framing::Prompt(b'>'));
        script.push_reply("A");

        assert!(matches!(
            transceiver.send("GO 90.0\r"),
            Err(DomeError::ParseFailure(_))
        ));
    }

    #[test]
    fn test_send_error_kinds() {
        let (mut transceiver, script) = make_transceiver(Framing::Raw);
        script.push_silence();
        script.push_write_failure();

        assert_eq!(transceiver.send("ANGLE\r"), Err(DomeError::Timeout));
        assert!(matches!(
            transceiver.send("ANGLE\r"),
            Err(DomeError::TransportFailure(_))
        ));
    }
}
