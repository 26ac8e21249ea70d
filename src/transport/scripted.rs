//! In-memory transport that answers each written command with the next
//! scripted reply. Shared through an `Arc` so a test keeps a handle after the
//! transport moves into a session.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use crate::{
    error::{DomeError, DomeResult},
    transport::{LinkSettings, Transport},
};

#[derive(Debug)]
enum ScriptedReply {
    Bytes(Vec<u8>),
    Silence,
    WriteFailure,
}

#[derive(Debug, Default)]
struct ScriptState {
    open: bool,
    refuse_open: bool,
    replies: VecDeque<ScriptedReply>,
    pending: VecDeque<u8>,
    written: Vec<String>,
    purges: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> ScriptedTransport {
        ScriptedTransport::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        // A poisoned script only happens after a failed assertion elsewhere.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a reply line; the carriage return is appended.
    pub fn push_reply(&self, line: &str) -> &ScriptedTransport {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\r');
        self.state().replies.push_back(ScriptedReply::Bytes(bytes));
        self
    }

    /// Queue raw bytes as the answer to the next command.
    pub fn push_raw(&self, bytes: &[u8]) -> &ScriptedTransport {
        self.state()
            .replies
            .push_back(ScriptedReply::Bytes(bytes.to_vec()));
        self
    }

    /// The next command gets no answer at all.
    pub fn push_silence(&self) -> &ScriptedTransport {
        self.state().replies.push_back(ScriptedReply::Silence);
        self
    }

    /// Writing the next command fails at the byte channel level.
    pub fn push_write_failure(&self) -> &ScriptedTransport {
        self.state().replies.push_back(ScriptedReply::WriteFailure);
        self
    }

    /// Bytes already sitting in the input buffer, e.g. a late reply.
    pub fn inject_stale(&self, bytes: &[u8]) {
        self.state().pending.extend(bytes.iter().copied());
    }

    pub fn refuse_open(&self) {
        self.state().refuse_open = true;
    }

    /// Commands written so far, terminators stripped.
    pub fn written(&self) -> Vec<String> {
        self.state().written.clone()
    }

    pub fn clear_written(&self) {
        self.state().written.clear();
    }

    pub fn purges(&self) -> usize {
        self.state().purges
    }

    pub fn remaining_replies(&self) -> usize {
        self.state().replies.len()
    }
}

impl Transport for ScriptedTransport {
    fn open(&mut self, port: &str, _settings: &LinkSettings) -> DomeResult<()> {
        let mut state = self.state();
        if state.refuse_open {
            return Err(DomeError::TransportFailure(format!("Cannot open {port}.")));
        }
        state.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.state().open = false;
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn purge(&mut self) -> DomeResult<()> {
        let mut state = self.state();
        state.pending.clear();
        state.purges += 1;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8], _timeout: Duration) -> DomeResult<usize> {
        let mut state = self.state();
        let mut n_bytes = 0;
        while n_bytes < buffer.len() {
            let next_byte = state.pending.pop_front();
            match next_byte {
                Some(byte) => {
                    buffer[n_bytes] = byte;
                    n_bytes += 1;
                }
                None => break,
            }
        }
        Ok(n_bytes)
    }

    fn write(&mut self, bytes: &[u8]) -> DomeResult<usize> {
        let mut state = self.state();
        if !state.open {
            return Err(DomeError::TransportFailure("Link is not open.".to_string()));
        }
        let command = String::from_utf8_lossy(bytes)
            .trim_end_matches('\r')
            .to_string();
        state.written.push(command);
        let next_reply = state.replies.pop_front();
        match next_reply {
            Some(ScriptedReply::Bytes(reply)) => state.pending.extend(reply),
            Some(ScriptedReply::WriteFailure) => {
                return Err(DomeError::TransportFailure("Write failed.".to_string()))
            }
            Some(ScriptedReply::Silence) | None => {}
        }
        Ok(bytes.len())
    }

    fn flush(&mut self) -> DomeResult<()> {
        Ok(())
    }
}
