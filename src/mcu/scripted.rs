use std::collections::VecDeque;
use std::io::{self, Read, Write};

use super::McuLink;
use crate::protocol::{Codec, Response};

/// Link with canned replies and a record of everything written.
///
/// Replies are served in the order they were queued regardless of what was
/// written. Reading past the last reply reports a timeout. Replies queued
/// with `respond` survive `discard_input`; bytes queued with `respond_stale`
/// model input already sitting in the port buffer and are dropped by it.
pub struct ScriptedLink {
    codec: Codec,
    inbound: VecDeque<u8>,
    /// Leading bytes of `inbound` that `discard_input` removes.
    stale: usize,
    written: Vec<u8>,
    open: bool,
    discards: usize,
}

impl ScriptedLink {
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            inbound: VecDeque::new(),
            stale: 0,
            written: Vec::new(),
            open: true,
            discards: 0,
        }
    }

    pub fn respond(&mut self, response: Response) -> &mut Self {
        let frame = self.codec.encode_response(&response);
        self.inbound.extend(frame);
        self
    }

    pub fn respond_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.inbound.extend(bytes.iter().copied());
        self
    }

    /// Queue bytes that are already buffered on the port. They must be
    /// queued before any regular reply.
    pub fn respond_stale(&mut self, bytes: &[u8]) -> &mut Self {
        self.stale += bytes.len();
        self.inbound.extend(bytes.iter().copied());
        self
    }

    /// Simulate the port going away.
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Command codes written so far, separators stripped.
    pub fn written_codes(&self) -> Vec<String> {
        self.written
            .split(|b| *b == self.codec.separator())
            .filter(|code| !code.is_empty())
            .map(|code| String::from_utf8_lossy(code).into_owned())
            .collect()
    }

    pub fn clear_written(&mut self) {
        self.written.clear();
    }

    /// Replies still queued.
    pub fn unread(&self) -> usize {
        self.inbound.len()
    }

    pub fn discards(&self) -> usize {
        self.discards
    }
}

impl Read for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "link closed"));
        }
        if self.inbound.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no scripted reply"));
        }
        let n = buf.len().min(self.inbound.len());
        self.stale = self.stale.saturating_sub(n);
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for ScriptedLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "link closed"));
        }
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl McuLink for ScriptedLink {
    fn is_open(&self) -> bool {
        self.open
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.discards += 1;
        self.inbound.drain(..self.stale.min(self.inbound.len()));
        self.stale = 0;
        Ok(())
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
