//! MCU client: the only component that touches the serial wire.
//!
//! Every operation writes one command and blocks for its reply before
//! returning, so commands are never pipelined. Links are abstracted behind
//! [`McuLink`]:
//! - `SerialLink`: a real serial port
//! - `SimulatedMcu`: an in-process MCU for `stub://` ports
//! - `ScriptedLink`: canned replies and a write log, for tests

use std::io::{self, Read, Write};

use crate::buckets::{Bucket, Gate};
use crate::error::{ConnectionError, ProtocolError, Result, SorterError};
use crate::protocol::{Codec, Command, IrStates, Response};

mod scripted;
mod serial;
mod sim;

pub use scripted::ScriptedLink;
pub use serial::SerialLink;
pub use sim::SimulatedMcu;

/// Longest reply accepted before a separator must appear.
pub const MAX_FRAME_BYTES: usize = 64;

/// Byte transport to the MCU.
///
/// Reads must honour the configured connection timeout and report it as
/// `io::ErrorKind::TimedOut`.
pub trait McuLink: Read + Write {
    /// Whether the underlying connection is still usable.
    fn is_open(&self) -> bool;

    /// Drop any unread input, used to resynchronise after a timeout.
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Human-readable name for logs.
    fn describe(&self) -> String;
}

impl<L: McuLink + ?Sized> McuLink for Box<L> {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        (**self).discard_input()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<L: McuLink + ?Sized> McuLink for &mut L {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        (**self).discard_input()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Typed client over an [`McuLink`].
pub struct McuClient<L: McuLink> {
    link: L,
    codec: Codec,
    pending: Vec<u8>,
    protocol_version: String,
    needs_resync: bool,
    /// Set once standby has been sent, or while the handshake has not
    /// completed. Drop only parks an MCU that was live.
    parked: bool,
}

impl<L: McuLink> McuClient<L> {
    /// Wrap a link and perform the startup handshake. Any failure here is
    /// fatal and nothing is written after a bad READY frame.
    pub fn connect(link: L, codec: Codec) -> Result<Self> {
        let mut client = Self {
            link,
            codec,
            pending: Vec::new(),
            protocol_version: String::new(),
            needs_resync: false,
            parked: true,
        };
        client.handshake()?;
        client.parked = false;
        Ok(client)
    }

    /// Wait for the READY frame, then query and log the protocol version.
    pub fn handshake(&mut self) -> Result<&str> {
        log::info!("Checking for MCU connection on {}...", self.link.describe());
        if !self.link.is_open() {
            return Err(ConnectionError::Handshake("could not connect to the MCU".into()).into());
        }

        let greeting = self
            .read_response()
            .map_err(|e| ConnectionError::Handshake(format!("no READY frame: {}", e)))?;
        if greeting != Response::Ready {
            return Err(ConnectionError::Handshake(format!(
                "the MCU did not respond as expected (got '{}')",
                greeting
            ))
            .into());
        }
        log::info!("MCU connection established.");

        let version = self
            .protocol_version()
            .map_err(|e| ConnectionError::Handshake(format!("protocol version query: {}", e)))?;
        log::info!("MCU protocol version: {}", version);
        self.protocol_version = version;
        Ok(&self.protocol_version)
    }

    /// Version string negotiated during the handshake.
    pub fn negotiated_version(&self) -> &str {
        &self.protocol_version
    }

    pub fn protocol_version(&mut self) -> Result<String> {
        match self.transact(Command::GetProtocolVersion)? {
            Response::ProtocolVersion(version) => Ok(version),
            other => Err(unexpected(Command::GetProtocolVersion, &other)),
        }
    }

    pub fn set_gate(&mut self, gate: Gate, open: bool) -> Result<()> {
        let command = if open {
            Command::OpenGate(gate)
        } else {
            Command::CloseGate(gate)
        };
        self.confirm(command)
    }

    pub fn set_platform(&mut self, open: bool) -> Result<()> {
        self.confirm(if open {
            Command::OpenPlatform
        } else {
            Command::ClosePlatform
        })
    }

    pub fn set_error_indicator(&mut self, on: bool) -> Result<()> {
        self.confirm(if on {
            Command::ErrorLedOn
        } else {
            Command::ErrorLedOff
        })
    }

    /// Poll the latched drop sensors.
    pub fn read_ir_states(&mut self) -> Result<IrStates> {
        match self.transact(Command::IrStatus)? {
            Response::IrStatus(states) => Ok(states),
            other => Err(unexpected(Command::IrStatus, &other)),
        }
    }

    /// Clear a latched IR detection. Returns the MCU's SUCCESS or FAILURE.
    pub fn acknowledge_ir(&mut self, sensor: Bucket) -> Result<Response> {
        let command = Command::AcknowledgeIr(sensor);
        match self.transact(command)? {
            response @ (Response::Success | Response::Failure) => Ok(response),
            other => Err(unexpected(command, &other)),
        }
    }

    /// Tell the MCU a sort decision was committed. The MCU only uses this for
    /// its own counters, so a refusal is logged rather than raised.
    pub fn acknowledge_object_sort(&mut self) -> Result<()> {
        self.best_effort(Command::AcknowledgeSort, "acknowledge the sort")
            .map(|_| ())
    }

    pub fn standby(&mut self) -> Result<()> {
        let accepted = self.best_effort(Command::Standby, "enter standby mode")?;
        self.parked = true;
        if accepted {
            log::info!("MCU is now in standby mode.");
        }
        Ok(())
    }

    pub fn show_statistics(&mut self) -> Result<()> {
        self.best_effort(Command::ShowStatistics, "show statistics")
            .map(|_| ())
    }

    /// Park the MCU if it has not been parked already.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.parked {
            return Ok(());
        }
        self.standby()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    fn confirm(&mut self, command: Command) -> Result<()> {
        match self.transact(command)? {
            response if response.is_success() => Ok(()),
            Response::Failure => Err(ConnectionError::Rejected {
                command: command.code().to_string(),
            }
            .into()),
            other => Err(unexpected(command, &other)),
        }
    }

    /// Returns whether the MCU accepted the command.
    fn best_effort(&mut self, command: Command, action: &str) -> Result<bool> {
        match self.transact(command)? {
            response if response.is_success() => Ok(true),
            Response::Failure => {
                log::warn!("The MCU could not {}.", action);
                Ok(false)
            }
            other => Err(unexpected(command, &other)),
        }
    }

    /// One lock-step exchange: write a command, read exactly one reply.
    fn transact(&mut self, command: Command) -> Result<Response> {
        if !self.link.is_open() {
            return Err(ConnectionError::NotOpen.into());
        }
        if self.needs_resync {
            self.pending.clear();
            self.link.discard_input().map_err(ConnectionError::Io)?;
            self.needs_resync = false;
        }

        let frame = self.codec.encode(command);
        self.link
            .write_all(&frame)
            .and_then(|_| self.link.flush())
            .map_err(ConnectionError::Io)?;

        let response = self.read_response();
        match &response {
            Ok(reply) => log::debug!("mcu {} -> {}", command, reply),
            Err(e) => log::debug!("mcu {} -> error: {}", command, e),
        }
        response
    }

    fn read_response(&mut self) -> Result<Response> {
        let frame = self.read_frame()?;
        Ok(self.codec.decode(&frame)?)
    }

    fn read_frame(&mut self) -> Result<Vec<u8>> {
        let separator = self.codec.separator();
        let mut chunk = [0u8; MAX_FRAME_BYTES];
        loop {
            if let Some(pos) = self.pending.iter().position(|b| *b == separator) {
                return Ok(self.pending.drain(..=pos).collect());
            }
            if self.pending.len() > MAX_FRAME_BYTES {
                // The rest of the oversized frame is still on the wire.
                self.pending.clear();
                self.needs_resync = true;
                return Err(ProtocolError::FrameTooLong(MAX_FRAME_BYTES).into());
            }
            match self.link.read(&mut chunk) {
                Ok(0) => return Err(self.timed_out()),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    return Err(self.timed_out())
                }
                Err(e) => return Err(ConnectionError::Io(e).into()),
            }
        }
    }

    fn timed_out(&mut self) -> SorterError {
        // A late reply would otherwise be read as the answer to the next command.
        self.needs_resync = true;
        ConnectionError::Timeout.into()
    }
}

impl<L: McuLink> Drop for McuClient<L> {
    fn drop(&mut self) {
        if self.parked || !self.link.is_open() {
            return;
        }
        if let Err(e) = self.standby() {
            log::warn!("failed to put the MCU in standby on release: {}", e);
        }
    }
}

fn unexpected(command: Command, response: &Response) -> SorterError {
    ConnectionError::UnexpectedResponse {
        command: command.code().to_string(),
        response: response.code(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_link() -> ScriptedLink {
        let mut link = ScriptedLink::new(Codec::default());
        link.respond(Response::Ready)
            .respond(Response::ProtocolVersion("2.1".into()));
        link
    }

    #[test]
    fn handshake_reads_ready_then_version() {
        let client = McuClient::connect(ready_link(), Codec::default()).unwrap();
        assert_eq!(client.negotiated_version(), "2.1");
        assert_eq!(client.link().written_codes(), vec!["pro"]);
    }

    #[test]
    fn handshake_rejects_failure_frame_without_writing() {
        let mut link = ScriptedLink::new(Codec::default());
        link.respond(Response::Failure);
        let err = McuClient::connect(&mut link, Codec::default()).err().unwrap();
        assert!(matches!(
            err,
            SorterError::Connection(ConnectionError::Handshake(_))
        ));
        assert!(err.is_fatal());
        assert!(link.written_codes().is_empty());
    }

    #[test]
    fn handshake_fails_on_closed_link() {
        let mut link = ready_link();
        link.close();
        assert!(McuClient::connect(link, Codec::default()).is_err());
    }

    #[test]
    fn operations_fail_once_link_closes() {
        let mut client = McuClient::connect(ready_link(), Codec::default()).unwrap();
        client.link_mut().close();
        let err = client.set_platform(true).unwrap_err();
        assert!(matches!(err, SorterError::Connection(ConnectionError::NotOpen)));
        assert_eq!(client.link().written_codes(), vec!["pro"]);
    }

    #[test]
    fn failure_reply_rejects_actuation_but_not_maintenance() {
        let mut client = McuClient::connect(ready_link(), Codec::default()).unwrap();
        client
            .link_mut()
            .respond(Response::Failure)
            .respond(Response::Failure)
            .respond(Response::Failure);
        let gate = Gate::new(2).unwrap();
        assert!(matches!(
            client.set_gate(gate, true),
            Err(SorterError::Connection(ConnectionError::Rejected { .. }))
        ));
        client.show_statistics().unwrap();
        client.standby().unwrap();
        assert_eq!(client.link().written_codes(), vec!["pro", "g2o", "sts", "stb"]);
    }

    #[test]
    fn ir_status_requires_ir_prefix() {
        let mut client = McuClient::connect(ready_link(), Codec::default()).unwrap();
        client.link_mut().respond(Response::Success);
        let err = client.read_ir_states().unwrap_err();
        assert!(matches!(
            err,
            SorterError::Connection(ConnectionError::UnexpectedResponse { .. })
        ));
        assert!(err.is_reply_format());

        client.link_mut().respond_raw(b"IS:00100\n");
        let states = client.read_ir_states().unwrap();
        assert_eq!(states.as_array(), [false, false, true, false, false]);
    }

    #[test]
    fn timeout_resynchronises_before_next_command() {
        let mut client = McuClient::connect(ready_link(), Codec::default()).unwrap();
        assert!(matches!(
            client.set_error_indicator(true),
            Err(SorterError::Connection(ConnectionError::Timeout))
        ));
        client.link_mut().respond(Response::Success);
        client.set_error_indicator(false).unwrap();
        assert_eq!(client.link().discards(), 1);
    }

    #[test]
    fn oversized_reply_resynchronises_before_next_command() {
        let mut client = McuClient::connect(ready_link(), Codec::default()).unwrap();
        client
            .link_mut()
            .respond_stale(&[b'A'; 130])
            .respond_stale(b"\n")
            .respond(Response::Success);

        let err = client.set_error_indicator(true).unwrap_err();
        assert!(matches!(
            err,
            SorterError::Protocol(ProtocolError::FrameTooLong(MAX_FRAME_BYTES))
        ));
        client.set_error_indicator(false).unwrap();
        assert_eq!(client.link().discards(), 1);
        assert_eq!(client.link().unread(), 0);
    }

    #[test]
    fn shutdown_parks_a_live_mcu_once() {
        let mut link = ready_link();
        link.respond(Response::Success);
        {
            let mut client = McuClient::connect(&mut link, Codec::default()).unwrap();
            client.shutdown().unwrap();
            client.shutdown().unwrap();
        }
        assert_eq!(link.written_codes(), vec!["pro", "stb"]);
    }

    #[test]
    fn dropping_a_live_client_parks_the_mcu() {
        let mut link = ready_link();
        link.respond(Response::Success);
        {
            let _client = McuClient::connect(&mut link, Codec::default()).unwrap();
        }
        assert_eq!(link.written_codes(), vec!["pro", "stb"]);
        assert_eq!(link.unread(), 0);
    }
}
