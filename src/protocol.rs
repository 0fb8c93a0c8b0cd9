//! Serial wire protocol between the host and the sorter MCU.
//!
//! Every frame in either direction is `<code><SEP>`, where `SEP` is a single
//! separator character configured identically on both ends. Commands are short
//! lowercase literals; responses are uppercase codes, two of which carry a
//! payload after a fixed prefix (`PV:` and `IS:`).

use std::fmt;

use crate::buckets::{Bucket, Gate, BUCKET_COUNT, GATED_BUCKETS};
use crate::error::ProtocolError;

pub const DEFAULT_SEPARATOR: char = '\n';

const PROTOCOL_VERSION_PREFIX: &str = "PV:";
const IR_STATUS_PREFIX: &str = "IS:";

const GATE_OPEN_CODES: [&str; GATED_BUCKETS] = ["g1o", "g2o", "g3o", "g4o"];
const GATE_CLOSE_CODES: [&str; GATED_BUCKETS] = ["g1c", "g2c", "g3c", "g4c"];
const IR_ACK_CODES: [&str; BUCKET_COUNT] = ["ir1", "ir2", "ir3", "ir4", "ir5"];

/// Commands the host can send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    GetProtocolVersion,
    Standby,
    ShowStatistics,
    OpenGate(Gate),
    CloseGate(Gate),
    OpenPlatform,
    ClosePlatform,
    ErrorLedOn,
    ErrorLedOff,
    AcknowledgeSort,
    IrStatus,
    AcknowledgeIr(Bucket),
}

impl Command {
    /// Literal wire code, without separator.
    pub fn code(self) -> &'static str {
        match self {
            Command::GetProtocolVersion => "pro",
            Command::Standby => "stb",
            Command::ShowStatistics => "sts",
            Command::OpenGate(gate) => GATE_OPEN_CODES[gate.index()],
            Command::CloseGate(gate) => GATE_CLOSE_CODES[gate.index()],
            Command::OpenPlatform => "pso",
            Command::ClosePlatform => "psc",
            Command::ErrorLedOn => "elh",
            Command::ErrorLedOff => "ell",
            Command::AcknowledgeSort => "aos",
            Command::IrStatus => "irs",
            Command::AcknowledgeIr(sensor) => IR_ACK_CODES[sensor.index()],
        }
    }

    /// Inverse of [`Command::code`]. Used by the simulated MCU.
    pub fn from_code(code: &str) -> Option<Command> {
        let fixed = match code {
            "pro" => Some(Command::GetProtocolVersion),
            "stb" => Some(Command::Standby),
            "sts" => Some(Command::ShowStatistics),
            "pso" => Some(Command::OpenPlatform),
            "psc" => Some(Command::ClosePlatform),
            "elh" => Some(Command::ErrorLedOn),
            "ell" => Some(Command::ErrorLedOff),
            "aos" => Some(Command::AcknowledgeSort),
            "irs" => Some(Command::IrStatus),
            _ => None,
        };
        fixed
            .or_else(|| {
                lookup(&GATE_OPEN_CODES, code)
                    .and_then(|n| Gate::new(n).ok())
                    .map(Command::OpenGate)
            })
            .or_else(|| {
                lookup(&GATE_CLOSE_CODES, code)
                    .and_then(|n| Gate::new(n).ok())
                    .map(Command::CloseGate)
            })
            .or_else(|| {
                lookup(&IR_ACK_CODES, code)
                    .and_then(|n| Bucket::new(n).ok())
                    .map(Command::AcknowledgeIr)
            })
    }
}

fn lookup(table: &[&str], code: &str) -> Option<u8> {
    table
        .iter()
        .position(|candidate| *candidate == code)
        .map(|idx| idx as u8 + 1)
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Latched IR drop sensor states, index `i` is sensor `i + 1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IrStates([bool; BUCKET_COUNT]);

impl IrStates {
    pub fn new(states: [bool; BUCKET_COUNT]) -> Self {
        Self(states)
    }

    pub fn triggered(&self, sensor: Bucket) -> bool {
        self.0[sensor.index()]
    }

    pub fn as_array(&self) -> [bool; BUCKET_COUNT] {
        self.0
    }

    /// Sensors currently latched, lowest first.
    pub fn active(&self) -> impl Iterator<Item = Bucket> + '_ {
        Bucket::all().filter(|sensor| self.triggered(*sensor))
    }

    fn parse(payload: &str) -> Result<Self, ProtocolError> {
        if payload.len() != BUCKET_COUNT {
            return Err(ProtocolError::MalformedPayload(format!(
                "ir status needs {} sensor flags, got '{}'",
                BUCKET_COUNT, payload
            )));
        }
        let mut states = [false; BUCKET_COUNT];
        for (slot, ch) in states.iter_mut().zip(payload.chars()) {
            *slot = match ch {
                '1' => true,
                '0' => false,
                other => {
                    return Err(ProtocolError::MalformedPayload(format!(
                        "invalid ir flag '{}' in '{}'",
                        other, payload
                    )))
                }
            };
        }
        Ok(Self(states))
    }
}

impl fmt::Display for IrStates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for state in self.0 {
            f.write_str(if state { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Responses the MCU can send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Ready,
    Success,
    PlatformSuccess,
    Failure,
    ProtocolVersion(String),
    IrStatus(IrStates),
}

impl Response {
    /// Wire form without separator.
    pub fn code(&self) -> String {
        match self {
            Response::Ready => "RDY".to_string(),
            Response::Success => "OK".to_string(),
            Response::PlatformSuccess => "OKP".to_string(),
            Response::Failure => "KO".to_string(),
            Response::ProtocolVersion(version) => format!("{PROTOCOL_VERSION_PREFIX}{version}"),
            Response::IrStatus(states) => format!("{IR_STATUS_PREFIX}{states}"),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success | Response::PlatformSuccess)
    }

    fn parse(body: &str) -> Result<Self, ProtocolError> {
        match body {
            "RDY" => return Ok(Response::Ready),
            "OK" => return Ok(Response::Success),
            "OKP" => return Ok(Response::PlatformSuccess),
            "KO" => return Ok(Response::Failure),
            _ => {}
        }
        if let Some(version) = body.strip_prefix(PROTOCOL_VERSION_PREFIX) {
            return Ok(Response::ProtocolVersion(version.to_string()));
        }
        if let Some(payload) = body.strip_prefix(IR_STATUS_PREFIX) {
            return IrStates::parse(payload).map(Response::IrStatus);
        }
        Err(ProtocolError::UnknownResponse(body.to_string()))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// Stateless framing for both directions of the link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Codec {
    separator: u8,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR as u8,
        }
    }
}

impl Codec {
    /// The separator must be a single ASCII character.
    pub fn new(separator: char) -> Result<Self, ProtocolError> {
        if !separator.is_ascii() {
            return Err(ProtocolError::MalformedPayload(format!(
                "separator {:?} is not ascii",
                separator
            )));
        }
        Ok(Self {
            separator: separator as u8,
        })
    }

    pub fn separator(&self) -> u8 {
        self.separator
    }

    pub fn encode(&self, command: Command) -> Vec<u8> {
        self.frame(command.code())
    }

    pub fn encode_response(&self, response: &Response) -> Vec<u8> {
        self.frame(&response.code())
    }

    fn frame(&self, code: &str) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(code.len() + 1);
        bytes.extend_from_slice(code.as_bytes());
        bytes.push(self.separator);
        bytes
    }

    /// Decode one response frame. Bytes after the first separator are ignored.
    pub fn decode(&self, bytes: &[u8]) -> Result<Response, ProtocolError> {
        Response::parse(self.body(bytes)?)
    }

    /// Decode one command frame. Used by the simulated MCU.
    pub fn decode_command(&self, bytes: &[u8]) -> Result<Command, ProtocolError> {
        let body = self.body(bytes)?;
        Command::from_code(body).ok_or_else(|| ProtocolError::UnknownResponse(body.to_string()))
    }

    fn body<'a>(&self, bytes: &'a [u8]) -> Result<&'a str, ProtocolError> {
        let end = bytes
            .iter()
            .position(|b| *b == self.separator)
            .ok_or(ProtocolError::Unframed)?;
        let body = std::str::from_utf8(&bytes[..end]).map_err(|_| ProtocolError::NonUtf8)?;
        // A CRLF-terminated MCU print leaves a stray '\r' when the separator is '\n'.
        Ok(body.trim_end_matches('\r'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(n: u8) -> Bucket {
        Bucket::new(n).unwrap()
    }

    #[test]
    fn every_response_decodes_from_its_wire_form() {
        let codec = Codec::new(';').unwrap();
        let vocabulary = [
            Response::Ready,
            Response::Success,
            Response::PlatformSuccess,
            Response::Failure,
            Response::ProtocolVersion("1.2".to_string()),
            Response::IrStatus(IrStates::new([false, true, false, false, true])),
        ];
        for response in vocabulary {
            let wire = codec.encode_response(&response);
            assert_eq!(codec.decode(&wire).unwrap(), response);
        }
    }

    #[test]
    fn unknown_prefix_is_rejected() {
        let codec = Codec::default();
        assert_eq!(
            codec.decode(b"NOPE\n"),
            Err(ProtocolError::UnknownResponse("NOPE".to_string()))
        );
        assert_eq!(codec.decode(b"OK"), Err(ProtocolError::Unframed));
        assert_eq!(codec.decode(b"O\xffK\n"), Err(ProtocolError::NonUtf8));
    }

    #[test]
    fn ir_payload_shape_is_validated() {
        let codec = Codec::default();
        assert!(matches!(
            codec.decode(b"IS:0100\n"),
            Err(ProtocolError::MalformedPayload(_))
        ));
        assert!(matches!(
            codec.decode(b"IS:01x00\n"),
            Err(ProtocolError::MalformedPayload(_))
        ));
        let Response::IrStatus(states) = codec.decode(b"IS:00010\r\n").unwrap() else {
            panic!("expected ir status");
        };
        assert!(states.triggered(bucket(4)));
        assert_eq!(states.active().collect::<Vec<_>>(), vec![bucket(4)]);
    }

    #[test]
    fn command_codes_follow_the_gate_and_sensor_tables() {
        let codec = Codec::new(';').unwrap();
        let gate = Gate::new(3).unwrap();
        assert_eq!(codec.encode(Command::OpenGate(gate)), b"g3o;".to_vec());
        assert_eq!(codec.encode(Command::CloseGate(gate)), b"g3c;".to_vec());
        assert_eq!(codec.encode(Command::AcknowledgeIr(bucket(5))), b"ir5;".to_vec());
        assert_eq!(codec.encode(Command::IrStatus), b"irs;".to_vec());
        assert_eq!(Command::from_code("g3c"), Some(Command::CloseGate(gate)));
        assert_eq!(Command::from_code("ir1"), Some(Command::AcknowledgeIr(bucket(1))));
        assert_eq!(Command::from_code("g5o"), None);
    }

    #[test]
    fn decode_stops_at_first_separator() {
        let codec = Codec::new(';').unwrap();
        assert_eq!(codec.decode(b"RDY;OK;").unwrap(), Response::Ready);
        assert!(Codec::new('é').is_err());
    }
}
