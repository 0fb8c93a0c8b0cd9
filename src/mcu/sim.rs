use std::collections::VecDeque;
use std::io::{self, Read, Write};

use super::McuLink;
use crate::buckets::{Bucket, Gate, BUCKET_COUNT};
use crate::protocol::{Codec, Command, IrStates, Response};

const SIM_PROTOCOL_VERSION: &str = "sim-1";
const DEFAULT_DROP_AFTER_POLLS: u32 = 3;

/// In-process MCU used for `stub://` ports and for tests.
///
/// After a sort is acknowledged, the object "lands" in the bucket behind the
/// open gate (or the overflow bucket when no gate is open) once the IR status
/// has been polled `drop_after_polls` times.
pub struct SimulatedMcu {
    name: String,
    codec: Codec,
    inbound: Vec<u8>,
    outbound: VecDeque<u8>,
    open: bool,
    open_gate: Option<Gate>,
    platform_open: bool,
    error_led: bool,
    standby: bool,
    in_flight: Option<(Bucket, u32)>,
    latched: [bool; BUCKET_COUNT],
    drop_after_polls: u32,
    reject_next: u32,
    corrupt_next_ir: bool,
    sorted: [u64; BUCKET_COUNT],
}

impl SimulatedMcu {
    pub fn new(name: &str, codec: Codec) -> Self {
        let mut sim = Self {
            name: name.to_string(),
            codec,
            inbound: Vec::new(),
            outbound: VecDeque::new(),
            open: true,
            open_gate: None,
            platform_open: false,
            error_led: false,
            standby: false,
            in_flight: None,
            latched: [false; BUCKET_COUNT],
            drop_after_polls: DEFAULT_DROP_AFTER_POLLS,
            reject_next: 0,
            corrupt_next_ir: false,
            sorted: [0; BUCKET_COUNT],
        };
        sim.reply(&Response::Ready);
        sim
    }

    pub fn with_drop_after(mut self, polls: u32) -> Self {
        self.drop_after_polls = polls;
        self
    }

    /// Reply KO to the next `count` commands.
    pub fn reject_next(&mut self, count: u32) {
        self.reject_next = count;
    }

    /// Send a truncated IR status on the next poll.
    pub fn corrupt_next_ir(&mut self) {
        self.corrupt_next_ir = true;
    }

    pub fn disconnect(&mut self) {
        self.open = false;
    }

    pub fn error_led(&self) -> bool {
        self.error_led
    }

    pub fn platform_open(&self) -> bool {
        self.platform_open
    }

    pub fn open_gate(&self) -> Option<Gate> {
        self.open_gate
    }

    pub fn in_standby(&self) -> bool {
        self.standby
    }

    /// Objects the simulated hardware has seen land, per bucket.
    pub fn sorted(&self, bucket: Bucket) -> u64 {
        self.sorted[bucket.index()]
    }

    fn reply(&mut self, response: &Response) {
        let frame = self.codec.encode_response(response);
        self.outbound.extend(frame);
    }

    fn handle(&mut self, frame: &[u8]) {
        let command = match self.codec.decode_command(frame) {
            Ok(command) => command,
            Err(e) => {
                log::warn!("sim mcu: {}", e);
                self.reply(&Response::Failure);
                return;
            }
        };
        if self.reject_next > 0 {
            self.reject_next -= 1;
            self.reply(&Response::Failure);
            return;
        }
        if command != Command::Standby {
            self.standby = false;
        }

        let response = match command {
            Command::GetProtocolVersion => {
                Response::ProtocolVersion(SIM_PROTOCOL_VERSION.to_string())
            }
            Command::Standby => {
                self.standby = true;
                Response::Success
            }
            Command::ShowStatistics => {
                log::info!("sim mcu: sorted per bucket {:?}", self.sorted);
                Response::Success
            }
            Command::OpenGate(gate) => {
                self.open_gate = Some(gate);
                Response::Success
            }
            Command::CloseGate(gate) => {
                if self.open_gate == Some(gate) {
                    self.open_gate = None;
                }
                Response::Success
            }
            Command::OpenPlatform => {
                self.platform_open = true;
                Response::PlatformSuccess
            }
            Command::ClosePlatform => {
                self.platform_open = false;
                Response::PlatformSuccess
            }
            Command::ErrorLedOn => {
                self.error_led = true;
                Response::Success
            }
            Command::ErrorLedOff => {
                self.error_led = false;
                Response::Success
            }
            Command::AcknowledgeSort => {
                let bucket = self
                    .open_gate
                    .map(Gate::bucket)
                    .unwrap_or(Bucket::OVERFLOW);
                self.in_flight = Some((bucket, self.drop_after_polls));
                Response::Success
            }
            Command::IrStatus => {
                self.advance_drop();
                if self.corrupt_next_ir {
                    self.corrupt_next_ir = false;
                    self.outbound.extend(b"IS:01".iter().copied());
                    self.outbound.push_back(self.codec.separator());
                    return;
                }
                Response::IrStatus(IrStates::new(self.latched))
            }
            Command::AcknowledgeIr(sensor) => {
                self.latched[sensor.index()] = false;
                Response::Success
            }
        };
        self.reply(&response);
    }

    fn advance_drop(&mut self) {
        let Some((bucket, polls_left)) = self.in_flight else {
            return;
        };
        if polls_left > 1 {
            self.in_flight = Some((bucket, polls_left - 1));
            return;
        }
        self.in_flight = None;
        self.latched[bucket.index()] = true;
        self.sorted[bucket.index()] += 1;
    }
}

impl Read for SimulatedMcu {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "sim mcu disconnected"));
        }
        if self.outbound.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "sim mcu has nothing to send"));
        }
        let n = buf.len().min(self.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimulatedMcu {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "sim mcu disconnected"));
        }
        self.inbound.extend_from_slice(buf);
        let separator = self.codec.separator();
        while let Some(pos) = self.inbound.iter().position(|b| *b == separator) {
            let frame: Vec<u8> = self.inbound.drain(..=pos).collect();
            self.handle(&frame);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl McuLink for SimulatedMcu {
    fn is_open(&self) -> bool {
        self.open
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.outbound.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
