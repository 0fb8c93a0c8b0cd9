//! The frame loop against the simulated MCU: recovery from camera and MCU
//! failures, and the shutdown sequence.

use std::io::Cursor;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use aidsorter::{
    Bucket, BucketTable, Codec, Controller, Frame, FrameSource, McuClient, RecoveryPolicy,
    ReplayDetector, SimulatedMcu, Sorter, SorterError,
};

/// Camera double that fails on chosen calls to `next_frame` until it is
/// re-acquired.
struct FlakyCamera {
    fail_on: Vec<u64>,
    calls: u64,
    frames: u64,
    connected: bool,
    reacquired: u32,
    released: u32,
}

impl FlakyCamera {
    fn failing_on(fail_on: &[u64]) -> Self {
        Self {
            fail_on: fail_on.to_vec(),
            calls: 0,
            frames: 0,
            connected: true,
            reacquired: 0,
            released: 0,
        }
    }
}

impl FrameSource for FlakyCamera {
    fn connect(&mut self) -> aidsorter::Result<()> {
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> aidsorter::Result<Frame> {
        self.calls += 1;
        if self.fail_on.contains(&self.calls) {
            self.connected = false;
        }
        if !self.connected {
            return Err(SorterError::Camera("camera unplugged".into()));
        }
        self.frames += 1;
        Ok(Frame::blank(4, 4, self.frames))
    }

    fn reacquire(&mut self) -> aidsorter::Result<()> {
        self.reacquired += 1;
        self.release();
        self.connect()
    }

    fn release(&mut self) {
        self.released += 1;
        self.connected = false;
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn frames_captured(&self) -> u64 {
        self.frames
    }
}

fn controller(sim: SimulatedMcu) -> Controller<SimulatedMcu> {
    let mcu = McuClient::connect(sim, Codec::default()).expect("handshake");
    let sorter = Sorter::new(
        BucketTable::new([vec!["can"], vec!["cat"], vec![], vec![]]),
        2,
    );
    Controller::new(sorter, mcu).with_recovery(RecoveryPolicy {
        delay: Duration::ZERO,
    })
}

fn replay(lines: &[&str]) -> ReplayDetector<Cursor<String>> {
    let mut input = lines.join("\n");
    input.push('\n');
    ReplayDetector::new(Cursor::new(input), "test")
}

const CAT: &str = r#"[{"category":"cat","score":0.9}]"#;

#[test]
fn camera_loss_is_recovered_without_losing_samples() {
    let sim = SimulatedMcu::new("stub://mcu", Codec::default()).with_drop_after(1);
    let mut controller = controller(sim);
    let mut camera = FlakyCamera::failing_on(&[2]);
    let mut detector = replay(&[CAT, CAT, "", "", ""]);
    let stop = AtomicBool::new(false);

    controller.run(&mut camera, &mut detector, &stop).unwrap();

    let bucket = Bucket::new(2).unwrap();
    assert_eq!(camera.reacquired, 1);
    assert_eq!(controller.failures(), 1);
    assert_eq!(controller.tally().committed(bucket), 1);
    assert_eq!(controller.tally().dropped(bucket), 1);
    assert!(controller.session().is_idle());

    let sim = controller.mcu().link();
    assert_eq!(sim.sorted(bucket), 1);
    assert!(!sim.error_led());
    assert!(!sim.platform_open());
    assert_eq!(sim.open_gate(), None);
    assert!(sim.in_standby());
    assert!(!camera.is_healthy());
}

#[test]
fn rejected_command_recovers_without_touching_the_camera() {
    let sim = SimulatedMcu::new("stub://mcu", Codec::default());
    let mut controller = controller(sim);
    controller.mcu_mut().link_mut().reject_next(1);
    let mut camera = FlakyCamera::failing_on(&[]);
    let mut detector = replay(&[CAT, ""]);
    let stop = AtomicBool::new(false);

    controller.run(&mut camera, &mut detector, &stop).unwrap();

    assert_eq!(controller.failures(), 1);
    assert_eq!(camera.reacquired, 0);
    assert!(!controller.mcu().link().error_led());
}

#[test]
fn corrupt_ir_reply_keeps_waiting_for_the_drop() {
    let sim = SimulatedMcu::new("stub://mcu", Codec::default()).with_drop_after(2);
    let mut controller = controller(sim);
    let mut camera = FlakyCamera::failing_on(&[]);
    let can = r#"[{"category":"can","score":0.8}]"#;
    let mut detector = replay(&[can, can, "", ""]);
    let stop = AtomicBool::new(false);

    for _ in 0..2 {
        controller.run_once(&mut camera, &mut detector).unwrap();
    }
    let bucket = Bucket::new(1).unwrap();
    assert_eq!(controller.session().active_bucket(), Some(bucket));

    controller.mcu_mut().link_mut().corrupt_next_ir();
    controller.run(&mut camera, &mut detector, &stop).unwrap();

    // The corrupted poll is retried on the next frame, not treated as a failure.
    assert_eq!(controller.failures(), 0);
    assert!(controller.session().is_idle());
    assert_eq!(controller.tally().dropped(bucket), 1);
    assert_eq!(controller.mcu().link().sorted(bucket), 1);
}

#[test]
fn stop_signal_still_parks_the_mcu_and_releases_the_camera() {
    let sim = SimulatedMcu::new("stub://mcu", Codec::default());
    let mut controller = controller(sim);
    let mut camera = FlakyCamera::failing_on(&[]);
    let mut detector = replay(&[CAT]);
    let stop = AtomicBool::new(true);

    controller.run(&mut camera, &mut detector, &stop).unwrap();

    assert_eq!(camera.calls, 0);
    assert_eq!(camera.released, 1);
    assert!(controller.mcu().link().in_standby());
}
