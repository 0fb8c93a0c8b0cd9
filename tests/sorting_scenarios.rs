//! End-to-end sorting scenarios, asserting the exact command sequence on the
//! wire.

use aidsorter::{
    Bucket, BucketTable, Codec, ConnectionError, Detection, IrStates, McuClient, Observation,
    Response, ScriptedLink, Sorter, SorterError, SortingSession, StepOutcome,
};

fn connected_client() -> McuClient<ScriptedLink> {
    let mut link = ScriptedLink::new(Codec::default());
    link.respond(Response::Ready)
        .respond(Response::ProtocolVersion("1.0".into()));
    let mut client = McuClient::connect(link, Codec::default()).expect("handshake");
    client.link_mut().clear_written();
    client
}

fn pets_in_bucket_two(samples: usize) -> Sorter {
    Sorter::new(
        BucketTable::new([vec!["can", "bottle"], vec!["cat"], vec![], vec!["book"]]),
        samples,
    )
}

fn one(category: &str) -> Vec<Detection> {
    vec![Detection::new(category, 0.8)]
}

fn ir(bits: [bool; 5]) -> Response {
    Response::IrStatus(IrStates::new(bits))
}

#[test]
fn majority_commit_then_confirmed_drop() {
    let sorter = pets_in_bucket_two(3);
    let mut mcu = connected_client();
    let mut session = SortingSession::new();
    let bucket = Bucket::new(2).unwrap();

    // three samples (ell each), gate, platform, sort ack
    mcu.link_mut()
        .respond(Response::Success)
        .respond(Response::Success)
        .respond(Response::Success)
        .respond(Response::Success)
        .respond(Response::PlatformSuccess)
        .respond(Response::Success);

    for category in ["cat", "cat"] {
        let outcome = sorter.step(&mut session, &one(category), &mut mcu).unwrap();
        assert!(matches!(outcome, StepOutcome::Sampling(Observation::Sampled { .. })));
    }
    let outcome = sorter.step(&mut session, &one("dog"), &mut mcu).unwrap();
    assert_eq!(
        outcome,
        StepOutcome::Committed {
            category: "cat".into(),
            bucket
        }
    );
    assert_eq!(session.active_bucket(), Some(bucket));
    assert_eq!(
        mcu.link().written_codes(),
        vec!["ell", "ell", "ell", "g2o", "pso", "aos"]
    );
    mcu.link_mut().clear_written();

    // Five empty polls, then the bucket 2 sensor fires.
    for _ in 0..5 {
        mcu.link_mut().respond(ir([false; 5]));
    }
    mcu.link_mut()
        .respond(ir([false, true, false, false, false]))
        .respond(Response::Success)
        .respond(Response::Success)
        .respond(Response::Success)
        .respond(Response::Success)
        .respond(Response::Success)
        .respond(Response::Success)
        .respond(Response::Success)
        .respond(Response::PlatformSuccess);

    for _ in 0..5 {
        let outcome = sorter.step(&mut session, &[], &mut mcu).unwrap();
        assert_eq!(outcome, StepOutcome::Awaiting { bucket });
    }
    let outcome = sorter.step(&mut session, &[], &mut mcu).unwrap();
    assert_eq!(outcome, StepOutcome::Dropped { bucket });
    assert_eq!(session, SortingSession::new());

    let mut expected = vec!["irs"; 6];
    expected.extend(["g2c", "ir1", "ir2", "ir3", "ir4", "ir5", "sts", "psc"]);
    assert_eq!(mcu.link().written_codes(), expected);
    assert_eq!(mcu.link().unread(), 0);
}

#[test]
fn crowded_frame_raises_indicator_and_keeps_buffer() {
    let sorter = pets_in_bucket_two(3);
    let mut mcu = connected_client();
    let mut session = SortingSession::new();

    mcu.link_mut()
        .respond(Response::Success)
        .respond(Response::Success);
    sorter.step(&mut session, &one("can"), &mut mcu).unwrap();
    let before = session.buffer().cloned();

    let crowded = vec![Detection::new("can", 0.9), Detection::new("cat", 0.7)];
    let outcome = sorter.step(&mut session, &crowded, &mut mcu).unwrap();

    assert_eq!(
        outcome,
        StepOutcome::Sampling(Observation::Ambiguous { objects: 2 })
    );
    assert_eq!(session.buffer().cloned(), before);
    assert_eq!(mcu.link().written_codes(), vec!["ell", "elh"]);
}

#[test]
fn failed_handshake_sends_nothing() {
    let mut link = ScriptedLink::new(Codec::default());
    link.respond_raw(b"KO\n");

    let err = McuClient::connect(&mut link, Codec::default()).err().unwrap();
    assert!(matches!(
        err,
        SorterError::Connection(ConnectionError::Handshake(_))
    ));
    assert!(err.is_fatal());
    assert!(link.written_codes().is_empty());
}

#[test]
fn partial_read_expires_after_samples_empty_frames() {
    let sorter = pets_in_bucket_two(4);
    let mut mcu = connected_client();
    let mut session = SortingSession::new();

    mcu.link_mut()
        .respond(Response::Success)
        .respond(Response::Success);
    sorter.step(&mut session, &one("cat"), &mut mcu).unwrap();
    sorter.step(&mut session, &one("cat"), &mut mcu).unwrap();

    for _ in 0..3 {
        sorter.step(&mut session, &[], &mut mcu).unwrap();
        assert_eq!(session.buffer().map(|b| b.len()), Some(2));
    }
    let outcome = sorter.step(&mut session, &[], &mut mcu).unwrap();
    assert_eq!(
        outcome,
        StepOutcome::Sampling(Observation::Expired { discarded: 2 })
    );
    assert_eq!(session.buffer().map(|b| b.len()), Some(0));
    assert_eq!(mcu.link().written_codes(), vec!["ell", "ell"]);
}

#[test]
fn no_sampling_while_a_drop_is_pending() {
    let sorter = pets_in_bucket_two(1);
    let mut mcu = connected_client();
    let mut session = SortingSession::new();

    mcu.link_mut()
        .respond(Response::Success)
        .respond(Response::PlatformSuccess)
        .respond(Response::Success);
    let outcome = sorter.step(&mut session, &one("dog"), &mut mcu).unwrap();
    assert_eq!(
        outcome,
        StepOutcome::Committed {
            category: "dog".into(),
            bucket: Bucket::OVERFLOW
        }
    );

    for _ in 0..3 {
        mcu.link_mut().respond(ir([false; 5]));
    }
    for category in ["can", "cat", "book"] {
        let outcome = sorter.step(&mut session, &one(category), &mut mcu).unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Awaiting {
                bucket: Bucket::OVERFLOW
            }
        );
        assert!(session.buffer().is_none());
    }
    assert_eq!(
        mcu.link().written_codes(),
        vec!["ell", "pso", "aos", "irs", "irs", "irs"]
    );
}
