use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pbb::core::flag::{FLAG_BUSY, FLAG_READY};
use pbb::core::shm::ShmSegment;
use pbb::core::{Address, Client, Error, FlagState, Naming, ReadOptions, RetryPolicy, Status};
use pbb::registry::{Declaration, ProvisionOutcome, Registry};

fn namespace(tag: &str) -> Naming {
    Naming::new(format!("PBBT{}{}", std::process::id(), tag))
}

fn provisioned(tag: &str, decls: &[Declaration]) -> (Naming, Registry) {
    let naming = namespace(tag);
    let mut registry = Registry::new(naming.clone());
    registry.start().expect("registry start");
    for decl in decls {
        let outcome = registry.provision(decl).expect("provision");
        assert_eq!(
            outcome,
            ProvisionOutcome::Created {
                capacity: decl.capacity()
            }
        );
    }
    (naming, registry)
}

#[test]
fn write_then_read_returns_payload() {
    let decl = Declaration::new("sender", "data", "000.00");
    let (naming, _registry) = provisioned("rt", &[decl.clone()]);
    let addr = decl.address();
    let mut client = Client::new(naming);

    assert_eq!(client.check_state(&addr).expect("state"), FlagState::Idle);
    assert_eq!(client.read(&addr, ReadOptions::no_wait()).expect("read"), None);

    client.write(&addr, "001.50").expect("write");
    assert_eq!(client.check_state(&addr).expect("state"), FlagState::Ready);
    assert_eq!(
        client.read(&addr, ReadOptions::default()).expect("read").as_deref(),
        Some("001.50")
    );
}

#[test]
fn oversized_write_is_rejected_without_mutation() {
    let decl = Declaration::new("sender", "data", "000.00");
    let (naming, _registry) = provisioned("size", &[decl.clone()]);
    let addr = decl.address();
    let mut client = Client::new(naming);

    client.write(&addr, "001.50").expect("write");
    let err = client.write(&addr, "12345.00").unwrap_err();
    assert!(matches!(
        err,
        Error::SizeExceeded {
            len: 8,
            capacity: 6
        }
    ));
    assert_eq!(err.status(), Status::SizeExceeded);

    assert_eq!(client.check_state(&addr).expect("state"), FlagState::Ready);
    assert_eq!(
        client.read(&addr, ReadOptions::no_wait()).expect("read").as_deref(),
        Some("001.50")
    );
}

#[test]
fn oversized_first_write_leaves_topic_idle() {
    let decl = Declaration::new("u", "t", "abc");
    let (naming, _registry) = provisioned("size0", &[decl.clone()]);
    let addr = decl.address();
    let mut client = Client::new(naming);

    assert!(client.write(&addr, "abcd").is_err());
    assert_eq!(client.check_state(&addr).expect("state"), FlagState::Idle);
}

#[test]
fn shorter_payload_trims_padding() {
    let decl = Declaration::new("receiver", "status", "LISTENING");
    let (naming, _registry) = provisioned("trim", &[decl.clone()]);
    let addr = decl.address();
    let mut client = Client::new(naming);

    client.write(&addr, "RUNNING").expect("write");
    assert_eq!(
        client.read(&addr, ReadOptions::no_wait()).expect("read").as_deref(),
        Some("RUNNING")
    );
    client.write(&addr, 7).expect("write number");
    assert_eq!(
        client.read(&addr, ReadOptions::no_wait()).expect("read").as_deref(),
        Some("7")
    );
}

#[test]
fn utf8_payloads_and_invalid_bytes() {
    let decl = Declaration::new("u", "text", "éé");
    let (naming, _registry) = provisioned("utf8", &[decl.clone()]);
    let addr = decl.address();
    let mut client = Client::new(naming);

    client.write(&addr, "ü").expect("write");
    assert_eq!(
        client.read(&addr, ReadOptions::no_wait()).expect("read").as_deref(),
        Some("ü")
    );

    client.write_bytes(&addr, &[b'a', 0xff]).expect("write bytes");
    assert_eq!(
        client.read(&addr, ReadOptions::no_wait()).expect("read").as_deref(),
        Some("a\u{fffd}")
    );
}

#[test]
fn waiting_read_on_unwritten_topic_is_bounded() {
    let decl = Declaration::new("u", "never", "x");
    let (naming, _registry) = provisioned("wait", &[decl.clone()]);
    let mut client = Client::new(naming).with_retry(RetryPolicy {
        read_attempts: 5,
        read_poll_interval: Duration::from_millis(5),
        read_budget: Duration::from_millis(50),
        ..RetryPolicy::default()
    });

    let start = Instant::now();
    assert_eq!(
        client.read(&decl.address(), ReadOptions::default()).expect("read"),
        None
    );
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn missing_topic_distinguishes_registry_presence() {
    let (naming, _registry) = provisioned("miss", &[]);
    let mut client = Client::new(naming);
    let err = client
        .read(&Address::new("ghost", "topic"), ReadOptions::no_wait())
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    assert!(err.is_connection());

    let mut orphan = Client::new(namespace("noreg"));
    let err = orphan.write(&Address::new("ghost", "topic"), "x").unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed { .. }));
    assert_eq!(err.status(), Status::ConnectionFailed);

    let err = orphan.check_state(&Address::new("ghost", "topic")).unwrap_err();
    assert!(err.is_connection());
}

#[test]
fn busy_flag_exhausts_write_retries() {
    let decl = Declaration::new("sender", "data", "000.00");
    let (naming, _registry) = provisioned("busy", &[decl.clone()]);
    let addr = decl.address();
    let mut client = Client::new(naming.clone());
    client.write(&addr, "001.50").expect("write");

    let flag = ShmSegment::open(&naming.resolve(&addr).flag)
        .expect("open flag")
        .expect("flag exists");
    flag.atomic_u8().store(FLAG_BUSY, Ordering::Release);

    let err = client.write(&addr, "002.00").unwrap_err();
    assert!(matches!(err, Error::Busy { attempts: 3 }));
    assert!(err.is_transient());
    assert_eq!(client.check_state(&addr).expect("state"), FlagState::Busy);
    assert_eq!(client.read(&addr, ReadOptions::no_wait()).expect("read"), None);

    flag.atomic_u8().store(FLAG_READY, Ordering::Release);
    assert_eq!(
        client.read(&addr, ReadOptions::no_wait()).expect("read").as_deref(),
        Some("001.50")
    );
}

#[test]
fn unknown_flag_byte_is_reported_not_trusted() {
    let decl = Declaration::new("u", "odd", "abc");
    let (naming, _registry) = provisioned("odd", &[decl.clone()]);
    let addr = decl.address();
    let flag = ShmSegment::open(&naming.resolve(&addr).flag)
        .expect("open flag")
        .expect("flag exists");
    flag.atomic_u8().store(9, Ordering::Release);

    let mut client = Client::new(naming);
    assert_eq!(
        client.check_state(&addr).expect("state"),
        FlagState::Unknown(9)
    );
    assert_eq!(client.read(&addr, ReadOptions::no_wait()).expect("read"), None);
}

#[test]
fn publish_uses_own_unit_and_close_keeps_segments() {
    let decl = Declaration::new("sender", "data", "000.00");
    let (naming, _registry) = provisioned("pub", &[decl.clone()]);
    let mut sender = Client::for_unit(naming.clone(), "sender");
    sender.publish("data", "002.00").expect("publish");
    assert!(sender.attachments() > 0);

    sender.close();
    assert_eq!(sender.attachments(), 0);

    let mut reader = Client::new(naming.clone());
    assert_eq!(
        reader
            .read(&decl.address(), ReadOptions::no_wait())
            .expect("read")
            .as_deref(),
        Some("002.00")
    );

    let mut anonymous = Client::new(naming);
    assert!(matches!(
        anonymous.publish("data", "1").unwrap_err(),
        Error::Config(_)
    ));
}

#[test]
fn cached_attachment_is_reused() {
    let decl = Declaration::new("u", "t", "0000");
    let (naming, _registry) = provisioned("cache", &[decl.clone()]);
    let mut client = Client::new(naming);
    client.write(&decl.address(), "1").expect("write");
    client.read(&decl.address(), ReadOptions::no_wait()).expect("read");
    client.check_state(&decl.address()).expect("state");
    assert_eq!(client.attachments(), 2);
}

#[test]
fn unit_defaults_to_program_stem() {
    let client = Client::from_current_exe(namespace("exe")).expect("client");
    let unit = client.unit().expect("unit");
    assert!(!unit.is_empty());
    assert!(!unit.contains('/'));
}

#[test]
fn concurrent_reader_sees_defined_states_and_whole_payloads() {
    const PAYLOADS: [&str; 2] = ["AAAAAA", "BBBBBB"];
    const ROUNDS: usize = 2_000;

    let decl = Declaration::new("sender", "data", "000.00");
    let (naming, _registry) = provisioned("race", &[decl.clone()]);
    let addr = decl.address();
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let naming = naming.clone();
        let addr = addr.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut client = Client::new(naming);
            for round in 0..ROUNDS {
                client.write(&addr, PAYLOADS[round % 2]).expect("write");
                thread::sleep(Duration::from_micros(20));
            }
            done.store(true, Ordering::Release);
        })
    };

    let mut client = Client::new(naming);
    let mut started = false;
    let mut polls = 0usize;
    while !done.load(Ordering::Acquire) {
        let state = client.check_state(&addr).expect("state");
        assert!(
            matches!(state, FlagState::Idle | FlagState::Busy | FlagState::Ready),
            "undefined flag state {state:?}"
        );
        if state == FlagState::Idle {
            assert!(!started, "flag returned to IDLE after writes began");
        } else {
            started = true;
        }
        if let Some(value) = client.read(&addr, ReadOptions::no_wait()).expect("read") {
            assert!(PAYLOADS.contains(&value.as_str()), "torn payload {value:?}");
            started = true;
        }
        polls += 1;
    }
    writer.join().expect("writer");

    assert!(polls > 0);
    assert_eq!(client.check_state(&addr).expect("state"), FlagState::Ready);
    assert_eq!(
        client.read(&addr, ReadOptions::no_wait()).expect("read").as_deref(),
        Some(PAYLOADS[(ROUNDS - 1) % 2])
    );
}
