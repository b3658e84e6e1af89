#![cfg(unix)]

use std::time::Duration;

use pbb::signal::termination_channel;

#[test]
fn termination_signals_reach_the_channel() {
    let rx = termination_channel().expect("install handler");
    for signal in [libc::SIGINT, libc::SIGTERM, libc::SIGHUP] {
        assert_eq!(unsafe { libc::raise(signal) }, 0);
        rx.recv_timeout(Duration::from_secs(5)).expect("signal delivered");
    }
    assert!(rx.try_recv().is_err());
    assert!(termination_channel().is_err());
}
