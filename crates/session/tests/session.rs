use rtpcore_session::endpoint::{NullObserver, SessionEndpoint, SessionEndpointOptions, SessionObserver};
use rtpcore_session::srtp::SrtpContext;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn peer() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 6000)
}

#[derive(Default)]
struct CountingObserver {
    digits: AtomicU32,
}

impl SessionObserver for CountingObserver {
    fn on_dtmf_digit(&self, _ssrc: u32, _digit: char) {
        self.digits.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn secure_session_round_trips_media_under_srtp() {
    let srtp = SrtpContext::from_hex_key("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d").unwrap();
    let mut options = SessionEndpointOptions::default();
    options.flags |= rtpcore_session::flags::SECURE;
    // Rotates on the first packet so a single write/read pair is enough
    // to see the frame; see the equivalent comment in endpoint.rs's tests.
    options.jitter.initial_qlen = 1;

    let endpoint = SessionEndpoint::new(options, Some(srtp), NullObserver);
    endpoint.bind(peer());

    let wire = endpoint.write_frame(0, b"secure-audio", Some(0)).unwrap();
    let frame = endpoint.read_frame(&wire, peer()).unwrap().unwrap();
    assert_eq!(frame.data, b"secure-audio");
}

#[test]
fn full_digit_train_reaches_observer_exactly_once() {
    let observer = Arc::new(CountingObserver::default());
    let endpoint = SessionEndpoint::new(SessionEndpointOptions::default(), None, observer.clone());
    endpoint.bind(peer());

    endpoint.send_digit('7');

    let mut sent = 0;
    while let Some(wire) = endpoint.poll_dtmf_send().unwrap() {
        endpoint.read_frame(&wire, peer()).unwrap();
        sent += 1;
        if sent > 64 {
            panic!("digit train did not terminate");
        }
    }

    assert_eq!(observer.digits.load(Ordering::SeqCst), 1);
}

#[test]
fn ssrc_collision_is_reported_on_address_change() {
    struct CollisionObserver(AtomicU32);
    impl SessionObserver for CollisionObserver {
        fn on_ssrc_collision(&self, _ssrc: u32, _source: SocketAddr) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let observer = Arc::new(CollisionObserver(AtomicU32::new(0)));
    let endpoint = SessionEndpoint::new(SessionEndpointOptions::default(), None, observer.clone());
    endpoint.bind(peer());

    let wire = endpoint.write_frame(0, b"a", Some(0)).unwrap();
    endpoint.read_frame(&wire, peer()).unwrap();

    let other_source = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)), 7000);
    endpoint.read_frame(&wire, other_source).unwrap();

    assert_eq!(observer.0.load(Ordering::SeqCst), 1);
}
