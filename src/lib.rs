pub mod config;
pub mod observer;
pub mod statistics;

use std::net::UdpSocket;
use std::sync::Arc;

use self::config::Config;
use self::observer::Observer;
use self::statistics::Statistics;

use session::{SessionEndpoint, SessionEndpointOptions, SessionState};

/// Runs one session endpoint against a bound UDP socket until the socket
/// errors. Exposed as a function (rather than folded into `main`) so an
/// integration test can drive it the same way the binary does.
pub fn startup(config: Config) -> anyhow::Result<()> {
    let statistics = Statistics::default();
    let observer = Observer::new(statistics.clone());

    let srtp = if config.session.srtp.enabled {
        let key = config
            .session
            .srtp
            .master_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("srtp.enabled is set but srtp.master-key is missing"))?;
        Some(
            session::srtp::SrtpContext::from_hex_key(key)
                .map_err(|err| anyhow::anyhow!("invalid srtp master key: {err}"))?,
        )
    } else {
        None
    };

    let mut flags = session::flags::IO | session::flags::AUTOADJ | session::flags::PASS_RFC2833;
    if srtp.is_some() {
        flags |= session::flags::SECURE;
    }

    let endpoint = Arc::new(SessionEndpoint::new(
        SessionEndpointOptions {
            event_payload_type: config.session.event_payload_type,
            jitter: config.session.jitter.to_jitter_buffer_config(),
            participant_timeout_secs: config.session.participant_timeout_secs,
            flags,
            ..Default::default()
        },
        srtp,
        observer,
    ));

    let socket = UdpSocket::bind(config.session.listen)?;
    log::info!("listening on {}", config.session.listen);

    let mut buf = [0u8; 1500];
    loop {
        let (len, source) = socket.recv_from(&mut buf)?;

        if endpoint.state() != SessionState::Active {
            endpoint.bind(source);
            log::info!("bound to remote peer {source}");
        }

        match endpoint.read_frame(&buf[..len], source) {
            Ok(Some(frame)) => {
                statistics.record_received(frame.data.len());
                log::debug!("frame ready: ts={}, len={}", frame.timestamp, frame.data.len());
            }
            Ok(None) => {}
            Err(err) => log::warn!("dropped packet from {source}: {err}"),
        }
    }
}
