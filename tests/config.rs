use rtpcore::config::Config;

#[test]
fn parses_minimal_config_with_defaults() {
    let config: Config = serde_json5::from_str(
        r#"{
            session: {
                listen: "127.0.0.1:0",
            },
        }"#,
    )
    .unwrap();

    assert_eq!(config.session.event_payload_type, 101);
    assert_eq!(config.session.jitter.samples_per_second, 8000);
    assert_eq!(config.session.port_range.start, 16384);
    assert!(!config.session.srtp.enabled);
}

#[test]
fn parses_full_config_with_srtp_enabled() {
    let config: Config = serde_json5::from_str(
        r#"{
            session: {
                listen: "0.0.0.0:5004",
                "event-payload-type": 100,
                jitter: {
                    "initial-qlen": 20,
                    "max-qlen": 100,
                },
                srtp: {
                    enabled: true,
                    "master-key": "00112233445566778899aabb",
                },
            },
            log: { level: "debug" },
        }"#,
    )
    .unwrap();

    assert_eq!(config.session.event_payload_type, 100);
    assert_eq!(config.session.jitter.initial_qlen, 20);
    assert!(config.session.srtp.enabled);
    assert_eq!(config.session.srtp.master_key.as_deref(), Some("00112233445566778899aabb"));
}
