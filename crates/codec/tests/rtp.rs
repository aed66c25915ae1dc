use bytes::BytesMut;
use rtpcore_codec::dtmf::TelephonyEvent;
use rtpcore_codec::rtp::{decode_rtp, encode_rtp, RtpHeader};

#[test]
fn carries_a_telephony_event_as_rtp_payload() {
    let event = TelephonyEvent {
        event: rtpcore_codec::dtmf::EVENT_POUND,
        end_of_event: true,
        volume: 12,
        duration: 480,
    };

    let mut payload = BytesMut::new();
    event.encode(&mut payload);

    let header = RtpHeader {
        marker: true,
        payload_type: 101,
        sequence_number: 10,
        timestamp: 16000,
        ssrc: 0xfeed_face,
        ..Default::default()
    };

    let mut wire = BytesMut::new();
    encode_rtp(&header, &[], &payload, &mut wire).unwrap();

    let packet = decode_rtp(&wire).unwrap();
    assert_eq!(packet.header.payload_type, 101);
    assert!(packet.header.marker);

    let decoded_event = TelephonyEvent::decode(packet.payload).unwrap();
    assert_eq!(decoded_event, event);
    assert_eq!(decoded_event.digit(), Some('#'));
}

#[test]
fn csrc_list_round_trips_through_mixer_style_packet() {
    let header = RtpHeader {
        payload_type: 0,
        sequence_number: 1,
        timestamp: 0,
        ssrc: 1,
        ..Default::default()
    };

    let mut wire = BytesMut::new();
    encode_rtp(&header, &[10, 20, 30], b"payload", &mut wire).unwrap();

    let packet = decode_rtp(&wire).unwrap();
    assert_eq!(packet.header.csrc_count, 3);
    assert_eq!(packet.csrcs(&wire).collect::<Vec<_>>(), vec![10, 20, 30]);
    assert_eq!(packet.payload, b"payload");
}
