use rtpcore_codec::rtcp::{
    Bye, ReceiverReport, ReportBlock, RtcpCompoundBuilder, RtcpPacket, SdesChunk, SdesItem,
    SenderInfo, SenderReport, decode_compound,
};

#[test]
fn full_compound_round_trips_through_builder_and_parser() {
    let mut builder = RtcpCompoundBuilder::new();
    builder
        .add_sender_report(SenderReport {
            ssrc: 0x1111_2222,
            sender_info: SenderInfo {
                ntp_sec: 100,
                ntp_frac: 0,
                rtp_timestamp: 8000,
                packet_count: 40,
                octet_count: 6400,
            },
            reports: vec![ReportBlock {
                ssrc: 0x3333_4444,
                fraction_lost: 0,
                cumulative_lost: 2,
                highest_seq: 500,
                jitter: 12,
                last_sr: 0,
                delay_since_last_sr: 0,
            }],
        })
        .unwrap()
        .add_sdes(vec![SdesChunk {
            ssrc: 0x1111_2222,
            items: vec![SdesItem::new(rtpcore_codec::rtcp::SDES_CNAME, "alice@host")],
        }])
        .unwrap()
        .add_bye(Bye {
            sources: vec![0x1111_2222],
            reason: Some("bye".into()),
        })
        .unwrap();

    let bytes = builder.build().unwrap();
    let packets = decode_compound(&bytes).unwrap();

    assert_eq!(packets.len(), 3);
    match &packets[0] {
        RtcpPacket::SenderReport(sr) => {
            assert_eq!(sr.ssrc, 0x1111_2222);
            assert_eq!(sr.reports[0].cumulative_lost, 2);
        }
        other => panic!("expected sender report, got {other:?}"),
    }
    assert!(matches!(packets[1], RtcpPacket::SourceDescription(_)));
    assert!(matches!(packets[2], RtcpPacket::Bye(_)));
}

#[test]
fn receiver_report_only_compound_is_valid() {
    let mut builder = RtcpCompoundBuilder::new();
    builder
        .add_receiver_report(ReceiverReport {
            ssrc: 9,
            reports: vec![],
        })
        .unwrap();

    let bytes = builder.build().unwrap();
    let packets = decode_compound(&bytes).unwrap();
    assert_eq!(packets.len(), 1);
}

#[test]
fn garbage_after_last_packet_is_rejected() {
    let mut builder = RtcpCompoundBuilder::new();
    builder
        .add_receiver_report(ReceiverReport {
            ssrc: 9,
            reports: vec![],
        })
        .unwrap();

    let mut bytes = builder.build().unwrap();
    bytes.extend_from_slice(&[1, 2, 3]);
    assert!(decode_compound(&bytes).is_err());
}
