#[cfg(test)]
mod receiver_tests {
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    use crate::codec::{EncodedPayload, PcmFormat};
    use crate::fragment;
    use crate::reassembly::ReassemblyStore;
    use crate::receiver::{Reaper, ReceiverEvent, VoiceReceiver};
    use crate::tests::support::legacy_payload;
    use crate::transport::{InboundPacket, PortNum};
    use crate::wire::WireMessage;

    const PCM_8K: PcmFormat = PcmFormat { sample_rate: 8000, channels: 1, sample_width: 2 };

    fn packet(from: &str, port: PortNum, message: &WireMessage) -> InboundPacket {
        InboundPacket { from: from.to_string(), port, payload: message.to_bytes().unwrap() }
    }

    fn payload() -> EncodedPayload {
        legacy_payload(PCM_8K, &(0..400).map(|i| (i % 7) as u8).collect::<Vec<_>>())
    }

    #[test]
    fn test_single_voice_packet_bypasses_store() {
        let store = Arc::new(ReassemblyStore::new());
        let (receiver, events) = VoiceReceiver::new(store.clone());
        let payload = payload();

        receiver.handle_packet(&packet(
            "!a",
            PortNum::PrivateApp,
            &WireMessage::Voice { voice_data: payload.to_base64(), timestamp: "20240101_101010".into() },
        ));

        match events.try_recv().unwrap() {
            ReceiverEvent::Voice(voice) => {
                assert_eq!(voice.origin, "!a");
                assert!(voice.transfer_id.is_none());
                assert_eq!(voice.timestamp, "20240101_101010");
                assert_eq!(voice.payload, payload);
                assert_eq!(voice.clip.frame_count(), 200);
            }
            other => panic!("expected voice, got {:?}", other),
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_fragments_report_progress_then_voice() {
        let store = Arc::new(ReassemblyStore::new());
        let (receiver, events) = VoiceReceiver::new(store);
        let payload = payload();
        let chunks = fragment::fragment("f00d", &payload.to_base64(), 20);
        let total = chunks.len() as u32;

        for chunk in chunks.iter().rev() {
            receiver.handle_packet(&packet("!b", PortNum::PrivateApp, &WireMessage::from(chunk)));
        }

        let received: Vec<ReceiverEvent> = events.try_iter().collect();
        assert_eq!(received.len(), total as usize);
        for (i, event) in received[..received.len() - 1].iter().enumerate() {
            match event {
                ReceiverEvent::Progress { transfer_id, from, have, total: t } => {
                    assert_eq!(transfer_id, "f00d");
                    assert_eq!(from, "!b");
                    assert_eq!(*have, i as u32 + 1);
                    assert_eq!(*t, total);
                }
                other => panic!("expected progress, got {:?}", other),
            }
        }
        assert!(matches!(received.last(), Some(ReceiverEvent::Voice(v)) if v.payload == payload));
    }

    #[test]
    fn test_text_probe_and_junk() {
        let (receiver, events) = VoiceReceiver::new(Arc::new(ReassemblyStore::new()));

        receiver.handle_packet(&InboundPacket {
            from: "!c".into(),
            port: PortNum::TextMessage,
            payload: b"hello mesh".to_vec(),
        });
        receiver.handle_packet(&packet("!c", PortNum::PrivateApp, &WireMessage::Test { test: "ping".into() }));
        receiver.handle_packet(&InboundPacket { from: "!c".into(), port: PortNum::PrivateApp, payload: b"{oops".to_vec() });
        receiver.handle_packet(&InboundPacket { from: "!c".into(), port: PortNum::Other(67), payload: vec![1, 2, 3] });
        receiver.handle_packet(&packet(
            "!c",
            PortNum::PrivateApp,
            &WireMessage::Voice { voice_data: "###".into(), timestamp: "x".into() },
        ));

        let received: Vec<ReceiverEvent> = events.try_iter().collect();
        assert_eq!(received.len(), 4);
        assert!(matches!(&received[0], ReceiverEvent::Text { text, .. } if text == "hello mesh"));
        assert!(matches!(&received[1], ReceiverEvent::TestProbe { text, .. } if text == "ping"));
        assert!(matches!(&received[2], ReceiverEvent::Dropped { .. }));
        assert!(matches!(&received[3], ReceiverEvent::Dropped { reason, .. } if reason.contains("decode")));
    }

    #[test]
    fn test_rejected_fragment_is_reported() {
        let (receiver, events) = VoiceReceiver::new(Arc::new(ReassemblyStore::new()));
        receiver.handle_packet(&packet(
            "!d",
            PortNum::PrivateApp,
            &WireMessage::Chunk { chunk_id: "z".into(), chunk_num: 5, total_chunks: 2, data: "AA".into() },
        ));
        assert!(matches!(events.try_recv().unwrap(), ReceiverEvent::Dropped { .. }));
    }

    #[test]
    fn test_reaper_thread_expires_sessions() {
        let store = Arc::new(ReassemblyStore::new());
        let (receiver, _events) = VoiceReceiver::new(store.clone());
        receiver.handle_packet(&packet(
            "!e",
            PortNum::PrivateApp,
            &WireMessage::Chunk { chunk_id: "idle".into(), chunk_num: 1, total_chunks: 3, data: "AAAA".into() },
        ));
        assert_eq!(store.len(), 1);

        let (tx, rx) = mpsc::channel();
        let mut reaper = Reaper::start(store.clone(), Duration::ZERO, Duration::from_millis(10), Some(tx)).unwrap();

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            ReceiverEvent::Reaped(id) => assert_eq!(id, "idle"),
            other => panic!("expected reaped, got {:?}", other),
        }
        reaper.stop();
        assert!(store.is_empty());
    }

    #[test]
    fn test_reaper_stops_promptly_on_drop() {
        let store = Arc::new(ReassemblyStore::new());
        let reaper = Reaper::start(store, Duration::from_secs(180), Duration::from_secs(30), None).unwrap();
        let start = Instant::now();
        drop(reaper);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_handler_can_be_installed_on_transport() {
        use crate::transport::{Destination, LoopbackMesh, MeshConnector};

        let mesh = LoopbackMesh::new();
        let a = mesh.connect("a").unwrap();
        let b = mesh.connect("b").unwrap();
        let (receiver, events) = VoiceReceiver::new(Arc::new(ReassemblyStore::new()));
        b.subscribe(receiver.into_handler());

        let probe = WireMessage::Test { test: "over the air".into() }.to_bytes().unwrap();
        a.send(&probe, &Destination::Broadcast, PortNum::PrivateApp, true).unwrap();

        match events.try_recv().unwrap() {
            ReceiverEvent::TestProbe { from, text } => {
                assert_eq!(from, a.node_id());
                assert_eq!(text, "over the air");
            }
            other => panic!("expected probe, got {:?}", other),
        }
    }
}
