#[cfg(test)]
mod decoder_tests {
    use crate::codec::{self, CodecTag, PayloadHeader, PcmFormat, VocoderParams, legacy, vocoder};
    use crate::decoder::PayloadDecoder;
    use crate::error::DecodeError;
    use crate::quality::QualityTier;
    use crate::tests::support::{legacy_payload, voiced_clip};
    use proptest::prelude::*;

    const PCM_8K: PcmFormat = PcmFormat { sample_rate: 8000, channels: 1, sample_width: 2 };

    #[test]
    fn test_legacy_payload_decodes_verbatim() {
        let body: Vec<u8> = (0..200u8).collect();
        let payload = legacy_payload(PCM_8K, &body);

        let clip = PayloadDecoder::new().decode(payload.as_bytes()).unwrap();
        assert_eq!(clip.sample_rate, 8000);
        assert_eq!(clip.channels, 1);
        assert_eq!(clip.sample_width, 2);
        assert_eq!(clip.pcm, body);
        assert_eq!(clip.frame_count(), 100);
    }

    proptest! {
        #[test]
        fn prop_legacy_pcm_length_gives_half_as_many_samples(half in 0usize..4000, seed in any::<u8>()) {
            let body: Vec<u8> = (0..half * 2).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect();
            let clip = PayloadDecoder::new().decode(legacy_payload(PCM_8K, &body).as_bytes()).unwrap();
            prop_assert_eq!(clip.sample_rate, 8000);
            prop_assert_eq!(clip.frame_count(), half);
            prop_assert_eq!(clip.samples_i16().len(), body.len() / 2);
        }
    }

    #[test]
    fn test_empty_payload() {
        assert!(matches!(PayloadDecoder::new().decode(&[]), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_unknown_codec_tag_is_not_guessed_as_legacy() {
        let header = PayloadHeader { pcm: PCM_8K, codec: CodecTag::Unknown("OPUS".to_string()) };
        let framed = codec::frame(&header, &[1, 2, 3, 4]).unwrap();
        match PayloadDecoder::new().decode(&framed) {
            Err(DecodeError::UnsupportedCodec(tag)) => assert_eq!(tag, "OPUS"),
            other => panic!("expected UnsupportedCodec, got {:?}", other),
        }
    }

    #[test]
    fn test_untagged_bytes_that_are_not_zlib_fail_decompression() {
        let result = PayloadDecoder::new().decode(&[0xff, 0x00, 0x12]);
        assert!(matches!(result, Err(DecodeError::Decompression(_))));
    }

    #[test]
    fn test_plain_framed_pcm_without_zlib_is_rejected() {
        // An untagged outer header means legacy, and legacy is always zlib
        let framed = codec::frame(&PayloadHeader::pcm(PCM_8K), &[0; 16]).unwrap();
        assert!(PayloadDecoder::new().decode(&framed).is_err());
    }

    #[test]
    fn test_legacy_stream_with_garbage_header_is_malformed() {
        use flate2::Compression;
        use flate2::write::ZlibEncoder;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[3, b'a', b'b', b'c', 0, 0]).unwrap();
        let payload = encoder.finish().unwrap();

        assert!(matches!(PayloadDecoder::new().decode(&payload), Err(DecodeError::MalformedHeader(_))));
    }

    #[test]
    fn test_legacy_inflation_is_capped() {
        use flate2::Compression;
        use flate2::write::ZlibEncoder;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&codec::frame(&PayloadHeader::pcm(PCM_8K), &[]).unwrap()).unwrap();
        let zeros = vec![0u8; 1 << 20];
        for _ in 0..(legacy::MAX_DECOMPRESSED_BYTES >> 20) {
            encoder.write_all(&zeros).unwrap();
        }
        encoder.write_all(&[0; 16]).unwrap();
        let bomb = encoder.finish().unwrap();
        assert!(bomb.len() < 64 * 1024);

        match PayloadDecoder::new().decode(&bomb) {
            Err(DecodeError::TooLarge(limit)) => assert_eq!(limit, legacy::MAX_DECOMPRESSED_BYTES),
            other => panic!("expected TooLarge, got {:?}", other.map(|c| c.pcm.len())),
        }
    }

    #[test]
    fn test_legacy_payload_just_under_cap_decodes() {
        let body = vec![0u8; legacy::MAX_DECOMPRESSED_BYTES - 64];
        let clip = PayloadDecoder::new().decode(legacy_payload(PCM_8K, &body).as_bytes()).unwrap();
        assert_eq!(clip.pcm.len(), body.len());
    }

    #[test]
    fn test_vocoder_decode_rejects_legacy_payload() {
        let payload = legacy::encode(&voiced_clip(8000, 1, 800), &QualityTier::Low.profile()).unwrap();
        assert!(matches!(vocoder::decode(payload.as_bytes()), Err(DecodeError::NotVocoderPayload)));
    }

    #[test]
    fn test_unsupported_vocoder_bit_rate() {
        let params = VocoderParams { bit_rate: 9999, samples_per_frame: 320, bytes_per_frame: 8 };
        let framed = codec::frame(&PayloadHeader::vocoder(PCM_8K, params), &[0; 16]).unwrap();
        assert!(matches!(PayloadDecoder::new().decode(&framed), Err(DecodeError::UnsupportedBitRate(9999))));
    }

    #[test]
    fn test_invalid_base64_text() {
        assert!(matches!(PayloadDecoder::new().decode_base64("not*base64!"), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn test_decode_base64_returns_payload_and_clip() {
        let payload = legacy_payload(PCM_8K, &[1, 0, 2, 0]);
        let (restored, clip) = PayloadDecoder::new().decode_base64(&payload.to_base64()).unwrap();
        assert_eq!(restored, payload);
        assert_eq!(clip.samples_i16(), vec![1, 2]);
    }

    #[cfg(feature = "vocoder")]
    #[test]
    fn test_vocoder_payload_dispatch() {
        let payload = vocoder::encode(&voiced_clip(8000, 1, 3200), &QualityTier::UltraLow.profile()).unwrap();
        let clip = PayloadDecoder::new().decode(payload.as_bytes()).unwrap();
        assert_eq!(clip.sample_rate, 8000);
        assert_eq!(clip.sample_width, 2);
        assert_eq!(clip.frame_count(), 3200);
    }

    #[cfg(feature = "vocoder")]
    #[test]
    fn test_vocoder_short_trailing_frame_is_discarded() {
        let payload = vocoder::encode(&voiced_clip(8000, 1, 3200), &QualityTier::Low.profile()).unwrap();
        let mut bytes = payload.into_bytes();
        bytes.extend_from_slice(&[0xAA, 0xBB, 0xCC]);

        let clip = PayloadDecoder::new().decode(&bytes).unwrap();
        assert_eq!(clip.frame_count(), 3200);
    }

    #[cfg(feature = "vocoder")]
    #[test]
    fn test_vocoder_geometry_mismatch_is_malformed() {
        let params = VocoderParams { bit_rate: 1600, samples_per_frame: 160, bytes_per_frame: 8 };
        let framed = codec::frame(&PayloadHeader::vocoder(PCM_8K, params), &[0; 16]).unwrap();
        assert!(matches!(PayloadDecoder::new().decode(&framed), Err(DecodeError::MalformedHeader(_))));
    }

    #[cfg(not(feature = "vocoder"))]
    #[test]
    fn test_vocoder_payload_without_codec() {
        use crate::codec::EncodedPayload;

        let params = VocoderParams { bit_rate: 1600, samples_per_frame: 320, bytes_per_frame: 8 };
        let framed = codec::frame(&PayloadHeader::vocoder(PCM_8K, params), &[0; 16]).unwrap();
        let payload = EncodedPayload::new(framed);
        assert!(matches!(PayloadDecoder::new().decode(payload.as_bytes()), Err(DecodeError::CodecUnavailable)));
    }
}
