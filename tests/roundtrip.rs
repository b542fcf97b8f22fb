use proptest::prelude::*;
use sdon::prelude::*;
use sdon_strategy::*;

proptest! {
    #![proptest_config(ProptestConfig { cases: 512, ..ProptestConfig::default() })]

    #[test]
    fn json_round_trip(v in arb_value()) {
        let enc = write(&v, EncodeFormat::JSON);
        prop_assert_eq!(read(&enc), v);
    }

    #[test]
    fn cbor_round_trip(v in arb_value()) {
        let enc = write(&v, EncodeFormat::CBOR);
        prop_assert_eq!(read(&enc), v);
    }

    #[test]
    fn compressed_cbor_round_trip(v in arb_value()) {
        let enc = write(&v, EncodeFormat::CBOR_COMPRESSED);
        prop_assert_eq!(read(&enc), v);
    }

    #[test]
    fn canonical_output_is_idempotent(v in arb_value()) {
        // write . read . write is a fixed point for the compact formats
        for fmt in [EncodeFormat::JSON, EncodeFormat::CBOR] {
            let once = write(&v, fmt);
            let again = write(&read(&once), fmt);
            prop_assert_eq!(&once, &again);
        }
    }

    #[test]
    fn streaming_matches_one_shot(v in arb_value()) {
        for fmt in [EncodeFormat::JSON, EncodeFormat::CBOR] {
            let enc = write(&v, fmt);

            let mut dec = StreamingDecoder::new();
            for b in &enc {
                dec.feed(std::slice::from_ref(b));
            }
            prop_assert_eq!(dec.finish(), read(&enc));
        }
    }

    #[test]
    fn compression_frames_round_trip(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        let frame = sdon::compress::compress(&data, Compression::Lz4, false);
        prop_assert_eq!(sdon::compress::decompress(&frame), data);
    }

    #[test]
    fn detection_never_misroutes_encodes(v in arb_value()) {
        prop_assert_eq!(
            detect_data_format(&write(&v, EncodeFormat::CBOR)),
            DataFormat::Cbor
        );
    }
}
