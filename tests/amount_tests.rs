//! Amount formatting, compression and base58 encodings

use cash_consensus::amount::*;
use cash_consensus::base58::*;
use cash_consensus::compressor::*;
use cash_consensus::serialize::Reader;
use cash_consensus::*;
use proptest::prelude::*;

// ============================================================================
// AMOUNT COMPRESSION
// ============================================================================

#[test]
fn test_compress_amount_known_values() {
    let cases: [(i64, u64); 6] = [
        (0, 0x0),
        (1, 0x1),
        (1_000_000, 0x7),
        (100_000_000, 0x9),
        (50 * 100_000_000, 0x32),
        (21_000_000 * 100_000_000, 0x1406f40),
    ];
    for (sat, compressed) in cases {
        assert_eq!(compress_amount(Amount::from_sat(sat)), Some(compressed), "amount {}", sat);
        assert_eq!(decompress_amount(compressed), Amount::from_sat(sat));
    }
}

#[test]
fn test_decompress_then_compress_small_values() {
    for x in 0..100_000u64 {
        assert_eq!(compress_amount(decompress_amount(x)), Some(x));
    }
}

#[test]
fn test_negative_amounts_have_no_compressed_form() {
    for sat in [-1, -MAX_MONEY.to_sat(), i64::MIN] {
        assert_eq!(compress_amount(Amount::from_sat(sat)), None);
    }
    let output = TransactionOutput::new(Amount::from_sat(-1), vec![0x51]);
    let mut bytes = Vec::new();
    assert!(matches!(encode_compressed_output(&mut bytes, &output), Err(ConsensusError::InvalidAmount(_))));
}

proptest! {
    #[test]
    fn prop_amount_compression_round_trip(sat in 0i64..=MAX_MONEY.to_sat()) {
        let amount = Amount::from_sat(sat);
        prop_assert_eq!(compress_amount(amount).map(decompress_amount), Some(amount));
    }

    #[test]
    fn prop_format_parse_round_trip(sat in 0i64..=MAX_MONEY.to_sat()) {
        let amount = Amount::from_sat(sat);
        prop_assert_eq!(parse_money(&format_money(amount)).unwrap(), amount);
    }

    #[test]
    fn prop_compressed_output_round_trip(sat in 0i64..=MAX_MONEY.to_sat(), hash in any::<[u8; 20]>()) {
        let output = TransactionOutput::new(Amount::from_sat(sat), script::p2pkh_script(&hash));
        let mut bytes = Vec::new();
        encode_compressed_output(&mut bytes, &output).unwrap();
        let mut reader = Reader::new(&bytes);
        prop_assert_eq!(decode_compressed_output(&mut reader).unwrap(), output);
        prop_assert!(reader.is_empty());
    }
}

// ============================================================================
// MONEY STRINGS
// ============================================================================

#[test]
fn test_format_money() {
    assert_eq!(format_money(Amount::zero()), "0.00");
    assert_eq!(format_money(COIN), "1.00");
    assert_eq!(format_money(Amount::from_sat(12_345_678)), "0.12345678");
    assert_eq!(format_money(Amount::from_sat(-COIN.to_sat() / 2)), "-0.50");
}

#[test]
fn test_parse_money_rejects_malformed() {
    for input in ["", " ", "1.123456789", "12345678901", "-1", "1e8", "0x10", "1.2.3"] {
        assert!(parse_money(input).is_err(), "input {:?}", input);
    }
    assert_eq!(parse_money(" 12.5 ").unwrap(), Amount::from_sat(1_250_000_000));
    assert_eq!(parse_money(".01").unwrap(), Amount::from_sat(1_000_000));
}

// ============================================================================
// BASE58
// ============================================================================

#[test]
fn test_base58_check_zero_payload() {
    let encoded = encode_base58_check(&[0u8; 21]);
    assert_eq!(encoded, "1111111111111111111114oLvT2");
    assert_eq!(decode_base58_check(&encoded, 21).unwrap(), vec![0u8; 21]);
    assert!(decode_base58_check(&encoded, 20).is_err());
}

#[test]
fn test_base58_check_detects_corruption() {
    let payload = hex::decode("005a1fc5dd9e6f03819fca94a2d89669469667f9a0").unwrap();
    let encoded = encode_base58_check(&payload);
    assert_eq!(decode_base58_check(&encoded, 64).unwrap(), payload);

    let mut corrupted: Vec<char> = encoded.chars().collect();
    let last = corrupted.len() - 1;
    corrupted[last] = if corrupted[last] == '2' { '3' } else { '2' };
    let corrupted: String = corrupted.into_iter().collect();
    assert!(matches!(decode_base58_check(&corrupted, 64), Err(ConsensusError::InvalidBase58(_))));
}

proptest! {
    #[test]
    fn prop_base58_round_trip(data in proptest::collection::vec(any::<u8>(), 0..64)) {
        prop_assert_eq!(decode_base58(&encode_base58(&data), 64).unwrap(), data);
    }
}
