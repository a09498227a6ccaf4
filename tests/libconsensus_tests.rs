//! Standalone verification over serialized transactions

use cash_consensus::hash::hash160;
use cash_consensus::key::Key;
use cash_consensus::libconsensus::{self, ConsensusApiError, ENABLE_SIGHASH_FORKID, VERIFY_ALL};
use cash_consensus::script::*;
use cash_consensus::serialize::Encodable;
use cash_consensus::sighash::signature_hash;
use cash_consensus::*;

/// Two-input spend of P2PKH coins worth 20 000 and 30 000 satoshis
fn signed_two_input_spend() -> (Vec<Vec<u8>>, Vec<i64>, Vec<u8>) {
    let keys = [Key::from_slice(&[0x51; 32], true).unwrap(), Key::from_slice(&[0x52; 32], false).unwrap()];
    let amounts = vec![20_000i64, 30_000];
    let script_pubkeys: Vec<Vec<u8>> = keys.iter().map(|k| p2pkh_script(&hash160(&k.public_key()))).collect();

    let mut tx = Transaction {
        version: 1,
        inputs: (0..2u8)
            .map(|i| TransactionInput { prevout: OutPoint::new([i + 1; 32], 0), script_sig: vec![], sequence: 0xffff_ffff })
            .collect(),
        outputs: vec![TransactionOutput::new(Amount::from_sat(49_000), vec![OP_RETURN])],
        lock_time: 0,
    };

    let mut script_sigs = Vec::new();
    for (i, k) in keys.iter().enumerate() {
        let coin = TransactionOutput::new(Amount::from_sat(amounts[i]), script_pubkeys[i].clone());
        let context = ScriptExecutionContext::new_limited(&tx, i, &coin).unwrap();
        let flags = ScriptFlags::ENABLE_SIGHASH_FORKID;
        let digest = signature_hash(&script_pubkeys[i], &context, SigHashType::all_forkid(), flags, None);
        let mut sig = k.sign_ecdsa(&digest).unwrap();
        sig.push(SigHashType::all_forkid().raw() as u8);
        script_sigs.push(ScriptBuilder::new().push_slice(&sig).push_slice(&k.public_key()).into_bytes());
    }
    for (input, script_sig) in tx.inputs.iter_mut().zip(script_sigs) {
        input.script_sig = script_sig;
    }

    let mut bytes = Vec::new();
    tx.encode(&mut bytes);
    (script_pubkeys, amounts, bytes)
}

#[test]
fn test_each_input_verifies_with_its_amount() {
    let (script_pubkeys, amounts, tx) = signed_two_input_spend();
    let flags = VERIFY_ALL | ENABLE_SIGHASH_FORKID;
    for i in 0..2 {
        assert_eq!(libconsensus::verify_script_with_amount(&script_pubkeys[i], amounts[i], &tx, i, flags), Ok(true));
    }
    // swapped coins do not verify
    assert_eq!(libconsensus::verify_script_with_amount(&script_pubkeys[1], amounts[1], &tx, 0, flags), Ok(false));
    assert_eq!(libconsensus::verify_script_with_amount(&script_pubkeys[0], amounts[1], &tx, 0, flags), Ok(false));
}

#[test]
fn test_forkid_needs_amount() {
    let (script_pubkeys, _, tx) = signed_two_input_spend();
    assert_eq!(
        libconsensus::verify_script(&script_pubkeys[0], &tx, 0, VERIFY_ALL | ENABLE_SIGHASH_FORKID),
        Err(ConsensusApiError::AmountRequired)
    );
}

#[test]
fn test_c_interface_reports_codes() {
    let (script_pubkeys, amounts, tx) = signed_two_input_spend();
    let spk = &script_pubkeys[1];
    let mut err = ConsensusApiError::TxDeserialize;
    let flags = VERIFY_ALL | ENABLE_SIGHASH_FORKID;

    let ok = unsafe {
        libconsensus::cashconsensus_verify_script_with_amount(
            spk.as_ptr(),
            spk.len() as u32,
            amounts[1],
            tx.as_ptr(),
            tx.len() as u32,
            1,
            flags,
            &mut err,
        )
    };
    assert_eq!((ok, err), (1, ConsensusApiError::Ok));

    let ok = unsafe {
        libconsensus::cashconsensus_verify_script_with_amount(
            spk.as_ptr(),
            spk.len() as u32,
            amounts[1],
            tx.as_ptr(),
            tx.len() as u32 - 1,
            1,
            flags,
            &mut err,
        )
    };
    assert_eq!((ok, err), (0, ConsensusApiError::TxDeserialize));

    let ok = unsafe {
        libconsensus::cashconsensus_verify_script(spk.as_ptr(), spk.len() as u32, tx.as_ptr(), tx.len() as u32, 1, 1 << 20, &mut err)
    };
    assert_eq!((ok, err), (0, ConsensusApiError::InvalidFlags));
    assert_eq!(libconsensus::cashconsensus_version(), 1);
}
