//! Script interpreter: EvalScript and VerifyScript

use crate::checker::SignatureChecker;
use crate::constants::*;
use crate::hash::{hash160, ripemd160, sha1, sha256, sha256d};
use crate::script::*;
use crate::script_error::ScriptError;
use crate::script_flags::ScriptFlags;
use crate::script_num::{cast_to_bool, is_minimally_encoded, minimally_encode, ScriptNum};
use crate::sigencoding::*;
use crate::sighash::get_hash_type;
use crate::types::TransactionOutput;

/// A stack element
pub type StackElement = Vec<u8>;

/// The main and alt stacks share this shape
pub type Stack = Vec<StackElement>;

/// Counters accumulated while a script runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptExecutionMetrics {
    /// Signature checks actually performed (null signatures are free)
    pub sig_checks: usize,
}

/// Nesting of IF/NOTIF/ELSE branches.
///
/// Only the stack depth and the position of the first false entry matter,
/// so ELSE and ENDIF run in constant time.
#[derive(Debug, Default)]
struct ConditionStack {
    size: usize,
    first_false: Option<usize>,
}

impl ConditionStack {
    fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn all_true(&self) -> bool {
        self.first_false.is_none()
    }

    fn push(&mut self, value: bool) {
        if self.first_false.is_none() && !value {
            self.first_false = Some(self.size);
        }
        self.size += 1;
    }

    fn pop(&mut self) {
        self.size -= 1;
        if self.first_false == Some(self.size) {
            self.first_false = None;
        }
    }

    fn toggle_top(&mut self) {
        let top = self.size - 1;
        match self.first_false {
            None => self.first_false = Some(top),
            Some(position) if position == top => self.first_false = None,
            // an earlier false entry keeps this branch dead either way
            Some(_) => {}
        }
    }
}

/// Opcodes that fail even inside an unexecuted branch
fn is_opcode_disabled(opcode: u8, flags: ScriptFlags) -> bool {
    match opcode {
        OP_INVERT | OP_2MUL | OP_2DIV | OP_LSHIFT | OP_RSHIFT => true,
        OP_MUL => !flags.contains(ScriptFlags::INTEGERS_64_BIT),
        _ => false,
    }
}

fn bool_element(value: bool) -> StackElement {
    if value {
        vec![1]
    } else {
        Vec::new()
    }
}

/// Remove the signature from the script code of a pre-FORKID signature
fn cleanup_script_code(script_code: &mut Vec<u8>, sig: &[u8], flags: ScriptFlags) {
    if !flags.contains(ScriptFlags::ENABLE_SIGHASH_FORKID) || !get_hash_type(sig).has_fork_id() {
        find_and_delete(script_code, &ScriptBuilder::new().push_slice(sig).into_bytes());
    }
}

/// Decode the Schnorr multisig dummy element into a key bitfield
fn decode_bitfield(dummy: &[u8], size: usize) -> Result<u32, ScriptError> {
    if size > 32 {
        return Err(ScriptError::InvalidBitfieldSize);
    }
    let bitfield_size = (size + 7) / 8;
    if dummy.len() != bitfield_size {
        return Err(ScriptError::InvalidBitfieldSize);
    }
    let bitfield = dummy
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, &byte)| acc | (u64::from(byte) << (8 * i)));
    let mask = (1u64 << size) - 1;
    if bitfield & mask != bitfield {
        return Err(ScriptError::InvalidBitRange);
    }
    Ok(bitfield as u32)
}

/// Interpreter state for one EvalScript call
struct Machine<'a, C: SignatureChecker + ?Sized> {
    stack: &'a mut Stack,
    altstack: Stack,
    exec: ConditionStack,
    script: &'a [u8],
    /// Start of the script code, moved past each executed OP_CODESEPARATOR
    code_start: usize,
    op_count: usize,
    flags: ScriptFlags,
    checker: &'a C,
    metrics: &'a mut ScriptExecutionMetrics,
    require_minimal: bool,
    integers_64_bit: bool,
    max_num_size: usize,
}

impl<'a, C: SignatureChecker + ?Sized> Machine<'a, C> {
    // ============================================================================
    // STACK HELPERS
    // ============================================================================

    fn require(&self, depth: usize) -> Result<(), ScriptError> {
        if self.stack.len() < depth {
            return Err(ScriptError::InvalidStackOperation);
        }
        Ok(())
    }

    /// Element `depth` places from the top (1 is the top); caller checks depth
    fn top(&self, depth: usize) -> &StackElement {
        &self.stack[self.stack.len() - depth]
    }

    fn top_mut(&mut self) -> Result<&mut StackElement, ScriptError> {
        self.stack.last_mut().ok_or(ScriptError::InvalidStackOperation)
    }

    fn pop(&mut self) -> Result<StackElement, ScriptError> {
        self.stack.pop().ok_or(ScriptError::InvalidStackOperation)
    }

    fn drop_n(&mut self, count: usize) {
        let len = self.stack.len().saturating_sub(count);
        self.stack.truncate(len);
    }

    fn push_num(&mut self, value: i64) {
        self.stack.push(ScriptNum::new(value).to_bytes());
    }

    fn num(&self, bytes: &[u8]) -> Result<ScriptNum, ScriptError> {
        ScriptNum::decode(bytes, self.require_minimal, self.max_num_size, self.integers_64_bit)
    }

    fn range_error(&self) -> ScriptError {
        if self.integers_64_bit {
            ScriptError::InvalidNumberRange64Bit
        } else {
            ScriptError::InvalidNumberRange
        }
    }

    fn script_code(&self) -> Vec<u8> {
        self.script[self.code_start..].to_vec()
    }

    // ============================================================================
    // DISPATCH
    // ============================================================================

    fn step(&mut self, opcode: u8, data: &[u8], end: usize) -> Result<(), ScriptError> {
        let executing = self.exec.all_true();

        if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(ScriptError::PushSize);
        }

        // Push values are not counted towards the operation limit
        if opcode > OP_16 {
            self.op_count += 1;
            if self.op_count > MAX_OPS_PER_SCRIPT {
                return Err(ScriptError::OpCount);
            }
        }

        if is_opcode_disabled(opcode, self.flags) {
            return Err(ScriptError::DisabledOpcode);
        }

        if executing && opcode <= OP_PUSHDATA4 {
            if self.require_minimal && !check_minimal_push(data, opcode) {
                return Err(ScriptError::MinimalData);
            }
            self.stack.push(data.to_vec());
            return Ok(());
        }

        if executing || (OP_IF..=OP_ENDIF).contains(&opcode) {
            self.execute(opcode, end, executing)?;
        }
        Ok(())
    }

    fn execute(&mut self, opcode: u8, end: usize, executing: bool) -> Result<(), ScriptError> {
        match opcode {
            OP_1NEGATE | OP_1..=OP_16 => {
                self.push_num(i64::from(opcode) - i64::from(OP_1 - 1));
            }

            // Control
            OP_NOP => {}
            OP_CHECKLOCKTIMEVERIFY => self.op_check_lock_time_verify()?,
            OP_CHECKSEQUENCEVERIFY => self.op_check_sequence_verify()?,
            OP_NOP1 | OP_NOP4..=OP_NOP10 => {
                if self.flags.contains(ScriptFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                    return Err(ScriptError::DiscourageUpgradableNops);
                }
            }
            OP_IF | OP_NOTIF => {
                let mut value = false;
                if executing {
                    let condition = self.stack.last().ok_or(ScriptError::UnbalancedConditional)?;
                    if self.flags.contains(ScriptFlags::MINIMALIF)
                        && (condition.len() > 1 || (condition.len() == 1 && condition[0] != 1))
                    {
                        return Err(ScriptError::MinimalIf);
                    }
                    value = cast_to_bool(condition);
                    if opcode == OP_NOTIF {
                        value = !value;
                    }
                    self.pop()?;
                }
                self.exec.push(value);
            }
            OP_ELSE => {
                if self.exec.is_empty() {
                    return Err(ScriptError::UnbalancedConditional);
                }
                self.exec.toggle_top();
            }
            OP_ENDIF => {
                if self.exec.is_empty() {
                    return Err(ScriptError::UnbalancedConditional);
                }
                self.exec.pop();
            }
            OP_VERIFY => {
                self.require(1)?;
                if !cast_to_bool(self.top(1)) {
                    return Err(ScriptError::Verify);
                }
                self.pop()?;
            }
            OP_RETURN => return Err(ScriptError::OpReturn),

            OP_TOALTSTACK..=OP_TUCK => self.op_stack(opcode)?,

            // Splice
            OP_CAT => {
                self.require(2)?;
                if self.top(2).len() + self.top(1).len() > MAX_SCRIPT_ELEMENT_SIZE {
                    return Err(ScriptError::PushSize);
                }
                let tail = self.pop()?;
                self.top_mut()?.extend_from_slice(&tail);
            }
            OP_SPLIT => {
                self.require(2)?;
                let position = self.num(self.top(1))?.value();
                if position < 0 || position as usize > self.top(2).len() {
                    return Err(ScriptError::InvalidSplitRange);
                }
                self.pop()?;
                let tail = self.top_mut()?.split_off(position as usize);
                self.stack.push(tail);
            }
            OP_NUM2BIN => {
                self.require(2)?;
                let size = self.num(self.top(1))?.value();
                if size < 0 || size as usize > MAX_SCRIPT_ELEMENT_SIZE {
                    return Err(ScriptError::PushSize);
                }
                let size = size as usize;
                self.pop()?;
                let raw = self.top_mut()?;
                minimally_encode(raw);
                if raw.len() > size {
                    return Err(ScriptError::ImpossibleEncoding);
                }
                if raw.len() < size {
                    let sign_bit = match raw.last_mut() {
                        Some(last) => {
                            let bit = *last & 0x80;
                            *last &= 0x7f;
                            bit
                        }
                        None => 0,
                    };
                    raw.resize(size - 1, 0);
                    raw.push(sign_bit);
                }
            }
            OP_BIN2NUM => {
                let max_num_size = self.max_num_size;
                let range_error = self.range_error();
                let element = self.top_mut()?;
                minimally_encode(element);
                if !is_minimally_encoded(element, max_num_size) {
                    return Err(range_error);
                }
            }
            OP_SIZE => {
                self.require(1)?;
                let size = self.top(1).len();
                self.push_num(size as i64);
            }
            OP_REVERSEBYTES => self.top_mut()?.reverse(),

            // Bitwise logic
            OP_AND | OP_OR | OP_XOR => {
                self.require(2)?;
                if self.top(2).len() != self.top(1).len() {
                    return Err(ScriptError::InvalidOperandSize);
                }
                let operand = self.pop()?;
                let target = self.top_mut()?;
                for (a, b) in target.iter_mut().zip(operand) {
                    match opcode {
                        OP_AND => *a &= b,
                        OP_OR => *a |= b,
                        _ => *a ^= b,
                    }
                }
            }
            OP_EQUAL | OP_EQUALVERIFY => {
                self.require(2)?;
                let equal = self.top(2) == self.top(1);
                self.drop_n(2);
                if opcode == OP_EQUALVERIFY {
                    if !equal {
                        return Err(ScriptError::EqualVerify);
                    }
                } else {
                    self.stack.push(bool_element(equal));
                }
            }

            OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => self.op_unary_numeric(opcode)?,
            OP_ADD..=OP_MAX => self.op_binary_numeric(opcode)?,
            OP_WITHIN => {
                self.require(3)?;
                let x = self.num(self.top(3))?;
                let min = self.num(self.top(2))?;
                let max = self.num(self.top(1))?;
                self.drop_n(3);
                self.stack.push(bool_element(min <= x && x < max));
            }

            // Crypto
            OP_RIPEMD160 | OP_SHA1 | OP_SHA256 | OP_HASH160 | OP_HASH256 => {
                let element = self.pop()?;
                let digest = match opcode {
                    OP_RIPEMD160 => ripemd160(&element).to_vec(),
                    OP_SHA1 => sha1(&element).to_vec(),
                    OP_SHA256 => sha256(&element).to_vec(),
                    OP_HASH160 => hash160(&element).to_vec(),
                    _ => sha256d(&element).to_vec(),
                };
                self.stack.push(digest);
            }
            OP_CODESEPARATOR => self.code_start = end,
            OP_CHECKSIG | OP_CHECKSIGVERIFY => self.op_check_sig(opcode)?,
            OP_CHECKDATASIG | OP_CHECKDATASIGVERIFY => self.op_check_data_sig(opcode)?,
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => self.op_check_multisig(opcode)?,

            // Introspection
            OP_INPUTINDEX..=OP_OUTPUTBYTECODE => {
                if !self.flags.contains(ScriptFlags::NATIVE_INTROSPECTION) {
                    return Err(ScriptError::BadOpcode);
                }
                self.op_introspection(opcode)?;
            }
            OP_UTXOTOKENCATEGORY..=OP_OUTPUTTOKENAMOUNT => {
                if !self.flags.contains(ScriptFlags::NATIVE_INTROSPECTION)
                    || !self.flags.contains(ScriptFlags::ENABLE_TOKENS)
                {
                    return Err(ScriptError::BadOpcode);
                }
                self.op_token_introspection(opcode)?;
            }

            _ => return Err(ScriptError::BadOpcode),
        }
        Ok(())
    }

    // ============================================================================
    // LOCK TIME
    // ============================================================================

    /// Lock time operand: 5 bytes so values past 2^31 can be expressed
    fn lock_time_operand(&self) -> Result<i64, ScriptError> {
        self.require(1)?;
        let value = ScriptNum::decode(
            self.top(1),
            self.require_minimal,
            LOCKTIME_SCRIPTNUM_SIZE,
            self.integers_64_bit,
        )?
        .value();
        if value < 0 {
            return Err(ScriptError::NegativeLocktime);
        }
        Ok(value)
    }

    fn op_check_lock_time_verify(&mut self) -> Result<(), ScriptError> {
        if !self.flags.contains(ScriptFlags::CHECKLOCKTIMEVERIFY) {
            if self.flags.contains(ScriptFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                return Err(ScriptError::DiscourageUpgradableNops);
            }
            return Ok(());
        }
        let lock_time = self.lock_time_operand()?;
        if !self.checker.check_lock_time(lock_time) {
            return Err(ScriptError::UnsatisfiedLocktime);
        }
        Ok(())
    }

    fn op_check_sequence_verify(&mut self) -> Result<(), ScriptError> {
        if !self.flags.contains(ScriptFlags::CHECKSEQUENCEVERIFY) {
            if self.flags.contains(ScriptFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                return Err(ScriptError::DiscourageUpgradableNops);
            }
            return Ok(());
        }
        let sequence = self.lock_time_operand()?;
        // Disabled relative lock times behave as a NOP
        if sequence & i64::from(SEQUENCE_LOCKTIME_DISABLE_FLAG) != 0 {
            return Ok(());
        }
        if !self.checker.check_sequence(sequence) {
            return Err(ScriptError::UnsatisfiedLocktime);
        }
        Ok(())
    }

    // ============================================================================
    // STACK OPERATIONS
    // ============================================================================

    fn op_stack(&mut self, opcode: u8) -> Result<(), ScriptError> {
        let len = self.stack.len();
        match opcode {
            OP_TOALTSTACK => {
                let element = self.pop()?;
                self.altstack.push(element);
            }
            OP_FROMALTSTACK => {
                let element = self.altstack.pop().ok_or(ScriptError::InvalidAltstackOperation)?;
                self.stack.push(element);
            }
            OP_2DROP => {
                self.require(2)?;
                self.drop_n(2);
            }
            OP_2DUP => {
                self.require(2)?;
                self.stack.extend_from_within(len - 2..);
            }
            OP_3DUP => {
                self.require(3)?;
                self.stack.extend_from_within(len - 3..);
            }
            OP_2OVER => {
                self.require(4)?;
                self.stack.extend_from_within(len - 4..len - 2);
            }
            OP_2ROT => {
                self.require(6)?;
                let moved: Vec<StackElement> = self.stack.drain(len - 6..len - 4).collect();
                self.stack.extend(moved);
            }
            OP_2SWAP => {
                self.require(4)?;
                self.stack.swap(len - 4, len - 2);
                self.stack.swap(len - 3, len - 1);
            }
            OP_IFDUP => {
                self.require(1)?;
                if cast_to_bool(self.top(1)) {
                    let top = self.top(1).clone();
                    self.stack.push(top);
                }
            }
            OP_DEPTH => self.push_num(len as i64),
            OP_DROP => {
                self.pop()?;
            }
            OP_DUP => {
                self.require(1)?;
                let top = self.top(1).clone();
                self.stack.push(top);
            }
            OP_NIP => {
                self.require(2)?;
                self.stack.remove(len - 2);
            }
            OP_OVER => {
                self.require(2)?;
                let second = self.top(2).clone();
                self.stack.push(second);
            }
            OP_PICK | OP_ROLL => {
                self.require(2)?;
                let n = self.num(self.top(1))?.value();
                self.pop()?;
                if n < 0 || n as usize >= self.stack.len() {
                    return Err(ScriptError::InvalidStackOperation);
                }
                let index = self.stack.len() - 1 - n as usize;
                let element = if opcode == OP_PICK {
                    self.stack[index].clone()
                } else {
                    self.stack.remove(index)
                };
                self.stack.push(element);
            }
            OP_ROT => {
                // (x1 x2 x3 -- x2 x3 x1)
                self.require(3)?;
                self.stack.swap(len - 3, len - 2);
                self.stack.swap(len - 2, len - 1);
            }
            OP_SWAP => {
                self.require(2)?;
                self.stack.swap(len - 2, len - 1);
            }
            OP_TUCK => {
                // (x1 x2 -- x2 x1 x2)
                self.require(2)?;
                let top = self.top(1).clone();
                self.stack.insert(len - 2, top);
            }
            _ => return Err(ScriptError::BadOpcode),
        }
        Ok(())
    }

    // ============================================================================
    // ARITHMETIC
    // ============================================================================

    fn op_unary_numeric(&mut self, opcode: u8) -> Result<(), ScriptError> {
        self.require(1)?;
        let n = self.num(self.top(1))?;
        let one = ScriptNum::new(1);
        let result = match opcode {
            OP_1ADD => n.checked_add(one).ok_or(ScriptError::InvalidNumberRange64Bit)?.value(),
            OP_1SUB => n.checked_sub(one).ok_or(ScriptError::InvalidNumberRange64Bit)?.value(),
            OP_NEGATE => -n.value(),
            OP_ABS => n.value().abs(),
            OP_NOT => i64::from(n.value() == 0),
            _ => i64::from(n.value() != 0),
        };
        self.pop()?;
        self.push_num(result);
        Ok(())
    }

    fn op_binary_numeric(&mut self, opcode: u8) -> Result<(), ScriptError> {
        self.require(2)?;
        let a = self.num(self.top(2))?;
        let b = self.num(self.top(1))?;
        let overflow = ScriptError::InvalidNumberRange64Bit;
        let result = match opcode {
            OP_ADD => a.checked_add(b).ok_or(overflow)?.value(),
            OP_SUB => a.checked_sub(b).ok_or(overflow)?.value(),
            OP_MUL => a.checked_mul(b).ok_or(overflow)?.value(),
            OP_DIV => {
                if b.value() == 0 {
                    return Err(ScriptError::DivByZero);
                }
                a.value() / b.value()
            }
            OP_MOD => {
                if b.value() == 0 {
                    return Err(ScriptError::ModByZero);
                }
                a.value() % b.value()
            }
            OP_BOOLAND => i64::from(a.value() != 0 && b.value() != 0),
            OP_BOOLOR => i64::from(a.value() != 0 || b.value() != 0),
            OP_NUMEQUAL | OP_NUMEQUALVERIFY => i64::from(a == b),
            OP_NUMNOTEQUAL => i64::from(a != b),
            OP_LESSTHAN => i64::from(a < b),
            OP_GREATERTHAN => i64::from(a > b),
            OP_LESSTHANOREQUAL => i64::from(a <= b),
            OP_GREATERTHANOREQUAL => i64::from(a >= b),
            OP_MIN => a.min(b).value(),
            OP_MAX => a.max(b).value(),
            _ => return Err(ScriptError::BadOpcode),
        };
        self.drop_n(2);
        if opcode == OP_NUMEQUALVERIFY {
            if result == 0 {
                return Err(ScriptError::NumEqualVerify);
            }
        } else {
            self.push_num(result);
        }
        Ok(())
    }

    // ============================================================================
    // SIGNATURES
    // ============================================================================

    fn op_check_sig(&mut self, opcode: u8) -> Result<(), ScriptError> {
        self.require(2)?;
        let sig = self.top(2).clone();
        let pubkey = self.top(1).clone();
        check_transaction_signature_encoding(&sig, self.flags)?;
        check_pubkey_encoding(&pubkey, self.flags)?;

        let mut success = false;
        if !sig.is_empty() {
            let mut script_code = self.script_code();
            cleanup_script_code(&mut script_code, &sig, self.flags);
            success = self.checker.check_sig(&sig, &pubkey, &script_code, self.flags);
            self.metrics.sig_checks += 1;
            if !success && self.flags.contains(ScriptFlags::NULLFAIL) {
                return Err(ScriptError::SigNullFail);
            }
        }

        self.drop_n(2);
        if opcode == OP_CHECKSIGVERIFY {
            if !success {
                return Err(ScriptError::CheckSigVerify);
            }
        } else {
            self.stack.push(bool_element(success));
        }
        Ok(())
    }

    fn op_check_data_sig(&mut self, opcode: u8) -> Result<(), ScriptError> {
        self.require(3)?;
        let sig = self.top(3);
        let message = self.top(2);
        let pubkey = self.top(1);
        check_data_signature_encoding(sig, self.flags)?;
        check_pubkey_encoding(pubkey, self.flags)?;

        let mut success = false;
        if !sig.is_empty() {
            let digest = sha256(message);
            success = self.checker.verify_signature(sig, pubkey, &digest);
            self.metrics.sig_checks += 1;
            if !success && self.flags.contains(ScriptFlags::NULLFAIL) {
                return Err(ScriptError::SigNullFail);
            }
        }

        self.drop_n(3);
        if opcode == OP_CHECKDATASIGVERIFY {
            if !success {
                return Err(ScriptError::CheckDataSigVerify);
            }
        } else {
            self.stack.push(bool_element(success));
        }
        Ok(())
    }

    /// CHECKMULTISIG: [dummy] [sig_1 .. sig_m] m [key_1 .. key_n] n
    ///
    /// 1. 0 ≤ n ≤ 20, op_count += n
    /// 2. 0 ≤ m ≤ n
    /// 3. Non-empty dummy with Schnorr multisig enabled: the dummy is a
    ///    bitfield selecting which keys the m Schnorr signatures belong to,
    ///    every signature must verify
    /// 4. Otherwise legacy ECDSA matching in order, one key per attempt
    fn op_check_multisig(&mut self, opcode: u8) -> Result<(), ScriptError> {
        const KEY_COUNT_DEPTH: usize = 1;
        self.require(KEY_COUNT_DEPTH)?;

        let key_count = self.num(self.top(KEY_COUNT_DEPTH))?.value();
        if key_count < 0 || key_count as usize > MAX_PUBKEYS_PER_MULTISIG {
            return Err(ScriptError::PubkeyCount);
        }
        let key_count = key_count as usize;
        self.op_count += key_count;
        if self.op_count > MAX_OPS_PER_SCRIPT {
            return Err(ScriptError::OpCount);
        }

        let top_key = KEY_COUNT_DEPTH + 1;
        let sig_count_depth = top_key + key_count;
        self.require(sig_count_depth)?;
        let sig_count = self.num(self.top(sig_count_depth))?.value();
        if sig_count < 0 || sig_count as usize > key_count {
            return Err(ScriptError::SigCount);
        }
        let sig_count = sig_count as usize;

        let top_sig = sig_count_depth + 1;
        let dummy_depth = top_sig + sig_count;
        self.require(dummy_depth)?;

        let script_code = self.script_code();
        let success = if self.flags.contains(ScriptFlags::ENABLE_SCHNORR_MULTISIG)
            && !self.top(dummy_depth).is_empty()
        {
            self.schnorr_multisig(script_code, key_count, sig_count, top_key, top_sig, dummy_depth)?
        } else {
            self.legacy_multisig(script_code, key_count, sig_count, top_key, top_sig)?
        };

        self.drop_n(dummy_depth);
        if opcode == OP_CHECKMULTISIGVERIFY {
            if !success {
                return Err(ScriptError::CheckMultisigVerify);
            }
        } else {
            self.stack.push(bool_element(success));
        }
        Ok(())
    }

    fn schnorr_multisig(
        &mut self,
        script_code: Vec<u8>,
        key_count: usize,
        sig_count: usize,
        top_key: usize,
        top_sig: usize,
        dummy_depth: usize,
    ) -> Result<bool, ScriptError> {
        let check_bits = decode_bitfield(self.top(dummy_depth), key_count)?;
        if check_bits.count_ones() as usize != sig_count {
            return Err(ScriptError::InvalidBitCount);
        }

        // Keys and signatures are consumed bottom-up
        let bottom_key = top_key + key_count - 1;
        let bottom_sig = top_sig + sig_count - 1;
        let mut key_index = 0usize;
        for sig_index in 0..sig_count {
            if u64::from(check_bits) >> key_index == 0 {
                return Err(ScriptError::InvalidBitRange);
            }
            while (u64::from(check_bits) >> key_index) & 1 == 0 {
                key_index += 1;
            }
            if key_index >= key_count {
                return Err(ScriptError::InvalidBitRange);
            }

            let sig = self.top(bottom_sig - sig_index);
            let pubkey = self.top(bottom_key - key_index);
            check_transaction_schnorr_signature_encoding(sig, self.flags)?;
            check_pubkey_encoding(pubkey, self.flags)?;
            if !self.checker.check_sig(sig, pubkey, &script_code, self.flags) {
                return Err(ScriptError::SigNullFail);
            }
            self.metrics.sig_checks += 1;
            key_index += 1;
        }

        if u64::from(check_bits) >> key_index != 0 {
            return Err(ScriptError::InvalidBitCount);
        }
        Ok(true)
    }

    fn legacy_multisig(
        &mut self,
        mut script_code: Vec<u8>,
        key_count: usize,
        sig_count: usize,
        top_key: usize,
        top_sig: usize,
    ) -> Result<bool, ScriptError> {
        for i in 0..sig_count {
            let sig = self.top(top_sig + i).clone();
            cleanup_script_code(&mut script_code, &sig, self.flags);
        }

        let mut success = true;
        let mut sigs_remaining = sig_count;
        let mut keys_remaining = key_count;
        while success && sigs_remaining > 0 {
            let sig = self.top(top_sig + (sig_count - sigs_remaining));
            let pubkey = self.top(top_key + (key_count - keys_remaining));
            check_transaction_ecdsa_signature_encoding(sig, self.flags)?;
            check_pubkey_encoding(pubkey, self.flags)?;

            if self.checker.check_sig(sig, pubkey, &script_code, self.flags) {
                sigs_remaining -= 1;
            }
            keys_remaining -= 1;

            // Fewer keys than signatures left: cannot succeed
            if sigs_remaining > keys_remaining {
                success = false;
            }
        }

        let all_null = (0..sig_count).all(|i| self.top(top_sig + i).is_empty());
        if !success && self.flags.contains(ScriptFlags::NULLFAIL) && !all_null {
            return Err(ScriptError::SigNullFail);
        }
        if !all_null {
            self.metrics.sig_checks += key_count;
        }
        Ok(success)
    }

    // ============================================================================
    // INTROSPECTION
    // ============================================================================

    fn pop_index(&mut self) -> Result<i64, ScriptError> {
        self.require(1)?;
        let index = self.num(self.top(1))?.value();
        self.pop()?;
        Ok(index)
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), ScriptError> {
        if bytes.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(ScriptError::PushSize);
        }
        self.stack.push(bytes.to_vec());
        Ok(())
    }

    fn op_introspection(&mut self, opcode: u8) -> Result<(), ScriptError> {
        let checker = self.checker;
        let context = *checker.context().ok_or(ScriptError::ContextNotPresent)?;
        let tx = context.tx();

        match opcode {
            OP_INPUTINDEX => self.push_num(context.input_index() as i64),
            OP_ACTIVEBYTECODE => {
                let code = self.script_code();
                self.push_bytes(&code)?;
            }
            OP_TXVERSION => self.push_num(i64::from(tx.version)),
            OP_TXINPUTCOUNT => self.push_num(tx.inputs.len() as i64),
            OP_TXOUTPUTCOUNT => self.push_num(tx.outputs.len() as i64),
            OP_TXLOCKTIME => self.push_num(i64::from(tx.lock_time)),

            OP_UTXOVALUE | OP_UTXOBYTECODE | OP_OUTPOINTTXHASH | OP_OUTPOINTINDEX | OP_INPUTBYTECODE
            | OP_INPUTSEQUENCENUMBER => {
                let index = self.pop_index()?;
                if index < 0 || index as usize >= tx.inputs.len() {
                    return Err(ScriptError::InvalidTxInputIndex);
                }
                let index = index as usize;
                let input = &tx.inputs[index];
                match opcode {
                    OP_UTXOVALUE => self.push_num(context.coin(index)?.value.to_sat()),
                    OP_UTXOBYTECODE => self.push_bytes(&context.coin(index)?.script_pubkey)?,
                    OP_OUTPOINTTXHASH => self.stack.push(input.prevout.hash.to_vec()),
                    OP_OUTPOINTINDEX => self.push_num(i64::from(input.prevout.index)),
                    OP_INPUTBYTECODE => self.push_bytes(context.script_sig(index)?)?,
                    _ => self.push_num(i64::from(input.sequence)),
                }
            }

            OP_OUTPUTVALUE | OP_OUTPUTBYTECODE => {
                let index = self.pop_index()?;
                if index < 0 || index as usize >= tx.outputs.len() {
                    return Err(ScriptError::InvalidTxOutputIndex);
                }
                let output = &tx.outputs[index as usize];
                if opcode == OP_OUTPUTVALUE {
                    self.push_num(output.value.to_sat());
                } else {
                    self.push_bytes(&output.script_pubkey)?;
                }
            }
            _ => return Err(ScriptError::BadOpcode),
        }
        Ok(())
    }

    fn op_token_introspection(&mut self, opcode: u8) -> Result<(), ScriptError> {
        let checker = self.checker;
        let context = *checker.context().ok_or(ScriptError::ContextNotPresent)?;
        let tx = context.tx();
        let index = self.pop_index()?;

        let output: &TransactionOutput = match opcode {
            OP_UTXOTOKENCATEGORY | OP_UTXOTOKENCOMMITMENT | OP_UTXOTOKENAMOUNT => {
                if index < 0 || index as usize >= tx.inputs.len() {
                    return Err(ScriptError::InvalidTxInputIndex);
                }
                context.coin(index as usize)?
            }
            _ => {
                if index < 0 || index as usize >= tx.outputs.len() {
                    return Err(ScriptError::InvalidTxOutputIndex);
                }
                &tx.outputs[index as usize]
            }
        };
        let token = output.token_data.as_ref();

        match opcode {
            OP_UTXOTOKENCATEGORY | OP_OUTPUTTOKENCATEGORY => {
                let mut category = Vec::new();
                if let Some(token) = token {
                    category.extend_from_slice(&token.category);
                    if let Some(nft) = &token.nft {
                        if nft.capability != crate::types::Capability::None {
                            category.push(nft.capability as u8);
                        }
                    }
                }
                self.stack.push(category);
            }
            OP_UTXOTOKENCOMMITMENT | OP_OUTPUTTOKENCOMMITMENT => {
                let commitment = token.map(|t| t.commitment().to_vec()).unwrap_or_default();
                self.stack.push(commitment);
            }
            _ => self.push_num(token.map_or(0, |t| t.amount)),
        }
        Ok(())
    }
}

/// EvalScript: 𝒮𝒞 × 𝒮𝒯 × ℱ → 𝒮𝒯 ∪ {error}
///
/// Runs `script` against `stack`, leaving the resulting stack in place:
/// 1. |script| > 10000: SCRIPT_SIZE
/// 2. For each instruction, including those in unexecuted branches:
///    - push larger than 520 bytes: PUSH_SIZE
///    - more than 201 non-push opcodes (multisig keys included): OP_COUNT
///    - disabled opcode: DISABLED_OPCODE
///    - execute when every enclosing branch is taken (IF/ELSE/ENDIF always)
///    - |stack| + |altstack| > 1000: STACK_SIZE
/// 3. Open branches at the end: UNBALANCED_CONDITIONAL
pub fn eval_script<C: SignatureChecker + ?Sized>(
    stack: &mut Stack,
    script: &[u8],
    flags: ScriptFlags,
    checker: &C,
    metrics: &mut ScriptExecutionMetrics,
) -> Result<(), ScriptError> {
    if script.len() > MAX_SCRIPT_SIZE {
        return Err(ScriptError::ScriptSize);
    }

    let integers_64_bit = flags.contains(ScriptFlags::INTEGERS_64_BIT);
    let mut machine = Machine {
        stack,
        altstack: Vec::new(),
        exec: ConditionStack::default(),
        script,
        code_start: 0,
        op_count: 0,
        flags,
        checker,
        metrics,
        require_minimal: flags.contains(ScriptFlags::MINIMALDATA),
        integers_64_bit,
        max_num_size: if integers_64_bit { MAX_SCRIPTNUM_SIZE_64 } else { MAX_SCRIPTNUM_SIZE_32 },
    };

    for instruction in instructions(script) {
        let instruction = instruction?;
        machine.step(instruction.opcode, instruction.data, instruction.end)?;
        if machine.stack.len() + machine.altstack.len() > MAX_STACK_SIZE {
            return Err(ScriptError::StackSize);
        }
    }

    if !machine.exec.is_empty() {
        return Err(ScriptError::UnbalancedConditional);
    }
    Ok(())
}

/// VerifyScript: 𝒮𝒞 × 𝒮𝒞 × ℱ → {valid, error}
///
/// For scriptSig ss, scriptPubKey spk and flags f:
/// 1. FORKID ∈ f implies STRICTENC
/// 2. SIGPUSHONLY ∈ f requires ss push-only
/// 3. S ← EvalScript(ss, ∅); S ← EvalScript(spk, S); top(S) must be true
/// 4. P2SH ∈ f and spk is pay-to-script-hash: ss must be push-only, the
///    last push of ss is the redeem script, evaluated on the rest of the
///    stack ss left behind. A lone witness-program push is accepted as is
///    unless DISALLOW_SEGWIT_RECOVERY ∈ f
/// 5. CLEANSTACK ∈ f requires exactly one element left
/// 6. INPUT_SIGCHECKS ∈ f requires |ss| ≥ 43 · sigchecks − 60
///
/// Returns the execution metrics of a successful verification.
pub fn verify_script<C: SignatureChecker + ?Sized>(
    script_sig: &[u8],
    script_pubkey: &[u8],
    flags: ScriptFlags,
    checker: &C,
) -> Result<ScriptExecutionMetrics, ScriptError> {
    let mut flags = flags;
    if flags.contains(ScriptFlags::ENABLE_SIGHASH_FORKID) {
        flags.insert(ScriptFlags::STRICTENC);
    }

    if flags.contains(ScriptFlags::SIGPUSHONLY) && !is_push_only(script_sig) {
        return Err(ScriptError::SigPushOnly);
    }

    let mut metrics = ScriptExecutionMetrics::default();
    let mut stack = Stack::new();
    eval_script(&mut stack, script_sig, flags, checker, &mut metrics)?;
    let p2sh_stack = if flags.contains(ScriptFlags::P2SH) { stack.clone() } else { Stack::new() };

    eval_script(&mut stack, script_pubkey, flags, checker, &mut metrics)?;
    match stack.last() {
        Some(top) if cast_to_bool(top) => {}
        _ => return Err(ScriptError::EvalFalse),
    }

    if flags.contains(ScriptFlags::P2SH) && is_pay_to_script_hash(script_pubkey, flags) {
        if !is_push_only(script_sig) {
            return Err(ScriptError::SigPushOnly);
        }
        stack = p2sh_stack;
        // The hash check above already consumed a non-empty stack
        let redeem_script = stack.pop().ok_or(ScriptError::InvalidStackOperation)?;

        if !flags.contains(ScriptFlags::DISALLOW_SEGWIT_RECOVERY)
            && stack.is_empty()
            && is_witness_program(&redeem_script)
        {
            return Ok(metrics);
        }

        eval_script(&mut stack, &redeem_script, flags, checker, &mut metrics)?;
        match stack.last() {
            Some(top) if cast_to_bool(top) => {}
            _ => return Err(ScriptError::EvalFalse),
        }
    }

    if flags.contains(ScriptFlags::CLEANSTACK) {
        // CLEANSTACK only makes sense together with P2SH
        if !flags.contains(ScriptFlags::P2SH) {
            return Err(ScriptError::Unknown);
        }
        if stack.len() != 1 {
            return Err(ScriptError::CleanStack);
        }
    }

    if flags.contains(ScriptFlags::INPUT_SIGCHECKS) {
        let required = (metrics.sig_checks * SIGCHECKS_DENSITY_FACTOR).saturating_sub(SIGCHECKS_DENSITY_BONUS);
        if script_sig.len() < required {
            return Err(ScriptError::InputSigChecks);
        }
    }

    Ok(metrics)
}
