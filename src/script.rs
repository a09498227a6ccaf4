//! Script byte strings: opcodes, instruction decoding and templates

use crate::constants::MAX_PUBKEYS_PER_MULTISIG;
use crate::script_error::ScriptError;
use crate::script_flags::ScriptFlags;

// push value
pub const OP_0: u8 = 0x00;
pub const OP_FALSE: u8 = OP_0;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_RESERVED: u8 = 0x50;
pub const OP_1: u8 = 0x51;
pub const OP_TRUE: u8 = OP_1;
pub const OP_2: u8 = 0x52;
pub const OP_3: u8 = 0x53;
pub const OP_16: u8 = 0x60;

// control
pub const OP_NOP: u8 = 0x61;
pub const OP_VER: u8 = 0x62;
pub const OP_IF: u8 = 0x63;
pub const OP_NOTIF: u8 = 0x64;
pub const OP_VERIF: u8 = 0x65;
pub const OP_VERNOTIF: u8 = 0x66;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6a;

// stack ops
pub const OP_TOALTSTACK: u8 = 0x6b;
pub const OP_FROMALTSTACK: u8 = 0x6c;
pub const OP_2DROP: u8 = 0x6d;
pub const OP_2DUP: u8 = 0x6e;
pub const OP_3DUP: u8 = 0x6f;
pub const OP_2OVER: u8 = 0x70;
pub const OP_2ROT: u8 = 0x71;
pub const OP_2SWAP: u8 = 0x72;
pub const OP_IFDUP: u8 = 0x73;
pub const OP_DEPTH: u8 = 0x74;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_NIP: u8 = 0x77;
pub const OP_OVER: u8 = 0x78;
pub const OP_PICK: u8 = 0x79;
pub const OP_ROLL: u8 = 0x7a;
pub const OP_ROT: u8 = 0x7b;
pub const OP_SWAP: u8 = 0x7c;
pub const OP_TUCK: u8 = 0x7d;

// splice ops
pub const OP_CAT: u8 = 0x7e;
pub const OP_SPLIT: u8 = 0x7f;
pub const OP_NUM2BIN: u8 = 0x80;
pub const OP_BIN2NUM: u8 = 0x81;
pub const OP_SIZE: u8 = 0x82;

// bit logic
pub const OP_INVERT: u8 = 0x83;
pub const OP_AND: u8 = 0x84;
pub const OP_OR: u8 = 0x85;
pub const OP_XOR: u8 = 0x86;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_RESERVED1: u8 = 0x89;
pub const OP_RESERVED2: u8 = 0x8a;

// numeric
pub const OP_1ADD: u8 = 0x8b;
pub const OP_1SUB: u8 = 0x8c;
pub const OP_2MUL: u8 = 0x8d;
pub const OP_2DIV: u8 = 0x8e;
pub const OP_NEGATE: u8 = 0x8f;
pub const OP_ABS: u8 = 0x90;
pub const OP_NOT: u8 = 0x91;
pub const OP_0NOTEQUAL: u8 = 0x92;
pub const OP_ADD: u8 = 0x93;
pub const OP_SUB: u8 = 0x94;
pub const OP_MUL: u8 = 0x95;
pub const OP_DIV: u8 = 0x96;
pub const OP_MOD: u8 = 0x97;
pub const OP_LSHIFT: u8 = 0x98;
pub const OP_RSHIFT: u8 = 0x99;
pub const OP_BOOLAND: u8 = 0x9a;
pub const OP_BOOLOR: u8 = 0x9b;
pub const OP_NUMEQUAL: u8 = 0x9c;
pub const OP_NUMEQUALVERIFY: u8 = 0x9d;
pub const OP_NUMNOTEQUAL: u8 = 0x9e;
pub const OP_LESSTHAN: u8 = 0x9f;
pub const OP_GREATERTHAN: u8 = 0xa0;
pub const OP_LESSTHANOREQUAL: u8 = 0xa1;
pub const OP_GREATERTHANOREQUAL: u8 = 0xa2;
pub const OP_MIN: u8 = 0xa3;
pub const OP_MAX: u8 = 0xa4;
pub const OP_WITHIN: u8 = 0xa5;

// crypto
pub const OP_RIPEMD160: u8 = 0xa6;
pub const OP_SHA1: u8 = 0xa7;
pub const OP_SHA256: u8 = 0xa8;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_HASH256: u8 = 0xaa;
pub const OP_CODESEPARATOR: u8 = 0xab;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

// expansion
pub const OP_NOP1: u8 = 0xb0;
pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
pub const OP_CHECKSEQUENCEVERIFY: u8 = 0xb2;
pub const OP_NOP4: u8 = 0xb3;
pub const OP_NOP5: u8 = 0xb4;
pub const OP_NOP6: u8 = 0xb5;
pub const OP_NOP7: u8 = 0xb6;
pub const OP_NOP8: u8 = 0xb7;
pub const OP_NOP9: u8 = 0xb8;
pub const OP_NOP10: u8 = 0xb9;

// more crypto
pub const OP_CHECKDATASIG: u8 = 0xba;
pub const OP_CHECKDATASIGVERIFY: u8 = 0xbb;

// additional byte string operations
pub const OP_REVERSEBYTES: u8 = 0xbc;

// native introspection
pub const OP_INPUTINDEX: u8 = 0xc0;
pub const OP_ACTIVEBYTECODE: u8 = 0xc1;
pub const OP_TXVERSION: u8 = 0xc2;
pub const OP_TXINPUTCOUNT: u8 = 0xc3;
pub const OP_TXOUTPUTCOUNT: u8 = 0xc4;
pub const OP_TXLOCKTIME: u8 = 0xc5;
pub const OP_UTXOVALUE: u8 = 0xc6;
pub const OP_UTXOBYTECODE: u8 = 0xc7;
pub const OP_OUTPOINTTXHASH: u8 = 0xc8;
pub const OP_OUTPOINTINDEX: u8 = 0xc9;
pub const OP_INPUTBYTECODE: u8 = 0xca;
pub const OP_INPUTSEQUENCENUMBER: u8 = 0xcb;
pub const OP_OUTPUTVALUE: u8 = 0xcc;
pub const OP_OUTPUTBYTECODE: u8 = 0xcd;

// token introspection
pub const OP_UTXOTOKENCATEGORY: u8 = 0xce;
pub const OP_UTXOTOKENCOMMITMENT: u8 = 0xcf;
pub const OP_UTXOTOKENAMOUNT: u8 = 0xd0;
pub const OP_OUTPUTTOKENCATEGORY: u8 = 0xd1;
pub const OP_OUTPUTTOKENCOMMITMENT: u8 = 0xd2;
pub const OP_OUTPUTTOKENAMOUNT: u8 = 0xd3;

pub const OP_RESERVED3: u8 = 0xd4;
pub const OP_RESERVED4: u8 = 0xd5;

/// Highest opcode with defined semantics
pub const MAX_OPCODE: u8 = OP_RESERVED4;

pub const OP_INVALIDOPCODE: u8 = 0xff;

/// Human-readable opcode name
pub fn op_name(opcode: u8) -> &'static str {
    const SMALL: [&str; 16] = [
        "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16",
    ];
    match opcode {
        OP_0 => "0",
        OP_PUSHDATA1 => "OP_PUSHDATA1",
        OP_PUSHDATA2 => "OP_PUSHDATA2",
        OP_PUSHDATA4 => "OP_PUSHDATA4",
        OP_1NEGATE => "-1",
        OP_RESERVED => "OP_RESERVED",
        OP_1..=OP_16 => SMALL[(opcode - OP_1) as usize],
        OP_NOP => "OP_NOP",
        OP_VER => "OP_VER",
        OP_IF => "OP_IF",
        OP_NOTIF => "OP_NOTIF",
        OP_VERIF => "OP_VERIF",
        OP_VERNOTIF => "OP_VERNOTIF",
        OP_ELSE => "OP_ELSE",
        OP_ENDIF => "OP_ENDIF",
        OP_VERIFY => "OP_VERIFY",
        OP_RETURN => "OP_RETURN",
        OP_TOALTSTACK => "OP_TOALTSTACK",
        OP_FROMALTSTACK => "OP_FROMALTSTACK",
        OP_2DROP => "OP_2DROP",
        OP_2DUP => "OP_2DUP",
        OP_3DUP => "OP_3DUP",
        OP_2OVER => "OP_2OVER",
        OP_2ROT => "OP_2ROT",
        OP_2SWAP => "OP_2SWAP",
        OP_IFDUP => "OP_IFDUP",
        OP_DEPTH => "OP_DEPTH",
        OP_DROP => "OP_DROP",
        OP_DUP => "OP_DUP",
        OP_NIP => "OP_NIP",
        OP_OVER => "OP_OVER",
        OP_PICK => "OP_PICK",
        OP_ROLL => "OP_ROLL",
        OP_ROT => "OP_ROT",
        OP_SWAP => "OP_SWAP",
        OP_TUCK => "OP_TUCK",
        OP_CAT => "OP_CAT",
        OP_SPLIT => "OP_SPLIT",
        OP_NUM2BIN => "OP_NUM2BIN",
        OP_BIN2NUM => "OP_BIN2NUM",
        OP_SIZE => "OP_SIZE",
        OP_INVERT => "OP_INVERT",
        OP_AND => "OP_AND",
        OP_OR => "OP_OR",
        OP_XOR => "OP_XOR",
        OP_EQUAL => "OP_EQUAL",
        OP_EQUALVERIFY => "OP_EQUALVERIFY",
        OP_RESERVED1 => "OP_RESERVED1",
        OP_RESERVED2 => "OP_RESERVED2",
        OP_1ADD => "OP_1ADD",
        OP_1SUB => "OP_1SUB",
        OP_2MUL => "OP_2MUL",
        OP_2DIV => "OP_2DIV",
        OP_NEGATE => "OP_NEGATE",
        OP_ABS => "OP_ABS",
        OP_NOT => "OP_NOT",
        OP_0NOTEQUAL => "OP_0NOTEQUAL",
        OP_ADD => "OP_ADD",
        OP_SUB => "OP_SUB",
        OP_MUL => "OP_MUL",
        OP_DIV => "OP_DIV",
        OP_MOD => "OP_MOD",
        OP_LSHIFT => "OP_LSHIFT",
        OP_RSHIFT => "OP_RSHIFT",
        OP_BOOLAND => "OP_BOOLAND",
        OP_BOOLOR => "OP_BOOLOR",
        OP_NUMEQUAL => "OP_NUMEQUAL",
        OP_NUMEQUALVERIFY => "OP_NUMEQUALVERIFY",
        OP_NUMNOTEQUAL => "OP_NUMNOTEQUAL",
        OP_LESSTHAN => "OP_LESSTHAN",
        OP_GREATERTHAN => "OP_GREATERTHAN",
        OP_LESSTHANOREQUAL => "OP_LESSTHANOREQUAL",
        OP_GREATERTHANOREQUAL => "OP_GREATERTHANOREQUAL",
        OP_MIN => "OP_MIN",
        OP_MAX => "OP_MAX",
        OP_WITHIN => "OP_WITHIN",
        OP_RIPEMD160 => "OP_RIPEMD160",
        OP_SHA1 => "OP_SHA1",
        OP_SHA256 => "OP_SHA256",
        OP_HASH160 => "OP_HASH160",
        OP_HASH256 => "OP_HASH256",
        OP_CODESEPARATOR => "OP_CODESEPARATOR",
        OP_CHECKSIG => "OP_CHECKSIG",
        OP_CHECKSIGVERIFY => "OP_CHECKSIGVERIFY",
        OP_CHECKMULTISIG => "OP_CHECKMULTISIG",
        OP_CHECKMULTISIGVERIFY => "OP_CHECKMULTISIGVERIFY",
        OP_CHECKDATASIG => "OP_CHECKDATASIG",
        OP_CHECKDATASIGVERIFY => "OP_CHECKDATASIGVERIFY",
        OP_REVERSEBYTES => "OP_REVERSEBYTES",
        OP_NOP1 => "OP_NOP1",
        OP_CHECKLOCKTIMEVERIFY => "OP_CHECKLOCKTIMEVERIFY",
        OP_CHECKSEQUENCEVERIFY => "OP_CHECKSEQUENCEVERIFY",
        OP_NOP4 => "OP_NOP4",
        OP_NOP5 => "OP_NOP5",
        OP_NOP6 => "OP_NOP6",
        OP_NOP7 => "OP_NOP7",
        OP_NOP8 => "OP_NOP8",
        OP_NOP9 => "OP_NOP9",
        OP_NOP10 => "OP_NOP10",
        OP_INPUTINDEX => "OP_INPUTINDEX",
        OP_ACTIVEBYTECODE => "OP_ACTIVEBYTECODE",
        OP_TXVERSION => "OP_TXVERSION",
        OP_TXINPUTCOUNT => "OP_TXINPUTCOUNT",
        OP_TXOUTPUTCOUNT => "OP_TXOUTPUTCOUNT",
        OP_TXLOCKTIME => "OP_TXLOCKTIME",
        OP_UTXOVALUE => "OP_UTXOVALUE",
        OP_UTXOBYTECODE => "OP_UTXOBYTECODE",
        OP_OUTPOINTTXHASH => "OP_OUTPOINTTXHASH",
        OP_OUTPOINTINDEX => "OP_OUTPOINTINDEX",
        OP_INPUTBYTECODE => "OP_INPUTBYTECODE",
        OP_INPUTSEQUENCENUMBER => "OP_INPUTSEQUENCENUMBER",
        OP_OUTPUTVALUE => "OP_OUTPUTVALUE",
        OP_OUTPUTBYTECODE => "OP_OUTPUTBYTECODE",
        OP_UTXOTOKENCATEGORY => "OP_UTXOTOKENCATEGORY",
        OP_UTXOTOKENCOMMITMENT => "OP_UTXOTOKENCOMMITMENT",
        OP_UTXOTOKENAMOUNT => "OP_UTXOTOKENAMOUNT",
        OP_OUTPUTTOKENCATEGORY => "OP_OUTPUTTOKENCATEGORY",
        OP_OUTPUTTOKENCOMMITMENT => "OP_OUTPUTTOKENCOMMITMENT",
        OP_OUTPUTTOKENAMOUNT => "OP_OUTPUTTOKENAMOUNT",
        crate::serialize::SPECIAL_TOKEN_PREFIX => "SPECIAL_TOKEN_PREFIX",
        OP_RESERVED3 => "OP_RESERVED3",
        OP_RESERVED4 => "OP_RESERVED4",
        _ => "OP_UNKNOWN",
    }
}

/// Small integer value of OP_0, OP_1..OP_16
pub fn decode_op_n(opcode: u8) -> u8 {
    if opcode == OP_0 {
        return 0;
    }
    opcode - (OP_1 - 1)
}

/// Opcode pushing the small integer `n` (0..=16)
pub fn encode_op_n(n: u8) -> u8 {
    if n == 0 {
        return OP_0;
    }
    OP_1 + n - 1
}

/// One decoded script instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    pub opcode: u8,
    /// Pushed bytes, empty for non-push opcodes
    pub data: &'a [u8],
    /// Offset of the byte following this instruction
    pub end: usize,
}

/// Iterator over the instructions of a script.
///
/// Yields `Err(ScriptError::BadOpcode)` once when a push runs past the end
/// of the script, then stops.
#[derive(Clone)]
pub struct Instructions<'a> {
    script: &'a [u8],
    pos: usize,
    done: bool,
}

pub fn instructions(script: &[u8]) -> Instructions<'_> {
    Instructions { script, pos: 0, done: false }
}

impl<'a> Instructions<'a> {
    pub fn position(&self) -> usize {
        self.pos
    }

    fn read_push(&mut self, opcode: u8) -> Option<&'a [u8]> {
        let script = self.script;
        let mut pos = self.pos;
        let len = match opcode {
            OP_PUSHDATA1 => {
                let b = *script.get(pos)?;
                pos += 1;
                b as usize
            }
            OP_PUSHDATA2 => {
                let b = script.get(pos..pos + 2)?;
                pos += 2;
                u16::from_le_bytes([b[0], b[1]]) as usize
            }
            OP_PUSHDATA4 => {
                let b = script.get(pos..pos + 4)?;
                pos += 4;
                u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize
            }
            n => n as usize,
        };
        let data = script.get(pos..pos.checked_add(len)?)?;
        self.pos = pos + len;
        Some(data)
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>, ScriptError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.script.len() {
            return None;
        }
        let opcode = self.script[self.pos];
        self.pos += 1;

        let data: &'a [u8] = if opcode <= OP_PUSHDATA4 {
            match self.read_push(opcode) {
                Some(data) => data,
                None => {
                    self.done = true;
                    return Some(Err(ScriptError::BadOpcode));
                }
            }
        } else {
            &[]
        };
        Some(Ok(Instruction { opcode, data, end: self.pos }))
    }
}

/// CheckMinimalPush: was `data` pushed with the smallest possible opcode?
pub fn check_minimal_push(data: &[u8], opcode: u8) -> bool {
    if data.is_empty() {
        // Should have used OP_0.
        return opcode == OP_0;
    }
    if data.len() == 1 && (1..=16).contains(&data[0]) {
        // Should have used OP_1 .. OP_16.
        return false;
    }
    if data.len() == 1 && data[0] == 0x81 {
        // Should have used OP_1NEGATE.
        return false;
    }
    if data.len() <= 75 {
        return opcode as usize == data.len();
    }
    if data.len() <= 255 {
        return opcode == OP_PUSHDATA1;
    }
    if data.len() <= 65535 {
        return opcode == OP_PUSHDATA2;
    }
    true
}

/// Script contains only push opcodes (OP_RESERVED counts as a push)
pub fn is_push_only(script: &[u8]) -> bool {
    for instruction in instructions(script) {
        match instruction {
            Ok(ins) if ins.opcode <= OP_16 => {}
            _ => return false,
        }
    }
    true
}

/// Kind of pay-to-script-hash template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum P2shKind {
    /// OP_HASH160 <20 bytes> OP_EQUAL
    Hash160,
    /// OP_HASH256 <32 bytes> OP_EQUAL
    Hash256,
}

/// Match a pay-to-script-hash locking script. The 32-byte form is only
/// recognized when `ENABLE_P2SH_32` is set.
pub fn pay_to_script_hash_kind(script: &[u8], flags: ScriptFlags) -> Option<P2shKind> {
    if script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL {
        return Some(P2shKind::Hash160);
    }
    if flags.contains(ScriptFlags::ENABLE_P2SH_32)
        && script.len() == 35
        && script[0] == OP_HASH256
        && script[1] == 0x20
        && script[34] == OP_EQUAL
    {
        return Some(P2shKind::Hash256);
    }
    None
}

pub fn is_pay_to_script_hash(script: &[u8], flags: ScriptFlags) -> bool {
    pay_to_script_hash_kind(script, flags).is_some()
}

/// OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG
pub fn is_pay_to_pubkey_hash(script: &[u8]) -> bool {
    script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 20
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
}

/// A 1-byte version push followed by a 2..=40 byte direct push
pub fn is_witness_program(script: &[u8]) -> bool {
    if script.len() < 4 || script.len() > 42 {
        return false;
    }
    if script[0] != OP_0 && !(OP_1..=OP_16).contains(&script[0]) {
        return false;
    }
    script[1] as usize + 2 == script.len()
}

/// FindAndDelete: remove every instruction-aligned occurrence of `pattern`.
///
/// Returns the number of occurrences removed. The script is left untouched
/// when nothing matched.
pub fn find_and_delete(script: &mut Vec<u8>, pattern: &[u8]) -> usize {
    if pattern.is_empty() {
        return 0;
    }
    let source: &[u8] = script;
    let mut found = 0;
    let mut result = Vec::with_capacity(source.len());
    let mut pc = 0usize;
    let mut copied_to = 0usize;
    loop {
        result.extend_from_slice(&source[copied_to..pc]);
        while source.len() - pc >= pattern.len() && &source[pc..pc + pattern.len()] == pattern {
            pc += pattern.len();
            found += 1;
        }
        copied_to = pc;

        let mut iter = Instructions { script: source, pos: pc, done: false };
        match iter.next() {
            Some(Ok(ins)) => pc = ins.end,
            _ => break,
        }
    }
    if found > 0 {
        result.extend_from_slice(&source[copied_to..]);
        *script = result;
    }
    found
}

/// Legacy signature operation count. With `accurate`, a multisig preceded
/// by OP_1..OP_16 counts as that many keys instead of the maximum.
pub fn get_sig_op_count(script: &[u8], accurate: bool) -> usize {
    let mut count = 0;
    let mut last_opcode = OP_INVALIDOPCODE;
    for instruction in instructions(script) {
        let Ok(ins) = instruction else { break };
        match ins.opcode {
            OP_CHECKSIG | OP_CHECKSIGVERIFY | OP_CHECKDATASIG | OP_CHECKDATASIGVERIFY => count += 1,
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                if accurate && (OP_1..=OP_16).contains(&last_opcode) {
                    count += decode_op_n(last_opcode) as usize;
                } else {
                    count += MAX_PUBKEYS_PER_MULTISIG;
                }
            }
            _ => {}
        }
        last_opcode = ins.opcode;
    }
    count
}

/// Incremental script construction with minimal pushes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptBuilder(Vec<u8>);

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_opcode(mut self, opcode: u8) -> Self {
        self.0.push(opcode);
        self
    }

    /// Push bytes with the smallest push-data opcode (never OP_1..OP_16)
    pub fn push_slice(mut self, data: &[u8]) -> Self {
        let len = data.len();
        if len < OP_PUSHDATA1 as usize {
            self.0.push(len as u8);
        } else if len <= 0xff {
            self.0.push(OP_PUSHDATA1);
            self.0.push(len as u8);
        } else if len <= 0xffff {
            self.0.push(OP_PUSHDATA2);
            self.0.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.0.push(OP_PUSHDATA4);
            self.0.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.0.extend_from_slice(data);
        self
    }

    /// Push an integer with OP_0/OP_1NEGATE/OP_1..OP_16 when possible
    pub fn push_int(self, value: i64) -> Self {
        match value {
            0 => self.push_opcode(OP_0),
            -1 => self.push_opcode(OP_1NEGATE),
            1..=16 => self.push_opcode(encode_op_n(value as u8)),
            _ => self.push_slice(&crate::script_num::ScriptNum::new(value).to_bytes()),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// P2PKH locking script for a 20-byte key hash
pub fn p2pkh_script(key_hash: &[u8; 20]) -> Vec<u8> {
    ScriptBuilder::new()
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(key_hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .into_bytes()
}

/// P2SH locking script committing to `redeem_script`
pub fn p2sh_script(redeem_script: &[u8]) -> Vec<u8> {
    ScriptBuilder::new()
        .push_opcode(OP_HASH160)
        .push_slice(&crate::hash::hash160(redeem_script))
        .push_opcode(OP_EQUAL)
        .into_bytes()
}

/// P2SH_32 locking script committing to `redeem_script`
pub fn p2sh32_script(redeem_script: &[u8]) -> Vec<u8> {
    ScriptBuilder::new()
        .push_opcode(OP_HASH256)
        .push_slice(&crate::hash::sha256d(redeem_script))
        .push_opcode(OP_EQUAL)
        .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_names() {
        assert_eq!(op_name(OP_0), "0");
        assert_eq!(op_name(OP_16), "16");
        assert_eq!(op_name(OP_CHECKDATASIG), "OP_CHECKDATASIG");
        assert_eq!(op_name(OP_OUTPUTTOKENAMOUNT), "OP_OUTPUTTOKENAMOUNT");
        assert_eq!(op_name(0xef), "SPECIAL_TOKEN_PREFIX");
        assert_eq!(op_name(0xfe), "OP_UNKNOWN");
    }

    #[test]
    fn test_small_ints() {
        for n in 0..=16u8 {
            assert_eq!(decode_op_n(encode_op_n(n)), n);
        }
    }

    // ============================================================================
    // INSTRUCTION DECODING
    // ============================================================================

    #[test]
    fn test_instruction_pushes() {
        let script = [0x02, 0xaa, 0xbb, OP_PUSHDATA1, 0x01, 0xcc, OP_PUSHDATA2, 0x01, 0x00, 0xdd, OP_DUP];
        let ins: Vec<_> = instructions(&script).collect::<Result<_, _>>().unwrap();
        assert_eq!(ins.len(), 4);
        assert_eq!(ins[0].data, &[0xaa, 0xbb]);
        assert_eq!(ins[1].data, &[0xcc]);
        assert_eq!(ins[2].data, &[0xdd]);
        assert_eq!(ins[3].opcode, OP_DUP);
        assert_eq!(ins[3].end, script.len());
    }

    #[test]
    fn test_truncated_push_is_bad_opcode() {
        let script = [OP_DUP, 0x05, 0x01];
        let items: Vec<_> = instructions(&script).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], Err(ScriptError::BadOpcode));

        assert!(instructions(&[OP_PUSHDATA4, 0xff]).next().unwrap().is_err());
    }

    #[test]
    fn test_check_minimal_push() {
        assert!(check_minimal_push(&[], OP_0));
        assert!(!check_minimal_push(&[], OP_PUSHDATA1));
        assert!(!check_minimal_push(&[5], 1));
        assert!(!check_minimal_push(&[0x81], 1));
        assert!(check_minimal_push(&[0x82], 1));
        assert!(check_minimal_push(&[0u8; 75], 75));
        assert!(!check_minimal_push(&[0u8; 75], OP_PUSHDATA1));
        assert!(check_minimal_push(&[0u8; 76], OP_PUSHDATA1));
        assert!(check_minimal_push(&[0u8; 256], OP_PUSHDATA2));
        assert!(!check_minimal_push(&[0u8; 256], OP_PUSHDATA4));
    }

    // ============================================================================
    // TEMPLATES
    // ============================================================================

    #[test]
    fn test_push_only() {
        assert!(is_push_only(&[OP_0, 0x01, 0xff, OP_16, OP_RESERVED]));
        assert!(!is_push_only(&[OP_0, OP_NOP]));
        assert!(!is_push_only(&[0x05, 0x01]));
    }

    #[test]
    fn test_p2sh_detection() {
        let p2sh = p2sh_script(&[OP_1]);
        assert_eq!(p2sh.len(), 23);
        assert!(is_pay_to_script_hash(&p2sh, ScriptFlags::NONE));

        let p2sh32 = p2sh32_script(&[OP_1]);
        assert_eq!(p2sh32.len(), 35);
        assert!(!is_pay_to_script_hash(&p2sh32, ScriptFlags::NONE));
        assert_eq!(
            pay_to_script_hash_kind(&p2sh32, ScriptFlags::ENABLE_P2SH_32),
            Some(P2shKind::Hash256)
        );
    }

    #[test]
    fn test_p2pkh_detection() {
        let script = p2pkh_script(&[7u8; 20]);
        assert!(is_pay_to_pubkey_hash(&script));
        assert!(!is_pay_to_pubkey_hash(&script[..24]));
    }

    #[test]
    fn test_witness_program() {
        let mut v0 = vec![OP_0, 20];
        v0.extend_from_slice(&[0u8; 20]);
        assert!(is_witness_program(&v0));
        assert!(!is_witness_program(&[OP_0, 1, 0]));
        let mut bad_version = v0.clone();
        bad_version[0] = OP_1NEGATE;
        assert!(!is_witness_program(&bad_version));
    }

    #[test]
    fn test_find_and_delete() {
        let mut script = vec![OP_1, OP_2];
        assert_eq!(find_and_delete(&mut script, &[]), 0);
        assert_eq!(script, vec![OP_1, OP_2]);

        let mut script = vec![OP_1, OP_2, OP_3];
        assert_eq!(find_and_delete(&mut script, &[OP_2]), 1);
        assert_eq!(script, vec![OP_1, OP_3]);

        let mut script = vec![OP_3, OP_1, OP_3, OP_3, OP_4_TEST, OP_3];
        assert_eq!(find_and_delete(&mut script, &[OP_3]), 4);
        assert_eq!(script, vec![OP_1, OP_4_TEST]);

        // only instruction-aligned matches are removed
        let mut script = vec![0x02, 0x03, 0x02, 0x03];
        assert_eq!(find_and_delete(&mut script, &[0x03, 0x02]), 0);
        assert_eq!(script, vec![0x02, 0x03, 0x02, 0x03]);

        let mut script = vec![0x02, 0x03, 0x02, 0x02, 0x03, 0x02];
        assert_eq!(find_and_delete(&mut script, &[0x02, 0x03, 0x02]), 2);
        assert!(script.is_empty());

        let mut script = vec![OP_0, OP_0, OP_1, OP_1];
        assert_eq!(find_and_delete(&mut script, &[OP_0, OP_1]), 1);
        assert_eq!(script, vec![OP_0, OP_1]);
    }

    const OP_4_TEST: u8 = 0x54;

    #[test]
    fn test_sig_op_count() {
        assert_eq!(get_sig_op_count(&[], true), 0);
        let multisig = [OP_1, 0x01, 0x02, 0x01, 0x03, OP_2, OP_CHECKMULTISIG];
        assert_eq!(get_sig_op_count(&multisig, true), 2);
        assert_eq!(get_sig_op_count(&multisig, false), 20);
        assert_eq!(get_sig_op_count(&p2pkh_script(&[0u8; 20]), true), 1);
    }

    #[test]
    fn test_builder_push_int() {
        assert_eq!(ScriptBuilder::new().push_int(0).into_bytes(), vec![OP_0]);
        assert_eq!(ScriptBuilder::new().push_int(-1).into_bytes(), vec![OP_1NEGATE]);
        assert_eq!(ScriptBuilder::new().push_int(16).into_bytes(), vec![OP_16]);
        assert_eq!(ScriptBuilder::new().push_int(17).into_bytes(), vec![0x01, 0x11]);
        assert_eq!(ScriptBuilder::new().push_int(-2).into_bytes(), vec![0x01, 0x82]);
    }
}
