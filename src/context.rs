//! Script execution context: the transaction being verified and the coins
//! its inputs spend

use std::collections::HashMap;
use std::hash::BuildHasher;

use crate::amount::Amount;
use crate::error::{ConsensusError, Result};
use crate::script_error::ScriptError;
use crate::types::*;

/// Lookup of the output an outpoint refers to
pub trait PrevoutResolver {
    fn resolve(&self, outpoint: &OutPoint) -> Option<TransactionOutput>;
}

impl<S: BuildHasher> PrevoutResolver for HashMap<OutPoint, TransactionOutput, S> {
    fn resolve(&self, outpoint: &OutPoint) -> Option<TransactionOutput> {
        self.get(outpoint).cloned()
    }
}

/// The outputs spent by a transaction, one per input, in input order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpentOutputs(Vec<TransactionOutput>);

impl SpentOutputs {
    pub fn new(outputs: Vec<TransactionOutput>) -> Self {
        SpentOutputs(outputs)
    }

    /// Resolve every input's prevout once for the whole transaction
    pub fn resolve<R: PrevoutResolver + ?Sized>(tx: &Transaction, resolver: &R) -> Result<Self> {
        tx.inputs
            .iter()
            .map(|input| {
                resolver.resolve(&input.prevout).ok_or_else(|| {
                    ConsensusError::MissingPrevout(format!(
                        "{}:{}",
                        crate::hash::to_hex_reversed(&input.prevout.hash),
                        input.prevout.index
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(SpentOutputs)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[TransactionOutput] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy)]
enum CoinView<'a> {
    /// Spent outputs of every input
    Full(&'a [TransactionOutput]),
    /// Only the output spent by the input under verification
    Limited(&'a TransactionOutput),
}

/// Everything a script may inspect while one input is verified.
///
/// Built for all inputs of a transaction at once so the spent outputs are
/// resolved a single time. A limited context knows only its own coin, as
/// when a caller supplies just one locking script and amount.
#[derive(Debug, Clone, Copy)]
pub struct ScriptExecutionContext<'a> {
    input_index: usize,
    tx: &'a Transaction,
    coins: CoinView<'a>,
}

impl<'a> ScriptExecutionContext<'a> {
    /// Context with sibling information.
    ///
    /// `spent` must hold exactly one output per input and `input_index` must
    /// be in range.
    pub fn new(tx: &'a Transaction, input_index: usize, spent: &'a SpentOutputs) -> Result<Self> {
        if spent.len() != tx.inputs.len() {
            return Err(ConsensusError::MissingPrevout(format!(
                "{} spent outputs for {} inputs",
                spent.len(),
                tx.inputs.len()
            )));
        }
        if input_index >= tx.inputs.len() {
            return Err(ConsensusError::Serialization(format!(
                "input index {} out of range",
                input_index
            )));
        }
        Ok(ScriptExecutionContext { input_index, tx, coins: CoinView::Full(spent.as_slice()) })
    }

    /// Context knowing only the coin spent by `input_index`
    pub fn new_limited(tx: &'a Transaction, input_index: usize, coin: &'a TransactionOutput) -> Result<Self> {
        if input_index >= tx.inputs.len() {
            return Err(ConsensusError::Serialization(format!(
                "input index {} out of range",
                input_index
            )));
        }
        Ok(ScriptExecutionContext { input_index, tx, coins: CoinView::Limited(coin) })
    }

    /// One context per input, sharing the resolved coins
    pub fn for_all_inputs(tx: &'a Transaction, spent: &'a SpentOutputs) -> Result<Vec<Self>> {
        (0..tx.inputs.len())
            .map(|index| ScriptExecutionContext::new(tx, index, spent))
            .collect()
    }

    pub fn input_index(&self) -> usize {
        self.input_index
    }

    pub fn is_limited(&self) -> bool {
        matches!(self.coins, CoinView::Limited(_))
    }

    pub fn tx(&self) -> &'a Transaction {
        self.tx
    }

    /// The coin spent by input `index`
    pub fn coin(&self, index: usize) -> std::result::Result<&'a TransactionOutput, ScriptError> {
        match self.coins {
            CoinView::Full(coins) => coins.get(index).ok_or(ScriptError::InvalidTxInputIndex),
            CoinView::Limited(coin) if index == self.input_index => Ok(coin),
            CoinView::Limited(_) if index >= self.tx.inputs.len() => Err(ScriptError::InvalidTxInputIndex),
            CoinView::Limited(_) => Err(ScriptError::LimitedContextNoSiblingInfo),
        }
    }

    /// The coin spent by the input under verification
    pub fn own_coin(&self) -> &'a TransactionOutput {
        match self.coins {
            CoinView::Full(coins) => &coins[self.input_index],
            CoinView::Limited(coin) => coin,
        }
    }

    pub fn coin_script_pubkey(&self) -> &'a [u8] {
        &self.own_coin().script_pubkey
    }

    pub fn coin_amount(&self) -> Amount {
        self.own_coin().value
    }

    pub fn coin_token_data(&self) -> Option<&'a TokenData> {
        self.own_coin().token_data.as_ref()
    }

    /// Spent outputs of all inputs, unavailable in a limited context
    pub fn all_coins(&self) -> Option<&'a [TransactionOutput]> {
        match self.coins {
            CoinView::Full(coins) => Some(coins),
            CoinView::Limited(_) => None,
        }
    }

    pub fn script_sig(&self, index: usize) -> std::result::Result<&'a [u8], ScriptError> {
        self.tx
            .inputs
            .get(index)
            .map(|input| input.script_sig.as_slice())
            .ok_or(ScriptError::InvalidTxInputIndex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_input_tx() -> Transaction {
        Transaction {
            version: 2,
            inputs: (0..2u32)
                .map(|i| TransactionInput {
                    prevout: OutPoint::new([i as u8 + 1; 32], i),
                    script_sig: vec![0x51],
                    sequence: 0xffff_ffff,
                })
                .collect(),
            outputs: vec![TransactionOutput::new(Amount::from_sat(1000), vec![0x51])],
            lock_time: 0,
        }
    }

    #[test]
    fn test_resolve_spent_outputs() {
        let tx = two_input_tx();
        let mut coins = HashMap::new();
        coins.insert(tx.inputs[0].prevout, TransactionOutput::new(Amount::from_sat(10), vec![0x51]));
        assert!(matches!(
            SpentOutputs::resolve(&tx, &coins),
            Err(ConsensusError::MissingPrevout(_))
        ));

        coins.insert(tx.inputs[1].prevout, TransactionOutput::new(Amount::from_sat(20), vec![0x52]));
        let spent = SpentOutputs::resolve(&tx, &coins).unwrap();
        let contexts = ScriptExecutionContext::for_all_inputs(&tx, &spent).unwrap();
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[1].coin_amount(), Amount::from_sat(20));
        assert_eq!(contexts[0].coin(1).unwrap().script_pubkey, vec![0x52]);
        assert_eq!(contexts[0].coin(2), Err(ScriptError::InvalidTxInputIndex));
    }

    #[test]
    fn test_limited_context_hides_siblings() {
        let tx = two_input_tx();
        let coin = TransactionOutput::new(Amount::from_sat(5), vec![0x51]);
        let context = ScriptExecutionContext::new_limited(&tx, 1, &coin).unwrap();
        assert!(context.is_limited());
        assert_eq!(context.coin(1).unwrap().value, Amount::from_sat(5));
        assert_eq!(context.coin(0), Err(ScriptError::LimitedContextNoSiblingInfo));
        assert_eq!(context.coin(7), Err(ScriptError::InvalidTxInputIndex));
        assert!(context.all_coins().is_none());
        assert_eq!(context.script_sig(0).unwrap(), &[0x51]);
    }

    #[test]
    fn test_context_index_checks() {
        let tx = two_input_tx();
        let coin = TransactionOutput::new(Amount::from_sat(5), vec![]);
        assert!(ScriptExecutionContext::new_limited(&tx, 2, &coin).is_err());
        let short = SpentOutputs::new(vec![coin]);
        assert!(ScriptExecutionContext::new(&tx, 0, &short).is_err());
    }
}
