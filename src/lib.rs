//! UTXO coin selection library.
//!
//! This library provides efficient algorithms to compose a set of unspent transaction outputs
//! (UTXOs) that funds a target spend amount while minimizing the long term cost (waste) of
//! the selection.

// Coding conventions.
#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![deny(missing_docs)]
// Experimental features we need.
#![cfg_attr(docsrs, feature(doc_cfg))]

mod branch_and_bound;
#[cfg(feature = "rand")]
mod knapsack;

use bitcoin::Amount;
use bitcoin::FeeRate;
use bitcoin::SignedAmount;
use bitcoin::TxOut;
use bitcoin::Weight;

pub use crate::branch_and_bound::select_coins_bnb;
#[cfg(feature = "rand")]
pub use crate::knapsack::select_coins_knapsack;
#[cfg(feature = "rand")]
use rand::thread_rng;

// MIN_CHANGE = CENT in Core:
// https://github.com/bitcoin/bitcoin/blob/v0.16.0/src/wallet/wallet.h#L59
/// The smallest change amount worth creating.  The knapsack widens its target
/// by this amount when searching for a selection that leaves room for a
/// change output.
pub const MIN_CHANGE: Amount = Amount::from_sat(1_000_000);

// Serialized length of a u32.
const SEQUENCE_SIZE: u64 = 4;
// The serialized lengths of txid and vout.
const OUTPOINT_SIZE: u64 = 32 + 4;
const TX_IN_BASE_WEIGHT: Weight = Weight::from_vb_unwrap(OUTPOINT_SIZE + SEQUENCE_SIZE);

// Predict the fee Amount to spend a UTXO.
//
// To predict the fee, the predicted weight is:
// weight = satisfaction_weight + TX_IN base weight.
//
// The fee is then calculated as:
// fee = weight * fee_rate
fn calculate_fee_prediction(satisfaction_weight: Weight, fee_rate: FeeRate) -> Option<Amount> {
    let weight = satisfaction_weight.checked_add(TX_IN_BASE_WEIGHT)?;
    fee_rate.checked_mul_by_weight(weight)
}

/// A candidate UTXO along with the cost of spending it.
///
/// The fee fields price the input itself.  Fees that do not depend on which
/// inputs are chosen (outputs, transaction overhead) are passed to the
/// selection algorithms separately.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputCoin {
    /// Gross value of the UTXO.
    pub value: Amount,
    /// Fee to spend this UTXO at the current fee rate.
    pub fee: Amount,
    /// Fee to spend this UTXO at the expected long term fee rate.
    pub long_term_fee: Amount,
}

impl InputCoin {
    /// Builds an `InputCoin` from a wallet UTXO by predicting the fee required
    /// to spend it now and at the expected long term fee rate.
    ///
    /// The predicted spend weight is the `satisfaction_weight` plus the fixed
    /// weight of serializing the outpoint and sequence.
    ///
    /// # Returns
    /// * `Some(InputCoin)` on success.
    /// * `None` if the weight or fee calculation overflows.
    pub fn from_utxo(
        utxo: &TxOut,
        satisfaction_weight: Weight,
        fee_rate: FeeRate,
        long_term_fee_rate: FeeRate,
    ) -> Option<InputCoin> {
        Some(InputCoin {
            value: utxo.value,
            fee: calculate_fee_prediction(satisfaction_weight, fee_rate)?,
            long_term_fee: calculate_fee_prediction(satisfaction_weight, long_term_fee_rate)?,
        })
    }

    /// The value of this coin net of the fee to spend it now.
    ///
    /// Negative when the coin costs more to spend than it contributes.
    /// Returns `None` if a conversion to a signed amount overflows.
    pub fn effective_value(&self) -> Option<SignedAmount> {
        self.value.to_signed().ok()?.checked_sub(self.fee.to_signed().ok()?)
    }

    // The cost of spending this coin now instead of at the long term fee
    // rate.  Negative in a low fee environment.
    fn waste(&self) -> Option<SignedAmount> {
        self.fee.to_signed().ok()?.checked_sub(self.long_term_fee.to_signed().ok()?)
    }
}

/// The result of a selection attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    /// The chosen candidates.
    pub coins: Vec<InputCoin>,
    /// Sum of the gross values of `coins`.
    pub value: Amount,
    /// Search iterations consumed producing this selection.
    pub iterations: u32,
}

/// Select coins first using the branch and bound search and fall back on the
/// knapsack approximation if no changeless match exists.
///
/// Candidates whose effective value is not positive pay more to spend than
/// they contribute and are dropped before the branch and bound search.  The
/// knapsack operates on gross values and receives the full pool.
///
/// Returns `None` if neither algorithm finds a selection for the given pool.
/// Requires compilation with the "rand" feature.
#[cfg(feature = "rand")]
#[cfg_attr(docsrs, doc(cfg(feature = "rand")))]
pub fn select_coins(
    target: Amount,
    cost_of_change: Amount,
    not_input_fees: Amount,
    pool: &mut [InputCoin],
) -> Option<Selection> {
    let eligible: Vec<InputCoin> = pool
        .iter()
        .filter(|coin| coin.effective_value().map_or(false, |ev| ev.is_positive()))
        .copied()
        .collect();

    let bnb = select_coins_bnb(target, cost_of_change, not_input_fees, &eligible);
    if bnb.is_some() {
        return bnb;
    }

    let knapsack_target = target.checked_add(not_input_fees)?;
    select_coins_knapsack(knapsack_target, pool, &mut thread_rng())
}

#[cfg(test)]
pub(crate) mod tests {
    use core::str::FromStr;

    use bitcoin::ScriptBuf;

    use super::*;

    // Builds a candidate from a "value/fee/long_term_fee" triple, e.g.
    // "3 cBTC/10 sats/5 sats".  Omitted fee fields default to zero.
    pub fn coin(desc: &str) -> InputCoin {
        let mut parts = desc.split('/').map(|s| Amount::from_str(s.trim()).unwrap());
        let value = parts.next().unwrap();
        let fee = parts.next().unwrap_or(Amount::ZERO);
        let long_term_fee = parts.next().unwrap_or(Amount::ZERO);
        InputCoin { value, fee, long_term_fee }
    }

    pub fn pool(descs: &[&str]) -> Vec<InputCoin> {
        descs.iter().map(|desc| coin(desc)).collect()
    }

    const SATISFACTION_SIZE: Weight = Weight::from_wu(204);

    #[test]
    fn from_utxo_predicts_fees() {
        let utxo = TxOut {
            value: Amount::from_str("1 cBTC").unwrap(),
            script_pubkey: ScriptBuf::new(),
        };

        // fee = 15 sats, since
        // 40 sat/kwu * (204 + BASE_WEIGHT) = 15 sats
        let fee_rate = FeeRate::from_sat_per_kwu(40);
        let long_term_fee_rate = FeeRate::from_sat_per_kwu(10);

        let input_coin =
            InputCoin::from_utxo(&utxo, SATISFACTION_SIZE, fee_rate, long_term_fee_rate).unwrap();

        assert_eq!(input_coin.value, Amount::from_str("1 cBTC").unwrap());
        assert_eq!(input_coin.fee, Amount::from_sat(15));
        assert_eq!(input_coin.long_term_fee, Amount::from_sat(4));
        assert_eq!(
            input_coin.effective_value().unwrap(),
            SignedAmount::from_sat(1_000_000 - 15)
        );
    }

    #[test]
    fn effective_value_negative_when_fee_exceeds_value() {
        let input_coin = coin("1 sat/2 sats");
        assert_eq!(input_coin.effective_value().unwrap(), SignedAmount::from_sat(-1));
    }

    #[test]
    #[cfg(feature = "rand")]
    fn select_coins_filters_uneconomic_candidates() {
        // The first candidate costs more to spend than it contributes and
        // must not block the changeless match on the second.
        let mut candidates = pool(&["10 sats/20 sats", "9 sats/1 sat"]);

        let result = select_coins(
            Amount::from_str("8 sats").unwrap(),
            Amount::ZERO,
            Amount::ZERO,
            &mut candidates,
        )
        .unwrap();

        assert_eq!(result.coins, pool(&["9 sats/1 sat"]));
        assert_eq!(result.value, Amount::from_str("9 sats").unwrap());
    }

    #[test]
    #[cfg(feature = "rand")]
    fn select_coins_falls_back_to_knapsack() {
        // A changeless match is impossible since the single coin overshoots
        // the window.  The fallback accepts the overshoot.
        let mut candidates = pool(&["15 sats/1 sat"]);

        let result = select_coins(
            Amount::from_str("4 sats").unwrap(),
            Amount::ZERO,
            Amount::ZERO,
            &mut candidates,
        )
        .unwrap();

        assert_eq!(result.coins, pool(&["15 sats/1 sat"]));
        assert_eq!(result.value, Amount::from_str("15 sats").unwrap());
    }

    #[test]
    #[cfg(feature = "rand")]
    fn select_coins_no_solution() {
        let mut candidates = pool(&["1 sat", "2 sats"]);

        let result = select_coins(
            Amount::from_str("1 BTC").unwrap(),
            Amount::ZERO,
            Amount::ZERO,
            &mut candidates,
        );

        assert!(result.is_none());
    }
}
