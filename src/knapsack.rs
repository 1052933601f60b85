// SPDX-License-Identifier: CC0-1.0
//
//! Knapsack Coin Selection.
//!
//! This module introduces the stochastic knapsack selection algorithm.

use bitcoin::Amount;
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::{InputCoin, Selection, MIN_CHANGE};

// Repetition budget for the subset approximation.
const APPROXIMATION_ITERATIONS: u32 = 1_000;

/// Select coins by solving the subset sum over gross values with a stochastic
/// approximation.
///
/// See also core: <https://github.com/bitcoin/bitcoin/blob/f3bc1a72825fe2b51f4bc20e004cef464f05b965/src/wallet/coinselection.cpp>
///
/// A coin whose value matches the target exactly is always preferred.  Failing that, the
/// search looks for the smallest combination of coins below `target + MIN_CHANGE` that
/// still covers the target, so that whatever excess remains funds a usable change output.
/// A single coin above that threshold is kept aside and wins whenever the combination
/// search stays looser than it.
///
/// The pool is shuffled before the scan.  The randomness serves no security purpose; it
/// prevents degenerate behavior in the approximation and avoids always spending coins in
/// the same order.
///
/// # Returns
/// * `Some(Selection)` where the selection contains a non-empty coin set summing to at
///   least the target.
/// * `None` No subset of the pool covers the target, or an arithmetic bound was exceeded.
///
/// # Arguments
/// * target: Target spend `Amount`
/// * pool: The candidate coins from which to choose a selection; reordered in place
/// * rng: Randomness source, injectable so tests can make the selection deterministic
pub fn select_coins_knapsack<R: Rng + ?Sized>(
    target: Amount,
    pool: &mut [InputCoin],
    rng: &mut R,
) -> Option<Selection> {
    if pool.is_empty() {
        debug!("knapsack: empty candidate pool");
        return None;
    }

    pool.shuffle(rng);

    let threshold = target.checked_add(MIN_CHANGE)?;

    let mut lowest_larger: Option<InputCoin> = None;
    let mut lower: Vec<InputCoin> = Vec::new();
    let mut total_lower = Amount::ZERO;

    for &coin in pool.iter() {
        if coin.value == target {
            return Some(Selection { coins: vec![coin], value: coin.value, iterations: 0 });
        } else if coin.value < threshold {
            total_lower = total_lower.checked_add(coin.value)?;
            lower.push(coin);
        } else if lowest_larger.map_or(true, |lowest| coin.value < lowest.value) {
            lowest_larger = Some(coin);
        }
    }

    if total_lower == target {
        return Some(Selection { coins: lower, value: total_lower, iterations: 0 });
    }

    if total_lower < target {
        return match lowest_larger {
            Some(coin) => {
                Some(Selection { coins: vec![coin], value: coin.value, iterations: 0 })
            }
            None => {
                debug!(
                    "knapsack: available value {} is below target {}",
                    total_lower, target
                );
                None
            }
        };
    }

    // Descending sort by gross value.
    lower.sort_by(|a, b| b.value.cmp(&a.value));

    let (mut best_mask, mut best_sum, mut iterations) =
        approximate_best_subset(&lower, total_lower, target, rng);
    if best_sum != target && total_lower >= threshold {
        let (mask, sum, repetitions) =
            approximate_best_subset(&lower, total_lower, threshold, rng);
        best_mask = mask;
        best_sum = sum;
        iterations += repetitions;
    }

    // A single larger coin wins if the approximation stayed loose (no exact match and not
    // even close enough to leave usable change) or if the larger coin is the closer fit.
    if let Some(coin) = lowest_larger {
        if (best_sum != target && best_sum < threshold) || coin.value <= best_sum {
            return Some(Selection { coins: vec![coin], value: coin.value, iterations });
        }
    }

    let coins: Vec<InputCoin> = lower
        .iter()
        .zip(best_mask.iter())
        .filter(|&(_, include)| *include)
        .map(|(&coin, _)| coin)
        .collect();

    if log::log_enabled!(log::Level::Debug) {
        let values: Vec<String> = coins.iter().map(|c| c.value.to_string()).collect();
        debug!("knapsack: best subset [{}] total {}", values.join(", "), best_sum);
    }

    Some(Selection { coins, value: best_sum, iterations })
}

// Double pass stochastic approximation of the smallest subset sum meeting the target.
//
// Pass zero includes each coin with even odds; pass one picks up every coin the first
// pass left out.  Between them the two passes cheaply sample both low and high
// cardinality subsets.  Whenever the running total reaches the target, the last
// inclusion is recorded if it tightened the best sum and then backed out again, so the
// rest of the pass keeps probing for a smaller finisher.  Once a repetition has reached
// the target no further pass starts.
//
// The best mask starts as the full lower set, whose sum the caller has already verified
// to cover the target.
fn approximate_best_subset<R: Rng + ?Sized>(
    coins: &[InputCoin],
    total_lower: Amount,
    target: Amount,
    rng: &mut R,
) -> (Vec<bool>, Amount, u32) {
    let mut best_mask = vec![true; coins.len()];
    let mut best_sum = total_lower;

    let mut included = vec![false; coins.len()];

    let mut repetition = 0;
    while repetition < APPROXIMATION_ITERATIONS && best_sum != target {
        included.fill(false);

        let mut total = Amount::ZERO;
        let mut reached_target = false;
        for pass in 0..2 {
            if reached_target {
                break;
            }

            for i in 0..coins.len() {
                let include = if pass == 0 { rng.gen_bool(0.5) } else { !included[i] };
                if include {
                    // No subset of the lower coins can overflow; their full sum was
                    // computed with checked arithmetic by the caller.
                    total = total.unchecked_add(coins[i].value);
                    included[i] = true;

                    if total >= target {
                        reached_target = true;
                        if total < best_sum {
                            best_sum = total;
                            best_mask.clone_from(&included);
                        }
                        total = total.unchecked_sub(coins[i].value);
                        included[i] = false;
                    }
                }
            }
        }

        repetition += 1;
    }

    (best_mask, best_sum, repetition)
}
