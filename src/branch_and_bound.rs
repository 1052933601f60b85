// SPDX-License-Identifier: CC0-1.0
//
//! Branch and Bound Coin Selection.
//!
//! This module introduces the Branch and Bound Coin Selection Algorithm.

use bitcoin::amount::CheckedSum;
use bitcoin::Amount;
use bitcoin::SignedAmount;
use log::debug;

use crate::{InputCoin, Selection};

// Total_Tries in Core:
// https://github.com/bitcoin/bitcoin/blob/1d9da8da309d1dbf9aef15eb8dc43b4a2dc3d309/src/wallet/coinselection.cpp#L74
const TOTAL_TRIES: u32 = 100_000;

/// Select coins bnb performs a depth first branch and bound search.  The search traverses a
/// binary tree with a maximum depth n where n is the size of the candidate pool.
///
/// See also core: <https://github.com/bitcoin/bitcoin/blob/f3bc1a72825fe2b51f4bc20e004cef464f05b965/src/wallet/coinselection.cpp>
///
/// Returns a [`Selection`] whose coins meet or exceed `target + not_input_fees` when their
/// effective values are summed.  The sum will not exceed that target by more than
/// `cost_of_change`, the value that would be lost to a change output.
///
/// Among the selections inside that window, the search keeps the one with the lowest waste
/// score.  Waste is the cost of spending the chosen inputs now instead of at the long term
/// fee rate, plus whatever the selection overshoots the target by.  When two selections tie
/// on waste, the one found first wins.
///
/// This search is designed to never panic or overflow on well formed candidates.  If an
/// arithmetic bound would be exceeded, None is returned.  Candidates must have a strictly
/// positive effective value; handing the search a candidate that violates this is a caller
/// bug and asserts.
///
/// # Returns
/// * `Some(Selection)` where the selection contains a non-empty coin set on match.
/// * `None` No match found or un-expected results.
///
/// # Arguments
/// * target: Target spend `Amount`
/// * cost_of_change: The `Amount` needed to produce a change output
/// * not_input_fees: Fixed fee `Amount` not attributable to any candidate (outputs, overhead)
/// * pool: The candidate coins from which to choose a selection

// This search explores a binary tree.  The left branch of each node is the inclusion branch
// and the right branch is the exclusion branch.
//      o
//     / \
//    I   E
//
// Candidates are sorted by descending effective value and the inclusion branch is always
// explored first, so high value coins are committed early and the first match is biased
// toward few inputs.  The running state at each node is the sum of included effective
// values, the sum of effective values still undecided (the lookahead), and the accumulated
// waste of the included coins.
//
// A subtree is abandoned when any of the bounds fail:
//
//  1) The included sum plus the lookahead cannot reach the target.  Nothing below this
//     node can succeed.
//
//  2) The included sum exceeds target + cost_of_change.  Every deeper inclusion only
//     overshoots further.
//
//  3) A solution has already been recorded with a lower waste score and each additional
//     input raises the accumulated waste.  The second half of the condition only holds
//     when fees exceed long term fees; in a low fee environment an extra input lowers
//     waste, so the bound must stay disabled or it would cut off improving branches.
//
// When the included sum lands inside the window, the waste score (accumulated input waste
// plus the overshoot) is compared against the best recorded so far and the search
// continues looking for something tighter.
//
// Backtracking walks from the current node toward the root.  A position whose bit is
// unset was excluded on the way down, so its value is returned to the lookahead and the
// walk continues.  The first set bit found is a coin whose exclusion branch has not been
// tried yet, so the coin is flipped to excluded and the descent resumes below it.  Walking
// past the root means the tree is exhausted.
//
// One further cut: if the previous position holds an excluded coin with the same effective
// value and the same fee, including the current coin reproduces a subtree that was already
// explored and rejected, so the inclusion branch is skipped outright.
pub fn select_coins_bnb(
    target: Amount,
    cost_of_change: Amount,
    not_input_fees: Amount,
    pool: &[InputCoin],
) -> Option<Selection> {
    if pool.is_empty() {
        debug!("bnb: empty candidate pool");
        return None;
    }

    let actual_target = target.checked_add(not_input_fees)?;
    let upper_bound = actual_target.checked_add(cost_of_change)?;

    // Creates a tuple of (effective_value, waste, input_coin).
    let mut coins: Vec<(Amount, SignedAmount, InputCoin)> = Vec::with_capacity(pool.len());
    for coin in pool {
        let eff_value = coin.effective_value()?;
        assert!(
            eff_value.is_positive(),
            "candidates with non-positive effective value must be filtered before the search"
        );
        coins.push((eff_value.to_unsigned().unwrap(), coin.waste()?, *coin));
    }

    // Descending sort by effective value.  Coins with equal effective value end up
    // adjacent, which the duplicate subtree cut below relies on.
    coins.sort_by(|a, b| b.0.cmp(&a.0));

    let mut available_value = coins.iter().map(|&(eff_value, _, _)| eff_value).checked_sum()?;

    if available_value < actual_target {
        debug!("bnb: available value {} is below target {}", available_value, actual_target);
        return None;
    }

    let mut value = Amount::ZERO;
    let mut current_waste = SignedAmount::ZERO;
    let mut best_waste = SignedAmount::MAX_MONEY;

    let mut selection: Vec<bool> = Vec::with_capacity(coins.len());
    let mut best_selection: Vec<bool> = Vec::new();

    let mut iteration: u32 = 0;
    while iteration < TOTAL_TRIES {
        iteration += 1;

        let mut backtrack = false;

        // unchecked_add is used here for performance.  Before entering the search loop,
        // all candidate effective values are summed and checked for overflow.  Since there
        // was no overflow then, no subset sum can overflow now.
        if value.unchecked_add(available_value) < actual_target
            // The window of acceptable selections is bounded above by the cost of creating
            // and later spending a change output.  Overshooting the target by more than
            // that is worse than simply making change.
            || value > upper_bound
            // A more wasteful selection than the recorded best cannot improve further down
            // this branch, but only while every additional input raises the waste score.
            // The sign of the first coin's waste decides, the pool shares one fee
            // environment.
            || (current_waste > best_waste && coins[0].1.is_positive())
        {
            backtrack = true;
        }
        // * value meets or exceeds the target.
        //   Record the solution if it beats the recorded best, then continue searching.
        else if value >= actual_target {
            backtrack = true;

            let v = value.to_signed().ok()?;
            let t = actual_target.to_signed().ok()?;
            let excess = v.checked_sub(t)?;
            current_waste = current_waste.checked_add(excess)?;

            // Strictly better only.  A later selection that ties on waste does not
            // replace the one found first.
            if current_waste < best_waste {
                best_selection.clone_from(&selection);
                best_selection.resize(coins.len(), false);
                best_waste = current_waste;
            }

            current_waste = current_waste.checked_sub(excess)?;
        }

        // * Step back to the last included coin and take its exclusion branch.
        if backtrack {
            // A trailing unset bit marks a coin that was excluded on the way down; its
            // value returns to the lookahead as the walk passes it.
            while selection.last() == Some(&false) {
                selection.pop();
                available_value = available_value.unchecked_add(coins[selection.len()].0);
            }

            match selection.last_mut() {
                // Walked back past the first coin, the tree is exhausted.
                None => break,
                // This coin was always included first, try excluding now.
                Some(selected) => *selected = false,
            }

            let (eff_value, coin_waste, _) = coins[selection.len() - 1];
            value = value.checked_sub(eff_value)?;
            current_waste = current_waste.checked_sub(coin_waste)?;
        }
        // * Add the next coin to the inclusion branch.
        else {
            let depth = selection.len();
            let (eff_value, coin_waste, _) = coins[depth];

            // unchecked_sub is used here for performance.  The bounds for available_value
            // are at most the sum of all candidates and at least zero.
            available_value = available_value.unchecked_sub(eff_value);

            if depth > 0
                && !selection[depth - 1]
                && eff_value == coins[depth - 1].0
                && coins[depth].2.fee == coins[depth - 1].2.fee
            {
                // Including this coin reproduces a subtree already explored from its
                // twin, take the exclusion branch directly.
                selection.push(false);
            } else {
                selection.push(true);
                value = value.unchecked_add(eff_value);
                current_waste = current_waste.checked_add(coin_waste)?;
            }
        }
    }

    if best_selection.is_empty() {
        if iteration >= TOTAL_TRIES {
            debug!("bnb: iteration limit {} reached without a match", TOTAL_TRIES);
        } else {
            debug!("bnb: search space exhausted without a match");
        }
        return None;
    }

    let mut value_ret = Amount::ZERO;
    let mut out_set = Vec::new();
    for (include, &(_, _, coin)) in best_selection.iter().zip(coins.iter()) {
        if *include {
            value_ret = value_ret.checked_add(coin.value)?;
            out_set.push(coin);
        }
    }

    debug!("bnb: selected {} coins, waste score {}", out_set.len(), best_waste);
    Some(Selection { coins: out_set, value: value_ret, iterations: iteration })
}
