use arbitrary::Arbitrary;
use bitcoin::Amount;
use honggfuzz::fuzz;
use utxo_select::{select_coins_bnb, InputCoin};

#[derive(Arbitrary, Debug)]
pub struct Params {
    target: u64,
    cost_of_change: u64,
    not_input_fees: u64,
    coins: Vec<(u64, u64, u64)>,
}

fn main() {
    loop {
        fuzz!(|params: Params| {
            let Params { target, cost_of_change, not_input_fees, coins } = params;

            // The search asserts on candidates with a non-positive effective value,
            // filtering is the caller's job.
            let pool: Vec<InputCoin> = coins
                .into_iter()
                .map(|(value, fee, long_term_fee)| InputCoin {
                    value: Amount::from_sat(value),
                    fee: Amount::from_sat(fee),
                    long_term_fee: Amount::from_sat(long_term_fee),
                })
                .filter(|coin| coin.effective_value().map_or(false, |ev| ev.is_positive()))
                .collect();

            select_coins_bnb(
                Amount::from_sat(target),
                Amount::from_sat(cost_of_change),
                Amount::from_sat(not_input_fees),
                &pool,
            );
        });
    }
}
