use arbitrary::Arbitrary;
use bitcoin::Amount;
use honggfuzz::fuzz;
use rand::thread_rng;
use utxo_select::{select_coins_knapsack, InputCoin};

#[derive(Arbitrary, Debug)]
pub struct Params {
    target: u64,
    coins: Vec<(u64, u64, u64)>,
}

fn main() {
    loop {
        fuzz!(|params: Params| {
            let Params { target, coins } = params;

            let mut pool: Vec<InputCoin> = coins
                .into_iter()
                .map(|(value, fee, long_term_fee)| InputCoin {
                    value: Amount::from_sat(value),
                    fee: Amount::from_sat(fee),
                    long_term_fee: Amount::from_sat(long_term_fee),
                })
                .collect();

            select_coins_knapsack(Amount::from_sat(target), &mut pool, &mut thread_rng());
        });
    }
}
