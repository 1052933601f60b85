use bitcoin::Amount;
use criterion::{criterion_group, criterion_main, Criterion};
use utxo_select::{select_coins_bnb, InputCoin};

pub fn criterion_benchmark(c: &mut Criterion) {
    const ONE_BTC: u64 = 100_000_000;

    let utxo_range = ONE_BTC..ONE_BTC + 100_000;

    let utxo_pool: Vec<InputCoin> = utxo_range
        .map(|value| InputCoin {
            value: Amount::from_sat(value),
            fee: Amount::ZERO,
            long_term_fee: Amount::ZERO,
        })
        .collect();

    let target = Amount::from_sat(ONE_BTC + 1);
    let cost_of_change = Amount::from_sat(50_000_000);

    c.bench_function("find_solution_with_large_utxo_pool", |b| {
        b.iter(|| select_coins_bnb(target, cost_of_change, Amount::ZERO, &utxo_pool))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
