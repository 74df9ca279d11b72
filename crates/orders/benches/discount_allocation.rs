use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use atelier_core::{Money, Percentage};
use atelier_orders::{ItemKind, PricedLine, allocate_discount};

fn lines(count: usize) -> Vec<PricedLine> {
    (0..count)
        .map(|i| PricedLine {
            name: format!("item-{i}"),
            kind: ItemKind::new((i % 28) as u8 + 1).unwrap(),
            // Uneven costs so every run exercises the rounding correction.
            cost: Money::from_cents(5_000 + (i as i64 * 3_337) % 900_000),
        })
        .collect()
}

fn bench_allocation_by_item_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("discount_allocation");
    let percentage = Percentage::new(33).unwrap();

    for count in [1usize, 10, 100, 1_000] {
        let input = lines(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| allocate_discount(black_box(input), black_box(percentage)).unwrap());
        });
    }

    group.finish();
}

fn bench_per_installment_pricing(c: &mut Criterion) {
    let input = lines(25);
    let percentage = Percentage::new(15).unwrap();

    c.bench_function("per_installment_total", |b| {
        b.iter(|| {
            let distribution = allocate_discount(black_box(&input), percentage).unwrap();
            distribution.per_installment(black_box(6))
        });
    });
}

criterion_group!(benches, bench_allocation_by_item_count, bench_per_installment_pricing);
criterion_main!(benches);
