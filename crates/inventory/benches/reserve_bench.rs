use chrono::Duration;
use common::OrderId;
use criterion::{Criterion, criterion_group, criterion_main};
use inventory::{
    InMemoryInventoryStore, InventoryEngine, ReservationLine, ReservationService, VariantKey,
};

fn bench_reserve_single_line(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("inventory/reserve_single_line", |b| {
        b.iter(|| {
            rt.block_on(async {
                let engine =
                    InventoryEngine::new(InMemoryInventoryStore::new(), Duration::minutes(15));
                let key = VariantKey::new("p_1", "v_1");
                engine.set_stock(&key, 1_000).await.unwrap();
                engine
                    .reserve(
                        OrderId::new(),
                        vec![ReservationLine { key, quantity: 1 }],
                        "bench",
                    )
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_reserve_commit_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("inventory/reserve_commit_cycle", |b| {
        b.iter(|| {
            rt.block_on(async {
                let engine =
                    InventoryEngine::new(InMemoryInventoryStore::new(), Duration::minutes(15));
                let key = VariantKey::new("p_1", "v_1");
                engine.set_stock(&key, 1_000).await.unwrap();
                let id = engine
                    .reserve(
                        OrderId::new(),
                        vec![ReservationLine { key, quantity: 1 }],
                        "bench",
                    )
                    .await
                    .unwrap();
                engine.commit(id).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_reserve_single_line, bench_reserve_commit_cycle);
criterion_main!(benches);
