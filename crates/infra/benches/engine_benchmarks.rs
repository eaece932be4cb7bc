use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rust_decimal_macros::dec;
use tokio::runtime::Runtime;

use tradeledger_core::{CompanyId, EngineContext, FinancialYear, PartyId, Quantity, UserId};
use tradeledger_events::InMemoryAuditSink;
use tradeledger_infra::TransferOrchestrator;
use tradeledger_infra::sequence::{
    DocumentType, InMemorySequenceGenerator, SequenceGenerator, SequenceScope,
};
use tradeledger_infra::store::InMemoryLedgerStore;
use tradeledger_inventory::{RecipientRequest, TransferRequest};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn context() -> EngineContext {
    EngineContext::new(
        CompanyId::new(),
        FinancialYear::parse("2025").unwrap(),
        UserId::new(),
    )
}

fn bench_sequence_issuance(c: &mut Criterion) {
    let rt = runtime();
    let generator = InMemorySequenceGenerator::new();
    let ctx = context();
    let scope = SequenceScope::new(
        ctx.company_id(),
        ctx.financial_year().clone(),
        DocumentType::Challan,
    );

    let mut group = c.benchmark_group("sequence");
    group.throughput(Throughput::Elements(1));
    group.bench_function("next_single_scope", |b| {
        b.iter(|| rt.block_on(async { black_box(generator.next(&scope).await.unwrap()) }))
    });
    group.finish();
}

fn bench_transfer_creation(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("transfer");

    for recipients in [1usize, 4, 16] {
        let ctx = context();
        let orchestrator = TransferOrchestrator::new(
            InMemoryLedgerStore::new(),
            InMemorySequenceGenerator::new(),
            InMemoryAuditSink::new(),
        );
        // Large enough that no iteration runs the source dry.
        let source = rt
            .block_on(orchestrator.record_purchase(
                &ctx,
                PartyId::new(),
                Quantity::new(i64::MAX / 2, dec!(0)),
            ))
            .unwrap()
            .id_typed();
        let request = TransferRequest {
            source_stock_unit_id: source,
            recipients: (0..recipients)
                .map(|_| RecipientRequest {
                    party_id: PartyId::new(),
                    boxes: 1,
                    meters: dec!(0),
                })
                .collect(),
            reason: None,
            notes: None,
        };

        group.throughput(Throughput::Elements(recipients as u64));
        group.bench_with_input(
            BenchmarkId::new("create_transfer", recipients),
            &request,
            |b, request| {
                b.iter(|| {
                    rt.block_on(async {
                        black_box(
                            orchestrator
                                .create_transfer(&ctx, request.clone())
                                .await
                                .unwrap(),
                        )
                    })
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_sequence_issuance, bench_transfer_creation);
criterion_main!(benches);
