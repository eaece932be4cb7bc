use std::sync::Arc;

use tradeledger_events::{AuditSink, TracingAuditSink};
use tradeledger_infra::sequence::{
    InMemorySequenceGenerator, PostgresSequenceGenerator, SequenceGenerator,
};
use tradeledger_infra::store::{
    InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError,
};
use tradeledger_infra::{EngineConfig, SettlementEngine, TransferOrchestrator};

pub type DynStore = Arc<dyn LedgerStore>;
pub type DynSequences = Arc<dyn SequenceGenerator>;
pub type DynAudit = Arc<dyn AuditSink>;

/// Engine services shared by every handler.
pub struct AppServices {
    pub transfers: TransferOrchestrator<DynStore, DynSequences, DynAudit>,
    pub settlement: SettlementEngine<DynStore, DynSequences, DynAudit>,
}

impl AppServices {
    pub fn new(
        store: DynStore,
        sequences: DynSequences,
        audit: DynAudit,
        number_width: usize,
    ) -> Self {
        Self {
            transfers: TransferOrchestrator::new(store.clone(), sequences.clone(), audit.clone())
                .with_number_width(number_width),
            settlement: SettlementEngine::new(store, sequences, audit)
                .with_number_width(number_width),
        }
    }

    /// In-memory wiring (dev/test).
    pub fn in_memory(config: &EngineConfig) -> Self {
        Self::new(
            Arc::new(InMemoryLedgerStore::with_lock_timeout(
                config.transaction_timeout,
            )),
            Arc::new(InMemorySequenceGenerator::new()),
            Arc::new(TracingAuditSink),
            config.document_number_width,
        )
    }
}

/// Wire services from configuration: Postgres when `DATABASE_URL` is set,
/// in-memory otherwise.
pub async fn build_services(config: &EngineConfig) -> Result<AppServices, StoreError> {
    let Some(url) = config.database_url.as_deref() else {
        return Ok(AppServices::in_memory(config));
    };

    let store = PostgresLedgerStore::connect(
        url,
        config.database_max_connections,
        config.transaction_timeout,
    )
    .await?;
    store.apply_schema().await?;
    let sequences = PostgresSequenceGenerator::new(store.pool().clone());
    tracing::info!(
        max_connections = config.database_max_connections,
        "postgres ledger store ready"
    );

    Ok(AppServices::new(
        Arc::new(store),
        Arc::new(sequences),
        Arc::new(TracingAuditSink),
        config.document_number_width,
    ))
}
