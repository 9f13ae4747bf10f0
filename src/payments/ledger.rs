//! Donation ledger with JSON persistence.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use alloy::primitives::{Address, TxHash};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::observability::metrics;
use crate::payments::recorder::{DonationRecorder, RecordOutcome, RecorderError};
use crate::payments::types::{EntityId, TransferObserved};

/// One recorded inbound transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationRecord {
    pub entity_id: EntityId,
    pub from: Address,
    pub amount: Decimal,
    pub token: Address,
    pub block_number: u64,
    /// Unix seconds.
    pub recorded_at: u64,
}

impl From<&TransferObserved> for DonationRecord {
    fn from(event: &TransferObserved) -> Self {
        Self {
            entity_id: event.entity_id.clone(),
            from: event.from,
            amount: event.amount,
            token: event.token,
            block_number: event.block_number,
            recorded_at: event.observed_at,
        }
    }
}

/// Per-entity totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTotals {
    pub donations: usize,
    pub amount: Decimal,
}

/// Donations keyed by transaction hash, so replayed events are absorbed.
#[derive(Clone, Default)]
pub struct DonationLedger {
    inner: Arc<DashMap<TxHash, DonationRecord>>,
    persistence_path: Option<String>,
}

impl DonationLedger {
    pub fn new(persistence_path: Option<String>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
        }
    }

    /// Load from file if it exists; an absent file yields an empty ledger.
    pub fn load_from_file(path: &str) -> std::io::Result<Self> {
        let ledger = Self::new(Some(path.to_string()));
        if Path::new(path).exists() {
            let reader = BufReader::new(File::open(path)?);
            let map: HashMap<TxHash, DonationRecord> = serde_json::from_reader(reader)?;
            for (k, v) in map {
                ledger.inner.insert(k, v);
            }
            tracing::info!(path, donations = ledger.inner.len(), "Loaded donation ledger");
        }
        Ok(ledger)
    }

    /// Save to the persistence path, if any.
    pub fn save_to_file(&self) -> std::io::Result<()> {
        if let Some(path) = &self.persistence_path {
            let writer = BufWriter::new(File::create(path)?);
            let map: HashMap<_, _> = self
                .inner
                .iter()
                .map(|r| (*r.key(), r.value().clone()))
                .collect();
            serde_json::to_writer(writer, &map)?;
            tracing::info!(path, donations = map.len(), "Saved donation ledger");
        }
        Ok(())
    }

    /// Insert unless `tx_hash` is already recorded.
    pub fn upsert(&self, tx_hash: TxHash, record: DonationRecord) -> RecordOutcome {
        match self.inner.entry(tx_hash) {
            Entry::Occupied(_) => RecordOutcome::Duplicate,
            Entry::Vacant(entry) => {
                entry.insert(record);
                RecordOutcome::Inserted
            }
        }
    }

    pub fn get(&self, tx_hash: &TxHash) -> Option<DonationRecord> {
        self.inner.get(tx_hash).map(|r| r.value().clone())
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }

    /// Every donation to `entity_id`, oldest block first.
    pub fn donations_for(&self, entity_id: &EntityId) -> Vec<(TxHash, DonationRecord)> {
        let mut records: Vec<_> = self
            .inner
            .iter()
            .filter(|r| &r.value().entity_id == entity_id)
            .map(|r| (*r.key(), r.value().clone()))
            .collect();
        records.sort_by_key(|(_, record)| record.block_number);
        records
    }

    pub fn totals(&self) -> HashMap<EntityId, EntityTotals> {
        let mut totals: HashMap<EntityId, EntityTotals> = HashMap::new();
        for r in self.inner.iter() {
            let entry = totals.entry(r.value().entity_id.clone()).or_default();
            entry.donations += 1;
            entry.amount += r.value().amount;
        }
        totals
    }
}

#[async_trait]
impl DonationRecorder for DonationLedger {
    async fn record(&self, event: &TransferObserved) -> Result<RecordOutcome, RecorderError> {
        let outcome = self.upsert(event.tx_hash, DonationRecord::from(event));
        if outcome == RecordOutcome::Inserted {
            metrics::record_donation_recorded();
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn event(tx: u8, entity: EntityId, amount: i64, block: u64) -> TransferObserved {
        TransferObserved {
            entity_id: entity,
            tx_hash: TxHash::repeat_byte(tx),
            from: address!("1111111111111111111111111111111111111111"),
            to: address!("2222222222222222222222222222222222222222"),
            amount: Decimal::from(amount),
            token: address!("dAC17F958D2ee523a2206206994597C13D831ec7"),
            block_number: block,
            log_index: Some(0),
            observed_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn test_replayed_event_is_duplicate() {
        let ledger = DonationLedger::new(None);
        let e = event(1, EntityId::campaign("7"), 50, 10);

        assert_eq!(ledger.record(&e).await.unwrap(), RecordOutcome::Inserted);
        assert_eq!(ledger.record(&e).await.unwrap(), RecordOutcome::Duplicate);
        assert_eq!(ledger.count(), 1);
    }

    #[tokio::test]
    async fn test_totals_and_listing() {
        let ledger = DonationLedger::new(None);
        ledger.record(&event(1, EntityId::campaign("7"), 50, 12)).await.unwrap();
        ledger.record(&event(2, EntityId::campaign("7"), 25, 11)).await.unwrap();
        ledger.record(&event(3, EntityId::Platform, 100, 13)).await.unwrap();

        let totals = ledger.totals();
        assert_eq!(totals[&EntityId::campaign("7")].donations, 2);
        assert_eq!(totals[&EntityId::campaign("7")].amount, Decimal::from(75));
        assert_eq!(totals[&EntityId::Platform].amount, Decimal::from(100));

        let listed = ledger.donations_for(&EntityId::campaign("7"));
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].1.block_number, 11);
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let path = path.to_str().unwrap();

        let ledger = DonationLedger::new(Some(path.to_string()));
        let e = event(9, EntityId::campaign("3"), 42, 99);
        ledger.upsert(e.tx_hash, DonationRecord::from(&e));
        ledger.save_to_file().unwrap();

        let loaded = DonationLedger::load_from_file(path).unwrap();
        let record = loaded.get(&e.tx_hash).unwrap();
        assert_eq!(record.amount, Decimal::from(42));
        assert_eq!(record.entity_id, EntityId::campaign("3"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let ledger = DonationLedger::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(ledger.count(), 0);
    }
}
