// Copyright 2026 The scand Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! An in-memory [`Namespace`] good enough to exercise every scan code path
//! in tests without a real storage engine behind it.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::digest::Digest;
use crate::errors::Result;
use crate::record::Record;
use crate::traits::{
    InternalTransaction, Namespace, PartitionTree, RecordStore, Reservation, SubmitOutcome,
    TransactionSubmitter,
};

#[derive(Default)]
struct MemTree {
    digests: RwLock<Vec<Digest>>,
}

impl PartitionTree for MemTree {
    fn len(&self) -> usize {
        self.digests.read().len()
    }

    fn reduce_from(&self, start: Option<Digest>, visit: &mut dyn FnMut(Digest) -> bool) {
        let digests = self.digests.read();
        let iter = digests.iter().copied();
        let iter: Box<dyn Iterator<Item = Digest>> = match start {
            Some(s) => Box::new(iter.filter(move |d| *d >= s)),
            None => Box::new(iter),
        };
        for d in iter {
            if !visit(d) {
                break;
            }
        }
    }
}

struct MemReservation {
    partition_id: u16,
    cluster_key: u64,
    tree: Option<Arc<MemTree>>,
}

impl Reservation for MemReservation {
    fn partition_id(&self) -> u16 {
        self.partition_id
    }

    fn tree(&self) -> Option<&dyn PartitionTree> {
        self.tree.as_deref().map(|t| t as &dyn PartitionTree)
    }

    fn cluster_key(&self) -> u64 {
        self.cluster_key
    }
}

#[derive(Default)]
struct MemStore {
    records: RwLock<BTreeMap<Digest, Record>>,
}

impl RecordStore for MemStore {
    fn open(&self, digest: Digest) -> Result<Option<Record>> {
        Ok(self.records.read().get(&digest).cloned())
    }
}

/// A single-node, single-set namespace held entirely in memory. Partitions
/// unavailable to this node are modeled by omitting them from `trees`
/// rather than by a separate flag, matching how a real reservation lookup
/// would simply come back empty.
pub struct MemNamespace {
    name: String,
    background_scan_max_rps: u32,
    sets: RwLock<BTreeMap<String, u16>>,
    trees: RwLock<BTreeMap<u16, Arc<MemTree>>>,
    store: MemStore,
    aggregation: Arc<dyn crate::traits::AggregationRuntime>,
    submitter: Arc<MemTransactionSubmitter>,
}

/// The namespace's built-in aggregation entry point: emits the digest count
/// it was handed as a single big-endian `u64` value. Good enough to drive
/// an aggregation scan end to end without a real UDF runtime.
struct CountDigests;

impl crate::traits::AggregationRuntime for CountDigests {
    fn run(
        &self,
        _namespace: &str,
        digests: &[Digest],
        _reservation: &dyn Reservation,
        emit: &mut dyn FnMut(&[u8]) -> Result<()>,
    ) -> Result<()> {
        emit(&(digests.len() as u64).to_be_bytes())
    }
}

impl MemNamespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            background_scan_max_rps: 20_000,
            sets: RwLock::new(BTreeMap::new()),
            trees: RwLock::new(BTreeMap::new()),
            store: MemStore::default(),
            aggregation: Arc::new(CountDigests),
            submitter: Arc::new(MemTransactionSubmitter::new()),
        }
    }

    pub fn with_background_scan_max_rps(mut self, rps: u32) -> Self {
        self.background_scan_max_rps = rps;
        self
    }

    pub fn with_aggregation_runtime(
        mut self,
        runtime: Arc<dyn crate::traits::AggregationRuntime>,
    ) -> Self {
        self.aggregation = runtime;
        self
    }

    /// Registers a named set so `resolve_set` can find it. Unregistered
    /// names stay unknown, as a real namespace's set table would report.
    pub fn register_set(&self, name: impl Into<String>, set_id: u16) {
        self.sets.write().insert(name.into(), set_id);
    }

    /// Inserts a record, creating its owning partition tree and reservation
    /// slot on first use. `n_partitions` controls how the digest maps to a
    /// partition id.
    pub fn seed(&self, record: Record, n_partitions: u16) {
        let pid = record.digest.partition_id(n_partitions);
        let tree = self
            .trees
            .write()
            .entry(pid)
            .or_insert_with(|| Arc::new(MemTree::default()))
            .clone();
        tree.digests.write().push(record.digest);
        self.store.records.write().insert(record.digest, record);
    }

    /// Seeds `count` records with random digests, live and with an empty bin
    /// set, spread across the ring by whatever `Digest::partition_id` maps
    /// them to. Good for the sample-max margin tests, which need a
    /// population distributed across partitions rather than one synthetic
    /// digest per call site.
    pub fn seed_random(&self, count: u32, n_partitions: u16) {
        use rand::RngCore;
        let mut rng = rand::rng();
        for _ in 0..count {
            let mut raw = [0u8; Digest::LEN];
            rng.fill_bytes(&mut raw);
            self.seed(
                Record {
                    digest: Digest(raw),
                    meta: crate::record::RecordMeta {
                        generation: 1,
                        expire_at_ms: None,
                        tombstone: false,
                        set_id: None,
                    },
                    bins: Vec::new(),
                },
                n_partitions,
            );
        }
    }

    /// Removes a partition from this node's reservation map, simulating a
    /// migration that left it mastered elsewhere.
    pub fn revoke_partition(&self, partition_id: u16) {
        self.trees.write().remove(&partition_id);
    }
}

impl Namespace for MemNamespace {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve_set(&self, name: &str) -> Option<u16> {
        self.sets.read().get(name).copied()
    }

    fn reservation(&self, partition_id: u16) -> Option<Box<dyn Reservation>> {
        let tree = self.trees.read().get(&partition_id).cloned();
        Some(Box::new(MemReservation {
            partition_id,
            cluster_key: scand_config::cluster::current_cluster_key(),
            tree,
        }))
    }

    fn records(&self) -> &dyn RecordStore {
        &self.store
    }

    fn background_scan_max_rps(&self) -> u32 {
        self.background_scan_max_rps
    }

    fn aggregation_runtime(&self) -> Arc<dyn crate::traits::AggregationRuntime> {
        self.aggregation.clone()
    }

    fn transaction_submitter(&self) -> Arc<dyn TransactionSubmitter> {
        self.submitter.clone()
    }
}

/// Records every submitted internal transaction instead of applying it
/// anywhere; good enough to drive and assert on a background scan's
/// completion-callback wiring.
#[derive(Default)]
pub struct MemTransactionSubmitter {
    submitted: RwLock<Vec<(String, InternalTransaction)>>,
}

impl MemTransactionSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.read().len()
    }
}

impl TransactionSubmitter for MemTransactionSubmitter {
    fn submit(&self, namespace: &str, txn: InternalTransaction) -> Result<SubmitOutcome> {
        self.submitted
            .write()
            .push((namespace.to_string(), txn));
        Ok(SubmitOutcome::Applied)
    }
}
