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

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::error::AbandonReason;
use crate::request::PartitionSelector;

pub type TrId = i64;

/// Fields common to every scan flavor, embedded by composition in each job
/// variant rather than by struct-prefix layout.
pub struct JobCore {
    pub trid: TrId,
    pub namespace: String,
    pub set_name: Option<String>,
    pub set_id: Option<u16>,
    pub partitions: Option<Vec<PartitionSelector>>,
    pub rps: u32,
    pub client_identity: String,

    abandoned: AtomicU8,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub filtered_meta: AtomicU64,
    pub filtered_bins: AtomicU64,
}

impl JobCore {
    pub fn new(
        trid: TrId,
        namespace: String,
        set_name: Option<String>,
        set_id: Option<u16>,
        partitions: Option<Vec<PartitionSelector>>,
        rps: u32,
        client_identity: String,
    ) -> Self {
        Self {
            trid,
            namespace,
            set_name,
            set_id,
            partitions,
            rps,
            client_identity,
            abandoned: AtomicU8::new(AbandonReason::None as u8),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            filtered_meta: AtomicU64::new(0),
            filtered_bins: AtomicU64::new(0),
        }
    }

    pub fn abandoned(&self) -> Option<AbandonReason> {
        match self.abandoned.load(Ordering::Relaxed) {
            0 => None,
            1 => Some(AbandonReason::Parameter),
            2 => Some(AbandonReason::NotFound),
            3 => Some(AbandonReason::Forbidden),
            4 => Some(AbandonReason::UnsupportedFeature),
            5 => Some(AbandonReason::BinName),
            6 => Some(AbandonReason::ClusterKeyMismatch),
            7 => Some(AbandonReason::UserAbort),
            8 => Some(AbandonReason::ResponseTimeout),
            9 => Some(AbandonReason::ResponseError),
            _ => Some(AbandonReason::Unknown),
        }
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Relaxed) != AbandonReason::None as u8
    }

    /// First writer wins; later callers racing to abandon the same job for
    /// a different reason are silently ignored, matching the "written once"
    /// contract.
    pub fn abandon(&self, reason: AbandonReason) {
        let _ = self.abandoned.compare_exchange(
            AbandonReason::None as u8,
            reason as u8,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    pub fn total_visited(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
            + self.filtered_meta.load(Ordering::Relaxed)
            + self.filtered_bins.load(Ordering::Relaxed)
    }
}

/// A point-in-time snapshot of one job's counters, returned by `info()`.
#[derive(Debug, Clone)]
pub struct ScanStat {
    pub trid: TrId,
    pub kind: &'static str,
    pub abandoned: Option<AbandonReason>,
    pub succeeded: u64,
    pub failed: u64,
    pub filtered_meta: u64,
    pub filtered_bins: u64,
    pub net_io_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abandon_is_first_writer_wins() {
        let core = JobCore::new(1, "ns".into(), None, None, None, 0, "client".into());
        core.abandon(AbandonReason::ResponseError);
        core.abandon(AbandonReason::UserAbort);
        assert_eq!(core.abandoned(), Some(AbandonReason::ResponseError));
    }

    #[test]
    fn counters_feed_total_visited() {
        let core = JobCore::new(1, "ns".into(), None, None, None, 0, "client".into());
        core.succeeded.fetch_add(2, Ordering::Relaxed);
        core.filtered_meta.fetch_add(3, Ordering::Relaxed);
        assert_eq!(core.total_visited(), 5);
    }
}
