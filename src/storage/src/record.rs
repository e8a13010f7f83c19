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

use bytes::Bytes;

use crate::digest::Digest;

/// Per-record bookkeeping kept alongside the payload. Mirrors the small set
/// of flags a scan needs to decide whether a record counts as "live".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMeta {
    pub generation: u64,
    pub expire_at_ms: Option<i64>,
    pub tombstone: bool,
    /// `None` means the record belongs to no named set (whole-namespace
    /// scans never filter on it).
    pub set_id: Option<u16>,
}

impl RecordMeta {
    pub fn is_live(&self, now_ms: i64) -> bool {
        if self.tombstone {
            return false;
        }
        match self.expire_at_ms {
            Some(t) => t > now_ms,
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Record {
    pub digest: Digest,
    pub meta: RecordMeta,
    pub bins: Vec<(String, Bytes)>,
}

impl Record {
    pub fn value_size(&self) -> usize {
        self.bins.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}
