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

//! Decodes the optional fields of an incoming scan message. The wire layout
//! is two leading flag bytes (which optional fields follow, and which
//! scan-type bits are set) followed by each present field in a fixed order,
//! mirroring the big-endian, length-prefixed style `ingester::entry::Entry`
//! uses for its own message framing.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};
use scand_config::config::N_PARTITIONS;
use scand_storage::Digest;

use crate::error::{Result, ScanError};

const FLAG_SET: u8 = 1 << 0;
const FLAG_SCAN_OPTIONS: u8 = 1 << 1;
const FLAG_PARTITION_LIST: u8 = 1 << 2;
const FLAG_DIGEST_LIST: u8 = 1 << 3;
const FLAG_SAMPLE_MAX: u8 = 1 << 4;
const FLAG_RPS: u8 = 1 << 5;
const FLAG_SOCKET_TIMEOUT: u8 = 1 << 6;
const FLAG_PREDICATE: u8 = 1 << 7;

const FLAG2_IS_UDF: u8 = 1 << 0;
const FLAG2_WRITE: u8 = 1 << 1;
const FLAG2_UDF_OP_PRESENT: u8 = 1 << 2;
const FLAG2_UDF_OP_AGGREGATE: u8 = 1 << 3;
const FLAG2_DURABLE_DELETE: u8 = 1 << 4;
const FLAG2_OP_LIST_HAS_READ: u8 = 1 << 5;
const FLAG2_BIN_NAMES: u8 = 1 << 6;
const FLAG2_META_ONLY: u8 = 1 << 7;

/// `flags2` ran out of bits for the op list's `REPLACE_ONLY` marker, so a
/// third leading byte carries it. Only meaningful when `write` is set.
const FLAG3_REPLACE_ONLY: u8 = 1 << 0;

const MAX_SET_NAME_LEN: usize = 63;
/// Wire-level ceiling only; a bin name within this but over
/// `scand_config::config::BIN_NAME_MAX_LEN` is a `BIN_NAME` job-construction
/// failure, not a parse failure.
const WIRE_BIN_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub priority: u8,
    pub fail_on_cluster_change: bool,
    pub sample_pct: u8,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            fail_on_cluster_change: false,
            sample_pct: 100,
        }
    }
}

/// One partition named explicitly by the client, optionally resuming from a
/// digest rather than the partition's first key.
#[derive(Debug, Clone, Copy)]
pub struct PartitionSelector {
    pub partition_id: u16,
    pub resume_from: Option<Digest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdfOp {
    Aggregate,
    Background,
}

#[derive(Debug, Clone, Copy)]
pub enum ScanKind {
    Basic,
    Aggregation,
    UdfBackground,
    OpsBackground,
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub set_name: Option<String>,
    pub options: ScanOptions,
    pub partitions: Option<Vec<PartitionSelector>>,
    pub sample_max: u64,
    pub rps: u32,
    pub socket_timeout_ms: u32,
    pub predicate: Option<Vec<u8>>,
    pub bin_names: Option<Vec<String>>,
    /// Whole-bin read left off the op list: the basic job serializes record
    /// metadata only.
    pub no_bin_data: bool,

    pub is_udf: bool,
    pub write: bool,
    pub udf_op: Option<UdfOp>,
    pub durable_delete: bool,
    pub op_list_has_read: bool,
    pub op_list_len: usize,
    pub replace_only: bool,
}

impl ScanRequest {
    /// Table from the external-interfaces section: `is_udf` / `write` /
    /// `udf_op` selects one of the four job constructors.
    pub fn scan_kind(&self) -> Result<ScanKind> {
        match (self.is_udf, self.write, self.udf_op) {
            (false, false, _) => Ok(ScanKind::Basic),
            (false, true, _) => Ok(ScanKind::OpsBackground),
            (true, _, Some(UdfOp::Aggregate)) => Ok(ScanKind::Aggregation),
            (true, _, Some(UdfOp::Background)) => Ok(ScanKind::UdfBackground),
            (true, _, None) => Err(ScanError::Parameter("udf scan without udf_op".into())),
        }
    }
}

fn read_len_prefixed_string(cursor: &mut Cursor<&[u8]>, max_len: usize) -> Result<String> {
    let len = cursor
        .read_u8()
        .map_err(|e| ScanError::Parameter(e.to_string()))? as usize;
    if len > max_len {
        return Err(ScanError::Parameter(format!(
            "name length {len} exceeds maximum {max_len}"
        )));
    }
    let mut buf = vec![0u8; len];
    cursor
        .read_exact(&mut buf)
        .map_err(|e| ScanError::Parameter(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| ScanError::Parameter(e.to_string()))
}

/// Decodes a scan message's optional fields. Never allocates a job; callers
/// map a parse failure straight to a pre-admission reply.
pub fn parse_scan_request(bytes: &[u8]) -> Result<ScanRequest> {
    let mut cursor = Cursor::new(bytes);
    let flags = cursor
        .read_u8()
        .map_err(|e| ScanError::Parameter(e.to_string()))?;
    let flags2 = cursor
        .read_u8()
        .map_err(|e| ScanError::Parameter(e.to_string()))?;
    let flags3 = cursor
        .read_u8()
        .map_err(|e| ScanError::Parameter(e.to_string()))?;
    let write = flags2 & FLAG2_WRITE != 0;

    let set_name = if flags & FLAG_SET != 0 {
        let name = read_len_prefixed_string(&mut cursor, MAX_SET_NAME_LEN)?;
        if name.is_empty() { None } else { Some(name) }
    } else {
        None
    };

    let mut options = ScanOptions::default();
    if flags & FLAG_SCAN_OPTIONS != 0 {
        let byte0 = cursor
            .read_u8()
            .map_err(|e| ScanError::Parameter(e.to_string()))?;
        let byte1 = cursor
            .read_u8()
            .map_err(|e| ScanError::Parameter(e.to_string()))?;
        options.priority = byte0 & 0x7F;
        options.fail_on_cluster_change = byte0 & 0x80 != 0;
        if byte1 > 100 {
            return Err(ScanError::Parameter("sample_pct out of range".into()));
        }
        options.sample_pct = byte1;
    }

    let mut partitions: Option<Vec<PartitionSelector>> = None;
    if flags & FLAG_PARTITION_LIST != 0 {
        let count = cursor
            .read_u16::<BigEndian>()
            .map_err(|e| ScanError::Parameter(e.to_string()))?;
        let mut seen = std::collections::HashSet::new();
        let mut list = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let pid = cursor
                .read_u16::<BigEndian>()
                .map_err(|e| ScanError::Parameter(e.to_string()))?;
            if pid >= N_PARTITIONS {
                return Err(ScanError::Parameter(format!(
                    "partition id {pid} out of range"
                )));
            }
            if !seen.insert(pid) {
                return Err(ScanError::Parameter(format!(
                    "duplicate partition id {pid}"
                )));
            }
            list.push(PartitionSelector {
                partition_id: pid,
                resume_from: None,
            });
        }
        partitions = Some(list);
    }

    if flags & FLAG_DIGEST_LIST != 0 {
        let count = cursor
            .read_u16::<BigEndian>()
            .map_err(|e| ScanError::Parameter(e.to_string()))?;
        let list = partitions.get_or_insert_with(Vec::new);
        let mut seen: std::collections::HashSet<u16> =
            list.iter().map(|p| p.partition_id).collect();
        for _ in 0..count {
            let mut raw = [0u8; Digest::LEN];
            cursor
                .read_exact(&mut raw)
                .map_err(|e| ScanError::Parameter(e.to_string()))?;
            let digest = Digest::from_slice(&raw)
                .ok_or_else(|| ScanError::Parameter("malformed digest".into()))?;
            let pid = digest.partition_id(N_PARTITIONS);
            if !seen.insert(pid) {
                return Err(ScanError::Parameter(format!(
                    "duplicate partition id {pid} from digest list"
                )));
            }
            list.push(PartitionSelector {
                partition_id: pid,
                resume_from: Some(digest),
            });
        }
    }

    let mut sample_max = 0u64;
    if flags & FLAG_SAMPLE_MAX != 0 {
        sample_max = cursor
            .read_u64::<BigEndian>()
            .map_err(|e| ScanError::Parameter(e.to_string()))?;
    }

    let mut rps = 0u32;
    if flags & FLAG_RPS != 0 {
        rps = cursor
            .read_u32::<BigEndian>()
            .map_err(|e| ScanError::Parameter(e.to_string()))?;
    }
    if rps == 0 && options.priority == 1 {
        rps = scand_config::config::LOW_PRIORITY_RPS;
    }

    let mut socket_timeout_ms = 0u32;
    if flags & FLAG_SOCKET_TIMEOUT != 0 {
        socket_timeout_ms = cursor
            .read_u32::<BigEndian>()
            .map_err(|e| ScanError::Parameter(e.to_string()))?;
    }

    let predicate = if flags & FLAG_PREDICATE != 0 {
        let len = cursor
            .read_u32::<BigEndian>()
            .map_err(|e| ScanError::Parameter(e.to_string()))? as usize;
        let mut buf = vec![0u8; len];
        cursor
            .read_exact(&mut buf)
            .map_err(|e| ScanError::Parameter(e.to_string()))?;
        Some(buf)
    } else {
        None
    };

    let bin_names = if flags2 & FLAG2_BIN_NAMES != 0 {
        let count = cursor
            .read_u8()
            .map_err(|e| ScanError::Parameter(e.to_string()))?;
        let mut names = Vec::with_capacity(count as usize);
        for _ in 0..count {
            names.push(read_len_prefixed_string(&mut cursor, WIRE_BIN_NAME_LEN)?);
        }
        names.sort();
        names.dedup();
        Some(names)
    } else {
        None
    };

    let is_udf = flags2 & FLAG2_IS_UDF != 0;
    let udf_op = if flags2 & FLAG2_UDF_OP_PRESENT != 0 {
        Some(if flags2 & FLAG2_UDF_OP_AGGREGATE != 0 {
            UdfOp::Aggregate
        } else {
            UdfOp::Background
        })
    } else {
        None
    };

    // The op list itself is the out-of-scope write path's payload; a
    // write-flavored scan carries only its count and read/replace bits here.
    let op_list_len = if write {
        cursor
            .read_u16::<BigEndian>()
            .map_err(|e| ScanError::Parameter(e.to_string()))? as usize
    } else {
        0
    };

    Ok(ScanRequest {
        set_name,
        options,
        partitions,
        sample_max,
        rps,
        socket_timeout_ms,
        predicate,
        bin_names,
        no_bin_data: flags2 & FLAG2_META_ONLY != 0,
        is_udf,
        write,
        udf_op,
        durable_delete: flags2 & FLAG2_DURABLE_DELETE != 0,
        op_list_has_read: flags2 & FLAG2_OP_LIST_HAS_READ != 0,
        op_list_len,
        replace_only: flags3 & FLAG3_REPLACE_ONLY != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(flags: u8, flags2: u8) -> Vec<u8> {
        vec![flags, flags2, 0]
    }

    #[test]
    fn empty_message_is_whole_namespace_basic_scan() {
        let bytes = header(0, 0);
        let req = parse_scan_request(&bytes).unwrap();
        assert!(req.set_name.is_none());
        assert_eq!(req.options.sample_pct, 100);
        assert!(matches!(req.scan_kind().unwrap(), ScanKind::Basic));
    }

    #[test]
    fn sample_pct_out_of_range_is_rejected() {
        let mut bytes = header(FLAG_SCAN_OPTIONS, 0);
        bytes.push(0); // byte0
        bytes.push(101); // byte1: invalid pct
        assert!(matches!(
            parse_scan_request(&bytes),
            Err(ScanError::Parameter(_))
        ));
    }

    #[test]
    fn duplicate_partition_ids_are_rejected() {
        let mut bytes = header(FLAG_PARTITION_LIST, 0);
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&3u16.to_be_bytes());
        bytes.extend_from_slice(&3u16.to_be_bytes());
        assert!(matches!(
            parse_scan_request(&bytes),
            Err(ScanError::Parameter(_))
        ));
    }

    #[test]
    fn rps_zero_with_legacy_priority_one_becomes_low_priority_rps() {
        let mut bytes = header(FLAG_SCAN_OPTIONS | FLAG_RPS, 0);
        bytes.push(1); // priority=1
        bytes.push(100);
        bytes.extend_from_slice(&0u32.to_be_bytes());
        let req = parse_scan_request(&bytes).unwrap();
        assert_eq!(req.rps, scand_config::config::LOW_PRIORITY_RPS);
    }

    #[test]
    fn scan_kind_selection_matches_table() {
        let mut req = parse_scan_request(&header(0, 0)).unwrap();
        assert!(matches!(req.scan_kind().unwrap(), ScanKind::Basic));

        req.write = true;
        assert!(matches!(req.scan_kind().unwrap(), ScanKind::OpsBackground));

        req.write = false;
        req.is_udf = true;
        req.udf_op = Some(UdfOp::Aggregate);
        assert!(matches!(req.scan_kind().unwrap(), ScanKind::Aggregation));

        req.udf_op = Some(UdfOp::Background);
        assert!(matches!(req.scan_kind().unwrap(), ScanKind::UdfBackground));

        req.udf_op = None;
        assert!(req.scan_kind().is_err());
    }

    #[test]
    fn write_scan_reads_trailing_op_count() {
        let mut bytes = header(0, FLAG2_WRITE);
        bytes.extend_from_slice(&3u16.to_be_bytes());
        let req = parse_scan_request(&bytes).unwrap();
        assert_eq!(req.op_list_len, 3);
        assert!(matches!(req.scan_kind().unwrap(), ScanKind::OpsBackground));
    }
}
