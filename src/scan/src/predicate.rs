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

//! A stand-in for the out-of-scope predicate expression engine. Compiles
//! one tiny textual grammar rather than a real opcode tree, enough to
//! exercise the two-phase metadata/bins match contract end to end.

use std::sync::Arc;

use scand_storage::{MatchResult, PredicateExpr, Record, RecordMeta};

use crate::error::ScanError;

struct AlwaysTrue;

impl PredicateExpr for AlwaysTrue {
    fn match_metadata(&self, _meta: &RecordMeta) -> MatchResult {
        MatchResult::True
    }

    fn match_bins(&self, _record: &Record) -> bool {
        true
    }
}

struct AlwaysFalse;

impl PredicateExpr for AlwaysFalse {
    fn match_metadata(&self, _meta: &RecordMeta) -> MatchResult {
        MatchResult::False
    }

    fn match_bins(&self, _record: &Record) -> bool {
        false
    }
}

/// `bin_eq:<name>:<utf8 value>`. Metadata alone can never decide a bin
/// comparison, so the metadata phase always defers.
struct BinEquals {
    name: String,
    value: Vec<u8>,
}

impl PredicateExpr for BinEquals {
    fn match_metadata(&self, _meta: &RecordMeta) -> MatchResult {
        MatchResult::Unknown
    }

    fn match_bins(&self, record: &Record) -> bool {
        record
            .bins
            .iter()
            .any(|(k, v)| k == &self.name && v.as_ref() == self.value.as_slice())
    }
}

/// Compiles the opaque predicate bytes carried on a scan request. A real
/// engine parses a serialized expression tree; this one parses a single
/// `key:args` line and fails anything else with `ScanError::Parameter`,
/// matching the "compile failure => PARAMETER" contract.
pub fn compile(bytes: &[u8]) -> Result<Arc<dyn PredicateExpr>, ScanError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| ScanError::Parameter("predicate is not valid utf-8".into()))?;
    if text == "true" {
        return Ok(Arc::new(AlwaysTrue));
    }
    if text == "false" {
        return Ok(Arc::new(AlwaysFalse));
    }
    if let Some(rest) = text.strip_prefix("bin_eq:") {
        let (name, value) = rest
            .split_once(':')
            .ok_or_else(|| ScanError::Parameter("malformed bin_eq predicate".into()))?;
        return Ok(Arc::new(BinEquals {
            name: name.to_string(),
            value: value.as_bytes().to_vec(),
        }));
    }
    Err(ScanError::Parameter(format!(
        "unrecognized predicate expression: {text}"
    )))
}
