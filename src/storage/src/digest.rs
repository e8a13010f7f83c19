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

use std::fmt;

/// A record's sole key: a 20-byte digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(pub [u8; 20]);

impl Digest {
    pub const LEN: usize = 20;

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::LEN {
            return None;
        }
        let mut buf = [0u8; Self::LEN];
        buf.copy_from_slice(bytes);
        Some(Self(buf))
    }

    /// Which of `N_PARTITIONS` a digest maps to. The source system hashes
    /// into the ring; here the first two bytes modulo the partition count is
    /// enough to exercise every partition-dependent code path without
    /// pulling in a real consistent-hash implementation.
    pub fn partition_id(&self, n_partitions: u16) -> u16 {
        let hi = u16::from_be_bytes([self.0[0], self.0[1]]);
        hi % n_partitions
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(Digest::from_slice(&[0u8; 19]).is_none());
        assert!(Digest::from_slice(&[0u8; 20]).is_some());
    }

    #[test]
    fn partition_id_is_stable() {
        let d = Digest([7u8; 20]);
        assert_eq!(d.partition_id(4096), d.partition_id(4096));
    }
}
