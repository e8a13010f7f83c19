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

//! `rps=0` means unthrottled; otherwise sleep `1e6 / rps` microseconds after
//! each successful emission. Never called for a skipped record.

pub fn throttle_sleep(rps: u32) -> Option<u64> {
    if rps == 0 {
        return None;
    }
    Some(1_000_000 / rps as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rps_means_no_throttle() {
        assert_eq!(throttle_sleep(0), None);
    }

    #[test]
    fn one_rps_is_one_second() {
        assert_eq!(throttle_sleep(1), Some(1_000_000));
    }
}
