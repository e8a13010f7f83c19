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

use std::sync::Mutex;

use once_cell::sync::Lazy;
use snowflake::SnowflakeIdGenerator;

static IDER: Lazy<Mutex<SnowflakeIdGenerator>> =
    Lazy::new(|| Mutex::new(SnowflakeIdGenerator::new(1, 1)));

pub fn init() {
    let _ = generate();
}

/// Generates a transaction id for a newly-admitted scan job.
pub fn generate() -> i64 {
    IDER.lock().unwrap().real_time_generate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_is_nonzero_and_increasing() {
        let a = generate();
        let b = generate();
        assert!(b >= a);
    }
}
