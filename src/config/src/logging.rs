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

// refer: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/fmt/trait.FormatEvent.html#examples

use std::sync::OnceLock;

use chrono::{Local, Utc};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{format::Writer, time::FormatTime},
    EnvFilter,
};

use crate::config::get_config;

struct ScandTimeFormat;

impl FormatTime for ScandTimeFormat {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let cfg = get_config();
        if cfg.log.local_time_format.is_empty() {
            write!(w, "{}", Utc::now().to_rfc3339())
        } else {
            write!(w, "{}", Local::now().format(&cfg.log.local_time_format))
        }
    }
}

/// Holds the non-blocking writer's flush guard alive for the process
/// lifetime when file logging is enabled; dropping it would silently stop
/// log lines from ever reaching disk.
static FILE_APPENDER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global `tracing` subscriber. Idempotent: a second call is a
/// no-op, so it is safe to call from tests and `main` alike. `log.dir` set
/// to a non-empty path switches from stdout to a daily-rolling file under
/// that directory, matching the teacher's split between console and
/// on-disk logging.
pub fn init() {
    let cfg = get_config();
    let filter = EnvFilter::try_new(&cfg.log.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ScandTimeFormat);

    let result = if cfg.log.dir.is_empty() {
        if cfg.log.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        }
    } else {
        let file_appender = tracing_appender::rolling::daily(&cfg.log.dir, "scand.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = FILE_APPENDER_GUARD.set(guard);
        let builder = builder.with_writer(non_blocking).with_ansi(false);
        if cfg.log.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        }
    };
    // try_init returns Err if a subscriber is already installed (e.g. a
    // prior test in the same process); that is not a failure worth panicking
    // over.
    let _ = result;
}
