/*
compdoc library & toolset
Copyright (C) 2018 Steve Muller <steve.muller@outlook.com>

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! Verbosity-driven logger writing to standard error (STDERR).

use std::io::{stderr, Write};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct Debug {
	level: LevelFilter,
}

impl Debug {
	pub fn new(verbosity: u64) -> Debug {
		Debug { level: level_for(verbosity) }
	}

	pub fn level(&self) -> LevelFilter {
		self.level
	}
}

impl Log for Debug {
	fn enabled(&self, metadata: &Metadata) -> bool {
		metadata.level() <= self.level
	}

	fn log(&self, record: &Record) {
		if !self.enabled(record.metadata()) {
			return;
		}
		let mut output = stderr().lock();
		// Nowhere left to report a failing STDERR
		let _ = match record.level() {
			Level::Error | Level::Warn => writeln!(output, "{}: {}", record.level(), record.args()),
			_ => writeln!(output, "{}", record.args()),
		};
	}

	fn flush(&self) {
		let _ = stderr().flush();
	}
}

/// Maps the number of `-v` flags to a log level: warnings only, then info, debug and trace.
pub fn level_for(verbosity: u64) -> LevelFilter {
	match verbosity {
		0 => LevelFilter::Warn,
		1 => LevelFilter::Info,
		2 => LevelFilter::Debug,
		_ => LevelFilter::Trace,
	}
}

/// Installs the STDERR logger for the given verbosity. Fails if a logger is already installed.
pub fn init(verbosity: u64) -> Result<(), SetLoggerError> {
	let debug = Debug::new(verbosity);
	let level = debug.level();
	log::set_boxed_logger(Box::new(debug))?;
	log::set_max_level(level);
	Ok(())
}
