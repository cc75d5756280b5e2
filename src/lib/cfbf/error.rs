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

use std::io;
use thiserror::Error;

/// Errors raised while reading a compound document.
#[derive(Error, Debug)]
pub enum Error {
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),

	/// The document violates the format: bad signature, unsupported sector sizes,
	/// cyclic or non-terminating chains, broken directory links, and the like.
	#[error("Invalid compound document: {0}")]
	Format(String),

	/// The source ends before a structure the document refers to.
	#[error("Source truncated: need {needed} bytes at offset {offset:#X}, but the source is only {len} bytes long")]
	Truncated { offset: u64, needed: u64, len: u64 },

	#[error("Entry #{0} is not a stream")]
	NotAStream(u32),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
	pub fn format(message: impl Into<String>) -> Error {
		Error::Format(message.into())
	}

	pub fn is_format(&self) -> bool {
		matches!(self, Error::Format(_))
	}

	pub fn is_truncated(&self) -> bool {
		matches!(self, Error::Truncated { .. })
	}
}

impl From<Error> for io::Error {
	fn from(err: Error) -> io::Error {
		match err {
			Error::Io(e) => e,
			e @ Error::Truncated { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, e),
			e => io::Error::new(io::ErrorKind::InvalidData, e),
		}
	}
}
