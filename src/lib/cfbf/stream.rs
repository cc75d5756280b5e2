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

use std::cmp::min;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use log::debug;
use super::directory::{DirectoryEntry, EntryKind};
use super::document::Document;
use super::error::{Error, Result};

/// Where the sectors of a stream live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
	/// Regular sectors, chained through the FAT.
	Regular,
	/// Mini-sectors inside the ministream, chained through the miniFAT.
	Mini,
}

/// A seekable reader over the content of one stream entry.
///
/// The sector chain is resolved when the stream is opened; the bytes are only read on demand.
/// Every stream keeps its own position, so several streams of one document can be read at the same time.
pub struct Stream<'a, R> {
	document: &'a Document<R>,
	id: u32,
	chain: Vec<u32>,
	location: Location,
	sector_len: u64,
	len: u64,
	position: u64,
}

impl<'a, R: Read + Seek> Stream<'a, R> {
	/// Opens the content of a stream entry, or the ministream when given the root entry.
	pub(crate) fn open(document: &'a Document<R>, entry: &DirectoryEntry) -> Result<Stream<'a, R>> {
		let header = document.header();
		let (start_sector, len, location) = match entry.kind {
			EntryKind::Stream { start_sector, size } if header.is_mini_stream(size) => (start_sector, size, Location::Mini),
			EntryKind::Stream { start_sector, size } => (start_sector, size, Location::Regular),
			EntryKind::Root { start_sector, size, .. } => (start_sector, size, Location::Regular),
			_ => return Err(Error::NotAStream(entry.id)),
		};
		let (table, sector_len) = match location {
			Location::Regular => (document.fat(), header.sector_size()),
			Location::Mini => (document.minifat(), header.mini_sector_size()),
		};

		let needed = len / sector_len + (len % sector_len != 0) as u64;
		let mut chain = if needed == 0 { Vec::new() } else { table.chain(start_sector)? };
		if (chain.len() as u64) < needed {
			return Err(Error::format(format!("stream #{} needs {} sector(s) for {} bytes, but its chain only has {}", entry.id, needed, len, chain.len())));
		}
		chain.truncate(needed as usize);
		debug!("[open] Opened stream #{} '{}' ({} bytes in {} {:?} sector(s)).", entry.id, entry.name, len, chain.len(), location);

		Ok(Stream {
			document,
			id: entry.id,
			chain,
			location,
			sector_len,
			len,
			position: 0,
		})
	}

	/// The id of the directory entry this stream belongs to.
	pub fn id(&self) -> u32 {
		self.id
	}

	pub fn len(&self) -> u64 {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn location(&self) -> Location {
		self.location
	}

	/// The (mini-)sector numbers holding this stream, in order.
	pub fn sectors(&self) -> &[u32] {
		&self.chain
	}

	/// Reads the remaining content into memory.
	pub fn read_to_vec(mut self) -> Result<Vec<u8>> {
		let mut data = vec![0u8; self.len.saturating_sub(self.position) as usize];
		let mut filled = 0;
		while filled < data.len() {
			filled += self.read_chunk(&mut data[filled..])?;
		}
		Ok(data)
	}

	/// Reads from the current position up to the end of the current (mini-)sector, clipped to the stream length.
	fn read_chunk(&mut self, buffer: &mut [u8]) -> Result<usize> {
		if self.position >= self.len || buffer.is_empty() {
			return Ok(0);
		}
		let index = (self.position / self.sector_len) as usize;
		let offset = self.position % self.sector_len;
		let available = min(self.sector_len - offset, self.len - self.position);
		let count = min(available, buffer.len() as u64) as usize;
		self.document.read_chunk(self.location, self.chain[index], offset, &mut buffer[..count])?;
		self.position += count as u64;
		Ok(count)
	}
}

impl<'a, R: Read + Seek> Read for Stream<'a, R> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		Ok(self.read_chunk(buf)?)
	}
}

impl<'a, R: Read + Seek> Seek for Stream<'a, R> {
	fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
		let target = match pos {
			SeekFrom::Start(offset) => Some(offset),
			SeekFrom::End(delta) => offset_by(self.len, delta),
			SeekFrom::Current(delta) => offset_by(self.position, delta),
		};
		match target {
			Some(position) => {
				self.position = position;
				Ok(position)
			},
			None => Err(io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative or overflowing position")),
		}
	}
}

impl<'a, R> fmt::Debug for Stream<'a, R> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Stream")
			.field("id", &self.id)
			.field("location", &self.location)
			.field("len", &self.len)
			.field("position", &self.position)
			.field("sectors", &self.chain.len())
			.finish()
	}
}

fn offset_by(base: u64, delta: i64) -> Option<u64> {
	if delta >= 0 {
		base.checked_add(delta as u64)
	}
	else {
		base.checked_sub(delta.unsigned_abs())
	}
}
