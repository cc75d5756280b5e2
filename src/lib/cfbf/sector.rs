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

use std::io::{Read, Seek, SeekFrom};
use log::trace;
use super::error::{Error, Result};
use super::header::Header;
use super::structures::MAXREGSECT;

/// Random access to the fixed-size sectors of the underlying source.
pub struct SectorReader<R> {
	source: R,
	len: u64,
	sector_size: u64,
	header_span: u64,
}

impl<R: Read + Seek> SectorReader<R> {
	/// Wraps `source`, whose header has already been parsed into `header`.
	pub fn new(mut source: R, header: &Header) -> Result<SectorReader<R>> {
		let len = source.seek(SeekFrom::End(0))?;
		Ok(SectorReader {
			source,
			len,
			sector_size: header.sector_size(),
			header_span: header.header_span(),
		})
	}

	/// Reads a whole sector.
	pub fn read_sector(&mut self, sector: u32) -> Result<Vec<u8>> {
		trace!("[read_sector] Reading sector #{} ...", sector);
		let offset = self.sector_offset(sector)?;
		let mut buffer = vec![0u8; self.sector_size as usize];
		self.read_exact_at(offset, &mut buffer)?;
		Ok(buffer)
	}

	/// Reads `buffer.len()` bytes starting at `offset` within the given sector.
	pub fn read_in_sector(&mut self, sector: u32, offset: u64, buffer: &mut [u8]) -> Result<()> {
		if offset + buffer.len() as u64 > self.sector_size {
			return Err(Error::format(format!("read of {} bytes at offset {} crosses the end of sector #{}", buffer.len(), offset, sector)));
		}
		let start = self.sector_offset(sector)?;
		self.read_exact_at(start + offset, buffer)
	}

	/// Reads exactly `buffer.len()` bytes at the given absolute offset, failing with
	/// `Error::Truncated` if the source ends first.
	pub fn read_exact_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<()> {
		let needed = buffer.len() as u64;
		if offset.checked_add(needed).map_or(true, |end| end > self.len) {
			return Err(Error::Truncated { offset, needed, len: self.len });
		}
		self.source.seek(SeekFrom::Start(offset))?;
		self.source.read_exact(buffer)?;
		Ok(())
	}
}

impl<R> SectorReader<R> {
	/// Total length of the source in bytes.
	pub fn len(&self) -> u64 {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn sector_size(&self) -> u64 {
		self.sector_size
	}

	/// Number of sectors that start within the source (the last one may be partial).
	pub fn sector_count(&self) -> u64 {
		if self.len <= self.header_span {
			0
		}
		else {
			(self.len - self.header_span + self.sector_size - 1) / self.sector_size
		}
	}

	/// File offset of the first byte of the given sector.
	pub fn sector_offset(&self, sector: u32) -> Result<u64> {
		if sector > MAXREGSECT {
			return Err(Error::format(format!("{:#X} is not a regular sector number", sector)));
		}
		Ok(self.header_span + sector as u64 * self.sector_size)
	}

	pub fn into_inner(self) -> R {
		self.source
	}
}
