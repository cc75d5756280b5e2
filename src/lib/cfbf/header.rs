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

use std::cmp::{max, min};
use std::io::{ErrorKind, Read};
use log::{info, warn};
use zerocopy::FromBytes;
use super::error::{Error, Result};
use super::structures::*;

/// The header of a CFBF file.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
	pub clsid: [u8; 16],
	pub minor_version: u16,
	pub major_version: u16,
	pub sector_shift: u16,
	pub mini_sector_shift: u16,
	pub number_of_directory_sectors: u32,
	pub number_of_fat_sectors: u32,
	pub first_directory_sector_location: u32,
	pub transaction_signature_number: u32,
	/// Streams smaller than this live in the ministream.
	pub mini_stream_cutoff_size: u32,
	pub first_mini_fat_sector_location: u32,
	pub number_of_mini_fat_sectors: u32,
	pub first_difat_sector_location: u32,
	pub number_of_difat_sectors: u32,
	/// The first 109 FAT sector locations, as stored in the header.
	pub difat: Vec<u32>,
}

impl Header {
	/// Reads and validates the 512-byte header from the start of `source`.
	/// Only the header bytes are consumed.
	pub fn read(source: &mut impl Read) -> Result<Header> {
		let mut buffer = [0u8; HEADER_SIZE];
		let mut filled = 0;
		while filled < HEADER_SIZE {
			match source.read(&mut buffer[filled..]) {
				Ok(0) => break,
				Ok(n) => filled += n,
				Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
				Err(e) => return Err(e.into()),
			}
		}

		// A short source is reported as a signature problem first, so that random input is
		// never blamed on truncation.
		if filled < SIGNATURE.len() || buffer[..SIGNATURE.len()] != SIGNATURE {
			return Err(Error::format(format!("bad signature {:02X?}, not a compound document", &buffer[..min(filled, SIGNATURE.len())])));
		}
		if filled < HEADER_SIZE {
			return Err(Error::Truncated { offset: 0, needed: HEADER_SIZE as u64, len: filled as u64 });
		}
		Header::parse(&buffer)
	}

	/// Parses and validates a header from its raw bytes.
	pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Header> {
		let raw = RawHeader::read_from_bytes(&bytes[..])
			.map_err(|_| Error::format("unable to parse header"))?;

		if raw.signature != SIGNATURE {
			return Err(Error::format(format!("bad signature {:02X?}, not a compound document", raw.signature)));
		}

		let byte_order = raw.byte_order.get();
		if byte_order != BYTE_ORDER_LITTLE_ENDIAN {
			return Err(Error::format(format!("unsupported byte order {:#06X}", byte_order)));
		}

		let sector_shift = raw.sector_shift.get();
		if sector_shift < MIN_SECTOR_SHIFT || sector_shift > MAX_SECTOR_SHIFT {
			return Err(Error::format(format!("unsupported sector shift {}", sector_shift)));
		}
		let mini_sector_shift = raw.mini_sector_shift.get();
		if mini_sector_shift < MIN_MINI_SECTOR_SHIFT || mini_sector_shift > MAX_MINI_SECTOR_SHIFT || mini_sector_shift >= sector_shift {
			return Err(Error::format(format!("unsupported mini-sector shift {}", mini_sector_shift)));
		}

		let major_version = raw.major_version.get();
		if (major_version == 3 && sector_shift != 9) || (major_version == 4 && sector_shift != 12) {
			warn!("[parse] Major version {} does not match sector size {}, continuing anyway.", major_version, 1u32 << sector_shift);
		}

		let header = Header {
			clsid: raw.clsid,
			minor_version: raw.minor_version.get(),
			major_version,
			sector_shift,
			mini_sector_shift,
			number_of_directory_sectors: raw.number_of_directory_sectors.get(),
			number_of_fat_sectors: raw.number_of_fat_sectors.get(),
			first_directory_sector_location: raw.first_directory_sector_location.get(),
			transaction_signature_number: raw.transaction_signature_number.get(),
			mini_stream_cutoff_size: raw.mini_stream_cutoff_size.get(),
			first_mini_fat_sector_location: raw.first_mini_fat_sector_location.get(),
			number_of_mini_fat_sectors: raw.number_of_mini_fat_sectors.get(),
			first_difat_sector_location: raw.first_difat_sector_location.get(),
			number_of_difat_sectors: raw.number_of_difat_sectors.get(),
			difat: raw.difat.iter().map(|location| location.get()).collect(),
		};
		info!("[parse] Version {}.{}, sector size {}, mini-sector size {}, {} FAT sector(s), {} DIFAT sector(s).",
			header.major_version, header.minor_version, header.sector_size(), header.mini_sector_size(),
			header.number_of_fat_sectors, header.number_of_difat_sectors);
		Ok(header)
	}

	pub fn sector_size(&self) -> u64 {
		1 << self.sector_shift
	}

	pub fn mini_sector_size(&self) -> u64 {
		1 << self.mini_sector_shift
	}

	/// Number of bytes before sector #0. The header fills a whole sector when sectors are larger than 512 bytes.
	pub fn header_span(&self) -> u64 {
		max(HEADER_SIZE as u64, self.sector_size())
	}

	/// Number of 32-bit entries in one FAT (or miniFAT, or DIFAT) sector.
	pub fn entries_per_sector(&self) -> usize {
		(self.sector_size() / 4) as usize
	}

	/// Whether a stream of this size is stored in the ministream.
	pub fn is_mini_stream(&self, size: u64) -> bool {
		size < self.mini_stream_cutoff_size as u64
	}
}
