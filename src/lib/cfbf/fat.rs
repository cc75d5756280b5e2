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

use std::io::{Read, Seek};
use fixedbitset::FixedBitSet;
use log::{debug, info, trace, warn};
use zerocopy::{FromBytes, LE, U32};
use super::error::{Error, Result};
use super::header::Header;
use super::sector::SectorReader;
use super::structures::*;

/// What the allocation table says about the sector following a given one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
	Sector(u32),
	EndOfChain,
	Free,
	FatSector,
	DifatSector,
}

impl Link {
	fn from_value(value: u32) -> Link {
		match value {
			ENDOFCHAIN => Link::EndOfChain,
			FREESECT => Link::Free,
			FATSECT => Link::FatSector,
			DIFSECT => Link::DifatSector,
			sector => Link::Sector(sector),
		}
	}
}

/// A sector allocation table (FAT or miniFAT): entry `i` holds the sector that follows sector `i` in its chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationTable {
	entries: Vec<u32>,
}

impl AllocationTable {
	pub fn new(entries: Vec<u32>) -> AllocationTable {
		AllocationTable { entries }
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn entries(&self) -> &[u32] {
		&self.entries
	}

	/// Looks up the successor of `sector`.
	pub fn next(&self, sector: u32) -> Result<Link> {
		match self.entries.get(sector as usize) {
			Some(&value) => Ok(Link::from_value(value)),
			None => Err(Error::format(format!("sector #{} is outside the allocation table ({} entries)", sector, self.entries.len()))),
		}
	}

	/// Follows the chain starting at `start` until ENDOFCHAIN and returns the visited sectors in order.
	/// A chain can visit each table entry at most once, so more steps than entries means a cycle.
	pub fn chain(&self, start: u32) -> Result<Vec<u32>> {
		let mut chain = Vec::new();
		let mut current = start;
		while current != ENDOFCHAIN {
			if chain.len() >= self.entries.len() {
				return Err(Error::format(format!("sector chain starting at #{} does not terminate", start)));
			}
			chain.push(current);
			current = match self.next(current)? {
				Link::Sector(next) if next <= MAXREGSECT => next,
				Link::EndOfChain => ENDOFCHAIN,
				link => return Err(Error::format(format!("sector chain starting at #{} is broken at #{} ({:?})", start, current, link))),
			};
			trace!("[chain] #{} -> {:#X}", chain[chain.len() - 1], current);
		}
		Ok(chain)
	}

	/// Builds the FAT from the sectors listed in the header and the DIFAT chain.
	pub fn build_fat<R: Read + Seek>(header: &Header, reader: &mut SectorReader<R>) -> Result<AllocationTable> {
		let fat_sectors = collect_fat_sector_locations(header, reader)?;
		let table = read_table(&fat_sectors, header, reader)?;
		info!("[build_fat] Read {} FAT sector(s), {} entries.", fat_sectors.len(), table.len());
		Ok(table)
	}

	/// Builds the miniFAT by following its sector chain through the FAT.
	pub fn build_minifat<R: Read + Seek>(header: &Header, fat: &AllocationTable, reader: &mut SectorReader<R>) -> Result<AllocationTable> {
		let start = header.first_mini_fat_sector_location;
		if start == ENDOFCHAIN || (start == FREESECT && header.number_of_mini_fat_sectors == 0) {
			debug!("[build_minifat] No miniFAT.");
			return Ok(AllocationTable::default());
		}

		let minifat_sectors = fat.chain(start)?;
		if minifat_sectors.len() != header.number_of_mini_fat_sectors as usize {
			warn!("[build_minifat] Header declares {} miniFAT sector(s), but the chain has {}.", header.number_of_mini_fat_sectors, minifat_sectors.len());
		}
		let table = read_table(&minifat_sectors, header, reader)?;
		info!("[build_minifat] Read {} miniFAT sector(s), {} entries.", minifat_sectors.len(), table.len());
		Ok(table)
	}
}

/// Enumerates the locations of all FAT sectors: the first 109 are listed in the header, the rest in the DIFAT sectors.
/// The last slot of every DIFAT sector points to the next DIFAT sector.
fn collect_fat_sector_locations<R: Read + Seek>(header: &Header, reader: &mut SectorReader<R>) -> Result<Vec<u32>> {
	let wanted = header.number_of_fat_sectors as usize;
	if wanted as u64 > reader.sector_count() {
		return Err(Error::Truncated {
			offset: header.header_span(),
			needed: wanted as u64 * header.sector_size(),
			len: reader.len(),
		});
	}

	let mut locations: Vec<u32> = header.difat.iter().take(wanted).cloned().collect();
	debug!("[collect_fat_sector_locations] {} FAT sector location(s) in the header.", locations.len());

	let difat_entries_per_sector = header.entries_per_sector() - 1;
	let mut visited = FixedBitSet::with_capacity(reader.sector_count() as usize);
	let mut difat_sector = header.first_difat_sector_location;
	let mut difat_sectors_read = 0;
	while locations.len() < wanted {
		if difat_sector == ENDOFCHAIN || difat_sector == FREESECT || difat_sectors_read >= header.number_of_difat_sectors {
			break;
		}
		if (difat_sector as usize) < visited.len() && visited.put(difat_sector as usize) {
			return Err(Error::format(format!("DIFAT chain revisits sector #{}", difat_sector)));
		}
		debug!("[collect_fat_sector_locations] Reading DIFAT sector #{} ...", difat_sector);
		let entries = parse_u32_entries(&reader.read_sector(difat_sector)?)?;
		let remaining = wanted - locations.len();
		locations.extend(entries[..difat_entries_per_sector].iter().take(remaining));
		difat_sector = entries[difat_entries_per_sector];
		difat_sectors_read += 1;
	}

	if locations.len() < wanted {
		return Err(Error::format(format!("header declares {} FAT sector(s), but only {} location(s) could be found", wanted, locations.len())));
	}
	Ok(locations)
}

/// Reads the given sectors and concatenates their entries into one table.
fn read_table<R: Read + Seek>(sectors: &[u32], header: &Header, reader: &mut SectorReader<R>) -> Result<AllocationTable> {
	let mut entries = Vec::with_capacity(sectors.len() * header.entries_per_sector());
	for &sector in sectors {
		if sector > MAXREGSECT {
			return Err(Error::format(format!("allocation table sector location {:#X} is not a regular sector", sector)));
		}
		entries.extend(parse_u32_entries(&reader.read_sector(sector)?)?);
	}
	Ok(AllocationTable::new(entries))
}

fn parse_u32_entries(bytes: &[u8]) -> Result<Vec<u32>> {
	let values = <[U32<LE>]>::ref_from_bytes(bytes)
		.map_err(|_| Error::format("sector size is not a multiple of 4 bytes"))?;
	Ok(values.iter().map(|value| value.get()).collect())
}
