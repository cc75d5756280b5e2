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

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use super::directory::{self, Directory, DirectoryEntry, EntryKind};
use super::error::{Error, Result};
use super::fat::AllocationTable;
use super::header::Header;
use super::sector::SectorReader;
use super::stream::{Location, Stream};
use super::structures::{ENDOFCHAIN, SIGNATURE};

/// An opened compound document.
///
/// Header, allocation tables and directory are read once when the document is opened and never change afterwards.
/// Stream contents are read lazily through the shared source, which is locked for the duration of each sector read.
pub struct Document<R> {
	source: Mutex<SectorReader<R>>,
	header: Header,
	fat: AllocationTable,
	minifat: AllocationTable,
	ministream: Vec<u32>,
	ministream_len: u64,
	directory: Directory,
}

impl Document<BufReader<File>> {
	/// Opens the compound document stored in the file at `path`.
	pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Document<BufReader<File>>> {
		let file = File::open(path.as_ref())?;
		debug!("[open_path] Opened '{}'.", path.as_ref().display());
		Document::open(BufReader::new(file))
	}
}

impl<R: Read + Seek> Document<R> {
	/// Reads and validates the header, the FAT, the miniFAT and the directory of `source`.
	/// The source is dropped if any of these is invalid.
	pub fn open(mut source: R) -> Result<Document<R>> {
		source.seek(SeekFrom::Start(0))?;
		let header = Header::read(&mut source)?;
		let mut reader = SectorReader::new(source, &header)?;
		info!("[open] Source is {} bytes long ({} sector(s) of {} bytes).", reader.len(), reader.sector_count(), reader.sector_size());

		let fat = AllocationTable::build_fat(&header, &mut reader)?;
		let minifat = AllocationTable::build_minifat(&header, &fat, &mut reader)?;

		let directory_sectors = fat.chain(header.first_directory_sector_location)?;
		if directory_sectors.is_empty() {
			return Err(Error::format("directory chain is empty"));
		}
		if header.major_version == 4 && directory_sectors.len() != header.number_of_directory_sectors as usize {
			warn!("[open] Header declares {} directory sector(s), but the chain has {}.", header.number_of_directory_sectors, directory_sectors.len());
		}
		let mut directory_data = Vec::with_capacity(directory_sectors.len() * header.sector_size() as usize);
		for &sector in &directory_sectors {
			directory_data.extend_from_slice(&reader.read_sector(sector)?);
		}
		let directory = Directory::parse(&directory_data, header.major_version)?;
		info!("[open] Directory has {} slot(s) in {} sector(s).", directory.len(), directory_sectors.len());

		let (ministream, ministream_len) = match directory.root().kind {
			EntryKind::Root { start_sector, size, .. } if size > 0 && start_sector != ENDOFCHAIN => (fat.chain(start_sector)?, size),
			_ => (Vec::new(), 0),
		};
		if (ministream.len() as u64) * header.sector_size() < ministream_len {
			return Err(Error::format(format!("ministream needs {} bytes, but its chain only has {} sector(s)", ministream_len, ministream.len())));
		}
		debug!("[open] Ministream is {} bytes long in {} sector(s).", ministream_len, ministream.len());

		Ok(Document {
			source: Mutex::new(reader),
			header,
			fat,
			minifat,
			ministream,
			ministream_len,
			directory,
		})
	}

	/// Reads bytes at `offset` within one sector (regular) or mini-sector (mini) of the document.
	/// The read must not cross the end of that sector.
	pub(crate) fn read_chunk(&self, location: Location, sector: u32, offset: u64, buffer: &mut [u8]) -> Result<()> {
		match location {
			Location::Regular => self.source.lock().read_in_sector(sector, offset, buffer),
			Location::Mini => {
				let mini_sector_size = self.header.mini_sector_size();
				if offset + buffer.len() as u64 > mini_sector_size {
					return Err(Error::format(format!("read of {} bytes at offset {} crosses the end of mini-sector #{}", buffer.len(), offset, sector)));
				}
				let position = sector as u64 * mini_sector_size + offset;
				if position + buffer.len() as u64 > self.ministream_len {
					return Err(Error::format(format!("mini-sector #{} lies outside the ministream ({} bytes)", sector, self.ministream_len)));
				}
				let sector_size = self.header.sector_size();
				let index = (position / sector_size) as usize;
				let regular = *self.ministream.get(index)
					.ok_or_else(|| Error::format(format!("mini-sector #{} lies outside the ministream chain", sector)))?;
				self.source.lock().read_in_sector(regular, position % sector_size, buffer)
			},
		}
	}
}

impl<R> Document<R> {
	pub fn header(&self) -> &Header {
		&self.header
	}

	pub fn fat(&self) -> &AllocationTable {
		&self.fat
	}

	pub fn minifat(&self) -> &AllocationTable {
		&self.minifat
	}

	pub fn directory(&self) -> &Directory {
		&self.directory
	}

	/// Size of the ministream, which holds the content of all streams below the cutoff size.
	pub fn ministream_len(&self) -> u64 {
		self.ministream_len
	}

	pub fn root_entry(&self) -> Entry<'_, R> {
		Entry { document: self, entry: self.directory.root() }
	}

	/// Looks up an entry by its directory slot. Unused slots and entries that are not part of the tree give `None`.
	pub fn entry(&self, id: u32) -> Option<Entry<'_, R>> {
		if !self.directory.is_reachable(id) {
			return None;
		}
		self.directory.get(id).map(|entry| Entry { document: self, entry })
	}

	/// Looks up an entry by its absolute path, e.g. `/Storage/Stream`. Components are matched case-insensitively.
	pub fn entry_by_path(&self, path: &str) -> Option<Entry<'_, R>> {
		if !path.starts_with('/') {
			return None;
		}
		path.split('/')
			.filter(|component| !component.is_empty())
			.try_fold(self.root_entry(), |entry, component| entry.child_entry(component))
	}

	/// Lists every entry of the tree together with its path, depth first, children in sibling order.
	pub fn walk(&self) -> Vec<(String, Entry<'_, R>)> {
		let mut result = Vec::with_capacity(self.directory.len());
		let mut pending = vec![(String::from("/"), self.root_entry())];
		while let Some((path, entry)) = pending.pop() {
			for child in entry.child_entries().into_iter().rev() {
				let child_path = if path == "/" {
					format!("/{}", child.name())
				}
				else {
					format!("{}/{}", path, child.name())
				};
				pending.push((child_path, child));
			}
			result.push((path, entry));
		}
		result
	}

	/// Gives back the underlying source.
	pub fn into_inner(self) -> R {
		self.source.into_inner().into_inner()
	}
}

impl<R> fmt::Display for Document<R> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(
			f,
			"CompoundDocument[clsid: {}, sector size: {}/{} bytes, directory sector: {}, FAT sectors: {}]",
			directory::format_clsid(&self.header.clsid),
			self.header.sector_size(),
			self.header.mini_sector_size(),
			self.header.first_directory_sector_location,
			self.header.number_of_fat_sectors,
		)
	}
}

impl<R> fmt::Debug for Document<R> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Document")
			.field("header", &self.header)
			.field("fat_entries", &self.fat.len())
			.field("minifat_entries", &self.minifat.len())
			.field("ministream_len", &self.ministream_len)
			.field("directory_entries", &self.directory.len())
			.finish()
	}
}

/// A handle to one entry of an opened document.
pub struct Entry<'a, R> {
	document: &'a Document<R>,
	entry: &'a DirectoryEntry,
}

impl<'a, R> Clone for Entry<'a, R> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<'a, R> Copy for Entry<'a, R> {}

impl<'a, R> PartialEq for Entry<'a, R> {
	fn eq(&self, other: &Self) -> bool {
		self.entry == other.entry
	}
}

impl<'a, R> fmt::Debug for Entry<'a, R> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(self.entry, f)
	}
}

impl<'a, R> fmt::Display for Entry<'a, R> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let kind = match self.entry.kind {
			EntryKind::Root { .. } => "root",
			EntryKind::Storage { .. } => "storage",
			EntryKind::Stream { .. } => "stream",
			EntryKind::Unused => "unused",
		};
		write!(f, "Entry[id: {}, name: '{}', type: {}, size: {}]", self.entry.id, self.entry.name, kind, self.len())
	}
}

impl<'a, R> Entry<'a, R> {
	pub fn id(&self) -> u32 {
		self.entry.id
	}

	pub fn name(&self) -> &'a str {
		&self.entry.name
	}

	pub fn kind(&self) -> &'a EntryKind {
		&self.entry.kind
	}

	/// The parsed directory record behind this handle.
	pub fn directory_entry(&self) -> &'a DirectoryEntry {
		self.entry
	}

	pub fn is_root(&self) -> bool {
		matches!(self.entry.kind, EntryKind::Root { .. })
	}

	pub fn is_storage(&self) -> bool {
		matches!(self.entry.kind, EntryKind::Storage { .. })
	}

	pub fn is_stream(&self) -> bool {
		matches!(self.entry.kind, EntryKind::Stream { .. })
	}

	/// Stream size in bytes. The root entry reports the size of the ministream; storages are empty.
	pub fn len(&self) -> u64 {
		match self.entry.kind {
			EntryKind::Stream { size, .. } | EntryKind::Root { size, .. } => size,
			_ => 0,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn clsid(&self) -> &'a [u8; 16] {
		&self.entry.clsid
	}

	pub fn created(&self) -> Option<DateTime<Utc>> {
		self.entry.created()
	}

	pub fn modified(&self) -> Option<DateTime<Utc>> {
		self.entry.modified()
	}

	/// The storage holding this entry; `None` for the root.
	pub fn parent(&self) -> Option<Entry<'a, R>> {
		let document = self.document;
		document.directory.parent(self.entry.id)
			.and_then(|id| document.directory.get(id))
			.map(|entry| Entry { document, entry })
	}

	/// The children of a storage in sibling order. Streams have none.
	pub fn child_entries(&self) -> Vec<Entry<'a, R>> {
		let document = self.document;
		document.directory.children(self.entry.id)
			.iter()
			.filter_map(|&id| document.directory.get(id))
			.map(|entry| Entry { document, entry })
			.collect()
	}

	/// Case-insensitive lookup of a direct child.
	pub fn child_entry(&self, name: &str) -> Option<Entry<'a, R>> {
		let document = self.document;
		document.directory.find_child(self.entry.id, name)
			.and_then(|id| document.directory.get(id))
			.map(|entry| Entry { document, entry })
	}
}

impl<'a, R: Read + Seek> Entry<'a, R> {
	/// Opens the content of a stream. For the root entry this is the raw ministream.
	pub fn input_stream(&self) -> Result<Stream<'a, R>> {
		Stream::open(self.document, self.entry)
	}

	/// Reads the whole content of a stream into memory.
	pub fn read_to_vec(&self) -> Result<Vec<u8>> {
		self.input_stream()?.read_to_vec()
	}
}

/// Checks whether `source` starts with the compound document signature. The position of `source` is left unchanged.
pub fn is_compound_document(source: &mut (impl Read + Seek)) -> io::Result<bool> {
	let position = source.stream_position()?;
	source.seek(SeekFrom::Start(0))?;
	let mut signature = Vec::with_capacity(SIGNATURE.len());
	let result = source.by_ref().take(SIGNATURE.len() as u64).read_to_end(&mut signature);
	source.seek(SeekFrom::Start(position))?;
	result?;
	Ok(signature == SIGNATURE)
}
