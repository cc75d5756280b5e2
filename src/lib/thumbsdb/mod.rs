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

//! Windows `Thumbs.db` files: a compound document whose `Catalog` stream lists the thumbnailed files, and one
//! stream per thumbnail, named after the reversed decimal item ID.

use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use chrono::{DateTime, Utc};
use log::{debug, info};
use zerocopy::{FromBytes, LE, U16, U32, U64};
use zerocopy_derive::FromBytes as DeriveFromBytes;
use crate::cfbf::{filetime_to_datetime, Document, Error, Result};

/// Name of the stream holding the catalog.
pub const CATALOG_STREAM: &str = "Catalog";

/// Every thumbnail stream starts with a header of this size, followed by the image data.
pub const THUMBNAIL_OFFSET: u64 = 12;

/// Longest file name stored in a catalog item, in UTF-16 code units.
pub const MAX_NAME_LENGTH: usize = 256;

#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawCatalogHeader {
	reserved1: U16<LE>,
	reserved2: U16<LE>,
	thumbnail_count: U32<LE>,
	max_width: U32<LE>,
	max_height: U32<LE>,
}

#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawCatalogItem {
	reserved: U32<LE>,
	item_id: U32<LE>,
	modified_time: U64<LE>,
}

/// One thumbnailed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
	pub id: u32,
	/// The file name, without the folder.
	pub name: String,
	pub modified_time: u64,
}

impl CatalogItem {
	pub fn modified(&self) -> Option<DateTime<Utc>> {
		filetime_to_datetime(self.modified_time)
	}

	/// The name of the stream holding the thumbnail of this item.
	pub fn stream_name(&self) -> String {
		self.id.to_string().chars().rev().collect()
	}

	/// A file name for the extracted thumbnail, unique within the catalog: `<stream name>_<name>.jpg`.
	pub fn thumbnail_file_name(&self) -> String {
		let name = self.name.replace(|c: char| c == '/' || c == '\\' || c == '\0', "_");
		format!("{}_{}.jpg", self.stream_name(), name)
	}

	fn read(input: &mut impl Read) -> Result<CatalogItem> {
		let mut buffer = [0u8; 16];
		input.read_exact(&mut buffer)?;
		let raw = RawCatalogItem::read_from_bytes(&buffer)
			.map_err(|_| Error::format("catalog item header has the wrong size"))?;

		let mut units = Vec::new();
		loop {
			let unit = read_u16(input)?;
			if unit == 0 {
				break;
			}
			if units.len() == MAX_NAME_LENGTH {
				return Err(Error::format(format!("name of catalog item #{} is longer than {} characters", raw.item_id.get(), MAX_NAME_LENGTH)));
			}
			units.push(unit);
		}
		let path = String::from_utf16_lossy(&units);
		let name = match path.rfind('\\') {
			Some(index) => path[index + 1..].to_string(),
			None => path,
		};
		read_u16(input)?;

		Ok(CatalogItem {
			id: raw.item_id.get(),
			name,
			modified_time: raw.modified_time.get(),
		})
	}
}

fn read_u16(input: &mut impl Read) -> Result<u16> {
	let mut buffer = [0u8; 2];
	input.read_exact(&mut buffer)?;
	Ok(u16::from_le_bytes(buffer))
}

/// The content of the `Catalog` stream. Items are ordered by ID, item `i` has ID `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
	pub max_width: u32,
	pub max_height: u32,
	items: Vec<CatalogItem>,
}

impl Catalog {
	pub fn read(mut input: impl Read) -> Result<Catalog> {
		let mut buffer = [0u8; 16];
		input.read_exact(&mut buffer)?;
		let header = RawCatalogHeader::read_from_bytes(&buffer)
			.map_err(|_| Error::format("catalog header has the wrong size"))?;
		let count = header.thumbnail_count.get();
		debug!("[read] Catalog lists {} thumbnail(s) of at most {}x{} pixels.", count, header.max_width.get(), header.max_height.get());

		// Slots are only allocated for items actually read
		let mut read = Vec::new();
		for _ in 0..count {
			read.push(CatalogItem::read(&mut input)?);
		}

		let mut slots: Vec<Option<CatalogItem>> = vec![None; read.len()];
		for item in read {
			if item.id == 0 || item.id > count {
				return Err(Error::format(format!("catalog item ID {} is outside 1..={}", item.id, count)));
			}
			let slot = &mut slots[item.id as usize - 1];
			if slot.is_some() {
				return Err(Error::format(format!("catalog item ID {} is listed twice", item.id)));
			}
			*slot = Some(item);
		}

		Ok(Catalog {
			max_width: header.max_width.get(),
			max_height: header.max_height.get(),
			// Every slot is filled: there are as many items as slots and no ID repeats
			items: slots.into_iter().flatten().collect(),
		})
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	pub fn items(&self) -> &[CatalogItem] {
		&self.items
	}

	pub fn item(&self, index: usize) -> Option<&CatalogItem> {
		self.items.get(index)
	}

	/// The name of the stream holding the thumbnail at `index`.
	pub fn stream_name(&self, index: usize) -> Option<String> {
		self.item(index).map(CatalogItem::stream_name)
	}

	/// Finds a thumbnail by file name (exact match).
	pub fn index_of(&self, name: &str) -> Option<usize> {
		self.items.iter().position(|item| item.name == name)
	}

	/// The file name belonging to a thumbnail stream name.
	pub fn name_of_stream(&self, stream_name: &str) -> Option<&str> {
		let id = stream_name.chars().rev().collect::<String>().parse::<usize>().ok()?;
		id.checked_sub(1)
			.and_then(|index| self.items.get(index))
			.map(|item| item.name.as_str())
	}
}

impl fmt::Display for Catalog {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Catalog[thumbs: {} maxWidth: {} maxHeight: {}]", self.items.len(), self.max_width, self.max_height)
	}
}

/// An opened `Thumbs.db` file.
pub struct ThumbsDb<R> {
	document: Document<R>,
	catalog: Catalog,
}

impl<R: Read + Seek> ThumbsDb<R> {
	pub fn open(source: R) -> Result<ThumbsDb<R>> {
		let document = Document::open(source)?;
		let catalog = {
			let entry = document.root_entry().child_entry(CATALOG_STREAM)
				.ok_or_else(|| Error::format(format!("no '{}' stream, not a Thumbs.db file", CATALOG_STREAM)))?;
			Catalog::read(entry.input_stream()?)?
		};
		info!("[open] Opened {}.", catalog);
		Ok(ThumbsDb { document, catalog })
	}

	pub fn document(&self) -> &Document<R> {
		&self.document
	}

	pub fn catalog(&self) -> &Catalog {
		&self.catalog
	}

	/// Reads the image data of the thumbnail at `index`, without its header.
	pub fn thumbnail(&self, index: usize) -> Result<Vec<u8>> {
		let stream_name = self.catalog.stream_name(index)
			.ok_or_else(|| Error::format(format!("thumbnail index {} is outside the catalog ({} items)", index, self.catalog.len())))?;
		let entry = self.document.root_entry().child_entry(&stream_name)
			.ok_or_else(|| Error::format(format!("thumbnail stream '{}' is missing", stream_name)))?;
		if entry.len() < THUMBNAIL_OFFSET {
			return Err(Error::format(format!("thumbnail stream '{}' is only {} bytes long", stream_name, entry.len())));
		}

		let mut stream = entry.input_stream()?;
		stream.seek(SeekFrom::Start(THUMBNAIL_OFFSET))?;
		debug!("[thumbnail] Reading thumbnail #{} from stream '{}' ...", index, stream_name);
		stream.read_to_vec()
	}

	/// Reads the thumbnail of the named file, if the catalog lists it.
	pub fn thumbnail_by_name(&self, name: &str) -> Result<Option<Vec<u8>>> {
		match self.catalog.index_of(name) {
			Some(index) => self.thumbnail(index).map(Some),
			None => Ok(None),
		}
	}

	pub fn into_inner(self) -> R {
		self.document.into_inner()
	}
}
