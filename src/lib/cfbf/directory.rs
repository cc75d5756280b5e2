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

use std::char::{decode_utf16, REPLACEMENT_CHARACTER};
use std::cmp::Ordering;
use chrono::{DateTime, Utc};
use fixedbitset::FixedBitSet;
use log::{debug, warn};
use zerocopy::FromBytes;
use super::error::{Error, Result};
use super::structures::*;

/// What a directory entry is, with the data only that kind of entry carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
	/// A free slot. Kept so that slot indices stay stable.
	Unused,
	/// A folder. `child` is the root of the sibling tree holding its children.
	Storage { child: u32 },
	/// A file.
	Stream { start_sector: u32, size: u64 },
	/// The root folder. Its own stream is the ministream.
	Root { child: u32, start_sector: u32, size: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeColor {
	Red,
	Black,
}

/// One slot of the directory stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
	pub id: u32,
	pub name: String,
	pub kind: EntryKind,
	pub color: NodeColor,
	/// The left sibling in the binary tree of this folder.
	pub left_sibling_id: u32,
	/// The right sibling in the binary tree of this folder.
	pub right_sibling_id: u32,
	pub clsid: [u8; 16],
	pub state_bits: u32,
	pub creation_time: u64,
	pub modified_time: u64,
}

impl DirectoryEntry {
	/// Parses one 128-byte directory slot. Version 3 documents only use the low 32 bits of the size.
	pub fn parse(bytes: &[u8], id: u32, major_version: u16) -> Result<DirectoryEntry> {
		let raw = RawDirectoryEntry::read_from_bytes(bytes)
			.map_err(|_| Error::format(format!("directory entry #{} is not {} bytes long", id, DIRECTORY_ENTRY_SIZE)))?;

		let child_id = raw.child_id.get();
		let starting_sector_location = raw.starting_sector_location.get();
		let stream_size = if major_version == 3 {
			raw.stream_size.get() & 0xFFFF_FFFF
		}
		else {
			raw.stream_size.get()
		};

		let kind = match raw.object_type {
			OBJECT_TYPE_UNUSED => return Ok(DirectoryEntry::unused(id)),
			OBJECT_TYPE_STORAGE => EntryKind::Storage { child: child_id },
			OBJECT_TYPE_STREAM => {
				if child_id != NOSTREAM {
					warn!("[parse] Stream entry #{} has a child link ({}), ignoring it.", id, child_id);
				}
				EntryKind::Stream { start_sector: starting_sector_location, size: stream_size }
			},
			OBJECT_TYPE_ROOT_STORAGE => EntryKind::Root { child: child_id, start_sector: starting_sector_location, size: stream_size },
			other => return Err(Error::format(format!("directory entry #{} has invalid object type {}", id, other))),
		};

		// The length is expressed in bytes and includes the trailing NUL character
		let name_length = raw.name_length.get() as usize;
		if name_length > raw.name.len() || name_length % 2 != 0 {
			return Err(Error::format(format!("directory entry #{} has invalid name length {}", id, name_length)));
		}
		let units = raw.name[..name_length.saturating_sub(2)]
			.chunks_exact(2)
			.map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
		let name = decode_utf16(units)
			.map(|r| r.unwrap_or(REPLACEMENT_CHARACTER))
			.collect::<String>();

		Ok(DirectoryEntry {
			id,
			name,
			kind,
			color: if raw.color_flag == 0 { NodeColor::Red } else { NodeColor::Black },
			left_sibling_id: raw.left_sibling_id.get(),
			right_sibling_id: raw.right_sibling_id.get(),
			clsid: raw.clsid,
			state_bits: raw.state_bits.get(),
			creation_time: raw.creation_time.get(),
			modified_time: raw.modified_time.get(),
		})
	}

	fn unused(id: u32) -> DirectoryEntry {
		DirectoryEntry {
			id,
			name: String::new(),
			kind: EntryKind::Unused,
			color: NodeColor::Black,
			left_sibling_id: NOSTREAM,
			right_sibling_id: NOSTREAM,
			clsid: [0; 16],
			state_bits: 0,
			creation_time: 0,
			modified_time: 0,
		}
	}

	/// The root of this entry's child tree, or NOSTREAM.
	pub fn child_id(&self) -> u32 {
		match self.kind {
			EntryKind::Storage { child } | EntryKind::Root { child, .. } => child,
			_ => NOSTREAM,
		}
	}

	pub fn created(&self) -> Option<DateTime<Utc>> {
		filetime_to_datetime(self.creation_time)
	}

	pub fn modified(&self) -> Option<DateTime<Utc>> {
		filetime_to_datetime(self.modified_time)
	}
}

/// Orders sibling names: shorter names first, then code unit by code unit after simple upper-casing.
pub fn compare_names(a: &str, b: &str) -> Ordering {
	let a_len = a.encode_utf16().count();
	let b_len = b.encode_utf16().count();
	a_len.cmp(&b_len).then_with(|| {
		a.encode_utf16().map(fold_case).cmp(b.encode_utf16().map(fold_case))
	})
}

/// One-to-one upper-casing of a UTF-16 code unit. Surrogates and characters whose upper case
/// expands to several characters are left alone.
fn fold_case(unit: u16) -> u16 {
	let c = match std::char::from_u32(unit as u32) {
		Some(c) => c,
		None => return unit,
	};
	let mut upper = c.to_uppercase();
	match (upper.next(), upper.next()) {
		(Some(u), None) if (u as u32) <= 0xFFFF => u as u16,
		_ => unit,
	}
}

/// Converts a FILETIME (100 ns intervals since 1601-01-01) into a date. Zero means "not set".
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
	const WINDOWS_EPOCH_OFFSET: i128 = 116_444_736_000_000_000;
	if filetime == 0 {
		return None;
	}
	let unix_ticks = filetime as i128 - WINDOWS_EPOCH_OFFSET;
	let seconds = unix_ticks.div_euclid(10_000_000) as i64;
	let nanos = (unix_ticks.rem_euclid(10_000_000) * 100) as u32;
	DateTime::from_timestamp(seconds, nanos)
}

/// Formats a class ID as `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`, or an empty string if it is all zeros.
pub fn format_clsid(clsid: &[u8; 16]) -> String {
	if clsid.iter().all(|&b| b == 0) {
		return String::new();
	}
	format!(
		"{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
		u32::from_le_bytes([clsid[0], clsid[1], clsid[2], clsid[3]]),
		u16::from_le_bytes([clsid[4], clsid[5]]),
		u16::from_le_bytes([clsid[6], clsid[7]]),
		clsid[8], clsid[9], clsid[10], clsid[11], clsid[12], clsid[13], clsid[14], clsid[15],
	)
}

/// All directory entries of a document, indexed by slot, plus the resolved folder hierarchy.
#[derive(Debug, Clone)]
pub struct Directory {
	entries: Vec<DirectoryEntry>,
	children: Vec<Vec<u32>>,
	parents: Vec<Option<u32>>,
}

impl Directory {
	/// Parses the raw directory stream (a whole number of sectors) and resolves the tree.
	pub fn parse(data: &[u8], major_version: u16) -> Result<Directory> {
		let entries = data
			.chunks_exact(DIRECTORY_ENTRY_SIZE)
			.enumerate()
			.map(|(id, bytes)| DirectoryEntry::parse(bytes, id as u32, major_version))
			.collect::<Result<Vec<_>>>()?;
		debug!("[parse] Directory has {} slot(s).", entries.len());
		Directory::from_entries(entries)
	}

	/// Checks the root and walks the tree from it. Every reachable entry must be reached exactly once.
	pub fn from_entries(entries: Vec<DirectoryEntry>) -> Result<Directory> {
		match entries.first() {
			Some(DirectoryEntry { kind: EntryKind::Root { .. }, .. }) => {},
			Some(entry) => return Err(Error::format(format!("invalid root entry type {:?}", entry.kind))),
			None => return Err(Error::format("empty directory")),
		}
		if let Some(entry) = entries.iter().skip(1).find(|e| matches!(e.kind, EntryKind::Root { .. })) {
			return Err(Error::format(format!("directory entry #{} is a second root entry", entry.id)));
		}

		let mut children = vec![Vec::new(); entries.len()];
		let mut parents = vec![None; entries.len()];
		let mut reached = FixedBitSet::with_capacity(entries.len());
		reached.insert(0);

		let mut pending = vec![0u32];
		while let Some(storage) = pending.pop() {
			let ids = Directory::resolve_children(&entries, storage)?;
			for &id in &ids {
				if reached.put(id as usize) {
					return Err(Error::format(format!("cyclic reference: entry #{} is reachable more than once", id)));
				}
				parents[id as usize] = Some(storage);
				if let EntryKind::Storage { .. } = entries[id as usize].kind {
					pending.push(id);
				}
			}
			children[storage as usize] = ids;
		}

		Ok(Directory { entries, children, parents })
	}

	/// In-order traversal of the sibling tree hanging off `entries[storage]`, giving the children sorted by
	/// `compare_names`. Revisiting a slot during the traversal is a cycle.
	pub fn resolve_children(entries: &[DirectoryEntry], storage: u32) -> Result<Vec<u32>> {
		let root = match entries.get(storage as usize) {
			Some(entry) => entry.child_id(),
			None => return Err(Error::format(format!("entry #{} does not exist", storage))),
		};

		let mut visited = FixedBitSet::with_capacity(entries.len());
		let mut ids = Vec::new();
		let mut stack = Vec::new();
		let mut current = root;
		loop {
			while current != NOSTREAM {
				let entry = entries.get(current as usize)
					.ok_or_else(|| Error::format(format!("link to entry #{} in storage #{} is out of range", current, storage)))?;
				match entry.kind {
					EntryKind::Unused | EntryKind::Root { .. } => {
						return Err(Error::format(format!("storage #{} links to entry #{} of kind {:?}", storage, current, entry.kind)));
					},
					_ => {},
				}
				if visited.put(current as usize) {
					return Err(Error::format(format!("cyclic reference in the children of storage #{} at entry #{}", storage, current)));
				}
				stack.push(current);
				current = entry.left_sibling_id;
			}
			match stack.pop() {
				Some(id) => {
					ids.push(id);
					current = entries[id as usize].right_sibling_id;
				},
				None => break,
			}
		}

		let name = |id: u32| entries[id as usize].name.as_str();
		if ids.windows(2).any(|pair| compare_names(name(pair[0]), name(pair[1])) == Ordering::Greater) {
			warn!("[resolve_children] Children of storage #{} are not stored in sorted order, sorting them.", storage);
			ids.sort_by(|&a, &b| compare_names(name(a), name(b)));
		}
		if let Some(pair) = ids.windows(2).find(|pair| compare_names(name(pair[0]), name(pair[1])) == Ordering::Equal) {
			return Err(Error::format(format!("storage #{} has two children named '{}' (#{} and #{})", storage, name(pair[1]), pair[0], pair[1])));
		}
		Ok(ids)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn entries(&self) -> &[DirectoryEntry] {
		&self.entries
	}

	pub fn get(&self, id: u32) -> Option<&DirectoryEntry> {
		self.entries.get(id as usize)
	}

	pub fn root(&self) -> &DirectoryEntry {
		&self.entries[0]
	}

	/// Children of a storage (empty for streams), in sibling order.
	pub fn children(&self, id: u32) -> &[u32] {
		self.children.get(id as usize).map(|ids| ids.as_slice()).unwrap_or(&[])
	}

	pub fn parent(&self, id: u32) -> Option<u32> {
		self.parents.get(id as usize).cloned().flatten()
	}

	/// Whether the entry is part of the tree (the root, or reachable from it).
	pub fn is_reachable(&self, id: u32) -> bool {
		id == 0 || self.parent(id).is_some()
	}

	/// Case-insensitive lookup of a direct child by name.
	pub fn find_child(&self, storage: u32, name: &str) -> Option<u32> {
		let children = self.children(storage);
		children
			.binary_search_by(|&id| compare_names(&self.entries[id as usize].name, name))
			.ok()
			.map(|index| children[index])
	}
}
