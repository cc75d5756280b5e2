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

//! Writes compound documents for the integration tests, and remembers where every structure ended up
//! so that tests can corrupt them on purpose.

#![allow(dead_code)]

use compdoc::cfbf::compare_names;
use compdoc::cfbf::structures::*;

pub const MINI_STREAM_CUTOFF: u32 = 4096;
pub const MINI_SECTOR_SIZE: usize = 64;

enum Content {
	Storage,
	Stream(Vec<u8>),
}

struct Node {
	path: String,
	name: String,
	parent: u32,
	content: Content,
	modified_time: u64,
}

pub struct DocumentBuilder {
	sector_shift: u16,
	fragmented: bool,
	padding: u32,
	root_clsid: [u8; 16],
	nodes: Vec<Node>,
}

/// Where a stream's content was placed.
#[derive(Debug, Clone)]
pub struct StreamLayout {
	pub id: u32,
	pub path: String,
	pub data: Vec<u8>,
	pub mini: bool,
	/// Sector (or mini-sector) numbers in chain order.
	pub chain: Vec<u32>,
}

/// A written document plus the locations of its structures.
#[derive(Debug, Clone)]
pub struct Layout {
	pub bytes: Vec<u8>,
	pub sector_size: usize,
	pub header_span: usize,
	pub fat_sectors: Vec<u32>,
	pub difat_sectors: Vec<u32>,
	pub directory_sectors: Vec<u32>,
	pub minifat_sectors: Vec<u32>,
	pub ministream_chain: Vec<u32>,
	pub ministream_len: usize,
	pub streams: Vec<StreamLayout>,
	/// Path of every directory entry, indexed by ID. The root is `/`.
	pub paths: Vec<String>,
}

impl Layout {
	pub fn sector_count(&self) -> usize {
		(self.bytes.len() - self.header_span) / self.sector_size
	}

	pub fn sector_offset(&self, sector: u32) -> usize {
		self.header_span + sector as usize * self.sector_size
	}

	pub fn fat_entry_offset(&self, sector: u32) -> usize {
		let per_sector = self.sector_size / 4;
		self.sector_offset(self.fat_sectors[sector as usize / per_sector]) + (sector as usize % per_sector) * 4
	}

	pub fn minifat_entry_offset(&self, mini_sector: u32) -> usize {
		let per_sector = self.sector_size / 4;
		self.sector_offset(self.minifat_sectors[mini_sector as usize / per_sector]) + (mini_sector as usize % per_sector) * 4
	}

	pub fn directory_entry_offset(&self, id: u32) -> usize {
		let per_sector = self.sector_size / DIRECTORY_ENTRY_SIZE;
		self.sector_offset(self.directory_sectors[id as usize / per_sector]) + (id as usize % per_sector) * DIRECTORY_ENTRY_SIZE
	}

	pub fn read_u32(&self, offset: usize) -> u32 {
		u32::from_le_bytes([self.bytes[offset], self.bytes[offset + 1], self.bytes[offset + 2], self.bytes[offset + 3]])
	}

	pub fn patch_u32(&mut self, offset: usize, value: u32) {
		self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
	}

	pub fn set_fat_entry(&mut self, sector: u32, value: u32) {
		let offset = self.fat_entry_offset(sector);
		self.patch_u32(offset, value);
	}

	pub fn set_minifat_entry(&mut self, mini_sector: u32, value: u32) {
		let offset = self.minifat_entry_offset(mini_sector);
		self.patch_u32(offset, value);
	}

	/// Overwrites a link (left sibling, right sibling or child) of a directory entry.
	pub fn set_link(&mut self, id: u32, link: Link, value: u32) {
		let offset = self.directory_entry_offset(id) + link as usize;
		self.patch_u32(offset, value);
	}

	pub fn id_of(&self, path: &str) -> u32 {
		self.paths.iter().position(|p| p == path).expect("no such path") as u32
	}

	pub fn stream(&self, path: &str) -> &StreamLayout {
		self.streams.iter().find(|s| s.path == path).expect("no such stream")
	}
}

/// Byte offsets of the links inside a directory entry.
#[derive(Debug, Clone, Copy)]
pub enum Link {
	Left = 68,
	Right = 72,
	Child = 76,
}

impl DocumentBuilder {
	pub fn new() -> DocumentBuilder {
		DocumentBuilder {
			sector_shift: 9,
			fragmented: false,
			padding: 0,
			root_clsid: [0; 16],
			nodes: Vec::new(),
		}
	}

	pub fn sector_shift(mut self, sector_shift: u16) -> DocumentBuilder {
		self.sector_shift = sector_shift;
		self
	}

	/// Lays out every chain backwards, so that no chain is contiguous in ascending order.
	pub fn fragmented(mut self) -> DocumentBuilder {
		self.fragmented = true;
		self
	}

	/// Adds unused sectors, e.g. to grow the FAT beyond what the header can list.
	pub fn padding(mut self, sectors: u32) -> DocumentBuilder {
		self.padding = sectors;
		self
	}

	pub fn root_clsid(mut self, clsid: [u8; 16]) -> DocumentBuilder {
		self.root_clsid = clsid;
		self
	}

	pub fn storage(self, path: &str) -> DocumentBuilder {
		self.add(path, Content::Storage, 0)
	}

	pub fn stream(self, path: &str, data: &[u8]) -> DocumentBuilder {
		self.add(path, Content::Stream(data.to_vec()), 0)
	}

	pub fn stream_modified(self, path: &str, data: &[u8], modified_time: u64) -> DocumentBuilder {
		self.add(path, Content::Stream(data.to_vec()), modified_time)
	}

	fn add(mut self, path: &str, content: Content, modified_time: u64) -> DocumentBuilder {
		let (parent_path, name) = path.rsplit_once('/').expect("paths must be absolute");
		let parent = if parent_path.is_empty() {
			0
		}
		else {
			1 + self.nodes.iter().position(|n| n.path == parent_path).expect("parent must be added first") as u32
		};
		self.nodes.push(Node { path: path.to_string(), name: name.to_string(), parent, content, modified_time });
		self
	}

	pub fn build(&self) -> Layout {
		let sector_size = 1usize << self.sector_shift;
		let header_span = sector_size.max(HEADER_SIZE);
		let fat_per_sector = sector_size / 4;
		let entry_count = self.nodes.len() + 1;
		let entries_per_sector = sector_size / DIRECTORY_ENTRY_SIZE;

		// Mini streams go into the ministream, in mini-sectors chained through the miniFAT
		let mut minifat: Vec<u32> = Vec::new();
		let mut ministream: Vec<u8> = Vec::new();
		let mut streams = Vec::new();
		for (index, node) in self.nodes.iter().enumerate() {
			if let Content::Stream(ref data) = node.content {
				let mini = (data.len() as u32) < MINI_STREAM_CUTOFF;
				let mut chain = Vec::new();
				if mini && !data.is_empty() {
					let first = minifat.len() as u32;
					let count = ceil_div(data.len(), MINI_SECTOR_SIZE) as u32;
					chain = self.chain_over(first, count);
					minifat.resize((first + count) as usize, FREESECT);
					link(&chain, &mut minifat);
					for (k, &mini_sector) in chain.iter().enumerate() {
						let chunk = &data[k * MINI_SECTOR_SIZE..data.len().min((k + 1) * MINI_SECTOR_SIZE)];
						let start = mini_sector as usize * MINI_SECTOR_SIZE;
						if ministream.len() < start + MINI_SECTOR_SIZE {
							ministream.resize(start + MINI_SECTOR_SIZE, 0);
						}
						ministream[start..start + chunk.len()].copy_from_slice(chunk);
					}
				}
				streams.push(StreamLayout { id: index as u32 + 1, path: node.path.clone(), data: data.clone(), mini, chain });
			}
		}

		// Regular sectors, in allocation order
		let mut next = 0u32;
		let directory_sectors = self.allocate(&mut next, ceil_div(entry_count, entries_per_sector) as u32);
		let minifat_sectors = self.allocate(&mut next, ceil_div(minifat.len() * 4, sector_size) as u32);
		let ministream_chain = self.allocate(&mut next, ceil_div(ministream.len(), sector_size) as u32);
		for stream in streams.iter_mut().filter(|s| !s.mini) {
			stream.chain = self.allocate(&mut next, ceil_div(stream.data.len(), sector_size) as u32);
		}
		next += self.padding;

		let used = next as usize;
		let mut fat_count = 1usize;
		let mut difat_count;
		loop {
			difat_count = if fat_count > HEADER_DIFAT_ENTRIES { ceil_div(fat_count - HEADER_DIFAT_ENTRIES, fat_per_sector - 1) } else { 0 };
			if fat_count * fat_per_sector >= used + fat_count + difat_count {
				break;
			}
			fat_count += 1;
		}
		let fat_sectors = (used..used + fat_count).map(|s| s as u32).collect::<Vec<_>>();
		let difat_sectors = (used + fat_count..used + fat_count + difat_count).map(|s| s as u32).collect::<Vec<_>>();
		let total = used + fat_count + difat_count;

		let mut layout = Layout {
			bytes: vec![0u8; header_span + total * sector_size],
			sector_size,
			header_span,
			fat_sectors,
			difat_sectors,
			directory_sectors,
			minifat_sectors,
			ministream_chain,
			ministream_len: ministream.len(),
			streams,
			paths: std::iter::once("/".to_string()).chain(self.nodes.iter().map(|n| n.path.clone())).collect(),
		};

		// FAT
		let mut fat = vec![FREESECT; fat_count * fat_per_sector];
		link(&layout.directory_sectors, &mut fat);
		link(&layout.minifat_sectors, &mut fat);
		link(&layout.ministream_chain, &mut fat);
		for stream in layout.streams.iter().filter(|s| !s.mini) {
			link(&stream.chain, &mut fat);
		}
		for &sector in &layout.fat_sectors {
			fat[sector as usize] = FATSECT;
		}
		for &sector in &layout.difat_sectors {
			fat[sector as usize] = DIFSECT;
		}
		let fat_chain = layout.fat_sectors.clone();
		write_chain(&mut layout, &fat_chain, &u32_bytes(&fat));

		// DIFAT sectors hold the FAT sector locations that do not fit into the header
		let overflow = layout.fat_sectors.iter().skip(HEADER_DIFAT_ENTRIES).cloned().collect::<Vec<_>>();
		for (index, &difat_sector) in layout.difat_sectors.clone().iter().enumerate() {
			let mut entries = overflow.iter().skip(index * (fat_per_sector - 1)).take(fat_per_sector - 1).cloned().collect::<Vec<_>>();
			entries.resize(fat_per_sector - 1, FREESECT);
			entries.push(layout.difat_sectors.get(index + 1).cloned().unwrap_or(ENDOFCHAIN));
			let offset = layout.sector_offset(difat_sector);
			layout.bytes[offset..offset + sector_size].copy_from_slice(&u32_bytes(&entries));
		}

		// MiniFAT and ministream
		let mut minifat_padded = minifat.clone();
		minifat_padded.resize(layout.minifat_sectors.len() * fat_per_sector, FREESECT);
		let minifat_chain = layout.minifat_sectors.clone();
		write_chain(&mut layout, &minifat_chain, &u32_bytes(&minifat_padded));
		let ministream_chain = layout.ministream_chain.clone();
		write_chain(&mut layout, &ministream_chain, &ministream);

		// Regular streams
		for stream in layout.streams.clone().iter().filter(|s| !s.mini) {
			write_chain(&mut layout, &stream.chain, &stream.data);
		}

		// Directory
		let mut left = vec![NOSTREAM; entry_count];
		let mut right = vec![NOSTREAM; entry_count];
		let mut child = vec![NOSTREAM; entry_count];
		for storage in 0..entry_count as u32 {
			let mut children = self.nodes.iter().enumerate()
				.filter(|(_, n)| n.parent == storage)
				.map(|(i, _)| i as u32 + 1)
				.collect::<Vec<_>>();
			children.sort_by(|&a, &b| compare_names(&self.nodes[a as usize - 1].name, &self.nodes[b as usize - 1].name));
			child[storage as usize] = balanced_tree(&children, &mut left, &mut right);
		}
		let mut directory = Vec::new();
		let (root_start, root_size) = match layout.ministream_chain.first() {
			Some(&first) => (first, ministream.len() as u64),
			None => (ENDOFCHAIN, 0),
		};
		directory.extend(directory_entry("Root Entry", OBJECT_TYPE_ROOT_STORAGE, NOSTREAM, NOSTREAM, child[0], &self.root_clsid, 0, root_start, root_size));
		for (index, node) in self.nodes.iter().enumerate() {
			let id = index + 1;
			let (object_type, start, size) = match node.content {
				Content::Storage => (OBJECT_TYPE_STORAGE, 0, 0),
				Content::Stream(ref data) => {
					let stream = layout.streams.iter().find(|s| s.id == id as u32).expect("stream layout");
					(OBJECT_TYPE_STREAM, stream.chain.first().cloned().unwrap_or(ENDOFCHAIN), data.len() as u64)
				},
			};
			directory.extend(directory_entry(&node.name, object_type, left[id], right[id], child[id], &[0; 16], node.modified_time, start, size));
		}
		while directory.len() < layout.directory_sectors.len() * sector_size {
			directory.extend(unused_directory_entry());
		}
		let directory_chain = layout.directory_sectors.clone();
		write_chain(&mut layout, &directory_chain, &directory);

		// Header
		let major_version: u16 = if self.sector_shift == 12 { 4 } else { 3 };
		let mut header = Vec::with_capacity(HEADER_SIZE);
		header.extend_from_slice(&SIGNATURE);
		header.extend_from_slice(&[0u8; 16]);
		header.extend_from_slice(&0x003Eu16.to_le_bytes());
		header.extend_from_slice(&major_version.to_le_bytes());
		header.extend_from_slice(&BYTE_ORDER_LITTLE_ENDIAN.to_le_bytes());
		header.extend_from_slice(&self.sector_shift.to_le_bytes());
		header.extend_from_slice(&6u16.to_le_bytes());
		header.extend_from_slice(&[0u8; 6]);
		let directory_count = if major_version == 4 { layout.directory_sectors.len() as u32 } else { 0 };
		header.extend_from_slice(&directory_count.to_le_bytes());
		header.extend_from_slice(&(fat_count as u32).to_le_bytes());
		header.extend_from_slice(&layout.directory_sectors[0].to_le_bytes());
		header.extend_from_slice(&0u32.to_le_bytes());
		header.extend_from_slice(&MINI_STREAM_CUTOFF.to_le_bytes());
		header.extend_from_slice(&layout.minifat_sectors.first().cloned().unwrap_or(ENDOFCHAIN).to_le_bytes());
		header.extend_from_slice(&(layout.minifat_sectors.len() as u32).to_le_bytes());
		header.extend_from_slice(&layout.difat_sectors.first().cloned().unwrap_or(ENDOFCHAIN).to_le_bytes());
		header.extend_from_slice(&(difat_count as u32).to_le_bytes());
		for index in 0..HEADER_DIFAT_ENTRIES {
			header.extend_from_slice(&layout.fat_sectors.get(index).cloned().unwrap_or(FREESECT).to_le_bytes());
		}
		assert_eq!(header.len(), HEADER_SIZE);
		layout.bytes[..HEADER_SIZE].copy_from_slice(&header);

		layout
	}

	/// `count` consecutive numbers starting at `first`, in chain order.
	fn chain_over(&self, first: u32, count: u32) -> Vec<u32> {
		let mut chain = (first..first + count).collect::<Vec<_>>();
		if self.fragmented {
			chain.reverse();
		}
		chain
	}

	fn allocate(&self, next: &mut u32, count: u32) -> Vec<u32> {
		let chain = self.chain_over(*next, count);
		*next += count;
		chain
	}
}

fn ceil_div(a: usize, b: usize) -> usize {
	(a + b - 1) / b
}

fn link(chain: &[u32], table: &mut [u32]) {
	for pair in chain.windows(2) {
		table[pair[0] as usize] = pair[1];
	}
	if let Some(&last) = chain.last() {
		table[last as usize] = ENDOFCHAIN;
	}
}

fn u32_bytes(values: &[u32]) -> Vec<u8> {
	values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Spreads `data` over the sectors of `chain`, in chain order.
fn write_chain(layout: &mut Layout, chain: &[u32], data: &[u8]) {
	for (k, &sector) in chain.iter().enumerate() {
		let chunk = &data[(k * layout.sector_size).min(data.len())..data.len().min((k + 1) * layout.sector_size)];
		let offset = layout.sector_offset(sector);
		layout.bytes[offset..offset + chunk.len()].copy_from_slice(chunk);
	}
}

/// Links `ids` (sorted) into a balanced binary tree and returns its root.
fn balanced_tree(ids: &[u32], left: &mut [u32], right: &mut [u32]) -> u32 {
	if ids.is_empty() {
		return NOSTREAM;
	}
	let middle = ids.len() / 2;
	let root = ids[middle];
	left[root as usize] = balanced_tree(&ids[..middle], left, right);
	right[root as usize] = balanced_tree(&ids[middle + 1..], left, right);
	root
}

#[allow(clippy::too_many_arguments)]
fn directory_entry(name: &str, object_type: u8, left: u32, right: u32, child: u32, clsid: &[u8; 16], modified_time: u64, start: u32, size: u64) -> Vec<u8> {
	let units = name.encode_utf16().collect::<Vec<_>>();
	assert!(units.len() < 32, "name too long");
	let mut entry = Vec::with_capacity(DIRECTORY_ENTRY_SIZE);
	for unit in &units {
		entry.extend_from_slice(&unit.to_le_bytes());
	}
	entry.resize(64, 0);
	entry.extend_from_slice(&(((units.len() + 1) * 2) as u16).to_le_bytes());
	entry.push(object_type);
	entry.push(1);
	entry.extend_from_slice(&left.to_le_bytes());
	entry.extend_from_slice(&right.to_le_bytes());
	entry.extend_from_slice(&child.to_le_bytes());
	entry.extend_from_slice(clsid);
	entry.extend_from_slice(&0u32.to_le_bytes());
	entry.extend_from_slice(&0u64.to_le_bytes());
	entry.extend_from_slice(&modified_time.to_le_bytes());
	entry.extend_from_slice(&start.to_le_bytes());
	entry.extend_from_slice(&size.to_le_bytes());
	assert_eq!(entry.len(), DIRECTORY_ENTRY_SIZE);
	entry
}

fn unused_directory_entry() -> Vec<u8> {
	let mut entry = vec![0u8; DIRECTORY_ENTRY_SIZE];
	for offset in [68usize, 72, 76] {
		entry[offset..offset + 4].copy_from_slice(&NOSTREAM.to_le_bytes());
	}
	entry
}

/// Deterministic filler content.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
	(0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) ^ (i >> 8) as u8).collect()
}
