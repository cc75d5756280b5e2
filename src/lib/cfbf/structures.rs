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

// Also see: [MS-CFB]: Compound File Binary File Format specifications, https://msdn.microsoft.com/en-us/library/dd942138.aspx

use zerocopy::{LE, U16, U32, U64};
use zerocopy_derive::FromBytes as DeriveFromBytes;

/// The 8-byte signature every compound document starts with.
pub const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// The header is always 512 bytes long, independent of the sector size.
pub const HEADER_SIZE: usize = 512;

/// Number of DIFAT entries stored in the header itself.
pub const HEADER_DIFAT_ENTRIES: usize = 109;

/// Directory entries are 128 bytes long.
pub const DIRECTORY_ENTRY_SIZE: usize = 128;

/// Little-endian byte order mark (0xFFFE).
pub const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0xFFFE;

pub const MIN_SECTOR_SHIFT: u16 = 7;
pub const MAX_SECTOR_SHIFT: u16 = 12;
pub const MIN_MINI_SECTOR_SHIFT: u16 = 2;
pub const MAX_MINI_SECTOR_SHIFT: u16 = 6;

/// Highest regular sector number; everything above is a marker.
pub const MAXREGSECT: u32 = 0xFFFF_FFFA;
/// Sector holds DIFAT entries.
pub const DIFSECT: u32 = 0xFFFF_FFFC;
/// Sector holds FAT entries.
pub const FATSECT: u32 = 0xFFFF_FFFD;
/// Terminates a sector chain.
pub const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
/// Unallocated sector.
pub const FREESECT: u32 = 0xFFFF_FFFF;
/// Absent sibling/child link in the directory.
pub const NOSTREAM: u32 = 0xFFFF_FFFF;

pub const OBJECT_TYPE_UNUSED: u8 = 0;
pub const OBJECT_TYPE_STORAGE: u8 = 1;
pub const OBJECT_TYPE_STREAM: u8 = 2;
pub const OBJECT_TYPE_ROOT_STORAGE: u8 = 5;

/// On-disk header of a CFBF file, including the trailing DIFAT entries.
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
pub struct RawHeader {
	pub signature: [u8; 8],
	pub clsid: [u8; 16],
	pub minor_version: U16<LE>,
	pub major_version: U16<LE>,
	pub byte_order: U16<LE>,
	pub sector_shift: U16<LE>,
	pub mini_sector_shift: U16<LE>,
	pub reserved: [u8; 6],
	pub number_of_directory_sectors: U32<LE>,
	pub number_of_fat_sectors: U32<LE>,
	pub first_directory_sector_location: U32<LE>,
	pub transaction_signature_number: U32<LE>,
	pub mini_stream_cutoff_size: U32<LE>,
	pub first_mini_fat_sector_location: U32<LE>,
	pub number_of_mini_fat_sectors: U32<LE>,
	pub first_difat_sector_location: U32<LE>,
	pub number_of_difat_sectors: U32<LE>,
	pub difat: [U32<LE>; HEADER_DIFAT_ENTRIES],
}

/// On-disk directory entry (128 bytes).
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
pub struct RawDirectoryEntry {
	/// UTF-16LE name, NUL-padded.
	pub name: [u8; 64],
	/// Length of the name in bytes, including the terminating NUL.
	pub name_length: U16<LE>,
	pub object_type: u8,
	pub color_flag: u8,
	pub left_sibling_id: U32<LE>,
	pub right_sibling_id: U32<LE>,
	pub child_id: U32<LE>,
	pub clsid: [u8; 16],
	pub state_bits: U32<LE>,
	pub creation_time: U64<LE>,
	pub modified_time: U64<LE>,
	pub starting_sector_location: U32<LE>,
	pub stream_size: U64<LE>,
}
