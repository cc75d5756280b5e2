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

//! Reader for the Compound File Binary File Format (also known as OLE file, COM file, or Structured Storage file).
//!
//! A compound document is a small file system inside a single file: fixed-size sectors, linked into chains by an
//! allocation table (FAT), and a directory of named storages (folders) and streams (files). Streams smaller than
//! the cutoff size live in the ministream, at mini-sector granularity, and are chained through the miniFAT.

pub mod structures;
mod error;
mod header;
mod sector;
mod fat;
mod directory;
mod stream;
mod document;

pub use self::error::{Error, Result};
pub use self::header::Header;
pub use self::sector::SectorReader;
pub use self::fat::{AllocationTable, Link};
pub use self::directory::{compare_names, filetime_to_datetime, format_clsid, Directory, DirectoryEntry, EntryKind, NodeColor};
pub use self::stream::{Location, Stream};
pub use self::document::{is_compound_document, Document, Entry};
