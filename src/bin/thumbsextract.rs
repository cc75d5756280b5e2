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

extern crate clap;
extern crate compdoc;

use std::io::{stdin, stdout, Cursor, BufReader, BufWriter, Read, Seek, Write};
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::Path;
use clap::{Arg, App};
use compdoc::cfbf::{Error, Result};
use compdoc::debug;
use compdoc::thumbsdb::ThumbsDb;
use log::info;

trait ReadSeek: Read + Seek { }
impl<T> ReadSeek for T where T: Read + Seek { }

fn main() {
	let matches = App::new("thumbsextract")
		.version("1.0")
		.author("Steve Muller <steve.muller@outlook.com>")
		.about("This utility reads a Windows thumbnail cache file (Thumbs.db) and extracts the cached thumbnails.")
		.arg(Arg::with_name("verbose")
			.short("v")
			.help("Increases the debug verbosity. This will print a lot of debug messages to standard error (STDERR). Can be used up to 3 times.")
			.multiple(true)
			.takes_value(false))
		.arg(Arg::with_name("input")
			.short("i")
			.long("input")
			.value_name("FILE")
			.help("If specified, then the Thumbs.db file will be read from this file. Otherwise it will be read from standard input (STDIN).")
			.takes_value(true))
		.arg(Arg::with_name("target")
			.short("t")
			.long("target")
			.value_name("DIR")
			.help("The directory where the thumbnails shall be written to. Each thumbnail is named '<stream>_<file>.jpg', after its stream name and the file it belongs to.")
			.takes_value(true)
			.required_unless("list"))
		.arg(Arg::with_name("list")
			.long("list")
			.help("Lists the catalog instead of extracting. Each output line contains the thumbnail stream name and the file name, separated by a space.")
			.takes_value(false))
	.get_matches();

	let verbose = matches.occurrences_of("verbose");
	if let Err(e) = debug::init(verbose) {
		eprintln!("ERROR: {}", e);
		std::process::exit(1);
	}

	let inputfile = matches.value_of("input").unwrap_or("-");
	let result = open_input(inputfile).and_then(|thumbs| {
		match matches.value_of("target") {
			Some(target) if !matches.is_present("list") => extract(&thumbs, Path::new(target)),
			_ => list(&thumbs),
		}
	});
	if let Err(e) = result {
		eprintln!("ERROR: {}", e);
		std::process::exit(1);
	}
}

fn open_input(inputfile: &str) -> Result<ThumbsDb<Box<dyn ReadSeek>>> {
	let input: Box<dyn ReadSeek> = match inputfile {
		"" | "-" => {
			let mut data = Vec::new();
			stdin().read_to_end(&mut data)?;
			Box::new(Cursor::new(data))
		},
		_ => Box::new(BufReader::new(File::open(inputfile)?)),
	};
	ThumbsDb::open(input)
}

fn list(thumbs: &ThumbsDb<Box<dyn ReadSeek>>) -> Result<()> {
	let mut output = BufWriter::new(stdout());
	for item in thumbs.catalog().items() {
		writeln!(output, "{} {}", item.stream_name(), item.name)?;
	}
	output.flush()?;
	Ok(())
}

fn extract(thumbs: &ThumbsDb<Box<dyn ReadSeek>>, target: &Path) -> Result<()> {
	fs::create_dir_all(target)?;
	let mut written = HashSet::new();
	for (index, item) in thumbs.catalog().items().iter().enumerate() {
		let path = target.join(item.thumbnail_file_name());
		if !written.insert(path.clone()) {
			return Err(Error::format(format!("catalog item {} would overwrite '{}'", item.id, path.display())));
		}
		let data = thumbs.thumbnail(index)?;
		fs::write(&path, &data)?;
		info!("[extract] Wrote {} bytes to '{}'.", data.len(), path.display());
	}
	Ok(())
}
