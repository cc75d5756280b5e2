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

#[macro_use] // enable value_t! macro
extern crate clap;
extern crate compdoc;

use std::io::{Cursor, Read, Seek, Write, BufReader, BufWriter, stdin, stdout};
use std::fs::File;
use clap::{Arg, App, AppSettings, SubCommand, ArgMatches};
use compdoc::cfbf::{self, Document, Error, Result};
use compdoc::debug;

trait ReadSeek: Read + Seek { }
impl<T> ReadSeek for T where T: Read + Seek { }

fn main() {
	let input_arg = Arg::with_name("input")
		.value_name("FILE")
		.help("A file in Compound File Binary File Format (CFBF). If omitted (or '-'), the file will be read from STDIN instead.")
		.short("i")
		.long("input")
		.takes_value(true)
		.required(false);

	let matches = App::new("cfbfdump")
		.version("1.0")
		.author("Steve Muller <steve.muller@outlook.com>")
		.about("This utility reads a Compound File Binary File Format (also known as OLE file, COM file, or Structured Storage file) and dumps all contained files.")
		.setting(AppSettings::SubcommandRequired)
		.arg(Arg::with_name("verbose")
			.short("v")
			.help("Increases the debug verbosity. This will print a lot of debug messages to standard error (STDERR). Can be used up to 3 times.")
			.multiple(true)
			.takes_value(false))
		.subcommand(SubCommand::with_name("list")
			.about("Lists all entries contained in the CFBF file. Each output line represents an entry, and contains the internal entry ID and the entry path, separated by a space. Storage paths end with a slash.")
			.arg(input_arg.clone())
		)
		.subcommand(SubCommand::with_name("dump")
			.about("Dumps a stream from the CFBF file. Dumping the root entry dumps the ministream.")
			.arg(Arg::with_name("id")
				.value_name("STREAMID")
				.help("The ID of the stream that shall be dumped.")
				.long("id")
				.takes_value(true)
				.required_unless("path")
				.conflicts_with("path"))
			.arg(Arg::with_name("path")
				.value_name("PATH")
				.help("The absolute path of the stream that shall be dumped, e.g. '/Storage/Stream'. Case-insensitive.")
				.long("path")
				.takes_value(true))
			.arg(Arg::with_name("output")
				.value_name("FILE")
				.help("The file where the stream shall be written to. If this parameter is not specified (or has the value '-'), the stream will be written to STDOUT instead.")
				.short("o")
				.long("output")
				.takes_value(true)
				.required(false))
			.arg(input_arg.clone())
		)
		.subcommand(SubCommand::with_name("info")
			.about("Prints a summary of the CFBF file header and allocation tables.")
			.arg(input_arg)
		)
	.get_matches();

	let verbose = matches.occurrences_of("verbose");
	if let Err(e) = debug::init(verbose) {
		eprintln!("ERROR: {}", e);
		std::process::exit(1);
	}

	if let Err(e) = dispatch(&matches) {
		eprintln!("ERROR: {}", e);
		std::process::exit(1);
	}
}

fn dispatch(matches: &ArgMatches) -> Result<()> {
	match matches.subcommand() {
		("list", Some(submatches)) => dispatch_list(submatches),
		("dump", Some(submatches)) => dispatch_dump(submatches),
		("info", Some(submatches)) => dispatch_info(submatches),
		(name, _) => Err(Error::format(format!("unrecognised subcommand '{}'", name))),
	}
}

/// Opens the input file, or buffers STDIN into memory so that it can be seeked.
fn open_input(matches: &ArgMatches) -> Result<Document<Box<dyn ReadSeek>>> {
	let input: Box<dyn ReadSeek> = match matches.value_of("input").unwrap_or("-") {
		"" | "-" => {
			let mut data = Vec::new();
			stdin().read_to_end(&mut data)?;
			Box::new(Cursor::new(data))
		},
		inputfile => Box::new(BufReader::new(File::open(inputfile)?)),
	};
	Document::open(input)
}

fn dispatch_list(matches: &ArgMatches) -> Result<()> {
	let document = open_input(matches)?;
	let mut output = BufWriter::new(stdout());
	for (path, entry) in document.walk() {
		if entry.is_stream() || path == "/" {
			writeln!(output, "{} {}", entry.id(), path)?;
		}
		else {
			writeln!(output, "{} {}/", entry.id(), path)?;
		}
	}
	output.flush()?;
	Ok(())
}

fn dispatch_dump(matches: &ArgMatches) -> Result<()> {
	let document = open_input(matches)?;
	let entry = match matches.value_of("path") {
		Some(path) => document.entry_by_path(path)
			.ok_or_else(|| Error::format(format!("no entry at path '{}'", path)))?,
		None => {
			let id = value_t!(matches, "id", u32).unwrap_or_else(|e| e.exit());
			document.entry(id)
				.ok_or_else(|| Error::format(format!("no entry with ID {}", id)))?
		},
	};

	let mut stream = entry.input_stream()?;
	let mut output: Box<dyn Write> = match matches.value_of("output").unwrap_or("-") {
		"" | "-" => Box::new(BufWriter::new(stdout())),
		outputfile => Box::new(BufWriter::new(File::create(outputfile)?)),
	};
	std::io::copy(&mut stream, &mut output)?;
	output.flush()?;
	Ok(())
}

fn dispatch_info(matches: &ArgMatches) -> Result<()> {
	let document = open_input(matches)?;
	let header = document.header();
	println!("{}", document);
	println!("version: {}.{}", header.major_version, header.minor_version);
	println!("mini stream cutoff: {} bytes", header.mini_stream_cutoff_size);
	println!("FAT entries: {}", document.fat().len());
	println!("miniFAT entries: {} (sector #{:#X}, {} sector(s))", document.minifat().len(), header.first_mini_fat_sector_location, header.number_of_mini_fat_sectors);
	println!("DIFAT: first sector #{:#X}, {} sector(s)", header.first_difat_sector_location, header.number_of_difat_sectors);
	println!("ministream: {} bytes", document.ministream_len());
	println!("directory entries: {} ({} in the tree)", document.directory().len(), document.walk().len());
	let root = document.root_entry();
	if !cfbf::format_clsid(root.clsid()).is_empty() {
		println!("root clsid: {}", cfbf::format_clsid(root.clsid()));
	}
	if let Some(modified) = root.modified() {
		println!("root modified: {}", modified.to_rfc3339());
	}
	Ok(())
}
