use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shm_mailbox::{pack_ascii, render_ascii, SharedRegion, DEFAULT_SHM_NAME, DEFAULT_SLOTS};
use std::path::PathBuf;

/// Read and write the dead drop's shared mailboxes from outside the engine
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
	/// Shared memory object holding the mailboxes
	#[arg(short, long, default_value = DEFAULT_SHM_NAME)]
	name: String,

	/// Map this file instead of a shared memory object
	#[arg(short, long)]
	file: Option<PathBuf>,

	/// Number of mailboxes in the region
	#[arg(short, long, default_value_t = DEFAULT_SLOTS)]
	slots: usize,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Print the content of a mailbox
	Read { index: usize },
	/// Store up to four ASCII characters in a mailbox
	Write { index: usize, value: String },
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	let region = match &cli.file {
		Some(path) => SharedRegion::map_file(path, cli.slots, false)
			.with_context(|| format!("mapping {}", path.display()))?,
		None => SharedRegion::open(&cli.name, cli.slots)
			.with_context(|| format!("opening shared memory {}", cli.name))?,
	};

	match cli.command {
		Command::Read { index } => {
			let value = region.read(index)?;
			println!(
				"Data at mailbox {} in CHAR: {}, in HEX: 0x{:08x}",
				index,
				render_ascii(value),
				value
			);
		}
		Command::Write { index, value } => {
			let packed = pack_ascii(&value)?;
			region.write(index, packed)?;
			println!("Wrote {} to mailbox {}", value, index);
		}
	}
	Ok(())
}
