// command line and configuration file
//
// Every setting can come from a flag, a NATTRACK_* variable or the TOML file
// named by --config, in that order of precedence.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, Parser};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::sink::Format;

/// pf's PFTM_INTERVAL, the kernel's own purge period
pub const DEFAULT_INTERVAL: u64 = 10;
pub const DEFAULT_DEVICE: &str = "/dev/pf";

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "nattrack")]
#[command(version)]
#[command(about = "Log NAT sessions as the pf packet filter creates and drops them")]
pub struct Args {
	/// TOML file with defaults for the options below
	#[arg(short, long, env = "NATTRACK_CONFIG")]
	pub config: Option<PathBuf>,

	/// Hash bucket count, a power of two (default 32768)
	#[arg(short, long, env = "NATTRACK_BUCKETS")]
	pub buckets: Option<usize>,

	/// Write sessions to DIR/nattrack-YYYY-MM-DD.log instead of stdout
	#[arg(short = 'd', long, value_name = "DIR", env = "NATTRACK_OUTPUT_DIR")]
	pub output_dir: Option<PathBuf>,

	/// Seconds between polls of the state table
	#[arg(short, long, value_name = "SECS", env = "NATTRACK_INTERVAL")]
	pub interval: Option<u64>,

	/// Record format
	#[arg(short, long, value_enum, env = "NATTRACK_FORMAT")]
	pub format: Option<Format>,

	/// Show host names instead of addresses
	#[arg(short, long)]
	pub resolve: bool,

	/// Also log sessions when they first appear
	#[arg(short = 'n', long)]
	pub report_new: bool,

	/// Stop after this many polls
	#[arg(long, value_name = "N", env = "NATTRACK_CYCLES")]
	pub cycles: Option<u64>,

	/// Read recorded snapshots from FILE (`-` for stdin) instead of the pf device
	#[arg(long, value_name = "FILE", env = "NATTRACK_REPLAY")]
	pub replay: Option<PathBuf>,

	/// Packet filter device
	#[arg(long, value_name = "PATH", env = "NATTRACK_DEVICE")]
	pub device: Option<PathBuf>,

	/// More logging
	#[arg(short, long, action = ArgAction::Count)]
	pub verbose: u8,

	/// Only warnings and errors
	#[arg(short, long, conflicts_with = "verbose")]
	pub quiet: bool,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
	pub buckets: Option<usize>,
	pub output_dir: Option<PathBuf>,
	pub interval: Option<u64>,
	pub format: Option<Format>,
	pub resolve: Option<bool>,
	pub report_new: Option<bool>,
	pub cycles: Option<u64>,
	pub replay: Option<PathBuf>,
	pub device: Option<PathBuf>,
}

impl FileConfig {
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let text = fs::read_to_string(path)
			.map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
		toml::from_str(&text).map_err(|e| ConfigError::Parse {
			path: path.to_path_buf(),
			message: e.to_string(),
		})
	}
}

/// Resolved runtime settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
	/// Raw hint, 0 when unset; the table picks the real size.
	pub buckets: usize,
	pub output_dir: Option<PathBuf>,
	pub interval: Duration,
	pub format: Format,
	pub resolve: bool,
	pub report_new: bool,
	pub cycles: Option<u64>,
	pub replay: Option<PathBuf>,
	pub device: PathBuf,
}

impl Settings {
	pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
		let file = match &args.config {
			Some(path) => FileConfig::from_file(path)?,
			None => FileConfig::default(),
		};
		Settings::merge(args, file)
	}

	pub fn merge(args: &Args, file: FileConfig) -> Result<Self, ConfigError> {
		let interval = args.interval.or(file.interval).unwrap_or(DEFAULT_INTERVAL);
		if interval == 0 {
			return Err(ConfigError::ZeroInterval);
		}
		let output_dir = args.output_dir.clone().or(file.output_dir);
		if let Some(dir) = &output_dir {
			if dir.exists() && !dir.is_dir() {
				return Err(ConfigError::NotADirectory(dir.clone()));
			}
		}

		Ok(Settings {
			buckets: args.buckets.or(file.buckets).unwrap_or(0),
			output_dir,
			interval: Duration::from_secs(interval),
			format: args.format.or(file.format).unwrap_or_default(),
			resolve: args.resolve || file.resolve.unwrap_or(false),
			report_new: args.report_new || file.report_new.unwrap_or(false),
			cycles: args.cycles.or(file.cycles),
			replay: args.replay.clone().or(file.replay),
			device: args
				.device
				.clone()
				.or(file.device)
				.unwrap_or_else(|| PathBuf::from(DEFAULT_DEVICE)),
		})
	}
}
