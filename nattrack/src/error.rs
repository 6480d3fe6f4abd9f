//! Error types for the tracker.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for startup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Bad configuration; fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("cannot read {path}: {source}")]
	Read { path: PathBuf, source: io::Error },

	#[error("invalid configuration file {path}: {message}")]
	Parse { path: PathBuf, message: String },

	#[error("interval must be at least one second")]
	ZeroInterval,

	#[error("output path {0} is not a directory")]
	NotADirectory(PathBuf),
}

/// Failures getting a snapshot. Only `Open` and `Unsupported` are fatal;
/// the rest abort the current cycle.
#[derive(Debug, Error)]
pub enum SourceError {
	#[error("cannot open {path}: {source}")]
	Open { path: PathBuf, source: io::Error },

	#[error("{0}")]
	Unsupported(String),

	#[cfg(target_os = "freebsd")]
	#[error("out of memory growing state buffer to {0} bytes")]
	Alloc(usize),

	#[cfg(target_os = "freebsd")]
	#[error("failed to get states from the packet filter: {0}")]
	Fetch(#[source] io::Error),

	#[error("read failed: {0}")]
	Read(#[from] io::Error),

	#[error("line {line}: {reason}")]
	Malformed { line: usize, reason: String },
}

/// Output failures; the sink falls back to stdout on these.
#[derive(Debug, Error)]
pub enum SinkError {
	#[error("cannot open {path}: {source}")]
	Open { path: PathBuf, source: io::Error },

	#[error("write failed: {0}")]
	Write(#[from] io::Error),

	#[error("csv: {0}")]
	Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
#[error("CSPRNG unavailable: {0}")]
pub struct SeedError(#[from] getrandom::Error);

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	Source(#[from] SourceError),

	#[error(transparent)]
	Seed(#[from] SeedError),
}
