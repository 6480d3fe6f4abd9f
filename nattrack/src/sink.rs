// rendering of session events to the console or to a dated log file

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::resolve::Resolver;
use crate::table::SessionEntry;
use crate::types::{Endpoint, Lifecycle, SessionTuple};

pub trait Sink {
	fn render(&mut self, entry: &SessionEntry, event: Lifecycle);
	fn flush(&mut self) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Format {
	Text,
	Csv,
}

impl Default for Format {
	fn default() -> Self {
		Format::Text
	}
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
	time: &'a str,
	event: &'static str,
	proto: u8,
	osrc: &'a str,
	osport: u16,
	tsrc: &'a str,
	tsport: u16,
	odst: &'a str,
	odport: u16,
	tdst: &'a str,
	tdport: u16,
	duration: u32,
}

enum Writer {
	Text(Box<dyn Write>),
	Csv(csv::Writer<Box<dyn Write>>),
}

struct Output {
	// None for stdout, which never rolls over
	date: Option<NaiveDate>,
	writer: Writer,
}

pub struct LogSink {
	dir: Option<PathBuf>,
	format: Format,
	resolver: Option<Resolver>,
	out: Option<Output>,
	degraded: bool,
}

pub fn log_file_name(date: NaiveDate) -> String {
	format!("nattrack-{}.log", date.format("%Y-%m-%d"))
}

impl LogSink {
	pub fn new(dir: Option<PathBuf>, format: Format, resolver: Option<Resolver>) -> Self {
		LogSink { dir, format, resolver, out: None, degraded: false }
	}

	/// True once a file error has sent output to stdout for good.
	#[cfg(test)]
	pub fn is_degraded(&self) -> bool {
		self.degraded
	}

	fn host(&mut self, ep: &Endpoint) -> String {
		match self.resolver.as_mut() {
			Some(r) => r.name(ep.addr),
			None => ep.addr.to_string(),
		}
	}

	fn writer_for(&self, sink: Box<dyn Write>, fresh: bool) -> Writer {
		match self.format {
			Format::Text => Writer::Text(sink),
			Format::Csv => Writer::Csv(
				csv::WriterBuilder::new()
					.has_headers(fresh)
					.from_writer(sink),
			),
		}
	}

	fn stdout(&self) -> Output {
		Output { date: None, writer: self.writer_for(Box::new(io::stdout()), true) }
	}

	fn open_file(&self, dir: &Path, date: NaiveDate) -> Result<Output, SinkError> {
		let path = dir.join(log_file_name(date));
		let open = |path: &Path| -> io::Result<File> {
			fs::create_dir_all(dir)?;
			OpenOptions::new().create(true).append(true).open(path)
		};
		let file = open(&path).map_err(|source| SinkError::Open { path: path.clone(), source })?;
		// only a new or empty file gets a CSV header
		let fresh = file.metadata().map(|m| m.len() == 0).unwrap_or(true);
		debug!("writing sessions to {}", path.display());
		Ok(Output { date: Some(date), writer: self.writer_for(Box::new(file), fresh) })
	}

	fn degrade(&mut self, err: &SinkError) {
		if !self.degraded {
			warn!("{}; writing sessions to stdout instead", err);
			self.degraded = true;
		}
		self.out = Some(self.stdout());
	}

	// Picks the current output, rolling the log file over at midnight.
	fn output(&mut self, today: NaiveDate) -> &mut Output {
		let stale = match (&self.out, &self.dir) {
			(None, _) => true,
			(Some(o), Some(_)) if !self.degraded => o.date != Some(today),
			_ => false,
		};
		if stale {
			let opened = match self.dir.clone() {
				Some(dir) if !self.degraded => self.open_file(&dir, today),
				_ => Ok(self.stdout()),
			};
			match opened {
				Ok(out) => self.out = Some(out),
				Err(e) => self.degrade(&e),
			}
		}
		self.out.get_or_insert_with(|| Output {
			date: None,
			writer: Writer::Text(Box::new(io::stdout())),
		})
	}

	fn write(&mut self, now: DateTime<Local>, tuple: &SessionTuple, event: Lifecycle) -> Result<(), SinkError> {
		let k = &tuple.key;
		let hosts = [
			self.host(&k.osrc),
			self.host(&k.tsrc),
			self.host(&k.odst),
			self.host(&k.tdst),
		];
		let time = now.format("%Y-%m-%d,%H:%M:%S").to_string();

		match &mut self.output(now.date_naive()).writer {
			Writer::Text(w) => {
				writeln!(
					w,
					"{} event={} proto={} osrc={}:{} tsrc={}:{} odst={}:{} tdst={}:{} duration={}",
					time, event, k.proto,
					hosts[0], k.osrc.port,
					hosts[1], k.tsrc.port,
					hosts[2], k.odst.port,
					hosts[3], k.tdst.port,
					tuple.duration
				)?;
				w.flush()?;
			}
			Writer::Csv(w) => {
				w.serialize(CsvRow {
					time: &time,
					event: event.as_str(),
					proto: k.proto,
					osrc: &hosts[0],
					osport: k.osrc.port,
					tsrc: &hosts[1],
					tsport: k.tsrc.port,
					odst: &hosts[2],
					odport: k.odst.port,
					tdst: &hosts[3],
					tdport: k.tdst.port,
					duration: tuple.duration,
				})?;
				w.flush()?;
			}
		}
		Ok(())
	}
}

impl Sink for LogSink {
	fn render(&mut self, entry: &SessionEntry, event: Lifecycle) {
		let now = Local::now();
		if let Err(e) = self.write(now, entry.tuple(), event) {
			if self.degraded {
				debug!("dropping session record: {}", e);
				return;
			}
			self.degrade(&e);
			if let Err(e) = self.write(now, entry.tuple(), event) {
				debug!("dropping session record: {}", e);
			}
		}
	}

	fn flush(&mut self) {
		let res = match self.out.as_mut().map(|o| &mut o.writer) {
			Some(Writer::Text(w)) => w.flush(),
			Some(Writer::Csv(w)) => w.flush(),
			None => Ok(()),
		};
		if let Err(e) = res {
			warn!("failed to flush session output: {}", e);
		}
	}
}

#[cfg(test)]
#[derive(Default)]
pub struct MemorySink {
	pub events: Vec<(Lifecycle, SessionTuple)>,
}

#[cfg(test)]
impl Sink for MemorySink {
	fn render(&mut self, entry: &SessionEntry, event: Lifecycle) {
		self.events.push((event, *entry.tuple()));
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::hash::Hasher;
	use crate::table::SessionTable;
	use crate::types::tests::sample;
	use tempfile::TempDir;

	fn render_one(sink: &mut LogSink, duration: u32, event: Lifecycle) {
		let mut table = SessionTable::new(Hasher::with_seed(1), 16);
		let id = table.insert(SessionTuple::new(sample(), duration));
		sink.render(table.get(id).unwrap(), event);
	}

	fn today_log(dir: &Path) -> String {
		let path = dir.join(log_file_name(Local::now().date_naive()));
		fs::read_to_string(path).unwrap()
	}

#[test]
	fn test_file_name() {
		let d = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
		assert_eq!(log_file_name(d), "nattrack-2024-03-07.log");
	}

#[test]
	fn test_text_record() {
		let dir = TempDir::new().unwrap();
		let mut sink = LogSink::new(Some(dir.path().to_path_buf()), Format::Text, None);
		render_one(&mut sink, 42, Lifecycle::Expired);
		sink.flush();

		let log = today_log(dir.path());
		let line = log.lines().next().unwrap();
		assert!(line.ends_with(
			"event=expired proto=6 osrc=10.0.0.1:1111 tsrc=203.0.113.5:2222 odst=8.8.8.8:53 tdst=8.8.8.8:53 duration=42"
		), "{}", line);
		// "YYYY-MM-DD,HH:MM:SS " prefix
		assert_eq!(line.find(' '), Some(19));
		assert!(!sink.is_degraded());
	}

#[test]
	fn test_csv_header_once() {
		let dir = TempDir::new().unwrap();
		let mut sink = LogSink::new(Some(dir.path().to_path_buf()), Format::Csv, None);
		render_one(&mut sink, 1, Lifecycle::New);
		render_one(&mut sink, 2, Lifecycle::Expired);
		drop(sink);

		// a second process appending to the same file
		let mut sink = LogSink::new(Some(dir.path().to_path_buf()), Format::Csv, None);
		render_one(&mut sink, 3, Lifecycle::Flushed);
		drop(sink);

		let log = today_log(dir.path());
		let lines: Vec<_> = log.lines().collect();
		assert_eq!(lines.len(), 4);
		assert_eq!(
			lines[0],
			"time,event,proto,osrc,osport,tsrc,tsport,odst,odport,tdst,tdport,duration"
		);
		assert!(lines[1].contains(",new,6,10.0.0.1,1111,203.0.113.5,2222,8.8.8.8,53,8.8.8.8,53,1"));
		assert!(lines[3].ends_with(",flushed,6,10.0.0.1,1111,203.0.113.5,2222,8.8.8.8,53,8.8.8.8,53,3"));
	}

#[test]
	fn test_creates_missing_dir() {
		let dir = TempDir::new().unwrap();
		let nested = dir.path().join("a").join("b");
		let mut sink = LogSink::new(Some(nested.clone()), Format::Text, None);
		render_one(&mut sink, 0, Lifecycle::Expired);
		assert!(today_log(&nested).contains("event=expired"));
	}

#[test]
	fn test_unwritable_dir_degrades() {
		let dir = TempDir::new().unwrap();
		// a plain file where the directory should be
		let blocker = dir.path().join("not-a-dir");
		fs::write(&blocker, b"x").unwrap();

		let mut sink = LogSink::new(Some(blocker.clone()), Format::Text, None);
		render_one(&mut sink, 0, Lifecycle::Expired);
		assert!(sink.is_degraded());
		render_one(&mut sink, 0, Lifecycle::Expired);
		assert!(sink.is_degraded());
		assert_eq!(fs::read(&blocker).unwrap(), b"x");
	}

#[test]
	fn test_console_sink() {
		let mut sink = LogSink::new(None, Format::Text, None);
		render_one(&mut sink, 0, Lifecycle::Flushed);
		sink.flush();
		assert!(!sink.is_degraded());
	}
}
