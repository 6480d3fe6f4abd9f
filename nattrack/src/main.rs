
mod arena;
mod config;
mod decode;
mod error;
mod hash;
mod list;
mod resolve;
mod sink;
mod source;
mod table;
mod tracker;
mod types;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use log::{debug, error, info, warn};

use crate::config::{Args, Settings};
use crate::decode::{decode, RawState};
use crate::hash::Hasher;
use crate::resolve::Resolver;
use crate::sink::{LogSink, Sink};
use crate::source::StateSource;
use crate::table::SessionTable;
use crate::tracker::{CycleStats, Tracker};


static STOP: AtomicBool = AtomicBool::new(false);

// SIGINT and SIGTERM both end the poll loop after the current cycle.
fn install_signal_handlers() {
	if let Err(e) = ctrlc::set_handler(|| STOP.store(true, Ordering::SeqCst)) {
		warn!("cannot install signal handler: {}", e);
	}
}

// Sleeps for `interval`, waking early when a stop is requested.
fn pause(interval: Duration) {
	let deadline = Instant::now() + interval;
	let slice = Duration::from_millis(200);
	while !STOP.load(Ordering::SeqCst) {
		let now = Instant::now();
		if now >= deadline {
			break;
		}
		std::thread::sleep(slice.min(deadline - now));
	}
}

fn init_logging(args: &Args) {
	let level = if args.quiet {
		log::LevelFilter::Warn
	} else if args.verbose > 0 {
		log::LevelFilter::Debug
	} else {
		log::LevelFilter::Info
	};
	env_logger::Builder::new()
		.filter_level(level)
		.parse_default_env()
		.format_target(false)
		.init();
}

fn open_source(settings: &Settings) -> Result<Box<dyn StateSource>, error::SourceError> {
	match &settings.replay {
		Some(path) => Ok(Box::new(source::open_replay(path)?)),
		None => source::open_device(&settings.device),
	}
}

fn reconcile(tracker: &mut Tracker, states: &[RawState], sink: &mut dyn Sink) -> CycleStats {
	tracker.reconcile(states.iter().filter_map(decode), sink)
}

fn poll(source: &mut dyn StateSource, tracker: &mut Tracker, sink: &mut dyn Sink, settings: &Settings) {
	let mut cycle: u64 = 0;
	while !STOP.load(Ordering::SeqCst) {
		if settings.cycles.map_or(false, |n| cycle >= n) {
			info!("stopping after {} cycles", cycle);
			break;
		}
		cycle += 1;

		match source.fetch() {
			Ok(Some(states)) => {
				let s = reconcile(tracker, &states, sink);
				debug!(
					"cycle {}: {} states, {} translated, {} new, {} continuing, {} expired, {} live",
					cycle, states.len(), s.observed, s.new, s.continued, s.expired, s.live
				);
				if s.duplicate > 0 {
					debug!("cycle {}: {} repeated sessions in one snapshot", cycle, s.duplicate);
				}
			}
			Ok(None) => {
				info!("no more snapshots from {}", source.name());
				break;
			}
			// table untouched, retried next cycle
			Err(e) => warn!("cycle {} skipped: {}", cycle, e),
		}

		if source.paced() {
			pause(settings.interval);
		}
	}
}

fn run(args: &Args) -> error::Result<()> {
	let settings = Settings::from_args(args)?;

	let hasher = Hasher::random()?;
	if settings.buckets != 0 && !settings.buckets.is_power_of_two() {
		warn!("bucket count {} is not a power of two, using {}", settings.buckets, table::DEFAULT_BUCKETS);
	}
	let table = SessionTable::new(hasher, settings.buckets);

	let mut source = open_source(&settings)?;
	info!(
		"tracking NAT sessions from {} in {} buckets, every {}s",
		source.name(),
		table.capacity(),
		settings.interval.as_secs()
	);

	let resolver = if settings.resolve { Some(Resolver::new()) } else { None };
	let mut sink = LogSink::new(settings.output_dir.clone(), settings.format, resolver);
	let mut tracker = Tracker::new(table).report_new(settings.report_new);

	install_signal_handlers();
	poll(source.as_mut(), &mut tracker, &mut sink, &settings);

	let live = tracker.live();
	let flushed = tracker.shutdown(&mut sink);
	sink.flush();
	debug_assert_eq!(live, flushed);
	info!("shut down, flushed {} live sessions", flushed);
	Ok(())
}

fn main() {
	let args = Args::parse();
	init_logging(&args);

	if let Err(e) = run(&args) {
		error!("{}", e);
		std::process::exit(1);
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::sink::MemorySink;
	use crate::source::ReplaySource;
	use crate::types::Lifecycle;
	use std::io::Cursor;

	fn settings(cycles: Option<u64>) -> Settings {
		let mut s = Settings::merge(&Args::default(), config::FileConfig::default()).unwrap();
		s.cycles = cycles;
		s
	}

	fn run_replay(text: &str, cycles: Option<u64>) -> (MemorySink, Tracker) {
		let mut source = ReplaySource::new(Cursor::new(text.as_bytes().to_vec()), "test");
		let mut tracker = Tracker::new(SessionTable::new(Hasher::with_seed(3), 64));
		let mut sink = MemorySink::default();
		poll(&mut source, &mut tracker, &mut sink, &settings(cycles));
		(sink, tracker)
	}

	const A: &str = "udp 10.0.0.1:1111 (203.0.113.5:2222) -> 8.8.8.8:53";
	const B: &str = "tcp 10.0.0.2:5555 (203.0.113.5:6666) -> 1.1.1.1:443";
	const PLAIN: &str = "tcp 10.0.0.7:22 (10.0.0.7:22) -> 10.0.0.8:40000";

#[test]
	fn test_replay_scenario() {
		let text = format!("{}\n---\n---\n{}\n", A, A);
		let (mut sink, mut tracker) = run_replay(&text, None);
		// cycle 2 expired A, cycle 3 brought it back as a new session
		assert_eq!(sink.events.len(), 1);
		assert_eq!(sink.events[0].0, Lifecycle::Expired);
		assert_eq!(tracker.live(), 1);

		assert_eq!(tracker.shutdown(&mut sink), 1);
		assert_eq!(sink.events[1].0, Lifecycle::Flushed);
	}

#[test]
	fn test_untranslated_never_tracked() {
		let text = format!("{}\n---\n{}\n{}\n---\n{}\n", PLAIN, PLAIN, B, PLAIN);
		let (sink, tracker) = run_replay(&text, None);
		// only B, which expired in the last cycle
		assert_eq!(sink.events.len(), 1);
		assert_eq!(sink.events[0].1.key.tsrc.port, 6666);
		assert_eq!(tracker.live(), 0);
	}

#[test]
	fn test_malformed_snapshot_skipped() {
		// the bad snapshot must not expire A
		let text = format!("{}\n---\n{}\nnot a state\n---\n{}\n", A, A, A);
		let (sink, tracker) = run_replay(&text, None);
		assert!(sink.events.is_empty());
		assert_eq!(tracker.live(), 1);
	}

#[test]
	fn test_trailing_lines_do_not_expire() {
		for text in [format!("{}\n---\n\n", A), format!("{}\n---\n# end of capture\n", A)] {
			let (mut sink, mut tracker) = run_replay(&text, None);
			assert!(sink.events.is_empty(), "{:?}", text);
			assert_eq!(tracker.live(), 1);
			// the session leaves through the shutdown flush instead
			assert_eq!(tracker.shutdown(&mut sink), 1);
			assert_eq!(sink.events[0].0, Lifecycle::Flushed);
		}
	}

#[test]
	fn test_cycle_limit() {
		let text = format!("{}\n---\n{}\n---\n---\n", A, B);
		let (sink, tracker) = run_replay(&text, Some(2));
		// third (empty) snapshot never read
		assert_eq!(sink.events.len(), 1);
		assert_eq!(tracker.live(), 1);
	}
}
