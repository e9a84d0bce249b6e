//! Line classification.
//!
//! stdout lines are tried in order: plain text, a record whose `msg` is
//! itself a record (request telemetry), a remote debug record, and finally
//! an intentional drop. stderr lines are errors unless they carry a level
//! tag from the server's own logger, which already reports them on stdout.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::event::{Channel, LogEvent};
use crate::splitter::LineSplitter;

const STDERR_NOISE: [&str; 3] = ["DEBUG", "INFO", "WARN"];

/// The structured shape a stdout line may take.
#[derive(Debug, Deserialize)]
struct Record {
	msg: String,
	#[serde(default)]
	level: Option<Value>,
	#[serde(default)]
	remote: Option<Value>,
	#[serde(default)]
	elapsed: Option<Value>,
}

/// What the record's `msg` turned out to be.
enum Payload {
	Nested(Map<String, Value>),
	Text,
}

impl Record {
	fn decode(line: &str) -> Option<Self> {
		serde_json::from_str(line).ok()
	}

	fn payload(&self) -> Payload {
		match serde_json::from_str::<Value>(&self.msg) {
			Ok(Value::Object(inner)) => Payload::Nested(inner),
			_ => Payload::Text,
		}
	}

	fn elapsed_millis(&self) -> Option<f64> {
		self.elapsed.as_ref().and_then(Value::as_str).and_then(parse_elapsed_millis)
	}

	/// Loggers disagree on the type of `level`; only the string form counts.
	fn level(&self) -> Option<&str> {
		self.level.as_ref().and_then(Value::as_str)
	}

	fn is_remote_debug(&self) -> bool {
		self.level() == Some("debug") && self.remote.is_some()
	}
}

/// Classify one stdout line. `None` is a deliberate drop.
pub fn classify_stdout_line(line: &str) -> Option<LogEvent> {
	let Some(record) = Record::decode(line) else {
		return Some(LogEvent::PlainMessage { text: line.to_string() });
	};

	match record.payload() {
		Payload::Nested(inner) => Some(nested_telemetry(line, &record, &inner)),
		Payload::Text if record.is_remote_debug() => Some(remote_debug(record)),
		Payload::Text => None,
	}
}

/// Classify one stderr line. `None` means it was level-tagged noise.
pub fn classify_stderr_line(line: &str) -> Option<LogEvent> {
	if STDERR_NOISE.iter().any(|tag| line.contains(tag)) {
		return None;
	}
	Some(LogEvent::ErrorLine { text: line.to_string() })
}

fn nested_telemetry(line: &str, outer: &Record, inner: &Map<String, Value>) -> LogEvent {
	let request = inner.get("msg").and_then(Value::as_str).and_then(parse_request_line);
	let Some((status_code, method, url)) = request else {
		// Nested records are expected to describe a request; keep the line.
		tracing::debug!("nested record without request line: {}", line);
		return LogEvent::PlainMessage { text: line.to_string() };
	};

	let duration_millis = inner
		.get("elapsed")
		.and_then(Value::as_str)
		.and_then(parse_elapsed_millis)
		.or_else(|| outer.elapsed_millis())
		.unwrap_or(0.0);

	LogEvent::RequestTelemetry {
		method,
		url,
		status_code,
		duration_millis,
	}
}

fn remote_debug(record: Record) -> LogEvent {
	let elapsed_millis = record.elapsed_millis();

	if let Some((status_code, method, url)) = parse_request_line(&record.msg) {
		return LogEvent::RequestTelemetry {
			method,
			url,
			status_code,
			duration_millis: elapsed_millis.unwrap_or(0.0),
		};
	}

	LogEvent::DebugEvent {
		level: record.level().unwrap_or_default().to_string(),
		message: record.msg,
		remote: true,
		elapsed_millis,
	}
}

/// `"200 GET /users"` into `(status, method, url)`.
fn parse_request_line(msg: &str) -> Option<(String, String, String)> {
	let mut parts = msg.split_whitespace();
	let status = parts.next()?;
	let method = parts.next()?;
	let url = parts.next()?;
	if parts.next().is_some() {
		return None;
	}
	if status.len() != 3 || !status.bytes().all(|b| b.is_ascii_digit()) {
		return None;
	}
	Some((status.to_string(), method.to_string(), url.to_string()))
}

/// Duration text such as `"12.5ms"` or `"2s"` in milliseconds.
///
/// A trailing `ms` is stripped as-is; otherwise exactly one trailing unit
/// character is stripped and the rest read as seconds. Longer units such as
/// `us` therefore do not parse.
pub fn parse_elapsed_millis(elapsed: &str) -> Option<f64> {
	let elapsed = elapsed.trim();
	let millis = match elapsed.strip_suffix("ms") {
		Some(number) => number.trim().parse::<f64>().ok()?,
		None => {
			let mut chars = elapsed.chars();
			chars.next_back()?;
			chars.as_str().trim().parse::<f64>().ok()? * 1000.0
		}
	};
	millis.is_finite().then_some(millis)
}

/// Per-channel line reassembly plus classification.
#[derive(Debug, Default)]
pub struct Classifier {
	stdout: LineSplitter,
	stderr: LineSplitter,
}

impl Classifier {
	pub fn new() -> Self {
		Self::default()
	}

	/// Events for every line completed by `chunk`, in input order.
	pub fn feed(&mut self, channel: Channel, chunk: &[u8]) -> Vec<LogEvent> {
		let lines = self.splitter(channel).push(chunk);
		classify_lines(channel, lines)
	}

	/// Flush a trailing unterminated line once `channel` has closed.
	pub fn finish(&mut self, channel: Channel) -> Vec<LogEvent> {
		let lines = self.splitter(channel).finish();
		classify_lines(channel, lines)
	}

	fn splitter(&mut self, channel: Channel) -> &mut LineSplitter {
		match channel {
			Channel::Stdout => &mut self.stdout,
			Channel::Stderr => &mut self.stderr,
		}
	}
}

fn classify_lines(channel: Channel, lines: Vec<String>) -> Vec<LogEvent> {
	lines
		.iter()
		.filter_map(|line| match channel {
			Channel::Stdout => classify_stdout_line(line),
			Channel::Stderr => classify_stderr_line(line),
		})
		.collect()
}
