use std::io::Write;

use logsift::{EventSink, LogEvent};
use owo_colors::OwoColorize;

use crate::cli::OutputFormat;

pub fn sink_for(format: OutputFormat) -> Box<dyn EventSink> {
	match format {
		OutputFormat::Pretty => Box::new(ConsoleSink),
		OutputFormat::Json => Box::new(JsonSink),
	}
}

/// Human-readable rendering; errors go to stderr, everything else to stdout.
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
	fn emit(&mut self, event: LogEvent) {
		match &event {
			LogEvent::ErrorLine { text } => eprintln!("  {} {}", "ERROR".red().bold(), text),
			_ => println!("{}", format_event(&event)),
		}
	}
}

/// One JSON object per event on stdout.
pub struct JsonSink;

impl EventSink for JsonSink {
	fn emit(&mut self, event: LogEvent) {
		if let Ok(line) = serde_json::to_string(&event) {
			let mut out = std::io::stdout().lock();
			let _ = writeln!(out, "{}", line);
		}
	}
}

pub fn format_event(event: &LogEvent) -> String {
	match event {
		LogEvent::PlainMessage { text } => format!("  {} {}", "INFO".blue().bold(), text),
		LogEvent::DebugEvent {
			message,
			elapsed_millis,
			..
		} => match elapsed_millis {
			Some(ms) => format!("  {} {} {}", "DEBUG".dimmed(), message, format_millis(*ms).dimmed()),
			None => format!("  {} {}", "DEBUG".dimmed(), message),
		},
		LogEvent::RequestTelemetry {
			method,
			url,
			status_code,
			duration_millis,
		} => {
			let status = match status_code.as_bytes().first() {
				Some(b'2') | Some(b'3') => status_code.green().to_string(),
				Some(b'4') => status_code.yellow().to_string(),
				_ => status_code.red().to_string(),
			};
			format!(
				"  {}  {:<7} {} {}",
				status,
				method.bold(),
				url,
				format_millis(*duration_millis).dimmed()
			)
		}
		LogEvent::ErrorLine { text } => format!("  {} {}", "ERROR".red().bold(), text),
	}
}

pub fn format_millis(ms: f64) -> String {
	format!("{:.2} ms", ms)
}

pub fn banner(host: &str, port: u16, workers: &str) {
	eprintln!();
	eprintln!(
		"  {} Server running on [{}] with {} workers.",
		"INFO".blue().bold(),
		format!("http://{}:{}", host, port).bold(),
		workers
	);
	eprintln!();
	eprintln!("  {}", "Press Ctrl+C to stop the server".yellow());
	eprintln!();
}

pub fn notice(message: &str) {
	notice_to(&mut std::io::stderr(), message);
}

pub fn notice_to(out: &mut dyn Write, message: &str) {
	let _ = writeln!(out, "  {} {}", "INFO".blue().bold(), message);
}

pub fn warn(message: &str) {
	eprintln!("  {} {}", "WARN".yellow().bold(), message);
}
