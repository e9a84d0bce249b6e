use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the state store and the process inspector.
///
/// "Not running" as an answer to a liveness question is never an error;
/// `NotRunning` is only produced by operations that need a target process.
#[derive(Debug, Error)]
pub enum Error {
	#[error("server is already running (pid {pid})")]
	AlreadyRunning { pid: u32 },

	#[error("server is not running")]
	NotRunning,

	#[error("state file {} is corrupt: {source}", .path.display())]
	CorruptState {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("state file {}: {source}", .path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("failed to launch {program}: {source}")]
	Launch {
		program: String,
		#[source]
		source: io::Error,
	},

	#[error("reload failed ({}){}", exit_label(.code), stderr_suffix(.stderr))]
	Reload { code: Option<i32>, stderr: String },
}

fn exit_label(code: &Option<i32>) -> String {
	match code {
		Some(code) => format!("exit {}", code),
		None => "terminated by signal".to_string(),
	}
}

fn stderr_suffix(stderr: &str) -> String {
	let trimmed = stderr.trim();
	if trimmed.is_empty() {
		String::new()
	} else {
		format!(": {}", trimmed)
	}
}
