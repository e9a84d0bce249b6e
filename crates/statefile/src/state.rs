//! The persisted record bridging two otherwise unconnected controller runs.
//!
//! Format: a single JSON object with camelCase keys.
//! ```text
//! {"appName":"shop","host":"127.0.0.1","port":8000,"workers":0,
//!  "maxRequests":500,"octaneConfig":{},"masterProcessId":4242}
//! ```
//! Every key is optional when reading so that records written by older
//! controllers still load.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Launch configuration of the last started server plus its master pid.
///
/// `workers == 0` means "auto": the launched server picks its own count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerState {
	pub master_process_id: Option<u32>,
	pub app_name: String,
	pub host: String,
	#[serde(deserialize_with = "lenient::number")]
	pub port: u16,
	#[serde(deserialize_with = "lenient::number")]
	pub workers: u32,
	#[serde(deserialize_with = "lenient::number")]
	pub max_requests: u32,
	#[serde(rename = "octaneConfig")]
	pub extra_config: Map<String, Value>,
}

impl ServerState {
	/// The recorded master pid, with `0` folded into "none".
	pub fn master_pid(&self) -> Option<u32> {
		self.master_process_id.filter(|pid| *pid != 0)
	}
}

/// Owner of the on-disk state record at one fixed path.
///
/// There is no locking: concurrent writers race and the last rename wins.
#[derive(Debug, Clone)]
pub struct StateStore {
	path: PathBuf,
}

impl StateStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Read the current record. A missing file is the empty state.
	pub fn read(&self) -> Result<ServerState> {
		let content = match fs::read_to_string(&self.path) {
			Ok(content) => content,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ServerState::default()),
			Err(e) => return Err(self.io_error(e)),
		};

		serde_json::from_str(&content).map_err(|source| Error::CorruptState {
			path: self.path.clone(),
			source,
		})
	}

	/// Replace the record wholesale. Fields the caller left at their default
	/// stay at their default; nothing carries over from the previous record.
	pub fn write_state(&self, state: &ServerState) -> Result<()> {
		let data = serde_json::to_vec_pretty(state).map_err(|e| self.io_error(io::Error::other(e)))?;
		self.write_atomic(&data)?;
		tracing::debug!("wrote server state to {}", self.path.display());
		Ok(())
	}

	/// Record the master pid while keeping the rest of the launch record.
	pub fn write_process_id(&self, pid: u32) -> Result<()> {
		let mut state = self.read()?;
		state.master_process_id = Some(pid);
		self.write_state(&state)
	}

	/// Remove the record (idempotent).
	pub fn delete(&self) -> Result<()> {
		match fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(self.io_error(e)),
		}
	}

	fn write_atomic(&self, data: &[u8]) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			if !parent.as_os_str().is_empty() {
				fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
			}
		}

		let mut temp_name = self.path.as_os_str().to_owned();
		temp_name.push(".tmp");
		let temp_path = PathBuf::from(temp_name);

		fs::write(&temp_path, data).map_err(|e| self.io_error(e))?;
		fs::rename(&temp_path, &self.path).map_err(|e| {
			let _ = fs::remove_file(&temp_path);
			self.io_error(e)
		})
	}

	fn io_error(&self, source: io::Error) -> Error {
		Error::Io {
			path: self.path.clone(),
			source,
		}
	}
}

/// Older controllers stored numeric options as strings ("8000").
mod lenient {
	use std::str::FromStr;

	use serde::de::Error as _;
	use serde::{Deserialize, Deserializer};

	#[derive(Deserialize)]
	#[serde(untagged)]
	enum NumberOrString<T> {
		Number(T),
		Text(String),
		Null(()),
	}

	pub fn number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
	where
		D: Deserializer<'de>,
		T: Deserialize<'de> + FromStr + Default,
	{
		match NumberOrString::<T>::deserialize(deserializer)? {
			NumberOrString::Number(n) => Ok(n),
			NumberOrString::Null(()) => Ok(T::default()),
			NumberOrString::Text(s) if s.trim().is_empty() => Ok(T::default()),
			NumberOrString::Text(s) => s
				.trim()
				.parse()
				.map_err(|_| D::Error::custom(format!("expected a number, got {:?}", s))),
		}
	}
}
