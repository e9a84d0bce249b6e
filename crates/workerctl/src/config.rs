use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{Map, Value};
use statefile::{ServerCommand, StatePaths, StateStore};

pub const APP_NAME: &str = "workerctl";

// ── Global config (~/.config/workerctl/config.toml) ─────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalConfig {
	#[serde(default)]
	pub server: ServerConfig,
	#[serde(default)]
	pub defaults: DefaultsConfig,
	#[serde(default)]
	pub app: AppConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
	#[serde(default = "default_program")]
	pub program: String,
	#[serde(default = "default_args")]
	pub args: Vec<String>,
	pub base_path: Option<PathBuf>,
	pub state_file: Option<PathBuf>,
	#[serde(default)]
	pub watch: Vec<PathBuf>,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			program: default_program(),
			args: default_args(),
			base_path: None,
			state_file: None,
			watch: Vec::new(),
		}
	}
}

fn default_program() -> String { "php".into() }
fn default_args() -> Vec<String> { vec!["vendor/bin/workerman-server".into()] }

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
	#[serde(default = "default_host")]
	pub host: String,
	#[serde(default = "default_port")]
	pub port: u16,
	#[serde(default)]
	pub workers: WorkerCount,
	#[serde(default = "default_max_requests")]
	pub max_requests: u32,
}

impl Default for DefaultsConfig {
	fn default() -> Self {
		Self {
			host: default_host(),
			port: default_port(),
			workers: WorkerCount::Auto,
			max_requests: default_max_requests(),
		}
	}
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8000 }
fn default_max_requests() -> u32 { 500 }

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
	#[serde(default = "default_app_name")]
	pub name: String,
	/// Passed through untouched to the server as `octaneConfig`.
	#[serde(default)]
	pub octane: toml::Table,
}

impl Default for AppConfig {
	fn default() -> Self {
		Self { name: default_app_name(), octane: toml::Table::new() }
	}
}

fn default_app_name() -> String { "Laravel".into() }

/// `auto` or an explicit number of workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkerCount {
	#[default]
	Auto,
	Fixed(u32),
}

impl WorkerCount {
	/// Value recorded in the state file; `0` lets the server decide.
	pub fn as_recorded(self) -> u32 {
		match self {
			WorkerCount::Auto => 0,
			WorkerCount::Fixed(n) => n,
		}
	}
}

impl FromStr for WorkerCount {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.eq_ignore_ascii_case("auto") {
			return Ok(WorkerCount::Auto);
		}
		s.parse::<u32>()
			.map(|n| if n == 0 { WorkerCount::Auto } else { WorkerCount::Fixed(n) })
			.map_err(|_| format!("expected 'auto' or a worker count, got '{}'", s))
	}
}

impl fmt::Display for WorkerCount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			WorkerCount::Auto => write!(f, "auto"),
			WorkerCount::Fixed(n) => write!(f, "{}", n),
		}
	}
}

impl<'de> Deserialize<'de> for WorkerCount {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		#[derive(Deserialize)]
		#[serde(untagged)]
		enum Raw {
			Count(u32),
			Text(String),
		}

		match Raw::deserialize(deserializer)? {
			Raw::Count(0) => Ok(WorkerCount::Auto),
			Raw::Count(n) => Ok(WorkerCount::Fixed(n)),
			Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
		}
	}
}

pub fn paths() -> StatePaths {
	StatePaths::new(APP_NAME)
}

pub fn default_config_path() -> PathBuf {
	paths().config_dir().join("config.toml")
}

pub fn load_global_config(path: Option<&Path>) -> GlobalConfig {
	let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
	if path.exists() {
		match std::fs::read_to_string(&path) {
			Ok(content) => match parse_config(&content) {
				Ok(config) => return config,
				Err(e) => eprintln!("warning: failed to parse {}: {}", path.display(), e),
			},
			Err(e) => eprintln!("warning: failed to read {}: {}", path.display(), e),
		}
	}
	GlobalConfig::default()
}

pub fn parse_config(content: &str) -> Result<GlobalConfig, toml::de::Error> {
	toml::from_str(content)
}

impl GlobalConfig {
	pub fn base_path(&self) -> PathBuf {
		self.server
			.base_path
			.clone()
			.or_else(|| std::env::current_dir().ok())
			.unwrap_or_else(|| PathBuf::from("."))
	}

	pub fn state_store(&self) -> StateStore {
		let path = self.server.state_file.clone().unwrap_or_else(|| paths().state_file());
		StateStore::new(path)
	}

	pub fn server_command(&self) -> ServerCommand {
		let base_path = self.base_path();
		ServerCommand {
			program: self.server.program.clone(),
			args: self.server.args.clone(),
			working_dir: Some(base_path.clone()),
			base_path,
		}
	}

	/// Paths to watch in `--watch` mode, relative entries resolved against
	/// the base path.
	pub fn watch_paths(&self) -> Vec<PathBuf> {
		let base = self.base_path();
		if self.server.watch.is_empty() {
			return vec![base];
		}
		self.server
			.watch
			.iter()
			.map(|p| if p.is_absolute() { p.clone() } else { base.join(p) })
			.collect()
	}

	pub fn octane_config(&self) -> Map<String, Value> {
		match serde_json::to_value(&self.app.octane) {
			Ok(Value::Object(map)) => map,
			_ => Map::new(),
		}
	}
}
