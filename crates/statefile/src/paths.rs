use std::path::PathBuf;

const STATE_FILE_NAME: &str = "server-state.json";

/// Deterministic locations for one application's controller state.
///
/// Nothing here depends on the current process id, so a later invocation of
/// the controller resolves the same file as the one that started the server.
#[derive(Debug, Clone)]
pub struct StatePaths {
	pub app_name: String,
}

impl StatePaths {
	pub fn new(app_name: impl Into<String>) -> Self {
		Self {
			app_name: app_name.into(),
		}
	}

	pub fn state_dir(&self) -> PathBuf {
		if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
			PathBuf::from(dir).join(&self.app_name)
		} else if let Some(home) = home_dir() {
			home.join(".local").join("state").join(&self.app_name)
		} else {
			PathBuf::from("/tmp").join(&self.app_name)
		}
	}

	pub fn config_dir(&self) -> PathBuf {
		if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
			PathBuf::from(dir).join(&self.app_name)
		} else if let Some(home) = home_dir() {
			home.join(".config").join(&self.app_name)
		} else {
			PathBuf::from("/tmp").join(&self.app_name).join("config")
		}
	}

	pub fn state_file(&self) -> PathBuf {
		self.state_dir().join(STATE_FILE_NAME)
	}
}

fn home_dir() -> Option<PathBuf> {
	std::env::var("HOME").ok().map(PathBuf::from)
}
