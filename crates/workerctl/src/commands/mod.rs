pub mod start;

use std::io::Write;

use anyhow::Result;
use owo_colors::OwoColorize;
use statefile::{ProcessLauncher, ProcessProbe, ServerInspector, ServerStatus};

use crate::render;

pub fn stop<P: ProcessProbe, L: ProcessLauncher>(inspector: &ServerInspector<'_, P, L>, out: &mut dyn Write) -> Result<i32> {
	let pid = inspector.request_stop()?;
	render::notice_to(out, &format!("Stopping server (pid {})...", pid));
	Ok(0)
}

pub fn reload<P: ProcessProbe, L: ProcessLauncher>(inspector: &ServerInspector<'_, P, L>, out: &mut dyn Write) -> Result<i32> {
	let pid = inspector.request_reload()?;
	render::notice_to(out, &format!("Reloaded workers (pid {}).", pid));
	Ok(0)
}

pub fn status<P: ProcessProbe, L: ProcessLauncher>(inspector: &ServerInspector<'_, P, L>) -> Result<i32> {
	let state = inspector.store().read()?;
	let status = inspector.status()?;
	println!("{}", describe_status(status, &state.host, state.port));
	Ok(if status.is_running() { 0 } else { 1 })
}

pub fn describe_status(status: ServerStatus, host: &str, port: u16) -> String {
	match status {
		ServerStatus::Running { pid } => format!(
			"{} server running on http://{}:{} (pid {})",
			"●".green(),
			host,
			port,
			pid
		),
		ServerStatus::Stopped { pid } => format!("{} server not running (last pid {})", "○".dimmed(), pid),
		ServerStatus::NoRecord => format!("{} server not running", "○".dimmed()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use statefile::{Error, ServerCommand, ServerState, StateStore};

	fn command() -> ServerCommand {
		ServerCommand {
			program: "sh".into(),
			args: vec!["-c".into(), "exit 0".into()],
			base_path: std::env::temp_dir(),
			working_dir: None,
		}
	}

	#[test]
	fn status_lines() {
		assert!(describe_status(ServerStatus::Running { pid: 7 }, "127.0.0.1", 8000)
			.contains("http://127.0.0.1:8000 (pid 7)"));
		assert!(describe_status(ServerStatus::Stopped { pid: 7 }, "", 0).contains("last pid 7"));
		assert!(describe_status(ServerStatus::NoRecord, "", 0).ends_with("server not running"));
	}

	#[test]
	fn stop_and_reload_without_server_are_not_running() {
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::new(dir.path().join("server-state.json"));
		let inspector = ServerInspector::system(&store, command());

		let mut out = Vec::new();
		for result in [stop(&inspector, &mut out), reload(&inspector, &mut out)] {
			let err = result.unwrap_err();
			assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotRunning)));
		}
		// Nothing claims progress before the liveness check fails.
		assert!(out.is_empty());
		assert_eq!(status(&inspector).unwrap(), 1);
	}

	#[test]
	fn reload_against_live_master_runs_helper() {
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::new(dir.path().join("server-state.json"));
		store
			.write_state(&ServerState {
				master_process_id: Some(std::process::id()),
				..Default::default()
			})
			.unwrap();
		let inspector = ServerInspector::system(&store, command());

		let mut out = Vec::new();
		assert_eq!(reload(&inspector, &mut out).unwrap(), 0);
		let out = String::from_utf8(out).unwrap();
		assert!(out.contains(&format!("Reloaded workers (pid {})", std::process::id())));
		assert_eq!(status(&inspector).unwrap(), 0);
	}
}
