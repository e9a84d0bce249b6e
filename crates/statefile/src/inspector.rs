//! Control questions about the supervised server, answered from the state
//! file and the process table.
//!
//! From the outside only three situations can be told apart: nothing was
//! ever recorded, the recorded master pid answers a signal-zero probe, or it
//! does not. Every answer is a point-in-time sample.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::launcher::{LaunchCommand, ProcessLauncher, SystemLauncher};
use crate::probe::{ProcessProbe, SignalProbe};
use crate::state::StateStore;

/// Environment variable carrying the application base path to the server.
pub const BASE_PATH_ENV: &str = "APP_BASE_PATH";
/// Environment flag marking the server as controller-managed.
pub const MANAGED_ENV: &str = "LARAVEL_OCTANE";

/// How to invoke the worker-server executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
	pub program: String,
	pub args: Vec<String>,
	pub base_path: PathBuf,
	pub working_dir: Option<PathBuf>,
}

impl ServerCommand {
	fn invocation(&self, action: &str) -> LaunchCommand {
		let mut cmd = LaunchCommand::new(&self.program)
			.args(self.args.iter().cloned())
			.arg(action)
			.env(BASE_PATH_ENV, self.base_path.to_string_lossy())
			.env(MANAGED_ENV, "1");
		if let Some(dir) = &self.working_dir {
			cmd = cmd.current_dir(dir);
		}
		cmd
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
	NoRecord,
	Running { pid: u32 },
	Stopped { pid: u32 },
}

impl ServerStatus {
	pub fn is_running(&self) -> bool {
		matches!(self, ServerStatus::Running { .. })
	}
}

pub struct ServerInspector<'a, P = SignalProbe, L = SystemLauncher> {
	store: &'a StateStore,
	server: ServerCommand,
	probe: P,
	launcher: L,
}

impl<'a> ServerInspector<'a> {
	/// Inspector wired to real signals and real child processes.
	pub fn system(store: &'a StateStore, server: ServerCommand) -> Self {
		Self::new(store, server, SignalProbe, SystemLauncher)
	}
}

impl<'a, P, L> ServerInspector<'a, P, L>
where
	P: ProcessProbe,
	L: ProcessLauncher,
{
	pub fn new(store: &'a StateStore, server: ServerCommand, probe: P, launcher: L) -> Self {
		Self {
			store,
			server,
			probe,
			launcher,
		}
	}

	pub fn store(&self) -> &StateStore {
		self.store
	}

	pub fn status(&self) -> Result<ServerStatus> {
		let Some(pid) = self.store.read()?.master_pid() else {
			return Ok(ServerStatus::NoRecord);
		};
		if self.probe.is_alive(pid) {
			Ok(ServerStatus::Running { pid })
		} else {
			Ok(ServerStatus::Stopped { pid })
		}
	}

	/// Only a corrupt state file is an error; absence answers `false`.
	pub fn server_is_running(&self) -> Result<bool> {
		Ok(self.status()?.is_running())
	}

	pub fn ensure_not_running(&self) -> Result<()> {
		match self.status()? {
			ServerStatus::Running { pid } => Err(Error::AlreadyRunning { pid }),
			_ => Ok(()),
		}
	}

	/// Ask the running master to replace its worker pool in place.
	///
	/// Runs the server's own `reload` helper and does not retry. A failed
	/// reload leaves both the master and the state file untouched.
	pub fn reload_server(&self) -> Result<()> {
		let command = self.reload_command();
		let outcome = self.launcher.run(&command).map_err(|source| Error::Launch {
			program: command.program.clone(),
			source,
		})?;

		if outcome.success() {
			tracing::info!("reload requested via {}", command.display());
			Ok(())
		} else {
			Err(Error::Reload {
				code: outcome.code,
				stderr: outcome.stderr,
			})
		}
	}

	/// Send a graceful termination signal to the recorded master.
	///
	/// Returns whether delivery succeeded. Neither waits for exit nor clears
	/// the state file, so a later call against the now-dead pid returns
	/// `Ok(false)` rather than erroring.
	pub fn stop_server(&self) -> Result<bool> {
		let pid = self.store.read()?.master_pid().ok_or(Error::NotRunning)?;
		let delivered = self.probe.terminate(pid);
		tracing::info!("terminate master {}: delivered={}", pid, delivered);
		Ok(delivered)
	}

	/// Stop as the `stop` command sees it: a record that points at nothing
	/// alive is "not running", the same as no record at all.
	pub fn request_stop(&self) -> Result<u32> {
		let ServerStatus::Running { pid } = self.status()? else {
			return Err(Error::NotRunning);
		};
		if self.probe.terminate(pid) {
			Ok(pid)
		} else {
			Err(Error::NotRunning)
		}
	}

	/// Reload only when a live master is recorded.
	pub fn request_reload(&self) -> Result<u32> {
		let ServerStatus::Running { pid } = self.status()? else {
			return Err(Error::NotRunning);
		};
		self.reload_server()?;
		Ok(pid)
	}

	/// `<program> <args..> start <state-file>`.
	pub fn start_command(&self) -> LaunchCommand {
		self.server
			.invocation("start")
			.arg(self.store.path().to_string_lossy())
	}

	pub fn reload_command(&self) -> LaunchCommand {
		self.server.invocation("reload")
	}
}

#[cfg(test)]
pub(crate) mod fakes {
	use std::cell::RefCell;
	use std::collections::HashSet;
	use std::io;

	use crate::launcher::{LaunchCommand, ProcessLauncher, RunOutcome};
	use crate::probe::ProcessProbe;

	#[derive(Default)]
	pub struct FakeProbe {
		pub alive: HashSet<u32>,
		pub probed: RefCell<Vec<u32>>,
		pub terminated: RefCell<Vec<u32>>,
	}

	impl FakeProbe {
		pub fn with_alive(pids: &[u32]) -> Self {
			Self {
				alive: pids.iter().copied().collect(),
				..Default::default()
			}
		}
	}

	impl ProcessProbe for FakeProbe {
		fn is_alive(&self, pid: u32) -> bool {
			self.probed.borrow_mut().push(pid);
			self.alive.contains(&pid)
		}

		fn terminate(&self, pid: u32) -> bool {
			self.terminated.borrow_mut().push(pid);
			self.alive.contains(&pid)
		}
	}

	pub struct FakeLauncher {
		pub outcome: RunOutcome,
		pub ran: RefCell<Vec<LaunchCommand>>,
	}

	impl FakeLauncher {
		pub fn exiting(code: i32, stderr: &str) -> Self {
			Self {
				outcome: RunOutcome {
					code: Some(code),
					stderr: stderr.to_string(),
				},
				ran: RefCell::new(Vec::new()),
			}
		}
	}

	impl ProcessLauncher for FakeLauncher {
		fn run(&self, command: &LaunchCommand) -> io::Result<RunOutcome> {
			self.ran.borrow_mut().push(command.clone());
			Ok(self.outcome.clone())
		}
	}
}
