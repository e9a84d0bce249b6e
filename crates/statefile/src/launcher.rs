use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// One invocation of the worker-server executable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchCommand {
	pub program: String,
	pub args: Vec<String>,
	pub cwd: Option<PathBuf>,
	pub env: BTreeMap<String, String>,
}

impl LaunchCommand {
	pub fn new(program: impl Into<String>) -> Self {
		Self {
			program: program.into(),
			..Default::default()
		}
	}

	pub fn arg(mut self, arg: impl Into<String>) -> Self {
		self.args.push(arg.into());
		self
	}

	pub fn args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.args.extend(args.into_iter().map(Into::into));
		self
	}

	pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.env.insert(key.into(), value.into());
		self
	}

	pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.cwd = Some(dir.into());
		self
	}

	/// A `std::process::Command` with program, args, cwd and env applied.
	pub fn to_command(&self) -> Command {
		let mut cmd = Command::new(&self.program);
		cmd.args(&self.args).envs(&self.env);
		if let Some(dir) = &self.cwd {
			cmd.current_dir(dir);
		}
		cmd
	}

	/// Shell-ish rendering for log lines.
	pub fn display(&self) -> String {
		std::iter::once(self.program.as_str())
			.chain(self.args.iter().map(String::as_str))
			.collect::<Vec<_>>()
			.join(" ")
	}
}

/// Result of a short-lived helper run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
	/// `None` when the helper was killed by a signal.
	pub code: Option<i32>,
	pub stderr: String,
}

impl RunOutcome {
	pub fn success(&self) -> bool {
		self.code == Some(0)
	}
}

/// Runs a command to completion.
pub trait ProcessLauncher {
	fn run(&self, command: &LaunchCommand) -> io::Result<RunOutcome>;
}

impl<L: ProcessLauncher + ?Sized> ProcessLauncher for &L {
	fn run(&self, command: &LaunchCommand) -> io::Result<RunOutcome> {
		(**self).run(command)
	}
}

/// [`ProcessLauncher`] that spawns a real child process and waits for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
	fn run(&self, command: &LaunchCommand) -> io::Result<RunOutcome> {
		tracing::debug!("running {}", command.display());
		let output = command
			.to_command()
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::piped())
			.output()?;

		Ok(RunOutcome {
			code: output.status.code(),
			stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
		})
	}
}
