//! Foreground start: launch the master, relay its output, forward signals.

use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use logsift::{Channel, Classifier, EventSink};
use nix::sys::signal::killpg;
use nix::unistd::Pid;
use statefile::{Error, LaunchCommand, ProcessLauncher, ProcessProbe, ServerInspector, ServerState};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::cli::StartArgs;
use crate::config::GlobalConfig;
use crate::render;
use crate::watch::FileWatcher;

/// Upper bound on any single wait, so signals are relayed promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// How long a stopping master may keep running before it is killed.
const STOP_GRACE: Duration = Duration::from_secs(10);
/// How long output is still read once the master has exited.
const DRAIN_LIMIT: Duration = POLL_INTERVAL;

pub fn run(config: &GlobalConfig, args: StartArgs) -> Result<i32> {
	let store = config.state_store();
	let inspector = ServerInspector::system(&store, config.server_command());

	let workers = args.workers.unwrap_or(config.defaults.workers);
	let state = ServerState {
		app_name: config.app.name.clone(),
		host: args.host.unwrap_or_else(|| config.defaults.host.clone()),
		port: args.port.unwrap_or(config.defaults.port),
		workers: workers.as_recorded(),
		max_requests: args.max_requests.unwrap_or(config.defaults.max_requests),
		extra_config: config.octane_config(),
		..Default::default()
	};

	let watcher = if args.watch {
		Some(FileWatcher::new(&config.watch_paths())?)
	} else {
		None
	};

	let mut sink = render::sink_for(args.output);

	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.context("failed to start async runtime")?;

	runtime.block_on(async {
		// Before the spawn: from here on a termination request is ours to relay.
		let signals = Signals::install()?;
		let mut server = launch(&inspector, &state).await?;
		render::banner(&state.host, state.port, &workers.to_string());

		let mut controls = Controls {
			signals,
			watcher,
			grace: STOP_GRACE,
		};
		supervise(&inspector, &mut server, sink.as_mut(), &mut controls).await
	})
}

/// SIGINT and SIGTERM addressed to the controller.
pub struct Signals {
	interrupt: Signal,
	terminate: Signal,
}

impl Signals {
	/// Needs a running tokio runtime.
	pub fn install() -> Result<Self> {
		Ok(Self {
			interrupt: signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?,
			terminate: signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?,
		})
	}

	async fn recv(&mut self) {
		tokio::select! {
			_ = self.interrupt.recv() => {}
			_ = self.terminate.recv() => {}
		}
	}
}

/// Everything the supervise loop reacts to besides the server itself.
pub struct Controls {
	pub signals: Signals,
	pub watcher: Option<FileWatcher>,
	pub grace: Duration,
}

/// Progress of a stop the controller has relayed.
#[derive(Debug, Default)]
struct Shutdown {
	requested: Option<Instant>,
	killed: bool,
}

/// Check, record, spawn, in that order: the state file always exists
/// before the process it describes.
pub async fn launch<P, L>(inspector: &ServerInspector<'_, P, L>, state: &ServerState) -> Result<Child>
where
	P: ProcessProbe,
	L: ProcessLauncher,
{
	inspector.ensure_not_running()?;
	inspector.store().write_state(state)?;

	let command = inspector.start_command();
	let child = spawn(&command).map_err(|source| Error::Launch {
		program: command.program.clone(),
		source,
	})?;

	if let Some(pid) = child.id() {
		inspector.store().write_process_id(pid)?;
		tracing::info!("started {} (pid {})", command.display(), pid);
	}

	Ok(child)
}

fn spawn(command: &LaunchCommand) -> std::io::Result<Child> {
	let mut std_cmd = command.to_command();
	// Own group: a kill reaches every worker, a terminal Ctrl-C only us.
	std_cmd.process_group(0);

	let mut cmd = Command::from(std_cmd);
	cmd.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true);
	cmd.spawn()
}

/// Pump output and relay control until the master exits; returns its exit
/// code, or 128 + signal when it was killed.
pub async fn supervise<P, L>(
	inspector: &ServerInspector<'_, P, L>,
	child: &mut Child,
	sink: &mut dyn EventSink,
	controls: &mut Controls,
) -> Result<i32>
where
	P: ProcessProbe,
	L: ProcessLauncher,
{
	let mut stdout = child.stdout.take();
	let mut stderr = child.stderr.take();
	let mut classifier = Classifier::new();
	let mut out_buf = [0u8; 8192];
	let mut err_buf = [0u8; 8192];

	let mut tick = tokio::time::interval(POLL_INTERVAL);
	let mut shutdown = Shutdown::default();

	let status = loop {
		tokio::select! {
			status = child.wait() => break status.context("failed to wait for server")?,
			read = read_chunk(&mut stdout, &mut out_buf) => {
				pump(&mut classifier, sink, Channel::Stdout, read, &mut stdout, &out_buf);
			}
			read = read_chunk(&mut stderr, &mut err_buf) => {
				pump(&mut classifier, sink, Channel::Stderr, read, &mut stderr, &err_buf);
			}
			_ = controls.signals.recv() => relay_stop(inspector, child, &mut shutdown),
			Some(changed) = next_change(&mut controls.watcher) => {
				tracing::debug!("changed: {:?}", changed);
				render::notice("Application change detected. Restarting workers...");
				if let Err(e) = inspector.reload_server() {
					render::warn(&e.to_string());
				}
			}
			_ = tick.tick() => {
				if let Some(since) = shutdown.requested {
					if !shutdown.killed && since.elapsed() >= controls.grace {
						tracing::warn!("server did not stop within {:?}, killing it", controls.grace);
						kill_group(child);
						shutdown.killed = true;
					}
				}
			}
		}
	};

	drain(&mut classifier, sink, stdout, stderr, &mut controls.signals).await;

	let code = match (status.code(), status.signal()) {
		(Some(code), _) => code,
		(None, Some(signal)) => 128 + signal,
		(None, None) => 1,
	};
	tracing::info!("server exited with {}", status);
	Ok(code)
}

fn relay_stop<P, L>(inspector: &ServerInspector<'_, P, L>, child: &mut Child, shutdown: &mut Shutdown)
where
	P: ProcessProbe,
	L: ProcessLauncher,
{
	if shutdown.requested.is_some() {
		tracing::info!("second interrupt, killing server");
		kill_group(child);
		shutdown.killed = true;
		return;
	}

	render::notice("Stopping server...");
	shutdown.requested = Some(Instant::now());
	match inspector.stop_server() {
		Ok(true) => {}
		Ok(false) | Err(_) => {
			tracing::warn!("graceful stop not delivered, killing server");
			kill_group(child);
			shutdown.killed = true;
		}
	}
}

/// SIGKILL the master and every process in its group.
fn kill_group(child: &mut Child) {
	if let Some(pgid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
		match killpg(Pid::from_raw(pgid), nix::sys::signal::Signal::SIGKILL) {
			Ok(()) => return,
			Err(e) => tracing::debug!("killpg {} failed: {}", pgid, e),
		}
	}
	let _ = child.start_kill();
}

fn pump<R>(
	classifier: &mut Classifier,
	sink: &mut dyn EventSink,
	channel: Channel,
	read: std::io::Result<usize>,
	reader: &mut Option<R>,
	buf: &[u8],
) {
	match read {
		Ok(0) | Err(_) => {
			*reader = None;
			emit_all(sink, classifier.finish(channel));
		}
		Ok(n) => emit_all(sink, classifier.feed(channel, &buf[..n])),
	}
}

/// Read what the exited master left behind. Processes it forked may keep
/// the pipes open, so this gives up after [`DRAIN_LIMIT`] or on a signal.
async fn drain<O, E>(
	classifier: &mut Classifier,
	sink: &mut dyn EventSink,
	mut stdout: Option<O>,
	mut stderr: Option<E>,
	signals: &mut Signals,
) where
	O: AsyncRead + Unpin,
	E: AsyncRead + Unpin,
{
	let mut out_buf = [0u8; 8192];
	let mut err_buf = [0u8; 8192];
	let deadline = tokio::time::sleep(DRAIN_LIMIT);
	tokio::pin!(deadline);

	while stdout.is_some() || stderr.is_some() {
		tokio::select! {
			read = read_chunk(&mut stdout, &mut out_buf) => {
				pump(classifier, sink, Channel::Stdout, read, &mut stdout, &out_buf);
			}
			read = read_chunk(&mut stderr, &mut err_buf) => {
				pump(classifier, sink, Channel::Stderr, read, &mut stderr, &err_buf);
			}
			_ = &mut deadline => {
				tracing::debug!("output still open {:?} after exit, no longer reading it", DRAIN_LIMIT);
				break;
			}
			_ = signals.recv() => break,
		}
	}

	emit_all(sink, classifier.finish(Channel::Stdout));
	emit_all(sink, classifier.finish(Channel::Stderr));
}

fn emit_all(sink: &mut dyn EventSink, events: Vec<logsift::LogEvent>) {
	for event in events {
		sink.emit(event);
	}
}

/// Reads from a still-open stream; pends forever once it has closed.
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize> {
	match reader {
		Some(reader) => reader.read(buf).await,
		None => std::future::pending().await,
	}
}

async fn next_change(watcher: &mut Option<FileWatcher>) -> Option<Vec<std::path::PathBuf>> {
	match watcher {
		Some(watcher) => watcher.next_change().await,
		None => std::future::pending().await,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use logsift::LogEvent;
	use nix::sys::signal::{raise, Signal as Sig};
	use statefile::{ServerCommand, StateStore};
	use std::sync::{Mutex, MutexGuard};
	use tokio::time::timeout;

	// Signals raised here reach every supervise loop in this process.
	static SIGNAL_TESTS: Mutex<()> = Mutex::new(());

	fn take_turn() -> MutexGuard<'static, ()> {
		SIGNAL_TESTS.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn shell_server(script: &str, dir: &tempfile::TempDir) -> ServerCommand {
		ServerCommand {
			program: "sh".into(),
			args: vec!["-c".into(), script.into()],
			base_path: dir.path().to_path_buf(),
			working_dir: Some(dir.path().to_path_buf()),
		}
	}

	fn launch_state() -> ServerState {
		ServerState {
			app_name: "test".into(),
			host: "127.0.0.1".into(),
			port: 8000,
			max_requests: 500,
			..Default::default()
		}
	}

	fn controls(grace: Duration) -> Controls {
		Controls {
			signals: Signals::install().unwrap(),
			watcher: None,
			grace,
		}
	}

	/// Collects events and lets a test act on them as they arrive.
	struct Reacting<F: FnMut(&LogEvent)> {
		events: Vec<LogEvent>,
		react: F,
	}

	impl<F: FnMut(&LogEvent)> EventSink for Reacting<F> {
		fn emit(&mut self, event: LogEvent) {
			(self.react)(&event);
			self.events.push(event);
		}
	}

	fn plain(text: &str) -> LogEvent {
		LogEvent::PlainMessage { text: text.into() }
	}

	fn is_gone(pid: u32) -> bool {
		match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
			Err(_) => true,
			Ok(stat) => stat
				.rsplit_once(") ")
				.is_some_and(|(_, rest)| rest.starts_with('Z') || rest.starts_with('X')),
		}
	}

	#[tokio::test]
	async fn relays_classified_output_and_exit_code() {
		let _turn = take_turn();
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::new(dir.path().join("server-state.json"));
		let script = r#"
			echo 'Workerman started'
			echo '{"msg":"200 GET /users","level":"debug","remote":"1.2.3.4","elapsed":"12.5ms"}'
			echo '{"msg":"boot","level":"info"}'
			echo '2024 INFO worker ready' >&2
			echo 'fatal: out of memory' >&2
			exit 3
		"#;
		let inspector = ServerInspector::system(&store, shell_server(script, &dir));

		let mut child = launch(&inspector, &launch_state()).await.unwrap();
		let pid = child.id().unwrap();
		assert_eq!(store.read().unwrap().master_pid(), Some(pid));
		assert_eq!(store.read().unwrap().port, 8000);

		let mut events: Vec<LogEvent> = Vec::new();
		let code = supervise(&inspector, &mut child, &mut events, &mut controls(STOP_GRACE))
			.await
			.unwrap();
		assert_eq!(code, 3);

		let stdout: Vec<&LogEvent> = events
			.iter()
			.filter(|e| !matches!(e, LogEvent::ErrorLine { .. }))
			.collect();
		assert_eq!(
			stdout,
			vec![
				&LogEvent::PlainMessage {
					text: "Workerman started".into()
				},
				&LogEvent::RequestTelemetry {
					method: "GET".into(),
					url: "/users".into(),
					status_code: "200".into(),
					duration_millis: 12.5,
				},
			]
		);
		let errors: Vec<&LogEvent> = events
			.iter()
			.filter(|e| matches!(e, LogEvent::ErrorLine { .. }))
			.collect();
		assert_eq!(
			errors,
			vec![&LogEvent::ErrorLine {
				text: "fatal: out of memory".into()
			}]
		);

		// The record outlives the process it describes.
		assert_eq!(store.read().unwrap().master_pid(), Some(pid));
	}

	#[tokio::test]
	async fn refuses_to_start_over_a_live_master() {
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::new(dir.path().join("server-state.json"));
		let running = ServerState {
			master_process_id: Some(std::process::id()),
			port: 9000,
			..Default::default()
		};
		store.write_state(&running).unwrap();
		let inspector = ServerInspector::system(&store, shell_server("exit 0", &dir));

		let err = launch(&inspector, &launch_state()).await.unwrap_err();
		assert!(matches!(
			err.downcast_ref::<Error>(),
			Some(Error::AlreadyRunning { .. })
		));
		assert_eq!(store.read().unwrap(), running);
	}

	#[tokio::test]
	async fn stop_is_relayed_to_the_master() {
		let _turn = take_turn();
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::new(dir.path().join("server-state.json"));
		let script = "trap 'echo bye; exit 0' TERM; echo ready; while true; do sleep 0.1; done";
		let inspector = ServerInspector::system(&store, shell_server(script, &dir));

		let mut child = launch(&inspector, &launch_state()).await.unwrap();
		tokio::time::sleep(Duration::from_millis(200)).await;

		let mut shutdown = Shutdown::default();
		relay_stop(&inspector, &mut child, &mut shutdown);
		assert!(shutdown.requested.is_some());
		assert!(!shutdown.killed);

		let mut events: Vec<LogEvent> = Vec::new();
		let code = supervise(&inspector, &mut child, &mut events, &mut controls(STOP_GRACE))
			.await
			.unwrap();
		assert_eq!(code, 0);
		assert!(events.contains(&plain("bye")));
	}

	#[tokio::test]
	async fn interrupt_to_controller_reaches_the_master() {
		let _turn = take_turn();
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::new(dir.path().join("server-state.json"));
		let script = "trap 'echo bye; exit 0' TERM; echo ready; while true; do sleep 0.1; done";
		let inspector = ServerInspector::system(&store, shell_server(script, &dir));

		let mut controls = controls(STOP_GRACE);
		let mut child = launch(&inspector, &launch_state()).await.unwrap();
		let mut sink = Reacting {
			events: Vec::new(),
			react: |event: &LogEvent| {
				if *event == plain("ready") {
					raise(Sig::SIGINT).unwrap();
				}
			},
		};

		let code = timeout(
			Duration::from_secs(5),
			supervise(&inspector, &mut child, &mut sink, &mut controls),
		)
		.await
		.expect("controller kept running after the interrupt")
		.unwrap();
		assert_eq!(code, 0);
		assert!(sink.events.contains(&plain("bye")));
	}

	#[cfg(target_os = "linux")]
	#[tokio::test]
	async fn unresponsive_master_and_its_workers_are_killed_after_grace() {
		let _turn = take_turn();
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::new(dir.path().join("server-state.json"));
		let script = r#"
			(trap '' TERM; while true; do sleep 0.1; done) &
			echo "worker $!"
			trap '' TERM
			echo ready
			while true; do sleep 0.1; done
		"#;
		let inspector = ServerInspector::system(&store, shell_server(script, &dir));

		let mut controls = controls(Duration::from_millis(200));
		let mut child = launch(&inspector, &launch_state()).await.unwrap();
		let mut sink = Reacting {
			events: Vec::new(),
			react: |event: &LogEvent| {
				if *event == plain("ready") {
					raise(Sig::SIGTERM).unwrap();
				}
			},
		};

		let started = Instant::now();
		let code = timeout(
			Duration::from_secs(5),
			supervise(&inspector, &mut child, &mut sink, &mut controls),
		)
		.await
		.expect("master outlived the grace period")
		.unwrap();
		assert_eq!(code, 128 + 9);
		assert!(started.elapsed() >= Duration::from_millis(200));

		let worker: u32 = sink
			.events
			.iter()
			.find_map(|event| match event {
				LogEvent::PlainMessage { text } => text.strip_prefix("worker ")?.parse().ok(),
				_ => None,
			})
			.unwrap();
		let deadline = Instant::now() + Duration::from_secs(2);
		while !is_gone(worker) && Instant::now() < deadline {
			tokio::time::sleep(Duration::from_millis(50)).await;
		}
		assert!(is_gone(worker), "worker {} survived the kill", worker);
	}

	#[tokio::test]
	async fn second_interrupt_kills_without_waiting() {
		let _turn = take_turn();
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::new(dir.path().join("server-state.json"));
		let script = "trap '' TERM; echo ready; while true; do echo tick; sleep 0.1; done";
		let inspector = ServerInspector::system(&store, shell_server(script, &dir));

		let mut controls = controls(Duration::from_secs(60));
		let mut child = launch(&inspector, &launch_state()).await.unwrap();
		let mut ticks = 0;
		let mut sink = Reacting {
			events: Vec::new(),
			react: |event: &LogEvent| {
				if *event == plain("ready") {
					raise(Sig::SIGTERM).unwrap();
				} else if *event == plain("tick") {
					ticks += 1;
					if ticks == 3 {
						raise(Sig::SIGINT).unwrap();
					}
				}
			},
		};

		let code = timeout(
			Duration::from_secs(5),
			supervise(&inspector, &mut child, &mut sink, &mut controls),
		)
		.await
		.expect("second interrupt did not kill the master")
		.unwrap();
		assert_eq!(code, 128 + 9);
	}

	#[tokio::test]
	async fn lingering_pipe_holder_does_not_block_exit() {
		let _turn = take_turn();
		let dir = tempfile::tempdir().unwrap();
		let store = StateStore::new(dir.path().join("server-state.json"));
		let inspector = ServerInspector::system(&store, shell_server("sleep 8 & echo master-done; exit 0", &dir));

		let mut child = launch(&inspector, &launch_state()).await.unwrap();
		let mut events: Vec<LogEvent> = Vec::new();
		let code = timeout(
			Duration::from_secs(2),
			supervise(&inspector, &mut child, &mut events, &mut controls(STOP_GRACE)),
		)
		.await
		.expect("controller waited on a process other than the master")
		.unwrap();
		assert_eq!(code, 0);
		assert!(events.contains(&plain("master-done")));
	}
}
