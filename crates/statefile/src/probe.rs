//! Liveness and termination by pid, without any connection to the process.
//!
//! A live answer only says *some* process holds that pid. Pids are recycled
//! by the OS and no identity check is made beyond existence.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// Signal-level capability over an OS process id.
pub trait ProcessProbe {
	/// Whether a process with `pid` exists (signal-zero delivery).
	fn is_alive(&self, pid: u32) -> bool;

	/// Ask `pid` to shut down gracefully. Does not wait for it to exit.
	fn terminate(&self, pid: u32) -> bool;
}

impl<P: ProcessProbe + ?Sized> ProcessProbe for &P {
	fn is_alive(&self, pid: u32) -> bool {
		(**self).is_alive(pid)
	}

	fn terminate(&self, pid: u32) -> bool {
		(**self).terminate(pid)
	}
}

/// [`ProcessProbe`] backed by `kill(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

impl ProcessProbe for SignalProbe {
	fn is_alive(&self, pid: u32) -> bool {
		let Some(pid) = to_nix_pid(pid) else {
			return false;
		};
		match kill(pid, None) {
			Ok(()) => true,
			// Exists, but owned by another user.
			Err(Errno::EPERM) => true,
			Err(_) => false,
		}
	}

	fn terminate(&self, pid: u32) -> bool {
		let Some(nix_pid) = to_nix_pid(pid) else {
			return false;
		};
		match kill(nix_pid, Signal::SIGTERM) {
			Ok(()) => {
				tracing::debug!("sent SIGTERM to {}", pid);
				true
			}
			Err(e) => {
				tracing::debug!("SIGTERM to {} failed: {}", pid, e);
				false
			}
		}
	}
}

/// Pid 0 addresses the whole process group and negative values address
/// other groups; neither is ever a valid target here.
fn to_nix_pid(pid: u32) -> Option<Pid> {
	let raw = i32::try_from(pid).ok()?;
	(raw > 0).then(|| Pid::from_raw(raw))
}
