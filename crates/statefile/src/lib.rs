//! # statefile
//!
//! Find and control a long-lived server process from a later, unrelated
//! invocation of its controller: a JSON state file at a fixed path records
//! the launch configuration and master pid, and liveness, stop and reload
//! go through the process table instead of a live connection.
//!
//! ```rust,no_run
//! use statefile::{ServerCommand, ServerInspector, StatePaths, StateStore};
//!
//! let store = StateStore::new(StatePaths::new("workerctl").state_file());
//! let inspector = ServerInspector::system(&store, ServerCommand {
//!     program: "php".into(),
//!     args: vec!["bin/workerman-server".into()],
//!     base_path: "/srv/app".into(),
//!     working_dir: None,
//! });
//!
//! if inspector.server_is_running().unwrap() {
//!     inspector.stop_server().unwrap();
//! }
//! ```

pub mod error;
pub mod inspector;
pub mod launcher;
pub mod paths;
pub mod probe;
pub mod state;

pub use error::{Error, Result};
pub use inspector::{ServerCommand, ServerInspector, ServerStatus, BASE_PATH_ENV, MANAGED_ENV};
pub use launcher::{LaunchCommand, ProcessLauncher, RunOutcome, SystemLauncher};
pub use paths::StatePaths;
pub use probe::{ProcessProbe, SignalProbe};
pub use state::{ServerState, StateStore};
