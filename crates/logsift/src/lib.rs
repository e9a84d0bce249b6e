//! # logsift
//!
//! Turn a server's mixed stdout/stderr into typed events.
//!
//! The supervised server writes human-readable lines and JSON records to the
//! same stream. [`Classifier`] splits incremental output into lines per
//! channel and maps each line to at most one [`LogEvent`]; classification
//! never fails.
//!
//! ```rust
//! use logsift::{Channel, Classifier, LogEvent};
//!
//! let mut classifier = Classifier::new();
//! let events = classifier.feed(Channel::Stdout, b"Workerman started\n{\"msg\":\"x\"}\n");
//! assert_eq!(events[0], LogEvent::PlainMessage { text: "Workerman started".into() });
//! ```

pub mod classify;
pub mod event;
pub mod sink;
pub mod splitter;

pub use classify::{classify_stderr_line, classify_stdout_line, parse_elapsed_millis, Classifier};
pub use event::{Channel, LogEvent};
pub use sink::EventSink;
pub use splitter::LineSplitter;
