use serde::Serialize;

/// Output stream of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
	Stdout,
	Stderr,
}

/// One classified line of server output.
///
/// Built per line and handed straight to a sink; nothing keeps them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
	PlainMessage {
		text: String,
	},
	DebugEvent {
		level: String,
		message: String,
		remote: bool,
		elapsed_millis: Option<f64>,
	},
	RequestTelemetry {
		method: String,
		url: String,
		status_code: String,
		duration_millis: f64,
	},
	ErrorLine {
		text: String,
	},
}
