use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::WorkerCount;

#[derive(Debug, Parser)]
#[command(name = "workerctl", version, about = "Supervise a multi-worker PHP server")]
pub struct Cli {
	/// Config file (default: ~/.config/workerctl/config.toml)
	#[arg(long, global = true)]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Start the server in the foreground and relay its output
	Start(StartArgs),
	/// Gracefully stop the running server
	Stop,
	/// Restart the server's workers without dropping its sockets
	Reload,
	/// Show whether the server is running
	Status,
}

#[derive(Debug, Args)]
pub struct StartArgs {
	/// The IP address the server should bind to
	#[arg(long)]
	pub host: Option<String>,
	/// The port the server should be available on
	#[arg(long)]
	pub port: Option<u16>,
	/// Number of workers, or "auto"
	#[arg(long)]
	pub workers: Option<WorkerCount>,
	/// Requests a worker handles before it is recycled
	#[arg(long)]
	pub max_requests: Option<u32>,
	/// Reload the workers when application files change
	#[arg(long)]
	pub watch: bool,
	/// How relayed server output is printed
	#[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
	pub output: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	Pretty,
	Json,
}
