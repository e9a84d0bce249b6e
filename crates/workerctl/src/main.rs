mod cli;
mod commands;
mod config;
mod render;
mod watch;

use clap::Parser;
use owo_colors::OwoColorize;
use statefile::ServerInspector;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

fn main() {
	let cli = Cli::parse();

	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
		.with_writer(std::io::stderr)
		.init();

	let config = config::load_global_config(cli.config.as_deref());

	let result = match cli.command {
		Command::Start(args) => commands::start::run(&config, args),
		Command::Stop => with_inspector(&config, |inspector| commands::stop(inspector, &mut std::io::stderr())),
		Command::Reload => with_inspector(&config, |inspector| commands::reload(inspector, &mut std::io::stderr())),
		Command::Status => with_inspector(&config, |inspector| commands::status(inspector)),
	};

	match result {
		Ok(code) => std::process::exit(code),
		Err(e) => {
			eprintln!("{} {:#}", "error:".red().bold(), e);
			std::process::exit(1);
		}
	}
}

fn with_inspector<F>(config: &config::GlobalConfig, f: F) -> anyhow::Result<i32>
where
	F: FnOnce(&ServerInspector<'_>) -> anyhow::Result<i32>,
{
	let store = config.state_store();
	let inspector = ServerInspector::system(&store, config.server_command());
	f(&inspector)
}
