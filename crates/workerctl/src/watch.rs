//! `--watch`: reload workers when application files change.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify_debouncer_full::{
	new_debouncer,
	notify::{RecommendedWatcher, RecursiveMode, Watcher},
	DebounceEventResult, Debouncer, FileIdMap,
};
use tokio::sync::mpsc;

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Directories whose churn never warrants a reload.
const IGNORED: [&str; 5] = ["vendor", "node_modules", ".git", "storage", "bootstrap/cache"];

pub struct FileWatcher {
	_debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
	changes: mpsc::UnboundedReceiver<Vec<PathBuf>>,
}

impl FileWatcher {
	pub fn new(paths: &[PathBuf]) -> Result<Self> {
		let (tx, changes) = mpsc::unbounded_channel();

		let mut debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| match result {
			Ok(events) => {
				let changed: Vec<PathBuf> = events
					.iter()
					.flat_map(|event| event.paths.iter())
					.filter(|path| !should_ignore_path(path))
					.cloned()
					.collect();
				if !changed.is_empty() {
					let _ = tx.send(changed);
				}
			}
			Err(errors) => tracing::warn!("watch error: {:?}", errors),
		})
		.context("failed to create file watcher")?;

		for path in paths {
			if !path.exists() {
				tracing::warn!("not watching missing path {}", path.display());
				continue;
			}
			debouncer
				.watcher()
				.watch(path, RecursiveMode::Recursive)
				.with_context(|| format!("failed to watch {}", path.display()))?;
			tracing::debug!("watching {}", path.display());
		}

		Ok(Self {
			_debouncer: debouncer,
			changes,
		})
	}

	/// Next batch of changed paths, `None` once the watcher has shut down.
	pub async fn next_change(&mut self) -> Option<Vec<PathBuf>> {
		self.changes.recv().await
	}
}

fn should_ignore_path(path: &Path) -> bool {
	let text = path.to_string_lossy();
	IGNORED.iter().any(|pattern| {
		path.components().any(|c| c.as_os_str() == *pattern)
			|| (pattern.contains('/') && text.contains(&format!("/{}/", pattern)))
	})
}
