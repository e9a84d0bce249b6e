/// Longest tail held back while waiting for a newline.
pub const MAX_PENDING: usize = 64 * 1024;

/// Reassembles lines from arbitrarily chunked output.
///
/// A read can end in the middle of a line; the tail is held back until the
/// next chunk completes it or [`finish`](LineSplitter::finish) flushes it.
/// A tail that reaches [`MAX_PENDING`] bytes is flushed as a line of its own.
#[derive(Debug, Default)]
pub struct LineSplitter {
	pending: Vec<u8>,
}

impl LineSplitter {
	pub fn new() -> Self {
		Self::default()
	}

	/// Complete, non-blank lines contained in `chunk` plus any held tail.
	pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
		let held = self.pending.len();
		self.pending.extend_from_slice(chunk);

		// Only the new bytes can hold a newline.
		let mut lines = match chunk.iter().rposition(|&b| b == b'\n') {
			Some(last_newline) => {
				let rest = self.pending.split_off(held + last_newline + 1);
				let complete = std::mem::replace(&mut self.pending, rest);
				split_lines(&complete)
			}
			None => Vec::new(),
		};

		if self.pending.len() >= MAX_PENDING {
			lines.extend(self.finish());
		}
		lines
	}

	/// Whatever is left once the stream has closed.
	pub fn finish(&mut self) -> Vec<String> {
		let rest = std::mem::take(&mut self.pending);
		split_lines(&rest)
	}
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
	String::from_utf8_lossy(bytes)
		.split('\n')
		.map(|line| line.strip_suffix('\r').unwrap_or(line))
		.filter(|line| !line.trim().is_empty())
		.map(str::to_string)
		.collect()
}
