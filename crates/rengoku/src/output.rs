use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::logs;
use crate::types::StreamKind;

const RING_BUFFER_SIZE: usize = 64 * 1024;

/// Text chunks read from the child, one receiver per stream.
///
/// Each receiver yields `None` once the child closes that stream.
pub struct OutputStreams {
	pub stdout: mpsc::UnboundedReceiver<String>,
	pub stderr: mpsc::UnboundedReceiver<String>,
}

/// Shared view of the most recent output of one stream.
#[derive(Clone)]
pub struct OutputTail {
	ring: Arc<Mutex<VecDeque<u8>>>,
}

impl OutputTail {
	fn new() -> Self {
		Self {
			ring: Arc::new(Mutex::new(VecDeque::with_capacity(RING_BUFFER_SIZE))),
		}
	}

	async fn push(&self, data: &[u8]) {
		let mut ring = self.ring.lock().await;
		let overflow = (ring.len() + data.len()).saturating_sub(RING_BUFFER_SIZE);
		let evict = overflow.min(ring.len());
		ring.drain(..evict);
		let keep = data.len().min(RING_BUFFER_SIZE);
		ring.extend(&data[data.len() - keep..]);
	}

	pub async fn snapshot(&self) -> Vec<u8> {
		let ring = self.ring.lock().await;
		ring.iter().copied().collect()
	}
}

/// The sink a single read loop writes into: tail buffer, optional log file,
/// and the channel handed to the caller.
///
/// Owned by exactly one read loop; dropping it ends the caller's stream.
pub(crate) struct OutputCapture {
	kind: StreamKind,
	tail: OutputTail,
	log: Option<Arc<Mutex<LogWriter>>>,
	sender: mpsc::UnboundedSender<String>,
	decoder: Utf8Decoder,
}

impl OutputCapture {
	pub(crate) async fn write(&mut self, data: &[u8]) {
		self.tail.push(data).await;

		if let Some(log) = &self.log {
			log.lock().await.write(data);
		}

		let text = self.decoder.decode(data);
		if !text.is_empty() {
			// The caller may have dropped its receiver; output is still captured above.
			let _ = self.sender.send(text);
		}
	}

	/// Flush any bytes held back waiting for the rest of a character.
	pub(crate) fn finish(mut self) {
		let rest = self.decoder.finish();
		if !rest.is_empty() {
			let _ = self.sender.send(rest);
		}
		tracing::debug!("{} closed", self.kind.as_str());
	}
}

/// Builds the stdout/stderr captures for one supervisor.
pub(crate) struct OutputSet {
	pub(crate) stdout: OutputCapture,
	pub(crate) stderr: OutputCapture,
}

impl OutputSet {
	pub(crate) fn new(log: Option<LogWriter>) -> (Self, OutputStreams, OutputTail, OutputTail) {
		let log = log.map(|w| Arc::new(Mutex::new(w)));
		let (out_tx, out_rx) = mpsc::unbounded_channel();
		let (err_tx, err_rx) = mpsc::unbounded_channel();
		let out_tail = OutputTail::new();
		let err_tail = OutputTail::new();

		let set = Self {
			stdout: OutputCapture {
				kind: StreamKind::Stdout,
				tail: out_tail.clone(),
				log: log.clone(),
				sender: out_tx,
				decoder: Utf8Decoder::default(),
			},
			stderr: OutputCapture {
				kind: StreamKind::Stderr,
				tail: err_tail.clone(),
				log,
				sender: err_tx,
				decoder: Utf8Decoder::default(),
			},
		};
		let streams = OutputStreams {
			stdout: out_rx,
			stderr: err_rx,
		};
		(set, streams, out_tail, err_tail)
	}
}

/// Incremental UTF-8 decoding across read boundaries.
///
/// A multi-byte character cut by the end of a read is held until the next
/// chunk; bytes that can never form valid UTF-8 become U+FFFD.
#[derive(Default)]
pub(crate) struct Utf8Decoder {
	pending: Vec<u8>,
}

impl Utf8Decoder {
	pub(crate) fn decode(&mut self, data: &[u8]) -> String {
		self.pending.extend_from_slice(data);
		let mut out = String::with_capacity(self.pending.len());
		let mut rest: &[u8] = &self.pending;

		loop {
			match std::str::from_utf8(rest) {
				Ok(valid) => {
					out.push_str(valid);
					rest = &[];
					break;
				}
				Err(e) => {
					let (valid, after) = rest.split_at(e.valid_up_to());
					out.push_str(std::str::from_utf8(valid).unwrap_or_default());
					match e.error_len() {
						Some(bad) => {
							out.push(char::REPLACEMENT_CHARACTER);
							rest = &after[bad..];
						}
						None => {
							rest = after;
							break;
						}
					}
				}
			}
		}

		self.pending = rest.to_vec();
		out
	}

	pub(crate) fn finish(&mut self) -> String {
		let rest = std::mem::take(&mut self.pending);
		String::from_utf8_lossy(&rest).into_owned()
	}
}

/// Appends console output to `<name> YY-MMDD.log`, rotating past `max_size`.
pub struct LogWriter {
	file: Option<File>,
	path: PathBuf,
	bytes_written: u64,
	max_size: u64,
	log_dir: PathBuf,
	name: String,
}

impl LogWriter {
	pub fn open(log_dir: &Path, name: &str, max_size: u64) -> Self {
		let _ = fs::create_dir_all(log_dir);
		let path = log_dir.join(logs::current_log_name(name));
		let file = open_append(&path);
		let bytes_written = file
			.as_ref()
			.and_then(|f| f.metadata().ok())
			.map(|m| m.len())
			.unwrap_or(0);

		Self {
			file,
			path,
			bytes_written,
			max_size,
			log_dir: log_dir.to_path_buf(),
			name: name.to_string(),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn write(&mut self, data: &[u8]) {
		let Some(file) = self.file.as_mut() else {
			return;
		};
		if file.write_all(data).is_err() {
			return;
		}
		self.bytes_written += data.len() as u64;
		if self.max_size > 0 && self.bytes_written >= self.max_size {
			self.rotate();
		}
	}

	fn rotate(&mut self) {
		drop(self.file.take());

		let rotated = self.log_dir.join(logs::rotated_log_name(&self.log_dir, &self.name));
		if let Err(e) = fs::rename(&self.path, &rotated) {
			tracing::warn!("failed to rotate {}: {}", self.path.display(), e);
		}

		self.path = self.log_dir.join(logs::current_log_name(&self.name));
		self.file = open_append(&self.path);
		self.bytes_written = 0;
	}
}

fn open_append(path: &Path) -> Option<File> {
	match OpenOptions::new().create(true).append(true).open(path) {
		Ok(f) => Some(f),
		Err(e) => {
			tracing::warn!("cannot open log {}: {}", path.display(), e);
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decoder_passes_ascii_through() {
		let mut d = Utf8Decoder::default();
		assert_eq!(d.decode(b"[Server] Done (3.2s)!\n"), "[Server] Done (3.2s)!\n");
		assert_eq!(d.finish(), "");
	}

	#[test]
	fn decoder_joins_split_character() {
		let bytes = "héllo".as_bytes();
		let mut d = Utf8Decoder::default();
		assert_eq!(d.decode(&bytes[..2]), "h");
		assert_eq!(d.decode(&bytes[2..]), "éllo");
	}

	#[test]
	fn decoder_replaces_invalid_bytes() {
		let mut d = Utf8Decoder::default();
		assert_eq!(d.decode(b"a\xffb"), "a\u{FFFD}b");
	}

	#[test]
	fn decoder_flushes_truncated_tail_lossily() {
		let mut d = Utf8Decoder::default();
		assert_eq!(d.decode(&"€".as_bytes()[..2]), "");
		assert_eq!(d.finish(), "\u{FFFD}");
	}

	#[tokio::test]
	async fn tail_keeps_most_recent_bytes() {
		let tail = OutputTail::new();
		tail.push(&vec![b'a'; RING_BUFFER_SIZE]).await;
		tail.push(b"xyz").await;
		let snap = tail.snapshot().await;
		assert_eq!(snap.len(), RING_BUFFER_SIZE);
		assert!(snap.ends_with(b"axyz"));
	}

	#[tokio::test]
	async fn capture_fans_out_per_stream() {
		let (mut set, mut streams, out_tail, err_tail) = OutputSet::new(None);
		set.stdout.write(b"Preparing level \"world\"\n").await;
		set.stderr.write(b"WARN: low memory\n").await;
		set.stdout.finish();
		set.stderr.finish();

		assert_eq!(
			streams.stdout.recv().await.as_deref(),
			Some("Preparing level \"world\"\n")
		);
		assert_eq!(streams.stdout.recv().await, None);
		assert_eq!(streams.stderr.recv().await.as_deref(), Some("WARN: low memory\n"));
		assert_eq!(streams.stderr.recv().await, None);
		assert_eq!(err_tail.snapshot().await, b"WARN: low memory\n");
		assert!(out_tail.snapshot().await.starts_with(b"Preparing"));
	}

	#[test]
	fn log_writer_rotates_past_max_size() {
		let dir = std::env::temp_dir().join(format!("rengoku-logwriter-{}", std::process::id()));
		let _ = fs::remove_dir_all(&dir);

		let mut w = LogWriter::open(&dir, "srv", 8);
		let first = w.path().to_path_buf();
		w.write(b"0123456789");
		assert!(first.exists());
		let count = fs::read_dir(&dir).unwrap().count();
		assert_eq!(count, 2, "expected rotated file plus fresh active file");

		let _ = fs::remove_dir_all(&dir);
	}

	#[test]
	fn log_writer_keeps_every_rotated_segment() {
		let dir = std::env::temp_dir().join(format!("rengoku-logwriter-many-{}", std::process::id()));
		let _ = fs::remove_dir_all(&dir);

		let mut w = LogWriter::open(&dir, "srv", 8);
		for segment in ["segment-1\n", "segment-2\n", "segment-3\n"] {
			w.write(segment.as_bytes());
		}

		let mut contents: Vec<String> = fs::read_dir(&dir)
			.unwrap()
			.flatten()
			.map(|e| fs::read_to_string(e.path()).unwrap())
			.filter(|c| !c.is_empty())
			.collect();
		contents.sort();
		assert_eq!(contents, ["segment-1\n", "segment-2\n", "segment-3\n"]);

		let _ = fs::remove_dir_all(&dir);
	}
}
