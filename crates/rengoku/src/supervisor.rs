use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::{LaunchError, SupervisorError};
use crate::output::{LogWriter, OutputCapture, OutputSet, OutputStreams, OutputTail};
use crate::types::*;

/// In-band command the server understands as "save and exit".
pub const STOP_COMMAND: &str = "stop";

const READ_BUFFER_SIZE: usize = 1024;
/// How long read loops may keep draining after the child has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(5);
/// Time between SIGTERM and SIGKILL on a forced shutdown.
const KILL_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
	/// Used in log messages and as the console log file prefix.
	pub name: String,
	/// Tee console output into dated files here when set.
	pub log_dir: Option<PathBuf>,
	pub max_log_size: u64,
}

impl Default for SupervisorConfig {
	fn default() -> Self {
		Self {
			name: "server".into(),
			log_dir: None,
			max_log_size: 10 * 1024 * 1024,
		}
	}
}

/// Owns one child server process for its whole life.
///
/// A supervisor launches at most once. Share it behind an [`Arc`]: one task
/// drives [`start`](Self::start) while others send commands or shut it down.
pub struct Supervisor {
	name: String,
	state: watch::Sender<SupervisorState>,
	cancel: watch::Sender<bool>,
	stdin: Mutex<Option<ChildStdin>>,
	outputs: Mutex<Option<OutputSet>>,
	stdout_tail: OutputTail,
	stderr_tail: OutputTail,
	log_path: Option<PathBuf>,
}

impl Supervisor {
	/// Create an idle supervisor and the receivers its output will arrive on.
	pub fn new(config: SupervisorConfig) -> (Arc<Self>, OutputStreams) {
		let log = config
			.log_dir
			.as_deref()
			.map(|dir| LogWriter::open(dir, &config.name, config.max_log_size));
		let log_path = log.as_ref().map(|w| w.path().to_path_buf());
		let (set, streams, stdout_tail, stderr_tail) = OutputSet::new(log);
		let (state, _) = watch::channel(SupervisorState::Idle);
		let (cancel, _) = watch::channel(false);

		let sup = Arc::new(Self {
			name: config.name,
			state,
			cancel,
			stdin: Mutex::new(None),
			outputs: Mutex::new(Some(set)),
			stdout_tail,
			stderr_tail,
			log_path,
		});
		(sup, streams)
	}

	pub fn state(&self) -> SupervisorState {
		*self.state.borrow()
	}

	/// Watch state transitions as they happen.
	pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
		self.state.subscribe()
	}

	pub fn pid(&self) -> Option<u32> {
		self.state.borrow().pid()
	}

	/// The most recent console output of one stream (up to 64 KiB).
	pub async fn snapshot(&self, stream: StreamKind) -> Vec<u8> {
		match stream {
			StreamKind::Stdout => self.stdout_tail.snapshot().await,
			StreamKind::Stderr => self.stderr_tail.snapshot().await,
		}
	}

	/// The console log file currently being written, if logging to disk.
	pub fn log_path(&self) -> Option<&Path> {
		self.log_path.as_deref()
	}

	/// Spawn the child and supervise it until it is gone.
	///
	/// This resolves only after the child has exited and both output streams
	/// have been drained; run it on its own task to keep issuing commands.
	/// On spawn failure the supervisor stays `Idle` and cannot be reused.
	pub async fn start(&self, plan: &LaunchPlan, working_dir: &Path) -> Result<(), LaunchError> {
		let outputs = self
			.outputs
			.lock()
			.await
			.take()
			.ok_or(LaunchError::AlreadyStarted)?;

		let mut lifecycle = Lifecycle {
			sup: self,
			armed: false,
		};
		let mut child = spawn_child(plan, working_dir).map_err(|source| {
			tracing::error!("{}: failed to spawn {}: {}", self.name, plan.program(), source);
			LaunchError::SpawnFailed {
				program: plan.program().to_string(),
				source,
			}
		})?;

		lifecycle.armed = true;
		let pid = child.id().unwrap_or(0);
		*self.stdin.lock().await = child.stdin.take();

		let mut cancel = self.cancel.subscribe();
		let mut readers = Vec::with_capacity(2);
		if let Some(stdout) = child.stdout.take() {
			readers.push(tokio::spawn(read_loop(stdout, outputs.stdout, self.cancel.subscribe())));
		}
		if let Some(stderr) = child.stderr.take() {
			readers.push(tokio::spawn(read_loop(stderr, outputs.stderr, self.cancel.subscribe())));
		}

		self.state.send_replace(SupervisorState::Running { pid });
		tracing::info!("{}: started {} (pid {})", self.name, plan.program(), pid);

		let status = tokio::select! {
			status = child.wait() => status,
			Ok(()) = cancel.changed() => terminate_child(&mut child).await,
		};

		let exit_code = match &status {
			Ok(exit) => {
				tracing::info!("{}: exited ({})", self.name, exit);
				exit.code()
			}
			Err(e) => {
				tracing::warn!("{}: failed to wait for exit: {}", self.name, e);
				None
			}
		};

		self.drain(readers).await;
		drop(child);
		self.release().await;
		lifecycle.armed = false;
		self.state.send_replace(SupervisorState::Terminated { exit_code });
		Ok(())
	}

	/// Write one command line to the server's console.
	///
	/// Silently does nothing when there is no open input stream; a failed
	/// write closes the stream, since the child is already going away.
	pub async fn send_command(&self, command: &str) {
		let mut stdin = self.stdin.lock().await;
		let Some(pipe) = stdin.as_mut() else {
			return;
		};
		if let Err(e) = write_line(pipe, command).await {
			tracing::debug!("{}: closing stdin after write error: {}", self.name, e);
			*stdin = None;
		}
	}

	/// Ask the server to shut itself down and wait until it has.
	pub async fn stop(&self) -> Result<(), SupervisorError> {
		let requested = self.state.send_if_modified(|state| match *state {
			SupervisorState::Running { pid } => {
				*state = SupervisorState::Stopping { pid };
				true
			}
			_ => false,
		});

		if requested {
			tracing::info!("{}: stop requested", self.name);
			self.send_command(STOP_COMMAND).await;
		} else if !matches!(self.state(), SupervisorState::Stopping { .. }) {
			return Err(SupervisorError::NotRunning);
		}

		self.wait_terminated().await;
		Ok(())
	}

	/// [`stop`](Self::stop), falling back to [`terminate`](Self::terminate)
	/// when the server takes longer than `timeout`.
	pub async fn stop_timeout(&self, timeout: Duration) -> Result<StopOutcome, SupervisorError> {
		match tokio::time::timeout(timeout, self.stop()).await {
			Ok(result) => result.map(|()| StopOutcome::Graceful),
			Err(_) => {
				tracing::warn!("{}: still running after {:?}, terminating", self.name, timeout);
				self.terminate().await;
				Ok(StopOutcome::Forced)
			}
		}
	}

	/// Signal the child and wait for it to be reaped. No-op without a child.
	pub async fn terminate(&self) {
		if !self.state().is_running() {
			return;
		}
		self.cancel.send_replace(true);
		self.wait_terminated().await;
	}

	/// Wait until the lifecycle is over and return the exit code, if any.
	pub async fn wait_terminated(&self) -> Option<i32> {
		let mut rx = self.state.subscribe();
		match rx.wait_for(|s| s.is_terminated()).await.map(|s| *s) {
			Ok(SupervisorState::Terminated { exit_code }) => exit_code,
			_ => None,
		}
	}

	/// Release the input stream and any output sinks not handed to a read loop.
	///
	/// Safe to call any number of times. Does nothing while a child is alive.
	/// On a supervisor that was never started this ends both output streams
	/// and rules out a later `start`.
	pub async fn cleanup(&self) {
		if self.state().is_running() {
			return;
		}
		self.release().await;
	}

	async fn release(&self) {
		if let Some(mut stdin) = self.stdin.lock().await.take() {
			let _ = stdin.shutdown().await;
		}
		drop(self.outputs.lock().await.take());
	}

	async fn drain(&self, readers: Vec<JoinHandle<()>>) {
		let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
		for mut reader in readers {
			if tokio::time::timeout_at(deadline, &mut reader).await.is_err() {
				tracing::debug!("{}: output still open after exit, cancelling reads", self.name);
				self.cancel.send_replace(true);
				let _ = reader.await;
			}
		}
	}
}

/// Ends the lifecycle when the `start` future is dropped before the child
/// was reaped. The child itself is killed by `kill_on_drop`.
struct Lifecycle<'a> {
	sup: &'a Supervisor,
	armed: bool,
}

impl Drop for Lifecycle<'_> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}
		tracing::warn!("{}: start was dropped before the child was reaped", self.sup.name);
		self.sup.cancel.send_replace(true);
		if let Ok(mut stdin) = self.sup.stdin.try_lock() {
			stdin.take();
		}
		self.sup
			.state
			.send_replace(SupervisorState::Terminated { exit_code: None });
	}
}

fn spawn_child(plan: &LaunchPlan, working_dir: &Path) -> io::Result<Child> {
	let mut cmd = Command::new(plan.program());
	cmd.args(plan.args())
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true)
		.process_group(0);

	if !working_dir.as_os_str().is_empty() {
		cmd.current_dir(working_dir);
	}

	cmd.spawn()
}

async fn read_loop<R: AsyncRead + Unpin>(
	mut reader: R,
	mut output: OutputCapture,
	mut cancel: watch::Receiver<bool>,
) {
	let mut buf = [0u8; READ_BUFFER_SIZE];
	loop {
		tokio::select! {
			read = reader.read(&mut buf) => match read {
				Ok(0) | Err(_) => break,
				Ok(n) => output.write(&buf[..n]).await,
			},
			Ok(()) = cancel.changed() => break,
		}
	}
	output.finish();
}

async fn write_line(pipe: &mut ChildStdin, command: &str) -> io::Result<()> {
	let mut line = String::with_capacity(command.len() + 1);
	line.push_str(command);
	line.push('\n');
	pipe.write_all(line.as_bytes()).await?;
	pipe.flush().await
}

async fn terminate_child(child: &mut Child) -> io::Result<ExitStatus> {
	let Some(pid) = child.id() else {
		return child.wait().await;
	};

	tracing::info!("sending SIGTERM to process group {}", pid);
	signal_group(pid, nix::sys::signal::Signal::SIGTERM);

	match tokio::time::timeout(KILL_GRACE, child.wait()).await {
		Ok(status) => status,
		Err(_) => {
			tracing::warn!("process group {} ignored SIGTERM, killing", pid);
			signal_group(pid, nix::sys::signal::Signal::SIGKILL);
			let _ = child.start_kill();
			child.wait().await
		}
	}
}

fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
	use nix::sys::signal::killpg;
	use nix::unistd::Pid;
	if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
		tracing::debug!("killpg {} {:?}: {}", pid, signal, e);
	}
}
