//! PTY-backed terminal sessions.
//!
//! Each session pairs one shell process with one PTY. A blocking reader
//! thread forwards PTY output into an unbounded channel in 4 KiB chunks,
//! preserving byte order; input is written straight to the PTY. Closing a
//! session kills the whole process group and reaps the child, so no shell
//! survives its connection.

use dashmap::DashMap;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use subterm_core::config::TerminalConfig;
use subterm_core::{Error, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const READ_CHUNK: usize = 4096;

/// Lifecycle of a terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

struct SessionInner {
    id: Uuid,
    writer: Mutex<Box<dyn Write + Send>>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: Mutex<Box<dyn Child + Send>>,
    state: Mutex<SessionState>,
}

impl SessionInner {
    fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }

        // Kill the process group, not just the shell: anything the user
        // started inside the terminal must die with the session.
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.lock().process_id() {
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGTERM);
                }
                thread::sleep(std::time::Duration::from_millis(50));
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.lock().kill();
        }

        // Reap, so the child never lingers as a zombie.
        if let Err(e) = self.child.lock().wait() {
            warn!(session_id = %self.id, error = %e, "failed to reap terminal child");
        }

        debug!(session_id = %self.id, "terminal session closed");
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle to one live terminal session.
///
/// The handle owns the output side; everything else is shared with the
/// manager so the session can be torn down from either end.
pub struct TermSession {
    inner: Arc<SessionInner>,
    output: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl TermSession {
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// OS process id of the shell, if it is still known.
    pub fn child_pid(&self) -> Option<u32> {
        self.inner.child.lock().process_id()
    }

    /// Forward input bytes to the shell.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        if self.state() != SessionState::Active {
            return Err(Error::terminal("session is closed"));
        }
        let mut writer = self.inner.writer.lock();
        writer
            .write_all(bytes)
            .map_err(|e| Error::terminal(format!("write to terminal failed: {}", e)))?;
        writer
            .flush()
            .map_err(|e| Error::terminal(format!("flush to terminal failed: {}", e)))
    }

    /// Resize the PTY.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        if self.state() != SessionState::Active {
            return Err(Error::terminal("session is closed"));
        }
        self.inner
            .master
            .lock()
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::terminal(format!("resize failed: {}", e)))
    }

    /// Next chunk of shell output; `None` once the shell has exited and the
    /// stream is drained, or if the output side was split off.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        match &mut self.output {
            Some(output) => output.recv().await,
            None => None,
        }
    }

    /// Split off the output stream so reading and writing can live on
    /// different tasks. Returns `None` on the second call.
    pub fn take_output(&mut self) -> Option<mpsc::UnboundedReceiver<Vec<u8>>> {
        self.output.take()
    }
}

/// Owns all live terminal sessions.
pub struct TermManager {
    config: TerminalConfig,
    sessions: DashMap<Uuid, Arc<SessionInner>>,
}

impl TermManager {
    pub fn new(config: TerminalConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    /// Spawn a shell on a fresh PTY with `cwd` as working directory.
    pub fn open(&self, cwd: &Path) -> Result<TermSession> {
        let id = Uuid::new_v4();
        let state = Mutex::new(SessionState::Connecting);

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: self.config.rows,
                cols: self.config.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::terminal(format!("failed to open pty: {}", e)))?;

        let mut cmd = CommandBuilder::new(&self.config.shell);
        cmd.cwd(cwd);
        cmd.env("TERM", &self.config.term);
        cmd.env("COLORTERM", "truecolor");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| Error::terminal(format!("failed to spawn shell: {}", e)))?;

        // Drop the slave side so the master sees EOF when the shell exits.
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| Error::terminal(format!("failed to clone pty reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| Error::terminal(format!("failed to take pty writer: {}", e)))?;

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        thread::spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if output_tx.send(buf[..n].to_vec()).is_err() {
                            // Receiver gone: the connection is closing.
                            break;
                        }
                    }
                }
            }
        });

        let inner = Arc::new(SessionInner {
            id,
            writer: Mutex::new(writer),
            master: Mutex::new(pair.master),
            child: Mutex::new(child),
            state,
        });
        *inner.state.lock() = SessionState::Active;
        self.sessions.insert(id, Arc::clone(&inner));

        info!(session_id = %id, shell = %self.config.shell, "terminal session started");

        Ok(TermSession {
            inner,
            output: Some(output_rx),
        })
    }

    /// Close a session and forget it. Closing an unknown or already closed
    /// session is a no-op.
    pub fn close(&self, id: Uuid) {
        if let Some((_, inner)) = self.sessions.remove(&id) {
            inner.close();
        }
    }

    /// Number of live sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Close every session; used during server shutdown.
    pub fn shutdown_all(&self) {
        let ids: Vec<Uuid> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.close(id);
        }
    }
}

impl Drop for TermManager {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> TerminalConfig {
        TerminalConfig {
            shell: "/bin/sh".to_string(),
            term: "xterm-256color".to_string(),
            cols: 80,
            rows: 24,
        }
    }

    async fn collect_until(
        session: &mut TermSession,
        needle: &str,
        limit: Duration,
    ) -> String {
        let mut collected = String::new();
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, session.recv()).await {
                Ok(Some(chunk)) => {
                    collected.push_str(&String::from_utf8_lossy(&chunk));
                    if collected.contains(needle) {
                        return collected;
                    }
                }
                Ok(None) | Err(_) => return collected,
            }
        }
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TermManager::new(test_config());
        let mut session = manager.open(dir.path()).unwrap();

        // Arithmetic expansion: the expanded marker only ever appears in the
        // shell's output, never in the echoed input line.
        session.write(b"echo sub$((1000+234))\n").unwrap();
        let output = collect_until(&mut session, "sub1234", Duration::from_secs(10)).await;
        assert!(output.contains("sub1234"), "output was: {:?}", output);

        manager.close(session.id());
    }

    #[tokio::test]
    async fn test_close_terminates_child() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TermManager::new(test_config());
        let session = manager.open(dir.path()).unwrap();
        let pid = session.child_pid().expect("child pid");

        manager.close(session.id());

        #[cfg(unix)]
        {
            // After close the child has been killed and reaped; signal 0
            // probes for existence.
            let mut gone = false;
            for _ in 0..40 {
                if unsafe { libc::kill(pid as i32, 0) } != 0 {
                    gone = true;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            assert!(gone, "shell process {} still alive after close", pid);
        }
        #[cfg(not(unix))]
        {
            let _ = pid;
        }
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TermManager::new(test_config());
        let session = manager.open(dir.path()).unwrap();

        manager.close(session.id());
        assert!(session.write(b"ls\n").is_err());
        assert!(session.resize(100, 40).is_err());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_active_count() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TermManager::new(test_config());
        assert_eq!(manager.active_count(), 0);

        let one = manager.open(dir.path()).unwrap();
        let two = manager.open(dir.path()).unwrap();
        assert_eq!(manager.active_count(), 2);

        manager.close(one.id());
        assert_eq!(manager.active_count(), 1);
        manager.close(two.id());
        assert_eq!(manager.active_count(), 0);

        // Closing twice is harmless.
        manager.close(two.id());
    }
}
