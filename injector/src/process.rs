use nix::{
    errno::Errno,
    sys::signal::{kill, Signal},
    unistd::{getpid, Pid},
};
use thiserror::Error;
use tracing::trace;

/// Looks up and signals OS processes.
pub trait ProcessManager: Send + Sync + 'static {
    /// The pid of the current process.
    fn process_id(&self) -> u32;

    fn find(&self, pid: u32) -> Result<Pid, Error>;

    fn signal(&self, pid: Pid, signal: Signal) -> Result<(), Error>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("process {pid} not found")]
    NotFound { pid: u32 },

    #[error("failed to look up process {pid}: {source}")]
    Lookup { pid: u32, source: Errno },

    #[error("failed to send {signal} to process {pid}: {source}")]
    Signal {
        pid: Pid,
        signal: Signal,
        source: Errno,
    },
}

/// Signals processes through `kill(2)`.
#[derive(Copy, Clone, Debug, Default)]
pub struct Manager {
    dry_run: bool,
}

// === impl Manager ===

impl Manager {
    /// In dry-run mode, processes are looked up but never signaled.
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl ProcessManager for Manager {
    fn process_id(&self) -> u32 {
        getpid().as_raw() as u32
    }

    fn find(&self, pid: u32) -> Result<Pid, Error> {
        let raw = Pid::from_raw(pid as i32);
        match kill(raw, None) {
            Ok(()) => Ok(raw),
            Err(Errno::ESRCH) => Err(Error::NotFound { pid }),
            // The process exists but belongs to someone else.
            Err(Errno::EPERM) => Ok(raw),
            Err(source) => Err(Error::Lookup { pid, source }),
        }
    }

    fn signal(&self, pid: Pid, signal: Signal) -> Result<(), Error> {
        if self.dry_run {
            trace!(%pid, %signal, "Dry run, not signaling");
            return Ok(());
        }
        kill(pid, signal).map_err(|source| Error::Signal {
            pid,
            signal,
            source,
        })
    }
}
