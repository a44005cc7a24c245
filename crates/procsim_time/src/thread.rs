// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, trace};

use crate::{Error, Result};

/// An OS thread that can be joined with an upper bound on the wait.
///
/// `JoinHandle::join` blocks for as long as the thread runs. The thread instead owns the sending
/// half of a channel and drops it on exit (including while unwinding), so the owner can wait for
/// the disconnect with a timeout before committing to the join.
#[derive(Debug)]
pub(crate) struct ManagedThread {
    name: String,
    handle: JoinHandle<()>,
    exited: mpsc::Receiver<()>,
}

impl ManagedThread {
    pub(crate) fn spawn<F>(name: String, body: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (exit_signal, exited) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                // Dropped after `body` and everything it captured.
                let _exit_signal = exit_signal;
                body();
            })
            .map_err(|source| Error::spawn(name.clone(), source))?;

        Ok(Self { name, handle, exited })
    }

    /// Whether the caller is running on this thread.
    pub(crate) fn is_current(&self) -> bool {
        self.handle.thread().id() == thread::current().id()
    }

    /// Lets the thread finish on its own.
    pub(crate) fn detach(self) {
        trace!(thread = %self.name, "detaching thread");
    }

    /// Waits at most `timeout` for the thread to exit, then joins it.
    ///
    /// A thread cannot join itself; when called from the managed thread, the handle is
    /// detached instead and the thread finishes on its own once control returns to its loop.
    #[cfg_attr(test, mutants::skip)] // Causes test timeout.
    pub(crate) fn join_within(self, timeout: Duration) -> Result<()> {
        if self.is_current() {
            trace!(thread = %self.name, "stop requested from own thread, detaching");
            return Ok(());
        }

        match self.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                error!(thread = %self.name, ?timeout, "thread did not stop in time");
                Err(Error::join_timeout(self.name, timeout))
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    error!(thread = %self.name, "thread terminated by a panic");
                }
                Ok(())
            }
        }
    }
}
