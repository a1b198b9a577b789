//! Signals that stop or reload the sync loop.
//!
//! * Ctrl-C (SIGINT) and SIGTERM stop the loop
//! * SIGHUP reloads the secrets and rebuilds the sync handles (Unix only)
//!
//! Handlers are registered up front, so a signal that arrives during a
//! cycle is delivered once the cycle is over instead of being lost.
//!
//! # Example
//!
//! ```no_run
//! use ynison_bio::signal::{Handler, ShutdownSignal};
//!
//! let mut signals = Handler::new()?;
//! match signals.recv().await {
//!     ShutdownSignal::Interrupt | ShutdownSignal::Terminate => return Ok(()),
//!     ShutdownSignal::Reload => reload()?,
//! }
//! ```

use std::fmt;

use crate::error::Result;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Signal received by the [`Handler`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[expect(clippy::module_name_repetitions)]
pub enum ShutdownSignal {
    /// Ctrl-C / SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGHUP
    Reload,
}

impl ShutdownSignal {
    /// Whether the loop should exit.
    #[must_use]
    pub fn is_shutdown(self) -> bool {
        !matches!(self, Self::Reload)
    }
}

pub struct Handler {
    #[cfg(unix)]
    sigint: Signal,
    #[cfg(unix)]
    sigterm: Signal,
    #[cfg(unix)]
    sighup: Signal,
}

impl Handler {
    /// Registers the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns error if signal handlers cannot be registered.
    pub fn new() -> Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                sigint: signal(SignalKind::interrupt())?,
                sigterm: signal(SignalKind::terminate())?,
                sighup: signal(SignalKind::hangup())?,
            })
        }

        #[cfg(not(unix))]
        Ok(Self {})
    }

    /// Waits for the next signal.
    ///
    /// On other platforms than Unix, only Ctrl-C is delivered.
    pub async fn recv(&mut self) -> ShutdownSignal {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.sigint.recv() => ShutdownSignal::Interrupt,
                _ = self.sigterm.recv() => ShutdownSignal::Terminate,
                _ = self.sighup.recv() => ShutdownSignal::Reload,
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("unable to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
            ShutdownSignal::Interrupt
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "Ctrl+C"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
            ShutdownSignal::Reload => write!(f, "SIGHUP"),
        }
    }
}
