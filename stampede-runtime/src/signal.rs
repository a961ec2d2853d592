//! Global abort coordination
//!
//! A run can be cut short by a threshold breach, a scheduler fault or an
//! operator interrupt. All three go through one [`AbortSignal`]; the first
//! reason recorded wins and later ones are ignored.

use stampede_thresholds::ThresholdVerdict;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::summary::{EXIT_SCHEDULER_FAULT, EXIT_THRESHOLDS_FAILED};

/// Why the run stopped early
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    /// An abort-on-breach threshold failed while the run was in progress
    ThresholdBreach(ThresholdVerdict),
    /// A worker task failed outside its iteration guard
    SchedulerFault(String),
    /// Ctrl-C, SIGTERM or an explicit request from the embedding program
    Interrupted,
}

impl AbortReason {
    /// Stable identifier used as `fatal_error.kind` in the summary
    pub fn kind(&self) -> &'static str {
        match self {
            AbortReason::ThresholdBreach(_) => "threshold_breach",
            AbortReason::SchedulerFault(_) => "scheduler_fault",
            AbortReason::Interrupted => "interrupted",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            AbortReason::ThresholdBreach(_) => EXIT_THRESHOLDS_FAILED,
            AbortReason::SchedulerFault(_) | AbortReason::Interrupted => EXIT_SCHEDULER_FAULT,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::ThresholdBreach(verdict) => write!(
                f,
                "threshold '{}' on '{}' breached",
                verdict.predicate, verdict.selector
            ),
            AbortReason::SchedulerFault(message) => write!(f, "scheduler fault: {}", message),
            AbortReason::Interrupted => f.write_str("run interrupted"),
        }
    }
}

/// Cloneable handle to the run-wide abort flag
#[derive(Debug, Clone)]
pub struct AbortSignal {
    sender: Arc<watch::Sender<Option<AbortReason>>>,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Request an abort; returns `false` when another reason was already set
    pub fn abort(&self, reason: AbortReason) -> bool {
        let mut reason = Some(reason);
        let accepted = self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = reason.take();
            true
        });
        match (accepted, reason) {
            (true, _) => info!("Abort requested"),
            (false, Some(ignored)) => warn!(reason = %ignored, "Run already aborting; ignoring"),
            (false, None) => {}
        }
        accepted
    }

    pub fn is_aborted(&self) -> bool {
        self.sender.borrow().is_some()
    }

    pub fn reason(&self) -> Option<AbortReason> {
        self.sender.borrow().clone()
    }

    /// Resolves once an abort has been requested
    pub async fn aborted(&self) -> AbortReason {
        let mut receiver = self.sender.subscribe();
        loop {
            let current = receiver.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            // the sender lives as long as `self`
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Abort the run with [`AbortReason::Interrupted`] on Ctrl-C or SIGTERM
pub async fn interrupt_on_shutdown_signal(signal: AbortSignal) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping all scenarios");
    signal.abort(AbortReason::Interrupted);
}
