//! The ambient deadline-carrying context threaded through every I/O-bound
//! operation: a cancellation signal paired with a per-operation timeout.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::TenangError;

#[derive(Clone)]
pub struct OpContext {
    cancel: CancellationToken,
}

impl OpContext {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
        }
    }

    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Runs `fut` under `timeout`, racing it against cancellation. Timeout
    /// and cancellation are both reported as the relevant `TenangError`
    /// variant rather than propagating the underlying `Elapsed`/`Cancelled`.
    pub async fn run<F, T>(&self, timeout: Duration, fut: F) -> Result<T, TenangError>
    where
        F: std::future::Future<Output = Result<T, TenangError>>,
    {
        if self.is_cancelled() {
            return Err(TenangError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TenangError::Cancelled),
            res = tokio::time::timeout(timeout, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(TenangError::TimeoutExceeded(timeout)),
            },
        }
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns a background task that cancels `ctx` on SIGINT (Ctrl-C), the
/// standard way an operator aborts a `backup`/`cleanup`/`restore` invocation
/// from a terminal. In-flight subprocesses observe the cancellation on their
/// next `ctx.run(...)` or `tokio::select!` check; no new work starts after.
pub fn cancel_on_ctrl_c(ctx: OpContext) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received interrupt signal, cancelling in-flight work");
            ctx.cancel();
        }
    });
}
