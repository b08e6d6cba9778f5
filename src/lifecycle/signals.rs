//! OS signal handling.
//!
//! SIGHUP, SIGINT, SIGTERM and SIGQUIT all request a graceful stop. On
//! non-unix targets Ctrl+C is the only trigger.

use std::io;

use tokio_util::sync::CancellationToken;

#[cfg(unix)]
struct Signals {
    hangup: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.hangup.recv() => "SIGHUP",
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        "ctrl-c"
    }
}

/// Child of `parent` that is also cancelled by the first shutdown signal.
///
/// Handlers are installed before this returns, so a signal delivered right
/// after the call is not lost. Must be called within a Tokio runtime.
pub fn notify_context(parent: &CancellationToken) -> io::Result<CancellationToken> {
    let token = parent.child_token();
    let mut signals = Signals::install()?;

    let listener = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            signal = signals.recv() => {
                tracing::info!(signal, "Shutdown signal received");
                listener.cancel();
            }
            _ = listener.cancelled() => {}
        }
    });

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parent_cancellation_reaches_child() {
        let parent = CancellationToken::new();
        let token = notify_context(&parent).unwrap();
        assert!(!token.is_cancelled());

        parent.cancel();
        token.cancelled().await;
    }

    #[tokio::test]
    async fn test_stopping_child_leaves_parent_alone() {
        let parent = CancellationToken::new();
        let token = notify_context(&parent).unwrap();

        token.cancel();
        assert!(!parent.is_cancelled());
    }
}
