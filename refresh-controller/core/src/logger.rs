/// Receives diagnostics from components whose logging is optional.
///
/// Each message carries a short tag naming the subsystem that produced it
/// (e.g. `Capabilities`, `Permissions`). Components that hold no logger skip
/// the work of producing these messages entirely.
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str, tag: &str);
    fn info(&self, message: &str, tag: &str);
    fn warn(&self, message: &str, tag: &str);
    fn error(&self, message: &str, tag: &str);
}

/// Forwards messages to the `tracing` subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str, tag: &str) {
        tracing::debug!(%tag, "{message}");
    }

    fn info(&self, message: &str, tag: &str) {
        tracing::info!(%tag, "{message}");
    }

    fn warn(&self, message: &str, tag: &str) {
        tracing::warn!(%tag, "{message}");
    }

    fn error(&self, message: &str, tag: &str) {
        tracing::error!(%tag, "{message}");
    }
}
