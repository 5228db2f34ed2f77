/// User-facing notification sink (toasts, status lines, ...).
///
/// Fire-and-forget: the session never depends on what the sink does.
pub trait Notifier: Send + Sync + 'static {
    fn success(&self, message: &str);

    fn failure(&self, message: &str);
}

/// Routes notifications into `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        tracing::info!(target: "fundtransfer_accounts::notify", %message);
    }

    fn failure(&self, message: &str) {
        tracing::warn!(target: "fundtransfer_accounts::notify", %message);
    }
}

/// Drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn success(&self, _message: &str) {}

    fn failure(&self, _message: &str) {}
}
