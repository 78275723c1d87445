//! Fire-and-forget notices to the presentation layer.

use tokio::sync::mpsc;

use punchclock_core::types::Notice;

/// Best-effort notice emitter. Automation correctness never depends on a
/// receiver being present or alive.
#[derive(Clone, Default)]
pub struct Notifier {
    tx: Option<mpsc::UnboundedSender<Notice>>,
}

impl Notifier {
    /// Build a notifier plus the receiving end for the presentation layer.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A notifier that drops everything (tests, headless runs).
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Emit a notice. Never blocks, never fails.
    pub fn emit(&self, notice: Notice) {
        tracing::debug!("🔔 Notice: {notice:?}");
        if let Some(tx) = &self.tx {
            let _ = tx.send(notice);
        }
    }
}
