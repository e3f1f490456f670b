use tracing::info;

pub const LOW_DISK_SPACE: &str = "LOW_DISK_SPACE";
pub const SCHEDULED_TASK_PENDING: &str = "SCHEDULED_TASK_PENDING";
pub const SCHEDULED_TASK_DONE: &str = "SCHEDULED_TASK_DONE";

/// Fire-and-forget user notification.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str, category: &str);
}

/// Emits notifications as log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str, category: &str) {
        info!(category, "{title}: {body}");
    }
}
