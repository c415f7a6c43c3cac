use std::sync::Mutex;
use tokio::task::JoinHandle;

/// Owns the background task that rotates the bot's presence.
///
/// Shared between the event handler, which starts it on `ready`, and the
/// channel, which stops it on disconnect.
#[derive(Default)]
pub struct PresenceRotation {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceRotation {
    /// Spawn the rotation unless one is already running. Returns whether a
    /// task was started.
    pub fn start(&self, spawn: impl FnOnce() -> JoinHandle<()>) -> bool {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return false;
        }
        *task = Some(spawn());
        true
    }

    /// Abort the running rotation, if any.
    pub fn stop(&self) -> bool {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        match task {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn starts_once_until_stopped() {
        let rotation = PresenceRotation::default();
        assert!(rotation.start(|| tokio::spawn(pending_forever())));
        assert!(!rotation.start(|| tokio::spawn(pending_forever())));
        assert!(rotation.is_running());

        assert!(rotation.stop());
        assert!(!rotation.is_running());
        assert!(!rotation.stop());

        assert!(rotation.start(|| tokio::spawn(pending_forever())));
        rotation.stop();
    }

    #[tokio::test]
    async fn stop_aborts_the_task() {
        let rotation = PresenceRotation::default();
        let (alive, closed) = oneshot::channel::<()>();
        rotation.start(|| {
            tokio::spawn(async move {
                let _alive = alive;
                pending_forever().await;
            })
        });

        rotation.stop();
        // the sender is dropped once the aborted task is torn down
        assert!(closed.await.is_err());
    }

    async fn pending_forever() {
        std::future::pending::<()>().await;
    }
}
