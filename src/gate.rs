use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{runtime::Handle, time::Instant};
use tracing::{debug, warn};

use crate::{
    block::BlockEvent,
    message::MessageSource,
    present::{BLOCKED_TITLE, Presenter, blocked_body},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationState {
    pub last_fired_at: Option<Instant>,
}

/// Debounces block notifications so a burst of blocks shows at most one popup per cooldown.
///
/// A request that passes fetches its message and displays it on a detached task; the caller
/// only ever waits for the cooldown check. The cooldown is supplied per request so a scan
/// applies the one from the snapshot it is running against.
pub struct NotificationGate {
    state: Mutex<NotificationState>,
    messages: Arc<MessageSource>,
    presenter: Arc<dyn Presenter>,
    runtime: Handle,
}

impl NotificationGate {
    pub fn new(messages: MessageSource, presenter: Arc<dyn Presenter>, runtime: Handle) -> Self {
        Self {
            state: Mutex::new(NotificationState::default()),
            messages: Arc::new(messages),
            presenter,
            runtime,
        }
    }

    /// Returns whether a notification was fired for `event`.
    pub fn request(&self, event: &BlockEvent, cooldown: Duration) -> bool {
        {
            let mut state = self.state.lock();
            let now = Instant::now();
            if let Some(last) = state.last_fired_at {
                if now.saturating_duration_since(last) < cooldown {
                    debug!(app = %event.process_name, pid = event.pid, "notification suppressed by cooldown");
                    return false;
                }
            }
            state.last_fired_at = Some(now);
        }

        self.dispatch(event.process_name.clone());
        true
    }

    pub fn state(&self) -> NotificationState {
        *self.state.lock()
    }

    fn dispatch(&self, app_name: String) {
        let messages = Arc::clone(&self.messages);
        let presenter = Arc::clone(&self.presenter);

        // detached, the popup may stay open long after the scan moved on
        self.runtime.spawn(async move {
            let message = messages.obtain(&app_name).await;
            let body = blocked_body(&app_name, &message);

            let shown =
                tokio::task::spawn_blocking(move || presenter.display(BLOCKED_TITLE, &body)).await;
            match shown {
                Ok(Ok(())) => debug!(app = %app_name, "notification dismissed"),
                Ok(Err(e)) => warn!(app = %app_name, error = %e, "failed to show popup"),
                Err(e) => warn!(app = %app_name, error = %e, "popup task panicked"),
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{message::DEFAULT_MESSAGE, present::PresentError};
    use chrono::Local;
    use tokio::sync::mpsc;

    const MINUTE: Duration = Duration::from_secs(60);

    /// Forwards every displayed body to a channel.
    pub(crate) struct RecordingPresenter(pub mpsc::UnboundedSender<String>);

    impl Presenter for RecordingPresenter {
        fn display(&self, _title: &str, body: &str) -> Result<(), PresentError> {
            let _ = self.0.send(body.to_string());
            Ok(())
        }
    }

    pub(crate) fn recording_gate() -> (NotificationGate, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = NotificationGate::new(
            MessageSource::fixed(),
            Arc::new(RecordingPresenter(tx)),
            Handle::current(),
        );
        (gate, rx)
    }

    fn event(name: &str) -> BlockEvent {
        BlockEvent {
            process_name: name.to_string(),
            pid: 42,
            detected_at: Local::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_block_inside_cooldown_is_suppressed() {
        let (gate, mut shown) = recording_gate();

        assert!(gate.request(&event("chrome.exe"), MINUTE));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!gate.request(&event("discord.exe"), MINUTE));

        let body = shown.recv().await.unwrap();
        assert!(body.contains("chrome.exe"));
        assert!(body.contains(DEFAULT_MESSAGE));
        assert!(shown.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn fires_again_once_cooldown_has_elapsed() {
        let (gate, mut shown) = recording_gate();

        assert!(gate.request(&event("chrome.exe"), MINUTE));
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!gate.request(&event("chrome.exe"), MINUTE));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(gate.request(&event("chrome.exe"), MINUTE));

        shown.recv().await.unwrap();
        shown.recv().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn burst_fires_once() {
        let (gate, _shown) = recording_gate();

        let fired = (0..100)
            .filter(|i| gate.request(&event(&format!("app{i}.exe")), MINUTE))
            .count();
        assert_eq!(fired, 1);
        assert!(gate.state().last_fired_at.is_some());
    }

    #[tokio::test]
    async fn zero_cooldown_never_suppresses() {
        let (gate, _shown) = recording_gate();

        assert!((0..5).all(|_| gate.request(&event("chrome.exe"), Duration::ZERO)));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_is_taken_from_each_request() {
        let (gate, _shown) = recording_gate();
        assert!(gate.request(&event("chrome.exe"), MINUTE));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!gate.request(&event("chrome.exe"), MINUTE));
        assert!(gate.request(&event("chrome.exe"), Duration::from_secs(2)));
    }

    struct BlockingPresenter {
        shown: mpsc::UnboundedSender<String>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl Presenter for BlockingPresenter {
        fn display(&self, _title: &str, body: &str) -> Result<(), PresentError> {
            let _ = self.shown.send(body.to_string());
            let _ = self.release.lock().recv();
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn open_popup_does_not_block_requests() {
        let (shown_tx, mut shown_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();

        let gate = NotificationGate::new(
            MessageSource::fixed(),
            Arc::new(BlockingPresenter {
                shown: shown_tx,
                release: Mutex::new(release_rx),
            }),
            Handle::current(),
        );

        assert!(gate.request(&event("chrome.exe"), Duration::ZERO));
        shown_rx.recv().await.unwrap();

        // the first popup is still open
        assert!(gate.request(&event("discord.exe"), Duration::ZERO));

        release_tx.send(()).unwrap();
        shown_rx.recv().await.unwrap();
        release_tx.send(()).unwrap();
    }
}
