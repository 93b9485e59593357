use tokio::sync::watch;

/// Phase of the batch start of configured servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DiscoveryState {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl DiscoveryState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug)]
pub(crate) struct DiscoveryTracker {
    tx: watch::Sender<DiscoveryState>,
}

impl DiscoveryTracker {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(DiscoveryState::NotStarted);
        Self { tx }
    }

    pub(crate) fn get(&self) -> DiscoveryState {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<DiscoveryState> {
        self.tx.subscribe()
    }

    pub(crate) fn begin(&self) {
        self.tx.send_replace(DiscoveryState::InProgress);
    }

    pub(crate) fn complete(&self) {
        self.tx.send_replace(DiscoveryState::Completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_started() {
        assert_eq!(DiscoveryTracker::new().get(), DiscoveryState::NotStarted);
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let tracker = DiscoveryTracker::new();
        let mut rx = tracker.subscribe();
        tracker.begin();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), DiscoveryState::InProgress);
        tracker.complete();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), DiscoveryState::Completed);
    }

    #[test]
    fn send_without_receivers_still_updates() {
        let tracker = DiscoveryTracker::new();
        tracker.begin();
        assert_eq!(tracker.get(), DiscoveryState::InProgress);
        assert_eq!(tracker.get().as_str(), "in_progress");
    }
}
