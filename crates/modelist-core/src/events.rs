use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Coarse-grained signal sent after any catalog mutation. Subscribers re-fetch
/// whatever view they display; no diff is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogEvent {
    Changed,
}

#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<CatalogEvent>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.tx.subscribe()
    }

    pub fn notify_changed(&self) {
        // No receivers is fine; nobody is looking at the catalog right now.
        let _ = self.tx.send(CatalogEvent::Changed);
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
