//! Newest-wins hand-off between a capture callback and the session loop

use tokio::sync::watch;

/// Producer half; publishing replaces any item the reader has not taken yet
#[derive(Debug)]
pub struct LatestSender<T> {
    tx: watch::Sender<Option<T>>,
}

/// Consumer half; only ever sees the most recent item
#[derive(Debug)]
pub struct LatestReceiver<T> {
    rx: watch::Receiver<Option<T>>,
}

pub fn latest<T>() -> (LatestSender<T>, LatestReceiver<T>) {
    let (tx, rx) = watch::channel(None);
    (LatestSender { tx }, LatestReceiver { rx })
}

impl<T> LatestSender<T> {
    /// Store `item` as the newest; false once the receiver is gone
    pub fn publish(&self, item: T) -> bool {
        if self.tx.is_closed() {
            return false;
        }
        self.tx.send_replace(Some(item));
        true
    }
}

impl<T> Clone for LatestSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone> LatestReceiver<T> {
    /// Wait for an item newer than the last one taken; `None` once every sender is dropped
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            self.rx.changed().await.ok()?;
            let newest = self.rx.borrow_and_update().clone();
            if newest.is_some() {
                return newest;
            }
        }
    }
}
