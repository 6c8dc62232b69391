use tokio::sync::mpsc;

/// Requests an out-of-cycle poll.
///
/// Backed by a capacity-1 channel: while one request is pending, further
/// requests are absorbed into it.
#[derive(Clone, Debug)]
pub struct RefreshTrigger {
    tx: mpsc::Sender<()>,
}

pub fn refresh_channel() -> (RefreshTrigger, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (RefreshTrigger { tx }, rx)
}

impl RefreshTrigger {
    /// Returns `false` when a request was already pending or the scheduler
    /// is gone.
    pub fn request(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}
