use reqwest::Client;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Requests a TeslaMate "resume logging" call; bursts collapse into one.
#[derive(Clone, Debug)]
pub struct WakeHandle {
    tx: mpsc::Sender<()>,
}

impl WakeHandle {
    pub fn wake(&self) {
        let _ = self.tx.try_send(());
    }
}

pub fn wake_channel() -> (WakeHandle, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (WakeHandle { tx }, rx)
}

/// Asks TeslaMate to resume logging after a command so the change shows up
/// in its database quickly. Failures are ignored.
pub struct TeslaMateWaker {
    http_client: Client,
    /// `None` when the configured URL is not http(s)
    url: Option<String>,
    requests: mpsc::Receiver<()>,
    min_gap: Duration,
}

impl TeslaMateWaker {
    pub fn new(
        http_client: Client,
        teslamate_url: &str,
        car_id: i64,
        requests: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            http_client,
            url: resume_url(teslamate_url, car_id),
            requests,
            min_gap: Duration::from_secs(1),
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        match &self.url {
            Some(url) => info!(url = %url, "TeslaMate waker started"),
            None => info!("No usable TeslaMate URL, waker disabled"),
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                request = self.requests.recv() => {
                    if request.is_none() {
                        break;
                    }
                }
            }

            let Some(url) = &self.url else { continue };

            debug!(url = %url, "Waking TeslaMate");
            match self.http_client.put(url).send().await {
                Ok(response) => debug!(status = %response.status(), "TeslaMate wake sent"),
                Err(e) => debug!(error = %e, "TeslaMate wake failed"),
            }

            // Spread out repeated wakes
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.min_gap) => {}
            }
        }
    }
}

/// `<teslamate_url>/api/car/<car_id>/logging/resume`
pub(crate) fn resume_url(teslamate_url: &str, car_id: i64) -> Option<String> {
    let base = teslamate_url.trim().trim_end_matches('/');
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return None;
    }
    Some(format!("{}/api/car/{}/logging/resume", base, car_id))
}
