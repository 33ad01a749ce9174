use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::media::{MediaBackend, MediaEvent, MediaEventKind, PlayFuture};

/// A media backend that checks a source with a small ranged GET instead of
/// decoding it. Used by the command line to see which candidate a preview
/// would end up playing.
pub struct HttpProbe {
    client: reqwest::Client,
    inflight: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpProbe {
    /// `request_timeout` should exceed the loader timeout so a slow host
    /// stays silent rather than turning into an error.
    pub fn new(request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed building HTTP client for video probing")?;
        Ok(Self {
            client,
            inflight: Mutex::new(Vec::new()),
        })
    }

    fn abort_inflight(&self) {
        for handle in self.inflight.lock().drain(..) {
            handle.abort();
        }
    }
}

impl MediaBackend for HttpProbe {
    fn load(&self, src: &str) -> mpsc::UnboundedReceiver<MediaEvent> {
        self.abort_inflight();

        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let src = src.to_string();

        let handle = tokio::spawn(async move {
            let response = client
                .get(src.as_str())
                .header(reqwest::header::RANGE, "bytes=0-1023")
                .send()
                .await;

            let kind = match response {
                Ok(resp) if resp.status().is_success() => MediaEventKind::Ready,
                Ok(resp) => {
                    debug!(src = %src, status = %resp.status(), "probe rejected");
                    MediaEventKind::Error
                }
                Err(err) if err.is_timeout() => {
                    debug!(src = %src, "probe timed out; leaving source silent");
                    return;
                }
                Err(err) => {
                    debug!(src = %src, error = %err, "probe failed");
                    MediaEventKind::Error
                }
            };

            trace!(src = %src, ?kind, "probe outcome");
            if tx.send(MediaEvent { src, kind }).is_err() {
                trace!("probe outcome dropped; source was replaced");
            }
        });
        self.inflight.lock().push(handle);

        rx
    }

    fn play(&self) -> PlayFuture {
        Box::pin(async { Ok(()) })
    }

    fn detach(&self) {
        self.abort_inflight();
    }
}

impl Drop for HttpProbe {
    fn drop(&mut self) {
        self.abort_inflight();
    }
}
