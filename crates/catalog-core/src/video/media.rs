use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

pub type PlayFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEventKind {
    /// Metadata loaded or the resource became playable.
    Ready,
    /// The resource failed to load.
    Error,
}

/// A load outcome, tagged with the source it belongs to so late events for
/// a replaced source can be told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEvent {
    pub src: String,
    pub kind: MediaEventKind,
}

impl MediaEvent {
    pub fn ready(src: &str) -> Self {
        Self {
            src: src.to_string(),
            kind: MediaEventKind::Ready,
        }
    }

    pub fn error(src: &str) -> Self {
        Self {
            src: src.to_string(),
            kind: MediaEventKind::Error,
        }
    }
}

/// The media element the loader drives.
///
/// `load` replaces whatever was loaded before and returns the event stream
/// for the new source. A backend may never send anything on that stream;
/// the loader's timeout covers that case.
pub trait MediaBackend: Send + Sync + 'static {
    fn load(&self, src: &str) -> mpsc::UnboundedReceiver<MediaEvent>;

    /// Starts playback. Rejections are expected (e.g. no user gesture) and
    /// are not load failures.
    fn play(&self) -> PlayFuture;

    /// Drops the current source and stops any in-flight loading.
    fn detach(&self);
}
