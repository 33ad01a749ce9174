use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::media::{MediaBackend, MediaEvent, MediaEventKind};
use super::sources::{UnavailableReason, cache_bust};
use crate::text::format_caption;

/// Tuned for a slow CDN: metadata can take well over 5s on a cold edge.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewStatus {
    Idle,
    Loading,
    Ready,
    Unavailable(UnavailableReason),
}

/// Everything a preview surface displays. `session` identifies the `open`
/// call this state describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewState {
    pub session: u64,
    pub open: bool,
    pub title: String,
    pub description: String,
    pub active_index: Option<usize>,
    pub active_src: Option<String>,
    pub status: PreviewStatus,
}

impl Default for PreviewState {
    fn default() -> Self {
        Self {
            session: 0,
            open: false,
            title: String::new(),
            description: String::new(),
            active_index: None,
            active_src: None,
            status: PreviewStatus::Idle,
        }
    }
}

impl PreviewState {
    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            PreviewStatus::Ready | PreviewStatus::Unavailable(_)
        )
    }

    /// The inline advisory, once every source has failed.
    pub fn advisory(&self) -> Option<String> {
        match &self.status {
            PreviewStatus::Unavailable(reason) => Some(reason.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoaderSettings {
    pub timeout: Duration,
    pub unavailable: UnavailableReason,
}

type Handles = Arc<Mutex<Vec<JoinHandle<()>>>>;

/// Plays one preview at a time, walking its candidate sources.
///
/// Each `open` starts a new session. Every state write made on behalf of a
/// session happens under the watch lock and only while that session is
/// still current, so a superseded load can never touch newer state.
pub struct VideoPreview<B: MediaBackend> {
    backend: Arc<B>,
    state: Arc<watch::Sender<PreviewState>>,
    settings: LoaderSettings,
    driver: Option<JoinHandle<()>>,
    playback: Handles,
}

impl<B: MediaBackend> VideoPreview<B> {
    pub fn new(backend: B, settings: LoaderSettings) -> Self {
        let (state, _) = watch::channel(PreviewState::default());
        Self {
            backend: Arc::new(backend),
            state: Arc::new(state),
            settings,
            driver: None,
            playback: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PreviewState {
        self.state.borrow().clone()
    }

    /// Starts loading `sources` in order. Must be called inside a tokio
    /// runtime. Returns the new session id.
    #[tracing::instrument(skip(self, sources, description))]
    pub fn open(&mut self, sources: &[String], title: &str, description: &str) -> u64 {
        let sources: Vec<String> = sources
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let mut session = 0;
        self.state.send_modify(|s| {
            s.session += 1;
            session = s.session;
            s.open = true;
            s.title = title.trim().to_string();
            s.description = format_caption(description);
            s.active_index = None;
            s.active_src = None;
            s.status = PreviewStatus::Loading;
        });
        self.cancel_tasks();
        self.backend.detach();

        info!(session, sources = sources.len(), "open");

        let driver = Driver {
            backend: Arc::clone(&self.backend),
            state: Arc::clone(&self.state),
            playback: Arc::clone(&self.playback),
            session,
            sources,
            settings: self.settings.clone(),
        };
        self.driver = Some(tokio::spawn(driver.run()));
        session
    }

    /// Cancels the current load and resets everything on display.
    #[tracing::instrument(skip(self))]
    pub fn close(&mut self) {
        let mut session = 0;
        self.state.send_modify(|s| {
            s.session += 1;
            session = s.session;
            s.open = false;
            s.title.clear();
            s.description.clear();
            s.active_index = None;
            s.active_src = None;
            s.status = PreviewStatus::Idle;
        });
        self.cancel_tasks();
        self.backend.detach();
        info!(session, "close");
    }

    /// Resolves once the current session is ready, unavailable, or
    /// superseded. A source left waiting on an explicit error never
    /// resolves; callers bound this with their own deadline.
    pub async fn settled(&self) -> PreviewState {
        let mut rx = self.state.subscribe();
        let session = rx.borrow().session;
        match rx
            .wait_for(|s| s.session != session || !s.open || s.is_settled())
            .await
        {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    fn cancel_tasks(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        for handle in self.playback.lock().drain(..) {
            handle.abort();
        }
    }
}

impl<B: MediaBackend> Drop for VideoPreview<B> {
    fn drop(&mut self) {
        self.cancel_tasks();
    }
}

/// The load task for one session.
struct Driver<B: MediaBackend> {
    backend: Arc<B>,
    state: Arc<watch::Sender<PreviewState>>,
    playback: Handles,
    session: u64,
    sources: Vec<String>,
    settings: LoaderSettings,
}

impl<B: MediaBackend> Driver<B> {
    /// Runs `f` under the watch lock if this session is still current.
    fn guarded<R>(&self, f: impl FnOnce(&mut PreviewState) -> R) -> Option<R> {
        let mut out = None;
        self.state.send_if_modified(|s| {
            if s.session != self.session {
                return false;
            }
            out = Some(f(s));
            true
        });
        if out.is_none() {
            debug!(session = self.session, "session superseded; dropping load step");
        }
        out
    }

    /// Points the backend at `src` and asks it to play.
    fn begin(&self, s: &mut PreviewState, index: usize, src: &str) -> mpsc::UnboundedReceiver<MediaEvent> {
        s.active_index = Some(index);
        s.active_src = Some(src.to_string());
        s.status = PreviewStatus::Loading;

        let events = self.backend.load(src);
        let play = self.backend.play();
        let session = self.session;
        let handle = tokio::spawn(async move {
            if let Err(err) = play.await {
                debug!(session, error = %err, "playback start rejected; ignoring");
            }
        });
        self.playback.lock().push(handle);
        events
    }

    fn report_unavailable(&self) {
        let reported = self.guarded(|s| {
            s.status = PreviewStatus::Unavailable(self.settings.unavailable.clone());
            s.active_src = None;
            self.backend.detach();
        });
        if reported.is_some() {
            warn!(session = self.session, tried = self.sources.len(), "unavailable");
        }
    }

    async fn run(self) {
        let session = self.session;
        let mut cursor = 0;
        let mut cache_bust_retried = false;

        loop {
            let Some(original) = self.sources.get(cursor) else {
                self.report_unavailable();
                return;
            };
            let index = cursor;
            cursor += 1;
            let mut src = original.clone();

            let Some(mut events) = self.guarded(|s| self.begin(s, index, &src)) else {
                return;
            };
            info!(session, index, src = %src, "try_source");

            let deadline = sleep(self.settings.timeout);
            tokio::pin!(deadline);
            let mut armed = true;
            let mut events_open = true;

            loop {
                tokio::select! {
                    event = events.recv(), if events_open => {
                        let Some(event) = event else {
                            debug!(session, index, "media event stream closed");
                            events_open = false;
                            continue;
                        };
                        if event.src != src {
                            debug!(session, event_src = %event.src, active = %src, "ignoring event for inactive source");
                            continue;
                        }
                        match event.kind {
                            MediaEventKind::Ready => {
                                if self.guarded(|s| s.status = PreviewStatus::Ready).is_some() {
                                    info!(session, index, src = %src, "ready");
                                }
                                return;
                            }
                            MediaEventKind::Error => {
                                warn!(session, index, src = %src, "error");
                                break;
                            }
                        }
                    }
                    () = &mut deadline, if armed => {
                        info!(session, index, src = %src, "timeout");

                        if index == 0
                            && !cache_bust_retried
                            && let Some(busted) = cache_bust(&src, Utc::now().timestamp_millis())
                        {
                            cache_bust_retried = true;
                            info!(session, from = %src, to = %busted, "retry_cache_bust");
                            src = busted;
                            let Some(retry) = self.guarded(|s| {
                                self.backend.detach();
                                self.begin(s, index, &src)
                            }) else {
                                return;
                            };
                            events = retry;
                            events_open = true;
                            deadline.as_mut().reset(Instant::now() + self.settings.timeout);
                            continue;
                        }

                        if cursor >= self.sources.len() {
                            info!(session, index, "last source stalled");
                            self.report_unavailable();
                            return;
                        }

                        // A slow source is not a missing one; only an explicit
                        // error moves on from here.
                        armed = false;
                        debug!(session, index, "timeout inconclusive; waiting for an explicit error");
                    }
                    else => {
                        debug!(session, index, "no further media events; source left loading");
                        return;
                    }
                }
            }
        }
    }
}
