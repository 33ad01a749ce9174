use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use catalog_core::video::{
    LoaderSettings, MediaBackend, MediaEvent, MediaEventKind, PlayFuture, PreviewStatus, UnavailableReason,
    VideoPreview,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

const TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Ready,
    Error,
    Silent,
}

#[derive(Default)]
struct Script {
    behaviors: Vec<(String, Behavior)>,
    loads: Vec<String>,
    channels: Vec<(String, mpsc::UnboundedSender<MediaEvent>)>,
    detaches: usize,
    reject_play: bool,
}

/// A media element whose outcome per URL is scripted up front. Query
/// strings are ignored when matching, so a cache-busted URL behaves like
/// the original.
#[derive(Clone, Default)]
struct ScriptedMedia(Arc<Mutex<Script>>);

impl ScriptedMedia {
    fn new(behaviors: &[(&str, Behavior)]) -> Self {
        let media = Self::default();
        media.0.lock().behaviors = behaviors.iter().map(|(url, b)| (url.to_string(), *b)).collect();
        media
    }

    fn loads(&self) -> Vec<String> {
        self.0.lock().loads.clone()
    }

    fn detaches(&self) -> usize {
        self.0.lock().detaches
    }

    /// Sends an event down the most recent channel opened for `channel_src`.
    fn emit(&self, channel_src: &str, event: MediaEvent) {
        let script = self.0.lock();
        let (_, tx) = script
            .channels
            .iter()
            .rev()
            .find(|(src, _)| src == channel_src)
            .expect("channel for source");
        tx.send(event).ok();
    }

    async fn wait_for_loads(&self, n: usize) {
        for _ in 0..1000 {
            if self.0.lock().loads.len() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {n} loads, saw {:?}", self.loads());
    }
}

impl MediaBackend for ScriptedMedia {
    fn load(&self, src: &str) -> mpsc::UnboundedReceiver<MediaEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut script = self.0.lock();
        script.loads.push(src.to_string());

        let base = src.split('?').next().unwrap_or(src);
        let behavior = script
            .behaviors
            .iter()
            .find(|(url, _)| url == base)
            .map(|(_, b)| *b)
            .unwrap_or(Behavior::Silent);
        match behavior {
            Behavior::Ready => tx.send(MediaEvent::ready(src)).ok(),
            Behavior::Error => tx.send(MediaEvent::error(src)).ok(),
            Behavior::Silent => None,
        };
        script.channels.push((src.to_string(), tx));
        rx
    }

    fn play(&self) -> PlayFuture {
        let reject = self.0.lock().reject_play;
        Box::pin(async move {
            if reject {
                Err(anyhow!("playback requires a user gesture"))
            } else {
                Ok(())
            }
        })
    }

    fn detach(&self) {
        self.0.lock().detaches += 1;
    }
}

fn settings(custom: bool) -> LoaderSettings {
    let unavailable = if custom {
        UnavailableReason::CustomBase {
            prefix: "robocasa365-videos".to_string(),
        }
    } else {
        UnavailableReason::PublicHost {
            host: "https://videos.example.org".to_string(),
            prefix: "robocasa365-videos".to_string(),
        }
    };
    LoaderSettings {
        timeout: TIMEOUT,
        unavailable,
    }
}

fn sources(urls: &[&str]) -> Vec<String> {
    urls.iter().map(|u| u.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn error_then_ready_plays_second_source() {
    let media = ScriptedMedia::new(&[("https://h/A.mp4", Behavior::Error), ("https://h/B.mp4", Behavior::Ready)]);
    let mut preview = VideoPreview::new(media.clone(), settings(false));

    preview.open(&sources(&["https://h/A.mp4", "https://h/B.mp4"]), "Task", "pick [*mug*]");
    let state = preview.settled().await;

    assert_eq!(state.status, PreviewStatus::Ready);
    assert_eq!(state.active_index, Some(1));
    assert_eq!(state.active_src.as_deref(), Some("https://h/B.mp4"));
    assert_eq!(state.description, "pick [<em>mug</em>]");
    assert_eq!(state.advisory(), None);
    assert_eq!(media.loads(), vec!["https://h/A.mp4", "https://h/B.mp4"]);
}

#[tokio::test(start_paused = true)]
async fn silent_single_source_is_unavailable_after_cache_bust() {
    let media = ScriptedMedia::new(&[("https://h/A.mp4", Behavior::Silent)]);
    let mut preview = VideoPreview::new(media.clone(), settings(true));

    let started = Instant::now();
    preview.open(&sources(&["https://h/A.mp4"]), "Task", "");
    let state = preview.settled().await;

    assert!(started.elapsed() >= TIMEOUT * 2);
    assert!(matches!(state.status, PreviewStatus::Unavailable(UnavailableReason::CustomBase { .. })));
    assert!(state.advisory().is_some_and(|a| a.contains("configured base URL")));
    assert_eq!(state.active_src, None);

    let loads = media.loads();
    assert_eq!(loads.len(), 2);
    assert_eq!(loads[0], "https://h/A.mp4");
    assert!(loads[1].starts_with("https://h/A.mp4?cb="));
}

#[tokio::test(start_paused = true)]
async fn stalled_first_source_waits_for_an_explicit_error() {
    let media = ScriptedMedia::new(&[("https://h/A.mp4", Behavior::Silent), ("https://h/B.mp4", Behavior::Ready)]);
    let mut preview = VideoPreview::new(media.clone(), settings(false));

    preview.open(&sources(&["https://h/A.mp4", "https://h/B.mp4"]), "Task", "");
    let outcome = tokio::time::timeout(Duration::from_secs(300), preview.settled()).await;
    assert!(outcome.is_err(), "a slow first source must not advance on timeout alone");

    let state = preview.state();
    assert_eq!(state.status, PreviewStatus::Loading);
    assert_eq!(state.active_index, Some(0));
    let busted = state.active_src.clone().expect("active source");
    assert!(busted.contains("cb="));
    assert_eq!(media.loads().len(), 2);

    // Events naming another source are ignored.
    media.emit(&busted, MediaEvent::error("https://h/A.mp4"));
    tokio::task::yield_now().await;
    assert_eq!(preview.state().status, PreviewStatus::Loading);

    media.emit(&busted, MediaEvent::error(&busted));
    let state = preview.settled().await;
    assert_eq!(state.status, PreviewStatus::Ready);
    assert_eq!(state.active_src.as_deref(), Some("https://h/B.mp4"));
}

#[tokio::test(start_paused = true)]
async fn later_source_is_never_cache_busted() {
    let media = ScriptedMedia::new(&[("https://h/A.mp4", Behavior::Error), ("https://h/B.mp4", Behavior::Silent)]);
    let mut preview = VideoPreview::new(media.clone(), settings(false));

    let started = Instant::now();
    preview.open(&sources(&["https://h/A.mp4", "https://h/B.mp4"]), "Task", "");
    let state = preview.settled().await;

    assert!(started.elapsed() >= TIMEOUT);
    assert!(started.elapsed() < TIMEOUT * 2);
    assert!(matches!(state.status, PreviewStatus::Unavailable(UnavailableReason::PublicHost { .. })));
    assert_eq!(media.loads(), vec!["https://h/A.mp4", "https://h/B.mp4"]);
}

#[tokio::test(start_paused = true)]
async fn reopening_discards_the_previous_session() {
    let media = ScriptedMedia::new(&[]);
    let mut preview = VideoPreview::new(media.clone(), settings(false));

    let first = preview.open(&sources(&["https://h/X.mp4"]), "X", "first");
    media.wait_for_loads(1).await;
    let second = preview.open(&sources(&["https://h/Y.mp4"]), "Y", "second");
    media.wait_for_loads(2).await;
    assert!(second > first);

    media.emit("https://h/X.mp4", MediaEvent::ready("https://h/X.mp4"));
    tokio::task::yield_now().await;
    let state = preview.state();
    assert_eq!(state.session, second);
    assert_eq!(state.title, "Y");
    assert_eq!(state.status, PreviewStatus::Loading);

    media.emit("https://h/Y.mp4", MediaEvent::ready("https://h/Y.mp4"));
    let state = preview.settled().await;
    assert_eq!(state.status, PreviewStatus::Ready);
    assert_eq!(state.title, "Y");
    assert_eq!(state.description, "second");
    assert_eq!(state.active_src.as_deref(), Some("https://h/Y.mp4"));
}

#[tokio::test(start_paused = true)]
async fn close_resets_display_and_ignores_stragglers() {
    let media = ScriptedMedia::new(&[]);
    let mut preview = VideoPreview::new(media.clone(), settings(false));

    preview.open(&sources(&["https://h/A.mp4"]), "Task", "desc");
    media.wait_for_loads(1).await;
    let detaches_before = media.detaches();
    preview.close();
    assert!(media.detaches() > detaches_before);

    media.emit("https://h/A.mp4", MediaEvent::ready("https://h/A.mp4"));
    tokio::time::sleep(TIMEOUT * 3).await;

    let state = preview.state();
    assert!(!state.open);
    assert_eq!(state.status, PreviewStatus::Idle);
    assert!(state.title.is_empty());
    assert!(state.description.is_empty());
    assert_eq!(state.active_src, None);
    assert_eq!(media.loads().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_playback_is_not_a_load_failure() {
    let media = ScriptedMedia::new(&[("https://h/A.mp4", Behavior::Ready)]);
    media.0.lock().reject_play = true;
    let mut preview = VideoPreview::new(media.clone(), settings(false));

    preview.open(&sources(&["https://h/A.mp4", "https://h/B.mp4"]), "Task", "");
    let state = preview.settled().await;
    assert_eq!(state.status, PreviewStatus::Ready);
    assert_eq!(state.active_index, Some(0));
}

#[tokio::test(start_paused = true)]
async fn no_sources_is_immediately_unavailable() {
    let media = ScriptedMedia::new(&[]);
    let mut preview = VideoPreview::new(media.clone(), settings(false));

    preview.open(&sources(&["", "   "]), "Task", "");
    let state = preview.settled().await;
    assert!(matches!(state.status, PreviewStatus::Unavailable(_)));
    assert!(media.loads().is_empty());
}
