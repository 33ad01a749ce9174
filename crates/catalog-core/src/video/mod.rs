//! Preview video resolution and the fallback loader.

pub mod loader;
pub mod media;
pub mod probe;
pub mod sources;

pub use loader::{LoaderSettings, PreviewState, PreviewStatus, VideoPreview};
pub use media::{MediaBackend, MediaEvent, MediaEventKind, PlayFuture};
pub use probe::HttpProbe;
pub use sources::{UnavailableReason, VideoHosting, cache_bust};
