//! Archive backend implementations.

mod paperless;

pub use paperless::{PaperlessArchiveBackend, PaperlessClient};
