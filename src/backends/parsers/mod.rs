//! Parser backend implementations.

mod docling_serve;
mod tika;

pub use docling_serve::DoclingServeParser;
pub use tika::TikaParser;
