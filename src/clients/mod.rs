//! HTTP clients for auxiliary document services.

pub mod renderer;
pub mod tika;

pub use renderer::RendererClient;
pub use tika::TikaClient;
