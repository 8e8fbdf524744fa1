//! RAG backend implementations.

mod vector;

pub use vector::VectorRagBackend;
