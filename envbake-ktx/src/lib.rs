//! envbake-ktx: KTX1 container assembly for baked environment maps.
//!
//! A [`KtxContainer`](container::KtxContainer) collects face/mip image blobs
//! plus key-value metadata and serializes them into the KTX 1.1 byte layout.
//! [`compression`] parses the compression mini-language accepted on the
//! command line and dispatches to the one encoder we ship (BC3/DXT5).
//!
//! Only writing is a first-class path; [`container::KtxContainer::from_bytes`]
//! exists so tests and downstream tools can inspect what was written.

pub mod compression;
pub mod container;

pub use compression::{CompressionConfig, CompressionFormat};
pub use container::{KtxContainer, KtxInfo};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unrecognized compression spec '{0}'")]
    BadCompressionSpec(String),
    #[error("compression format {0:?} has no encoder in this build")]
    UnsupportedCompression(CompressionFormat),
    #[error("malformed KTX data: {0}")]
    MalformedContainer(&'static str),
}
