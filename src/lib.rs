//! # Photosearch
//!
//! Per-project semantic similarity search for photo asset libraries.
//!
//! Each project (tenant) owns an exact inner-product vector index built from
//! CLIP-style image/text embeddings. The index is kept in memory, mirrored to
//! an on-disk snapshot after every mutation, and is always rebuildable from
//! the durable embedding record store.
//!
//! ## Features
//!
//! - Unit-normalized image and text embeddings in a shared vector space
//! - Exact top-k inner-product search with folder and similarity filters
//! - Per-tenant index registry with lazy snapshot loading
//! - Durable record mirroring with full per-project rebuild
//! - Combined text+image queries via weighted vector blending

pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod query;
pub mod records;
pub mod vector;

pub mod prelude {}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
