//! Object storage backends.
//!
//! The [`backend::StorageBackend`] trait abstracts over where blobs
//! physically live.  Implementations include AWS S3, local disk, and an
//! in-memory map.

pub mod aws;
pub mod backend;
pub mod local;
pub mod memory;
