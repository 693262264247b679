//! Metadata storage layer.
//!
//! The metadata store keeps track of uploaded files and health probes.
//! The [`store::MetadataStore`] trait defines the interface;
//! [`sqlite::SqliteMetadataStore`] is the default implementation and
//! [`memory::MemoryMetadataStore`] a volatile alternative.

pub mod memory;
pub mod sqlite;
pub mod store;
