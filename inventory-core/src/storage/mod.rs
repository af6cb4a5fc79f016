//! Storage modules for Inventory
//!
//! Provides the flat-directory blob store holding uploaded photos.

pub mod blob_store;

pub use blob_store::{BlobStore, FsBlobStore, StorageRef, sanitize_file_name};
