//! Inventory Core - item registry with on-disk photo attachments
//!
//! - In-memory item registry with monotonically increasing ids
//! - Flat-directory blob store for uploaded photos
//! - Photo lifecycle kept consistent with the blob store (no orphans after delete/replace)

pub mod error;
pub mod inventory;
pub mod storage;

pub use error::{InventoryError, Result};
pub use inventory::{
    BlobCleanup, DeletedItem, Item, ItemRegistry, ItemView, PHOTO_CONTENT_TYPE, PhotoFile,
    PhotoReplacement, RegisterItemRequest, UpdateItemRequest, Upload, photo_url,
};
pub use storage::{BlobStore, FsBlobStore, StorageRef, sanitize_file_name};
