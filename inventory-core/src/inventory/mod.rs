//! Inventory items and the registry that owns them.

pub mod item;
pub mod registry;

pub use item::{Item, ItemView, PHOTO_CONTENT_TYPE, PhotoFile, Upload, photo_url};
pub use registry::{
    BlobCleanup, DeletedItem, ItemRegistry, PhotoReplacement, RegisterItemRequest,
    UpdateItemRequest,
};
