use super::item::{Item, PHOTO_CONTENT_TYPE, PhotoFile, Upload, photo_url};
use crate::error::{InventoryError, Result};
use crate::storage::{BlobStore, StorageRef};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::RwLock;

const NO_DESCRIPTION: &str = "No description";

#[derive(Debug, Clone, Default)]
pub struct RegisterItemRequest {
    pub name: String,
    pub description: Option<String>,
    pub photo: Option<Upload>,
}

/// Field updates; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// What happened to a blob the registry stopped referencing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobCleanup {
    /// The item had no photo.
    NotNeeded,
    Removed(StorageRef),
    /// The blob could not be deleted and is now an orphan.
    Failed {
        storage_ref: StorageRef,
        error: String,
    },
}

impl BlobCleanup {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct DeletedItem {
    pub item: Item,
    pub photo_cleanup: BlobCleanup,
}

#[derive(Debug, Clone)]
pub struct PhotoReplacement {
    pub item: Item,
    pub previous_photo_cleanup: BlobCleanup,
}

struct RegistryState {
    items: Vec<Item>,
    next_id: u64,
}

/// ItemRegistry owns every live item and keeps their photos in step with the
/// blob store.
///
/// Mutations hold the write lock for their whole duration, blob I/O included,
/// so the item list, the id counter and the store never disagree.
pub struct ItemRegistry {
    state: RwLock<RegistryState>,
    blob_store: Arc<dyn BlobStore>,
}

impl ItemRegistry {
    pub fn new(blob_store: Arc<dyn BlobStore>) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                items: Vec::new(),
                next_id: 1,
            }),
            blob_store,
        }
    }

    pub async fn register(&self, request: RegisterItemRequest) -> Result<Item> {
        let RegisterItemRequest {
            name,
            description,
            photo,
        } = request;

        let name = name.trim();
        if name.is_empty() {
            return Err(InventoryError::Validation(
                "inventory_name is required".to_string(),
            ));
        }

        let mut state = self.state.write().await;

        let id = state.next_id.to_string();
        state.next_id += 1;

        let photo = match photo {
            Some(upload) => Some(self.blob_store.save(upload.payload, &upload.file_name).await?),
            None => None,
        };

        let item = Item {
            id,
            name: name.to_string(),
            description: description.unwrap_or_default(),
            photo,
        };
        state.items.push(item.clone());

        tracing::info!(
            "Registered item id={} name={} photo={}",
            item.id,
            item.name,
            item.has_photo()
        );
        Ok(item)
    }

    pub async fn list(&self) -> Vec<Item> {
        self.state.read().await.items.clone()
    }

    pub async fn get(&self, id: &str) -> Result<Item> {
        let state = self.state.read().await;
        state
            .items
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .ok_or_else(|| InventoryError::ItemNotFound(id.to_string()))
    }

    /// Apply the fields present in `request`. An empty name is accepted here.
    pub async fn update_fields(&self, id: &str, request: UpdateItemRequest) -> Result<Item> {
        let mut state = self.state.write().await;
        let item = find_mut(&mut state.items, id)?;

        if let Some(name) = request.name {
            item.name = name;
        }
        if let Some(description) = request.description {
            item.description = description;
        }

        tracing::info!("Updated item id={}", item.id);
        Ok(item.clone())
    }

    /// Store a new photo for `id` and release the one it replaces.
    ///
    /// The new blob is saved and recorded before the old one is deleted; a failed
    /// delete leaves the old blob orphaned and is reported, not rolled back.
    pub async fn replace_photo(&self, id: &str, upload: Option<Upload>) -> Result<PhotoReplacement> {
        let mut state = self.state.write().await;
        let item = find_mut(&mut state.items, id)?;

        let Some(upload) = upload else {
            return Err(InventoryError::Validation("Photo is required".to_string()));
        };

        let storage_ref = self
            .blob_store
            .save(upload.payload, &upload.file_name)
            .await?;
        let previous = item.photo.replace(storage_ref);
        let item = item.clone();

        let previous_photo_cleanup = self.release_blob(&item.id, previous).await;

        tracing::info!("Replaced photo for item id={}", item.id);
        Ok(PhotoReplacement {
            item,
            previous_photo_cleanup,
        })
    }

    pub async fn get_photo(&self, id: &str) -> Result<PhotoFile> {
        let state = self.state.read().await;
        let storage_ref = photo_ref(&state.items, id)?;

        let path = self.blob_store.resolve(storage_ref).await?;
        Ok(PhotoFile {
            path,
            content_type: PHOTO_CONTENT_TYPE,
        })
    }

    /// Photo bytes of `id` with the content type they are served as.
    pub async fn read_photo(&self, id: &str) -> Result<(Bytes, &'static str)> {
        let state = self.state.read().await;
        let storage_ref = photo_ref(&state.items, id)?;

        let bytes = self.blob_store.read(storage_ref).await?;
        Ok((bytes, PHOTO_CONTENT_TYPE))
    }

    /// Remove `id` and delete its photo on a best-effort basis.
    pub async fn delete(&self, id: &str) -> Result<DeletedItem> {
        let mut state = self.state.write().await;
        let index = state
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| InventoryError::ItemNotFound(id.to_string()))?;

        let item = state.items.remove(index);
        let photo_cleanup = self.release_blob(&item.id, item.photo.clone()).await;

        tracing::info!("Deleted item id={}", item.id);
        Ok(DeletedItem {
            item,
            photo_cleanup,
        })
    }

    /// Plain-text rendering used by the search endpoint.
    pub async fn render_search_text(&self, id: &str, include_photo: bool) -> Result<String> {
        let item = self.get(id).await?;

        let mut text = if item.description.is_empty() {
            NO_DESCRIPTION.to_string()
        } else {
            item.description.clone()
        };

        if include_photo && item.has_photo() {
            text.push_str(" Photo: ");
            text.push_str(&photo_url(&item.id));
        }

        Ok(text)
    }

    async fn release_blob(&self, id: &str, photo: Option<StorageRef>) -> BlobCleanup {
        let Some(storage_ref) = photo else {
            return BlobCleanup::NotNeeded;
        };

        match self.blob_store.delete(&storage_ref).await {
            Ok(()) => BlobCleanup::Removed(storage_ref),
            Err(error) => {
                tracing::warn!(
                    "Failed to delete blob {} released by item {}: {}",
                    storage_ref,
                    id,
                    error
                );
                BlobCleanup::Failed {
                    storage_ref,
                    error: error.to_string(),
                }
            }
        }
    }
}

fn photo_ref<'a>(items: &'a [Item], id: &str) -> Result<&'a StorageRef> {
    let item = items
        .iter()
        .find(|item| item.id == id)
        .ok_or_else(|| InventoryError::ItemNotFound(id.to_string()))?;

    item.photo
        .as_ref()
        .ok_or_else(|| InventoryError::PhotoNotFound(format!("item {} has no photo", id)))
}

fn find_mut<'a>(items: &'a mut [Item], id: &str) -> Result<&'a mut Item> {
    items
        .iter_mut()
        .find(|item| item.id == id)
        .ok_or_else(|| InventoryError::ItemNotFound(id.to_string()))
}
