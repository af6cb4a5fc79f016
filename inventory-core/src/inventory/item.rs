use crate::storage::StorageRef;
use bytes::Bytes;
use serde::Serialize;
use std::path::PathBuf;

/// Content type every photo is served with; payloads are not sniffed.
pub const PHOTO_CONTENT_TYPE: &str = "image/jpeg";

/// An inventory record as held by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub description: String,
    pub photo: Option<StorageRef>,
}

impl Item {
    pub fn has_photo(&self) -> bool {
        self.photo.is_some()
    }

    pub fn view(&self) -> ItemView {
        ItemView {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            photo_url: self.photo.as_ref().map(|_| photo_url(&self.id)),
        }
    }
}

/// Wire representation of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemView {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "photoUrl")]
    pub photo_url: Option<String>,
}

/// Path of the photo retrieval endpoint for an item.
pub fn photo_url(id: &str) -> String {
    format!("/inventory/{}/photo", id)
}

/// A raw photo upload: the client's file name plus its bytes.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub payload: Bytes,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhotoFile {
    pub path: PathBuf,
    pub content_type: &'static str,
}
