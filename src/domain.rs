use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Server-assigned identifier, unique across volumes, issues, articles and
/// assets. The only stable key an entity carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalId(String);

impl GlobalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GlobalId {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty() && trimmed.chars().all(|ch| !ch.is_whitespace());
        if !is_valid {
            return Err(SyncError::InvalidGlobalId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Alternate external identifier (Apple id / store SKU) some entities carry,
/// resolvable to a [`GlobalId`] via a lookup endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Sku {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(SyncError::InvalidSku(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Sound,
    Video,
    /// Any server-side type this client does not model explicitly.
    Custom(String),
}

impl AssetKind {
    /// Maps the server's media type names; "audio" is the wire name for sound.
    pub fn from_wire(value: &str) -> AssetKind {
        match value {
            "image" => AssetKind::Image,
            "audio" | "sound" => AssetKind::Sound,
            "video" => AssetKind::Video,
            other => AssetKind::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Image => write!(f, "image"),
            AssetKind::Sound => write!(f, "sound"),
            AssetKind::Video => write!(f, "video"),
            AssetKind::Custom(other) => write!(f, "{other}"),
        }
    }
}

/// Per-URL completion state inside the download tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    Complete,
    Error,
    SkippedUnchanged,
}

impl DownloadStatus {
    /// Completion means no more pending work, not necessarily success.
    pub fn is_settled(self) -> bool {
        self != DownloadStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Volume,
    Issue,
    Article,
    Asset,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Volume => write!(f, "volume"),
            EntityKind::Issue => write!(f, "issue"),
            EntityKind::Article => write!(f, "article"),
            EntityKind::Asset => write!(f, "asset"),
        }
    }
}
