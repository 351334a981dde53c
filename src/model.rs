use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{AssetKind, EntityKind, GlobalId, Sku};

/// A volume of a publication: owns zero or more issues plus volume-level
/// media. Dates are kept in the server-supplied RFC-3339 form and parsed
/// only when compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub global_id: GlobalId,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub publisher: String,
    pub release_date: String,
    pub published_date: String,
    pub published: bool,
    pub cover_asset_id: Option<GlobalId>,
    pub keywords: Vec<String>,
    pub custom_meta: Value,
    /// Folder (relative to the storage root) where this volume's asset
    /// binaries live.
    pub asset_folder: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub global_id: GlobalId,
    /// Empty when the issue is independent of any volume.
    pub volume_id: Option<GlobalId>,
    pub title: String,
    pub description: String,
    pub display_date: String,
    pub published_date: String,
    pub last_updated: String,
    pub sku: Option<Sku>,
    pub cover_asset_id: Option<GlobalId>,
    pub custom_meta: Value,
    pub asset_folder: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub global_id: GlobalId,
    /// Empty when the article is independent of any issue.
    pub issue_id: Option<GlobalId>,
    pub title: String,
    pub body: String,
    pub description: String,
    pub author_name: String,
    pub author_url: String,
    pub section: String,
    pub article_type: String,
    pub keywords: Vec<String>,
    pub commentary: String,
    pub custom_meta: Value,
    /// 1-based position within the owning issue.
    pub placement: u32,
    pub featured: bool,
    pub thumbnail_url: Option<String>,
    pub last_updated: String,
    /// Version stamp of the client that last wrote this record.
    pub written_by: String,
}

/// Owner of an asset. Exactly one direct owner; transitive reachability
/// (volume -> issue -> article -> asset) goes through the relation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetOwner {
    Issue { issue_id: GlobalId },
    Article {
        article_id: GlobalId,
        issue_id: Option<GlobalId>,
    },
    Volume { volume_id: GlobalId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub global_id: GlobalId,
    pub kind: AssetKind,
    pub caption: String,
    pub source: String,
    pub owner: AssetOwner,
    /// File name of the cached original, `original-<basename>`, relative to
    /// the owner's asset folder. The absolute path is derived at read time.
    pub original_file: String,
    /// File name of the cached thumbnail, `thumb-<basename>`.
    pub thumb_file: String,
    pub placement: u32,
    pub custom_meta: Value,
    pub last_updated: String,
}

impl Asset {
    /// Absolute location of the cached original inside `asset_folder`.
    pub fn original_path(&self, asset_folder: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(asset_folder).join(&self.original_file)
    }

    pub fn thumb_path(&self, asset_folder: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(asset_folder).join(&self.thumb_file)
    }
}

/// One directed membership link, tagged by kind so the three relationship
/// shapes can never be confused with one another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationKind {
    ArticleInIssue {
        issue_id: GlobalId,
        article_id: GlobalId,
    },
    AssetInIssue {
        issue_id: GlobalId,
        asset_id: GlobalId,
    },
    AssetInArticle {
        article_id: GlobalId,
        asset_id: GlobalId,
        /// Present when the owning article itself sits inside an issue.
        issue_id: Option<GlobalId>,
    },
    AssetInVolume {
        volume_id: GlobalId,
        asset_id: GlobalId,
    },
}

impl RelationKind {
    pub fn asset_id(&self) -> Option<&GlobalId> {
        match self {
            RelationKind::ArticleInIssue { .. } => None,
            RelationKind::AssetInIssue { asset_id, .. }
            | RelationKind::AssetInArticle { asset_id, .. }
            | RelationKind::AssetInVolume { asset_id, .. } => Some(asset_id),
        }
    }

    pub fn article_id(&self) -> Option<&GlobalId> {
        match self {
            RelationKind::ArticleInIssue { article_id, .. }
            | RelationKind::AssetInArticle { article_id, .. } => Some(article_id),
            _ => None,
        }
    }

    pub fn issue_id(&self) -> Option<&GlobalId> {
        match self {
            RelationKind::ArticleInIssue { issue_id, .. }
            | RelationKind::AssetInIssue { issue_id, .. } => Some(issue_id),
            RelationKind::AssetInArticle { issue_id, .. } => issue_id.as_ref(),
            RelationKind::AssetInVolume { .. } => None,
        }
    }

    pub fn volume_id(&self) -> Option<&GlobalId> {
        match self {
            RelationKind::AssetInVolume { volume_id, .. } => Some(volume_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub kind: RelationKind,
    /// 1-based position within the parent's ordered child list.
    pub placement: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseMode {
    InApp,
    Web,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub sku: Sku,
    pub global_id: GlobalId,
    pub mode: PurchaseMode,
    pub entity: EntityKind,
    pub purchase_date: String,
    pub expiration_date: Option<String>,
    /// Empty for on-device purchases, set for purchases synced from the web.
    pub user_identity: Option<String>,
}
