use camino::Utf8PathBuf;
use chrono::DateTime;
use tracing::debug;

use crate::domain::GlobalId;
use crate::error::SyncError;
use crate::fs_util;
use crate::model::{Article, Asset, AssetOwner, Issue, Purchase, Volume};
use crate::relations;
use crate::store::{Database, Tables};

/// True when `server` is strictly newer than `local`. Unparsable dates on
/// either side count as newer, so malformed timestamps always re-download.
pub fn is_strictly_newer(server: &str, local: &str) -> bool {
    match (
        DateTime::parse_from_rfc3339(server),
        DateTime::parse_from_rfc3339(local),
    ) {
        (Ok(server), Ok(local)) => server > local,
        _ => true,
    }
}

/// CRUD and query layer over the entity tables. Every multi-row mutation
/// runs in one store transaction; cascading deletes take dependents and
/// relations down with the parent.
#[derive(Clone)]
pub struct Repository {
    db: Database,
}

impl Repository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // Volumes

    pub fn upsert_volume(&self, volume: Volume) -> Result<(), SyncError> {
        self.db.write(|tables| {
            tables
                .volumes
                .insert(volume.global_id.as_str().to_string(), volume);
            Ok(())
        })
    }

    pub fn get_volume(&self, id: &GlobalId) -> Option<Volume> {
        self.db.read(|tables| tables.volumes.get(id.as_str()).cloned())
    }

    /// Removes the volume, its issues, their articles and assets, every
    /// relation touching any of them, and (best effort) the cached asset
    /// files.
    pub fn delete_volume(&self, id: &GlobalId) -> Result<(), SyncError> {
        let db = self.db.clone();
        let doomed_files = self.db.write(|tables| {
            let issue_ids: Vec<GlobalId> = tables
                .issues
                .values()
                .filter(|issue| issue.volume_id.as_ref() == Some(id))
                .map(|issue| issue.global_id.clone())
                .collect();

            let mut files = Vec::new();
            for issue_id in &issue_ids {
                files.extend(delete_issue_in(tables, &db, issue_id));
            }

            // volume-level assets
            let volume_assets: Vec<GlobalId> = tables
                .assets
                .values()
                .filter(|asset| {
                    matches!(&asset.owner, AssetOwner::Volume { volume_id } if volume_id == id)
                })
                .map(|asset| asset.global_id.clone())
                .collect();
            for asset_id in &volume_assets {
                files.extend(delete_asset_in(tables, &db, asset_id));
            }
            relations::remove_in(tables, None, None, Some(&volume_assets));

            tables.volumes.remove(id.as_str());
            debug!(volume = %id, issues = issue_ids.len(), "deleted volume cascade");
            Ok(files)
        })?;

        remove_files(doomed_files);
        Ok(())
    }

    // Issues

    pub fn upsert_issue(&self, issue: Issue) -> Result<(), SyncError> {
        self.db.write(|tables| {
            tables
                .issues
                .insert(issue.global_id.as_str().to_string(), issue);
            Ok(())
        })
    }

    /// Reconciles an issue's article set against a fresh server payload:
    /// articles no longer listed are deleted together with their assets and
    /// relations. Articles still listed are left alone so an unchanged one
    /// can be skipped instead of rewritten.
    pub fn prune_issue_articles(
        &self,
        issue_id: &GlobalId,
        keep: &[GlobalId],
    ) -> Result<(), SyncError> {
        let db = self.db.clone();
        let doomed_files = self.db.write(|tables| {
            let stale: Vec<GlobalId> = tables
                .articles
                .values()
                .filter(|article| {
                    article.issue_id.as_ref() == Some(issue_id)
                        && !keep.contains(&article.global_id)
                })
                .map(|article| article.global_id.clone())
                .collect();
            let mut files = Vec::new();
            for article_id in &stale {
                files.extend(delete_article_in(tables, &db, article_id));
            }
            Ok(files)
        })?;
        remove_files(doomed_files);
        Ok(())
    }

    pub fn get_issue(&self, id: &GlobalId) -> Option<Issue> {
        self.db.read(|tables| tables.issues.get(id.as_str()).cloned())
    }

    pub fn issue_by_sku(&self, sku: &str) -> Option<Issue> {
        self.db.read(|tables| {
            tables
                .issues
                .values()
                .find(|issue| issue.sku.as_ref().is_some_and(|s| s.as_str() == sku))
                .cloned()
        })
    }

    pub fn issues_for_volume(&self, volume_id: &GlobalId) -> Vec<Issue> {
        self.db.read(|tables| {
            let mut issues: Vec<Issue> = tables
                .issues
                .values()
                .filter(|issue| issue.volume_id.as_ref() == Some(volume_id))
                .cloned()
                .collect();
            issues.sort_by(|a, b| b.published_date.cmp(&a.published_date));
            issues
        })
    }

    /// Every stored issue, newest first.
    pub fn all_issues(&self) -> Vec<Issue> {
        self.db.read(|tables| {
            let mut issues: Vec<Issue> = tables.issues.values().cloned().collect();
            issues.sort_by(|a, b| b.published_date.cmp(&a.published_date));
            issues
        })
    }

    pub fn newest_issue(&self) -> Option<Issue> {
        self.db.read(|tables| {
            tables
                .issues
                .values()
                .max_by(|a, b| a.published_date.cmp(&b.published_date))
                .cloned()
        })
    }

    pub fn delete_issue(&self, id: &GlobalId) -> Result<(), SyncError> {
        let db = self.db.clone();
        let doomed_files = self.db.write(|tables| {
            let files = delete_issue_in(tables, &db, id);
            Ok(files)
        })?;
        remove_files(doomed_files);
        Ok(())
    }

    // Articles

    pub fn upsert_article(&self, article: Article) -> Result<(), SyncError> {
        self.db.write(|tables| {
            tables
                .articles
                .insert(article.global_id.as_str().to_string(), article);
            Ok(())
        })
    }

    pub fn get_article(&self, id: &GlobalId) -> Option<Article> {
        self.db.read(|tables| tables.articles.get(id.as_str()).cloned())
    }

    /// Articles of an issue (or independent articles when `issue_id` is
    /// None), placement ascending, with optional type filters and
    /// zero-based pagination.
    pub fn articles_for_issue(
        &self,
        issue_id: Option<&GlobalId>,
        article_type: Option<&str>,
        exclude_type: Option<&str>,
        page: usize,
        limit: usize,
    ) -> Vec<Article> {
        self.db.read(|tables| {
            let mut articles: Vec<Article> = tables
                .articles
                .values()
                .filter(|article| article.issue_id.as_ref() == issue_id)
                .filter(|article| {
                    article_type.is_none_or(|wanted| article.article_type == wanted)
                })
                .filter(|article| {
                    exclude_type.is_none_or(|unwanted| article.article_type != unwanted)
                })
                .cloned()
                .collect();
            articles.sort_by_key(|article| article.placement);
            paginate(articles, page, limit)
        })
    }

    pub fn featured_articles(&self, issue_id: &GlobalId) -> Vec<Article> {
        self.db.read(|tables| {
            let mut articles: Vec<Article> = tables
                .articles
                .values()
                .filter(|article| article.issue_id.as_ref() == Some(issue_id) && article.featured)
                .cloned()
                .collect();
            articles.sort_by_key(|article| article.placement);
            articles
        })
    }

    /// Case-insensitive keyword match over title, body and stored keywords.
    pub fn search_articles(&self, keywords: &[String], issue_id: Option<&GlobalId>) -> Vec<Article> {
        let needles: Vec<String> = keywords.iter().map(|kw| kw.to_lowercase()).collect();
        self.db.read(|tables| {
            let mut articles: Vec<Article> = tables
                .articles
                .values()
                .filter(|article| issue_id.is_none() || article.issue_id.as_ref() == issue_id)
                .filter(|article| {
                    let haystack = format!(
                        "{} {} {}",
                        article.title.to_lowercase(),
                        article.body.to_lowercase(),
                        article.keywords.join(" ").to_lowercase()
                    );
                    needles.iter().any(|needle| haystack.contains(needle))
                })
                .cloned()
                .collect();
            articles.sort_by_key(|article| article.placement);
            articles
        })
    }

    pub fn articles_newer_than(&self, date: &str) -> Vec<Article> {
        self.filter_articles_by_date(date, true)
    }

    pub fn articles_older_than(&self, date: &str) -> Vec<Article> {
        self.filter_articles_by_date(date, false)
    }

    fn filter_articles_by_date(&self, date: &str, newer: bool) -> Vec<Article> {
        self.db.read(|tables| {
            tables
                .articles
                .values()
                .filter(|article| {
                    let strictly_newer = is_strictly_newer(&article.last_updated, date);
                    if newer { strictly_newer } else { !strictly_newer }
                })
                .cloned()
                .collect()
        })
    }

    pub fn delete_article(&self, id: &GlobalId) -> Result<(), SyncError> {
        let db = self.db.clone();
        let doomed_files = self.db.write(|tables| {
            let files = delete_article_in(tables, &db, id);
            Ok(files)
        })?;
        remove_files(doomed_files);
        Ok(())
    }

    // Assets

    pub fn upsert_asset(&self, asset: Asset) -> Result<(), SyncError> {
        self.db.write(|tables| {
            tables
                .assets
                .insert(asset.global_id.as_str().to_string(), asset);
            Ok(())
        })
    }

    pub fn get_asset(&self, id: &GlobalId) -> Option<Asset> {
        self.db.read(|tables| tables.assets.get(id.as_str()).cloned())
    }

    /// Folder holding an asset's cached files, derived from its owner.
    pub fn asset_folder_of(&self, asset: &Asset) -> Utf8PathBuf {
        self.db.read(|tables| folder_for_owner(tables, &self.db, &asset.owner))
    }

    pub fn delete_asset(&self, id: &GlobalId) -> Result<(), SyncError> {
        let db = self.db.clone();
        let doomed_files = self.db.write(|tables| {
            let files = delete_asset_in(tables, &db, id);
            relations::remove_in(tables, None, None, Some(std::slice::from_ref(id)));
            Ok(files)
        })?;
        remove_files(doomed_files);
        Ok(())
    }

    // Purchases

    pub fn record_purchase(&self, purchase: Purchase) -> Result<(), SyncError> {
        self.db.write(|tables| {
            tables.purchases.retain(|existing| {
                !(existing.global_id == purchase.global_id
                    && existing.user_identity == purchase.user_identity)
            });
            tables.purchases.push(purchase);
            Ok(())
        })
    }

    /// Whether any recorded purchase grants access to the entity right now.
    pub fn is_purchased(&self, global_id: &GlobalId, now: &str) -> bool {
        self.db.read(|tables| {
            tables.purchases.iter().any(|purchase| {
                purchase.global_id == *global_id
                    && purchase
                        .expiration_date
                        .as_ref()
                        .is_none_or(|expiry| is_strictly_newer(expiry, now))
            })
        })
    }

    pub fn purchases_for(&self, user_identity: Option<&str>) -> Vec<Purchase> {
        self.db.read(|tables| {
            tables
                .purchases
                .iter()
                .filter(|purchase| purchase.user_identity.as_deref() == user_identity)
                .cloned()
                .collect()
        })
    }
}

fn paginate(items: Vec<Article>, page: usize, limit: usize) -> Vec<Article> {
    if limit == 0 {
        return items;
    }
    items.into_iter().skip(page * limit).take(limit).collect()
}

/// (folder, original file, thumb file) triples queued for best-effort
/// removal once the transaction has committed.
type DoomedFiles = Vec<(Utf8PathBuf, String, String)>;

fn folder_for_owner(tables: &Tables, db: &Database, owner: &AssetOwner) -> Utf8PathBuf {
    match owner {
        AssetOwner::Issue { issue_id } => tables
            .issues
            .get(issue_id.as_str())
            .map(|issue| Utf8PathBuf::from(&issue.asset_folder))
            .unwrap_or_else(|| db.asset_folder(issue_id.as_str())),
        AssetOwner::Volume { volume_id } => tables
            .volumes
            .get(volume_id.as_str())
            .map(|volume| Utf8PathBuf::from(&volume.asset_folder))
            .unwrap_or_else(|| db.asset_folder(volume_id.as_str())),
        AssetOwner::Article {
            article_id,
            issue_id,
        } => match issue_id {
            Some(issue_id) => tables
                .issues
                .get(issue_id.as_str())
                .map(|issue| Utf8PathBuf::from(&issue.asset_folder))
                .unwrap_or_else(|| db.asset_folder(issue_id.as_str())),
            None => db.asset_folder(article_id.as_str()),
        },
    }
}

fn delete_asset_in(tables: &mut Tables, db: &Database, id: &GlobalId) -> DoomedFiles {
    let Some(asset) = tables.assets.remove(id.as_str()) else {
        return Vec::new();
    };
    let folder = folder_for_owner(tables, db, &asset.owner);
    vec![(folder, asset.original_file, asset.thumb_file)]
}

fn delete_article_in(tables: &mut Tables, db: &Database, id: &GlobalId) -> DoomedFiles {
    let mut files = Vec::new();
    let asset_ids: Vec<GlobalId> = tables
        .assets
        .values()
        .filter(|asset| {
            matches!(&asset.owner, AssetOwner::Article { article_id, .. } if article_id == id)
        })
        .map(|asset| asset.global_id.clone())
        .collect();
    for asset_id in &asset_ids {
        files.extend(delete_asset_in(tables, db, asset_id));
    }
    tables.articles.remove(id.as_str());
    relations::remove_in(
        tables,
        None,
        Some(std::slice::from_ref(id)),
        Some(&asset_ids),
    );
    files
}

fn delete_articles_for_issue_in(tables: &mut Tables, db: &Database, issue_id: &GlobalId) -> DoomedFiles {
    let article_ids: Vec<GlobalId> = tables
        .articles
        .values()
        .filter(|article| article.issue_id.as_ref() == Some(issue_id))
        .map(|article| article.global_id.clone())
        .collect();
    let mut files = Vec::new();
    for article_id in &article_ids {
        files.extend(delete_article_in(tables, db, article_id));
    }
    files
}

fn delete_issue_in(tables: &mut Tables, db: &Database, id: &GlobalId) -> DoomedFiles {
    let mut files = delete_articles_for_issue_in(tables, db, id);

    let asset_ids: Vec<GlobalId> = tables
        .assets
        .values()
        .filter(|asset| matches!(&asset.owner, AssetOwner::Issue { issue_id } if issue_id == id))
        .map(|asset| asset.global_id.clone())
        .collect();
    for asset_id in &asset_ids {
        files.extend(delete_asset_in(tables, db, asset_id));
    }

    relations::remove_in(tables, Some(std::slice::from_ref(id)), None, Some(&asset_ids));
    tables.issues.remove(id.as_str());
    files
}

fn remove_files(doomed: DoomedFiles) {
    for (folder, original, thumb) in doomed {
        fs_util::remove_asset_files(&folder, &original, &thumb);
    }
}
