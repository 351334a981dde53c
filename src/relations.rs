use crate::domain::GlobalId;
use crate::error::SyncError;
use crate::model::{Relation, RelationKind};
use crate::store::{Database, Tables};

/// Association store over the tagged relation table. Each query method is
/// kind-exact: asking for an issue's direct assets can never return rows
/// that really belong to one of its articles, because the kinds are
/// distinct variants rather than sentinel-valued columns.
#[derive(Clone)]
pub struct RelationStore {
    db: Database,
}

impl RelationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts unless an identical link already exists. A link that exists
    /// with a different placement is deleted and reinserted; placement is
    /// never updated in place.
    pub fn upsert(&self, kind: RelationKind, placement: u32) -> Result<(), SyncError> {
        self.db.write(|tables| {
            upsert_in(tables, kind, placement);
            Ok(())
        })
    }

    /// Bulk delete by OR-combined membership: a row goes away if it touches
    /// any of the supplied issue, article or asset ids. An absent list puts
    /// no constraint on that column.
    pub fn remove(
        &self,
        issue_ids: Option<&[GlobalId]>,
        article_ids: Option<&[GlobalId]>,
        asset_ids: Option<&[GlobalId]>,
    ) -> Result<(), SyncError> {
        self.db.write(|tables| {
            remove_in(tables, issue_ids, article_ids, asset_ids);
            Ok(())
        })
    }

    /// Article ids directly inside an issue, placement ascending.
    pub fn articles_in_issue(&self, issue_id: &GlobalId) -> Vec<GlobalId> {
        self.collect(|kind| match kind {
            RelationKind::ArticleInIssue { issue_id: id, article_id } if id == issue_id => {
                Some(article_id.clone())
            }
            _ => None,
        })
    }

    /// Issue-level assets only; article assets are a different kind.
    pub fn assets_in_issue(&self, issue_id: &GlobalId) -> Vec<GlobalId> {
        self.collect(|kind| match kind {
            RelationKind::AssetInIssue { issue_id: id, asset_id } if id == issue_id => {
                Some(asset_id.clone())
            }
            _ => None,
        })
    }

    pub fn assets_in_article(&self, article_id: &GlobalId) -> Vec<GlobalId> {
        self.collect(|kind| match kind {
            RelationKind::AssetInArticle { article_id: id, asset_id, .. } if id == article_id => {
                Some(asset_id.clone())
            }
            _ => None,
        })
    }

    pub fn assets_in_volume(&self, volume_id: &GlobalId) -> Vec<GlobalId> {
        self.collect(|kind| match kind {
            RelationKind::AssetInVolume { volume_id: id, asset_id } if id == volume_id => {
                Some(asset_id.clone())
            }
            _ => None,
        })
    }

    pub fn issues_for_article(&self, article_id: &GlobalId) -> Vec<GlobalId> {
        self.collect(|kind| match kind {
            RelationKind::ArticleInIssue { issue_id, article_id: id } if id == article_id => {
                Some(issue_id.clone())
            }
            _ => None,
        })
    }

    fn collect(&self, select: impl Fn(&RelationKind) -> Option<GlobalId>) -> Vec<GlobalId> {
        self.db.read(|tables| {
            let mut matches: Vec<(u32, GlobalId)> = tables
                .relations
                .iter()
                .filter_map(|relation| select(&relation.kind).map(|id| (relation.placement, id)))
                .collect();
            matches.sort_by_key(|(placement, _)| *placement);
            matches.into_iter().map(|(_, id)| id).collect()
        })
    }
}

pub(crate) fn upsert_in(tables: &mut Tables, kind: RelationKind, placement: u32) {
    if let Some(pos) = tables.relations.iter().position(|rel| rel.kind == kind) {
        if tables.relations[pos].placement == placement {
            return;
        }
        tables.relations.remove(pos);
    }
    tables.relations.push(Relation { kind, placement });
}

pub(crate) fn remove_in(
    tables: &mut Tables,
    issue_ids: Option<&[GlobalId]>,
    article_ids: Option<&[GlobalId]>,
    asset_ids: Option<&[GlobalId]>,
) {
    tables.relations.retain(|relation| {
        let kind = &relation.kind;
        let hits_issue = issue_ids
            .is_some_and(|ids| kind.issue_id().is_some_and(|id| ids.contains(id)));
        let hits_article = article_ids
            .is_some_and(|ids| kind.article_id().is_some_and(|id| ids.contains(id)));
        let hits_asset = asset_ids
            .is_some_and(|ids| kind.asset_id().is_some_and(|id| ids.contains(id)));
        !(hits_issue || hits_article || hits_asset)
    });
}
