use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::model::{Article, Asset, Issue, Purchase, Relation, Volume};

pub const SCHEMA_VERSION: u32 = 1;
const DB_FILE: &str = "kiosk.db.json";

/// Everything the store persists. Entity tables are keyed by global id;
/// relations and purchases are flat lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tables {
    pub schema_version: u32,
    #[serde(default)]
    pub volumes: HashMap<String, Volume>,
    #[serde(default)]
    pub issues: HashMap<String, Issue>,
    #[serde(default)]
    pub articles: HashMap<String, Article>,
    #[serde(default)]
    pub assets: HashMap<String, Asset>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub purchases: Vec<Purchase>,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            volumes: HashMap::new(),
            issues: HashMap::new(),
            articles: HashMap::new(),
            assets: HashMap::new(),
            relations: Vec::new(),
            purchases: Vec::new(),
        }
    }
}

/// Handle to the embedded store for one storage folder. Constructed once and
/// passed by reference to every collaborator; there is no process-global
/// "current folder" state. Cloning shares the same underlying store.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    folder: Utf8PathBuf,
    db_path: Utf8PathBuf,
    tables: RwLock<Tables>,
    /// The store allows one write transaction at a time; writers queue here
    /// instead of interleaving commits.
    write_gate: Mutex<()>,
}

impl Database {
    pub fn open(folder: impl Into<Utf8PathBuf>) -> Result<Self, SyncError> {
        let folder = folder.into();
        fs::create_dir_all(folder.as_std_path())
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;

        let db_path = folder.join(DB_FILE);
        let mut tables = if db_path.as_std_path().exists() {
            let content = fs::read_to_string(db_path.as_std_path())
                .map_err(|err| SyncError::Persistence(err.to_string()))?;
            serde_json::from_str::<Tables>(&content)
                .map_err(|err| SyncError::Persistence(err.to_string()))?
        } else {
            Tables::default()
        };

        if tables.schema_version < SCHEMA_VERSION {
            migrate(&mut tables);
        }

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                folder,
                db_path,
                tables: RwLock::new(tables),
                write_gate: Mutex::new(()),
            }),
        })
    }

    pub fn folder(&self) -> &Utf8Path {
        &self.inner.folder
    }

    /// Asset folder for a parent entity, `<storage folder>/<global id>`.
    pub fn asset_folder(&self, global_id: &str) -> Utf8PathBuf {
        self.inner.folder.join(global_id)
    }

    pub fn schema_version(&self) -> u32 {
        self.inner.tables.read().schema_version
    }

    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        f(&self.inner.tables.read())
    }

    /// Runs `f` against a scratch copy of the tables. The mutation is
    /// committed (persisted, then swapped in) only if `f` returns Ok and the
    /// persist succeeds; any failure leaves the prior state intact.
    pub fn write<R>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<R, SyncError>,
    ) -> Result<R, SyncError> {
        let _gate = self.inner.write_gate.lock();

        let mut scratch = self.inner.tables.read().clone();
        let result = f(&mut scratch)?;
        self.persist(&scratch)?;
        *self.inner.tables.write() = scratch;
        Ok(result)
    }

    fn persist(&self, tables: &Tables) -> Result<(), SyncError> {
        let content = serde_json::to_vec_pretty(tables)
            .map_err(|err| SyncError::Persistence(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("kiosk-db")
            .tempfile_in(self.inner.folder.as_std_path())
            .map_err(|err| SyncError::Persistence(err.to_string()))?;
        fs::write(temp.path(), &content).map_err(|err| SyncError::Persistence(err.to_string()))?;
        temp.persist(self.inner.db_path.as_std_path())
            .map_err(|err| SyncError::Persistence(err.to_string()))?;
        Ok(())
    }
}

/// Pass-through migration hook. Nothing to rewrite between versions yet;
/// the stamp keeps old files loadable once there is.
fn migrate(tables: &mut Tables) {
    tables.schema_version = SCHEMA_VERSION;
}
