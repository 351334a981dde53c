use std::fs;

use camino::Utf8Path;
use tracing::warn;

use crate::error::SyncError;

/// Last path segment of a URL with any query string stripped; falls back to
/// the whole input when there is no '/'.
pub fn url_basename(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query.rsplit('/').next().unwrap_or(without_query)
}

pub fn original_file_name(url: &str) -> String {
    format!("original-{}", url_basename(url))
}

pub fn thumb_file_name(url: &str) -> String {
    format!("thumb-{}", url_basename(url))
}

/// Created lazily on the first child persisted for a parent.
pub fn ensure_dir(path: &Utf8Path) -> Result<(), SyncError> {
    fs::create_dir_all(path.as_std_path()).map_err(|err| SyncError::Filesystem(err.to_string()))
}

pub fn file_has_content(path: &Utf8Path) -> bool {
    fs::metadata(path.as_std_path())
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Best-effort removal of an asset's cached files. Failures are logged and
/// swallowed; a stale file on disk never blocks a record delete.
pub fn remove_asset_files(folder: &Utf8Path, original_file: &str, thumb_file: &str) {
    for name in [original_file, thumb_file] {
        if name.is_empty() {
            continue;
        }
        let path = folder.join(name);
        if !path.as_std_path().exists() {
            continue;
        }
        if let Err(err) = fs::remove_file(path.as_std_path()) {
            warn!(file = %path, error = %err, "failed to remove cached asset file");
        }
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn basename_strips_path_and_query() {
        assert_eq!(url_basename("https://cdn.example.com/a/b/cover.png"), "cover.png");
        assert_eq!(url_basename("https://cdn.example.com/cover.png?size=large"), "cover.png");
        assert_eq!(url_basename("cover.png"), "cover.png");
    }

    #[test]
    fn derived_file_names() {
        assert_eq!(
            original_file_name("https://cdn.example.com/img/cover.png"),
            "original-cover.png"
        );
        assert_eq!(
            thumb_file_name("https://cdn.example.com/img/cover_thumb.png"),
            "thumb-cover_thumb.png"
        );
    }

    #[test]
    fn remove_is_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let folder = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::write(folder.join("original-a.png").as_std_path(), b"x").unwrap();

        // thumb missing on disk; removal must not fail
        remove_asset_files(&folder, "original-a.png", "thumb-a.png");
        assert!(!folder.join("original-a.png").as_std_path().exists());
    }
}
