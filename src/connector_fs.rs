use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::FilesystemConnectorConfig;
use crate::models::Document;

/// Walk `config.root` and load every included file as a [`Document`].
///
/// Documents are returned sorted by relative path. Format support is not
/// checked here; the normalizer rejects unsupported files at ingest.
pub fn scan_directory(config: &FilesystemConnectorConfig) -> Result<Vec<Document>> {
    let root = &config.root;
    if !root.exists() {
        bail!(
            "Filesystem connector root does not exist: {}",
            root.display()
        );
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut found = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        found.push((rel_str, document_from_file(path)?));
    }

    // Sort for deterministic ordering
    found.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(found
        .into_iter()
        .map(|(rel, doc)| doc.with_metadata("relative_path", rel))
        .collect())
}

/// Read one file into a [`Document`] with a `file://` source locator.
pub fn document_from_file(path: &Path) -> Result<Document> {
    let absolute = path
        .canonicalize()
        .with_context(|| format!("resolving {}", path.display()))?;
    let content =
        std::fs::read(&absolute).with_context(|| format!("reading {}", absolute.display()))?;

    let mut doc = Document::new(format!("file://{}", absolute.display()), content);
    if let Some(name) = absolute.file_name() {
        doc = doc.with_metadata("file_name", name.to_string_lossy());
    }
    if let Ok(modified) = std::fs::metadata(&absolute).and_then(|m| m.modified()) {
        let modified: chrono::DateTime<chrono::Utc> = modified.into();
        doc = doc.with_metadata("modified_at", modified.to_rfc3339());
    }
    Ok(doc)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob {:?}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_included_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("b.md"), "# B").unwrap();
        std::fs::write(dir.path().join("sub/a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/readme.md"), "skip").unwrap();

        let docs = scan_directory(&FilesystemConnectorConfig::new(dir.path())).unwrap();
        let rels: Vec<&str> = docs
            .iter()
            .map(|d| d.metadata["relative_path"].as_str())
            .collect();
        assert_eq!(rels, vec!["b.md", "sub/a.txt"]);
        assert!(docs[0].source.starts_with("file://"));
        assert!(docs[0].source.ends_with("b.md"));
        assert_eq!(docs[0].content, b"# B");
    }

    #[test]
    fn custom_excludes_apply() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.md"), "k").unwrap();
        std::fs::write(dir.path().join("drop.md"), "d").unwrap();
        let mut config = FilesystemConnectorConfig::new(dir.path());
        config.exclude_globs = vec!["drop.md".to_string()];
        let docs = scan_directory(&config).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata["file_name"], "keep.md");
    }

    #[test]
    fn missing_root_is_an_error() {
        let config = FilesystemConnectorConfig::new("/definitely/not/here");
        assert!(scan_directory(&config).is_err());
    }
}
