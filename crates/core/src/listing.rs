//! Directory listings over delimiter-based object listings
//!
//! S3 has no directories, only keys. A "directory" is a key prefix ending in
//! `/`; its children are the common prefixes and keys one level below it.
//! [`read_dir`] follows continuation tokens until the listing is exhausted and
//! returns names relative to the directory.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{Error, Result};
use crate::path::{DELIMITER, S3Path};
use crate::traits::{ListOptions, ListPage, ObjectInfo};

/// Options for [`read_dir`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadDirOptions {
    /// Sort names lexicographically instead of keeping listing order
    pub sort: bool,

    /// Page size hint passed to the store
    pub max_keys: Option<i32>,
}

impl ReadDirOptions {
    pub fn sorted() -> Self {
        Self {
            sort: true,
            ..Default::default()
        }
    }
}

fn require_dir(path: &S3Path) -> Result<()> {
    if path.is_dir_path() {
        Ok(())
    } else {
        Err(Error::InvalidPath(format!(
            "{path} is not a directory path (it must end with '{DELIMITER}')"
        )))
    }
}

fn prefix_of(path: &S3Path) -> Option<String> {
    (!path.key().is_empty()).then(|| path.key().to_string())
}

/// Fetch every page of a listing, handing each to `on_page`
async fn for_each_page<F>(path: &S3Path, base: ListOptions, mut on_page: F) -> Result<usize>
where
    F: FnMut(ListPage),
{
    let store = path.config().store();
    let mut token = None;
    let mut pages = 0;

    loop {
        let options = ListOptions {
            continuation_token: token.take(),
            ..base.clone()
        };
        let mut page = store.list_objects_v2(path.bucket(), options).await?;
        pages += 1;

        let next = page.next_continuation_token.take();
        on_page(page);
        match next {
            Some(next) => token = Some(next),
            None => return Ok(pages),
        }
    }
}

/// Immediate children of a directory path with their listing metadata
///
/// Subdirectories keep their trailing `/` and carry [`ObjectInfo::dir`].
/// Names are deduplicated keeping the first occurrence; the directory's own
/// marker object is left out.
pub async fn read_dir_entries(
    path: &S3Path,
    options: &ReadDirOptions,
) -> Result<Vec<(String, ObjectInfo)>> {
    require_dir(path)?;

    let prefix = path.key();
    let base = ListOptions {
        prefix: prefix_of(path),
        delimiter: Some(DELIMITER.to_string()),
        continuation_token: None,
        max_keys: options.max_keys,
    };

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let pages = for_each_page(path, base, |page| {
        let infos = page
            .common_prefixes
            .into_iter()
            .map(ObjectInfo::dir)
            .chain(page.contents);
        for info in infos {
            let name = info.key.strip_prefix(prefix).unwrap_or(&info.key).to_string();
            if seen.insert(name.clone()) {
                entries.push((name, info));
            }
        }
    })
    .await?;

    entries.retain(|(name, _)| !name.is_empty() && name != "/");
    if options.sort {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
    }

    debug!(path = %path, pages, entries = entries.len(), "Listed directory");
    Ok(entries)
}

/// Names of the immediate children of a directory path
///
/// See [`read_dir_entries`] for naming and deduplication rules.
pub async fn read_dir(path: &S3Path, options: &ReadDirOptions) -> Result<Vec<String>> {
    let entries = read_dir_entries(path, options).await?;
    Ok(entries.into_iter().map(|(name, _)| name).collect())
}

/// Like [`read_dir`], but each name joined onto `path`
pub async fn read_dir_paths(path: &S3Path, options: &ReadDirOptions) -> Result<Vec<S3Path>> {
    let names = read_dir(path, options).await?;
    Ok(names.iter().map(|name| path.join(name)).collect())
}

/// Every object below a directory path, at any depth, in key order
///
/// Includes directory marker objects.
pub async fn walk(path: &S3Path) -> Result<Vec<(S3Path, ObjectInfo)>> {
    require_dir(path)?;

    let base = ListOptions {
        prefix: prefix_of(path),
        ..Default::default()
    };
    let mut objects = Vec::new();
    let pages = for_each_page(path, base, |page| {
        objects.extend(
            page.contents
                .into_iter()
                .map(|info| (path.with_key(&info.key), info)),
        );
    })
    .await?;

    debug!(path = %path, pages, objects = objects.len(), "Walked directory");
    Ok(objects)
}
