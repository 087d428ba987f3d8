use super::context::SyncContext;
use super::github::{RemoteApi, TreeResponse};
use crate::config::RepositoryReference;
use crate::error::{Result, SyncError};
use std::collections::BTreeMap;

const RAW_HOST: &str = "https://raw.githubusercontent.com";

/// A file in the remote listing, relative to the tracked subdirectory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileRecord {
    pub path: String,
    pub sha: String,
    pub url: String,
}

/// Raw content URL of a path relative to the tracked subdirectory
pub fn raw_url(reference: &RepositoryReference, path: &str) -> String {
    let mut url = format!(
        "{}/{}/{}/{}",
        RAW_HOST, reference.owner, reference.repo, reference.branch
    );
    if !reference.subdirectory.is_empty() {
        url.push('/');
        url.push_str(&reference.subdirectory);
    }
    url.push('/');
    url.push_str(path);
    url
}

/// Anything short of a fatal error becomes a tree fetch failure, which aborts the run
fn tree_error(e: SyncError) -> SyncError {
    if e.is_fatal() {
        return e;
    }
    SyncError::TreeFetch {
        status: e.status().unwrap_or(0),
        message: e.to_string(),
    }
}

async fn fetch_tree(api: &dyn RemoteApi, tree_ref: &str, recursive: bool) -> Result<TreeResponse> {
    api.fetch_tree(tree_ref, recursive).await.map_err(tree_error)
}

/// Navigate to a subtree by path (e.g., "textures/SLUS-21214")
pub async fn get_subtree_sha(api: &dyn RemoteApi, root: &str, path: &str) -> Result<String> {
    let mut current = root.to_string();

    for part in path.split('/').filter(|p| !p.is_empty()) {
        let tree = fetch_tree(api, &current, false).await?;

        let entry = tree
            .tree
            .iter()
            .find(|e| e.path == part && e.is_tree())
            .ok_or_else(|| SyncError::TreeFetch {
                status: 404,
                message: format!("Path component '{}' not found in repository", part),
            })?;

        current = entry.sha.clone();
    }

    Ok(current)
}

/// Recursively collect blobs under a tree, splitting truncated listings per directory
async fn fetch_tree_files_recursive(
    ctx: &SyncContext,
    tree_sha: &str,
    base_path: &str,
    files: &mut BTreeMap<String, String>,
) -> Result<()> {
    ctx.check_cancelled()?;
    let api = ctx.api.as_ref();
    let join = |path: &str| {
        if base_path.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", base_path, path)
        }
    };

    let tree = fetch_tree(api, tree_sha, true).await?;

    if tree.truncated {
        ctx.debug(format!(
            "Tree listing for '{}' truncated, fetching subdirectories individually",
            if base_path.is_empty() { "." } else { base_path }
        ));
        let top = fetch_tree(api, tree_sha, false).await?;

        for entry in top.tree {
            let entry_path = join(&entry.path);
            if entry.is_blob() {
                files.insert(entry_path, entry.sha);
            } else if entry.is_tree() {
                Box::pin(fetch_tree_files_recursive(ctx, &entry.sha, &entry_path, files)).await?;
            }
        }
    } else {
        for entry in tree.tree.into_iter().filter(|e| e.is_blob()) {
            files.insert(join(&entry.path), entry.sha);
        }
    }

    Ok(())
}

/// Full listing of the tracked subdirectory at the branch head, sorted by path.
///
/// Any failure aborts: a partial listing would turn into wrong deletions.
pub async fn fetch_remote_tree(ctx: &SyncContext) -> Result<Vec<RemoteFileRecord>> {
    let reference = &ctx.settings.reference;
    let subtree = get_subtree_sha(ctx.api.as_ref(), &reference.branch, &reference.subdirectory).await?;

    let mut files = BTreeMap::new();
    fetch_tree_files_recursive(ctx, &subtree, "", &mut files).await?;

    Ok(files
        .into_iter()
        .map(|(path, sha)| RemoteFileRecord {
            url: raw_url(reference, &path),
            path,
            sha,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_urls_include_subdirectory() {
        let mut reference = RepositoryReference {
            owner: "ncaanext".to_string(),
            repo: "ncaa-next-26".to_string(),
            branch: "main".to_string(),
            subdirectory: "textures".to_string(),
        };
        assert_eq!(
            raw_url(&reference, "SLUS-21214/replacements/a.png"),
            "https://raw.githubusercontent.com/ncaanext/ncaa-next-26/main/textures/SLUS-21214/replacements/a.png"
        );
        reference.subdirectory.clear();
        assert_eq!(
            raw_url(&reference, "a.png"),
            "https://raw.githubusercontent.com/ncaanext/ncaa-next-26/main/a.png"
        );
    }

    #[test]
    fn recoverable_errors_become_tree_failures() {
        let err = tree_error(SyncError::Status {
            status: 403,
            url: "u".to_string(),
            body: "rate limited".to_string(),
        });
        assert!(matches!(err, SyncError::TreeFetch { status: 403, .. }));
        assert!(err.is_fatal());
        assert!(matches!(tree_error(SyncError::Cancelled), SyncError::Cancelled));
    }
}
