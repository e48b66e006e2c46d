use std::path::{Path, PathBuf};

/// Directories from the one holding `file_path` up to `root`, closest first.
fn ancestor_dirs(root: &Path, file_path: &Path) -> Vec<PathBuf> {
    let Some(start) = file_path.parent() else {
        return Vec::new();
    };
    start
        .ancestors()
        .take_while(|dir| dir.starts_with(root))
        .map(Path::to_path_buf)
        .collect()
}

/// The nearest `style.css` beside `file_path` or in a parent directory,
/// as an absolute URL path (e.g. `/guide/style.css`).
pub async fn find_css(root: &Path, file_path: &Path) -> Option<String> {
    for dir in ancestor_dirs(root, file_path) {
        let candidate = dir.join("style.css");
        if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            let rel = candidate.strip_prefix(root).ok()?;
            return Some(format!("/{}", rel.to_string_lossy().replace('\\', "/")));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestors_stop_at_root() {
        let dirs = ancestor_dirs(Path::new("/docs"), Path::new("/docs/a/b/page.md"));
        assert_eq!(
            dirs,
            [
                PathBuf::from("/docs/a/b"),
                PathBuf::from("/docs/a"),
                PathBuf::from("/docs")
            ]
        );
        assert!(ancestor_dirs(Path::new("/docs"), Path::new("/other/x.md")).is_empty());
    }

    #[tokio::test]
    async fn nearest_stylesheet_wins() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("guide/deep")).unwrap();
        std::fs::write(root.join("style.css"), b"").unwrap();
        assert_eq!(
            find_css(root, &root.join("guide/deep/page.md")).await.as_deref(),
            Some("/style.css")
        );

        std::fs::write(root.join("guide/style.css"), b"").unwrap();
        assert_eq!(
            find_css(root, &root.join("guide/deep/page.md")).await.as_deref(),
            Some("/guide/style.css")
        );
    }
}
