use percent_encoding::{AsciiSet, CONTROLS};
use std::{
    io,
    path::{Path, PathBuf},
};

use crate::error::AppError;

/// Characters escaped when a decoded path is placed back into a `Location`.
const PATH_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Candidate on-disk locations for one request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocPath {
    /// Decoded URL path, with `index.html` appended to directory requests.
    pub url: String,
    /// `root` joined with `url`.
    pub literal: PathBuf,
    /// The `.md` sibling for `.html` requests.
    pub source: Option<SourcePath>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePath {
    pub url: String,
    pub path: PathBuf,
}

/// Map a decoded URL path onto the document root. Purely lexical: nothing
/// here touches the filesystem.
///
/// Any `..` segment is rejected as not found.
pub fn resolve(root: &Path, url_path: &str) -> Result<DocPath, AppError> {
    let mut url = if url_path.starts_with('/') {
        url_path.to_string()
    } else {
        format!("/{url_path}")
    };
    if url.ends_with('/') {
        url.push_str("index.html");
    }

    if url.split('/').any(|seg| seg == "..") {
        return Err(AppError::NotFound);
    }

    let rel = url.trim_start_matches('/');
    let literal = root.join(rel);

    // Fast lexical guard; `contained` performs the canonical check.
    if !literal.starts_with(root) {
        return Err(AppError::NotFound);
    }

    let source = url.strip_suffix(".html").map(|stem| {
        let md_url = format!("{stem}.md");
        SourcePath {
            path: root.join(md_url.trim_start_matches('/')),
            url: md_url,
        }
    });

    Ok(DocPath {
        url,
        literal,
        source,
    })
}

/// Canonicalize `path` (resolving symlinks) and verify it stays within
/// `canonical_root`. Returns the resolved path on success.
pub async fn contained(canonical_root: &Path, path: &Path) -> Result<PathBuf, AppError> {
    let canonical = tokio::fs::canonicalize(path).await.map_err(io_err)?;
    if !canonical.starts_with(canonical_root) {
        return Err(AppError::NotFound);
    }
    Ok(canonical)
}

/// Check that a file which may not exist yet would land inside
/// `canonical_root`: the nearest existing ancestor is canonicalized and the
/// missing tail re-appended. Creates nothing.
pub async fn contained_for_write(canonical_root: &Path, path: &Path) -> Result<PathBuf, AppError> {
    let mut existing = path;
    let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
    loop {
        match tokio::fs::symlink_metadata(existing).await {
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let name = existing.file_name().ok_or(AppError::NotFound)?;
                tail.push(name);
                existing = existing.parent().ok_or(AppError::NotFound)?;
            }
            Err(e) => return Err(AppError::Io(e)),
        }
    }

    let mut resolved = contained(canonical_root, existing).await?;
    for name in tail.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

pub async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

pub async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Map an `io::Error` to `AppError`, translating `NotFound` appropriately.
pub fn io_err(e: io::Error) -> AppError {
    if e.kind() == io::ErrorKind::NotFound {
        AppError::NotFound
    } else {
        AppError::Io(e)
    }
}

/// Percent-decode a URL path. Returns `None` if the decoded bytes are not
/// valid UTF-8 (which maps to a 404).
pub fn percent_decode(s: &str) -> Option<String> {
    percent_encoding::percent_decode_str(s)
        .decode_utf8()
        .ok()
        .map(|c| c.into_owned())
}

/// Percent-encode a decoded path for use in a `Location` header.
pub fn encode_path(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, PATH_SET).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_request_gets_md_sibling() {
        let doc = resolve(Path::new("/srv/docs"), "/guide/intro.html").unwrap();
        assert_eq!(doc.url, "/guide/intro.html");
        assert_eq!(doc.literal, Path::new("/srv/docs/guide/intro.html"));
        let src = doc.source.unwrap();
        assert_eq!(src.url, "/guide/intro.md");
        assert_eq!(src.path, Path::new("/srv/docs/guide/intro.md"));
    }

    #[test]
    fn trailing_slash_means_index() {
        let doc = resolve(Path::new("/srv/docs"), "/").unwrap();
        assert_eq!(doc.url, "/index.html");
        assert_eq!(doc.literal, Path::new("/srv/docs/index.html"));
        assert_eq!(doc.source.unwrap().path, Path::new("/srv/docs/index.md"));

        let doc = resolve(Path::new("/srv/docs"), "/a/b/").unwrap();
        assert_eq!(doc.literal, Path::new("/srv/docs/a/b/index.html"));
    }

    #[test]
    fn other_extensions_have_no_source() {
        let doc = resolve(Path::new("/srv/docs"), "/img/logo.png").unwrap();
        assert_eq!(doc.literal, Path::new("/srv/docs/img/logo.png"));
        assert!(doc.source.is_none());

        let doc = resolve(Path::new("/srv/docs"), "/notes.md").unwrap();
        assert!(doc.source.is_none());
    }

    #[test]
    fn parent_segments_are_rejected() {
        assert!(matches!(
            resolve(Path::new("/srv/docs"), "/../etc/passwd"),
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            resolve(Path::new("/srv/docs"), "/a/../../x.md"),
            Err(AppError::NotFound)
        ));
    }

    #[test]
    fn encode_path_keeps_slashes() {
        assert_eq!(encode_path("/my notes/a#1.md"), "/my%20notes/a%231.md");
        assert_eq!(percent_decode("/my%20notes/a.md").unwrap(), "/my notes/a.md");
        assert!(percent_decode("/%FF").is_none());
    }

    #[tokio::test]
    async fn write_target_must_stay_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = tokio::fs::canonicalize(dir.path()).await.unwrap();

        let target = contained_for_write(&root, &root.join("new/deep/file.md"))
            .await
            .unwrap();
        assert_eq!(target, root.join("new/deep/file.md"));
        assert!(!root.join("new").exists());

        let outside = tempfile::tempdir().unwrap();
        assert!(matches!(
            contained_for_write(&root, &outside.path().join("x.md")).await,
            Err(AppError::NotFound)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escape_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.md"), b"secret").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let root = tokio::fs::canonicalize(dir.path()).await.unwrap();

        assert!(matches!(
            contained(&root, &root.join("link/secret.md")).await,
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            contained_for_write(&root, &root.join("link/new.md")).await,
            Err(AppError::NotFound)
        ));
    }
}
