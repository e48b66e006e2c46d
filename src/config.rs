use anyhow::{Context, bail};
use clap::Parser;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

#[derive(Parser, Debug)]
#[command(name = "editdocs", about = "Serve a directory of markdown files with an inline editor")]
pub struct Args {
    /// Base directory that --docs, --editor and --users are resolved against.
    #[arg(long, env = "EDITDOCS_HOME", default_value = ".")]
    pub home: PathBuf,

    /// Document root, relative to --home unless absolute.
    #[arg(long, env = "EDITDOCS_DOCS", default_value = "docs")]
    pub docs: PathBuf,

    /// Editor asset directory served under /editor/.
    #[arg(long, env = "EDITDOCS_EDITOR", default_value = "editor")]
    pub editor: PathBuf,

    /// Credential file (one `username:hash` entry per line).
    #[arg(long, env = "EDITDOCS_USERS", default_value = "users")]
    pub users: PathBuf,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "9000")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Interactively add (or replace) a user in the credential file, then exit.
    #[arg(long)]
    pub adduser: bool,

    /// Comma-separated extensions that may be opened and saved through the
    /// editor. An empty list allows every extension.
    #[arg(long, env = "EDITDOCS_EDITABLE", default_value = "md")]
    pub editable: String,
}

impl Args {
    pub fn users_path(&self) -> PathBuf {
        self.home.join(&self.users)
    }
}

/// Validated process configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub docs_root: PathBuf,
    /// Canonicalized (symlink-resolved) `docs_root`, used for containment checks.
    pub canonical_root: PathBuf,
    pub editor_root: PathBuf,
    pub editable: EditableExtensions,
}

impl ServerConfig {
    pub fn from_args(args: &Args) -> anyhow::Result<Self> {
        let docs_root = args.home.join(&args.docs);
        let editor_root = args.home.join(&args.editor);
        require_dir(&docs_root, "document root")?;
        require_dir(&editor_root, "editor root")?;

        let canonical_root = std::fs::canonicalize(&docs_root)
            .with_context(|| format!("Cannot resolve document root {}", docs_root.display()))?;

        let users = args.users_path();
        let users_abs = std::fs::canonicalize(&users).unwrap_or(users);
        if users_abs.starts_with(&canonical_root) {
            tracing::warn!(
                "users file {} is inside the document root and will be served publicly",
                users_abs.display()
            );
        }

        let editable = EditableExtensions::parse(&args.editable);
        if editable.is_unrestricted() {
            tracing::warn!("editable whitelist is empty; every extension can be edited");
        }

        Ok(Self {
            docs_root,
            canonical_root,
            editor_root,
            editable,
        })
    }
}

fn require_dir(path: &Path, what: &str) -> anyhow::Result<()> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Cannot open {what} {}", path.display()))?;
    if !meta.is_dir() {
        bail!("{what} {} is not a directory", path.display());
    }
    Ok(())
}

/// Set of file extensions the editor may open and save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditableExtensions {
    exts: BTreeSet<String>,
}

impl EditableExtensions {
    pub fn parse(csv: &str) -> Self {
        let exts = csv
            .split(',')
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { exts }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.exts.is_empty()
    }

    /// Whether `path` may go through the editor. Paths without an extension
    /// are only allowed when the whitelist is empty.
    pub fn allows(&self, path: &Path) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.exts.contains(&e.to_lowercase()))
    }
}
