use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use std::{convert::Infallible, io, path::Path};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::{
    auth::require_user,
    css::find_css,
    error::AppError,
    render::render_markdown_safe,
    resolve::{self, DocPath, contained, contained_for_write, is_dir, is_file},
    state::AppState,
    template,
};

/// Site layout looked up in the document root on every render.
const SITE_TEMPLATE: &str = "template.html";

enum Action {
    Save,
    Edit,
    Read,
}

impl Action {
    fn classify(method: &Method, query: Option<&str>) -> Option<Self> {
        if *method == Method::POST {
            Some(Self::Save)
        } else if *method != Method::GET && *method != Method::HEAD {
            None
        } else if has_edit_param(query) {
            Some(Self::Edit)
        } else {
            Some(Self::Read)
        }
    }
}

/// Fallback handler for everything under the document root.
///
/// POST saves, `?edit` opens the editor, otherwise the literal file is
/// served, falling back to rendering the `.md` source of an `.html` path.
/// Saving and editing authenticate before the path is even decoded.
pub async fn handle(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let action = Action::classify(&method, uri.query()).ok_or(AppError::NotFound)?;

    if matches!(action, Action::Save | Action::Edit) {
        require_user(&state, &headers).await.inspect_err(|_| {
            tracing::warn!("rejected {} {}: not authenticated", method, uri.path());
        })?;
    }

    let decoded = resolve::percent_decode(uri.path()).ok_or(AppError::NotFound)?;
    let doc = resolve::resolve(&state.config.canonical_root, &decoded)?;

    match action {
        Action::Save => save(&state, &doc, body).await,
        Action::Edit => edit(&state, &doc, uri.query().unwrap_or("")).await,
        Action::Read => read(&state, &doc, method, uri, headers).await,
    }
}

async fn read(
    state: &AppState,
    doc: &DocPath,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if is_file(&doc.literal).await {
        return serve_static(state, &doc.literal, method, uri, headers).await;
    }

    // Real directory on disk without trailing slash → redirect to canonical URL.
    if is_dir(&doc.literal).await {
        return Ok(Redirect::permanent(&format!("{}/", uri.path())).into_response());
    }

    match &doc.source {
        Some(src) if is_file(&src.path).await => serve_markdown(state, &src.path).await,
        _ => Err(AppError::NotFound),
    }
}

/// `POST /editor/preview`: the request body rendered as it will appear on
/// the page, with raw HTML escaped.
pub async fn preview(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    require_user(&state, &headers).await.inspect_err(|_| {
        tracing::warn!("rejected preview: not authenticated");
    })?;
    let source = String::from_utf8_lossy(&body);
    Ok(Html(render_markdown_safe(&source)).into_response())
}

/// The `.md` source when it exists, otherwise the literal path.
async fn edit_target(doc: &DocPath) -> (&str, &Path) {
    if let Some(src) = &doc.source {
        if is_file(&src.path).await {
            return (src.url.as_str(), src.path.as_path());
        }
    }
    (doc.url.as_str(), doc.literal.as_path())
}

async fn save(state: &AppState, doc: &DocPath, body: Bytes) -> Result<Response, AppError> {
    let (url, path) = edit_target(doc).await;
    if !state.config.editable.allows(path) {
        tracing::warn!("rejected save to {}: extension not editable", url);
        return Err(AppError::Forbidden);
    }
    let target = contained_for_write(&state.config.canonical_root, path).await?;

    if let Some(parent) = target.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            tracing::error!("Cannot create directories for {}: {}", url, e);
            return Ok(StatusCode::OK.into_response());
        }
    }

    match tokio::fs::write(&target, &body).await {
        Ok(()) => tracing::info!("saved {} ({} bytes)", url, body.len()),
        Err(e) => tracing::error!("Cannot write {}: {}", url, e),
    }
    Ok(StatusCode::OK.into_response())
}

async fn edit(state: &AppState, doc: &DocPath, query: &str) -> Result<Response, AppError> {
    let (url, path) = edit_target(doc).await;
    if !state.config.editable.allows(path) {
        return Err(AppError::Forbidden);
    }

    if url != doc.url {
        let location = format!("{}?{}", resolve::encode_path(url), query);
        return Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response());
    }

    let content = read_for_editing(state, path).await;
    Ok(Html(template::editor_page(url, &content).into_string()).into_response())
}

/// Raw file content for the editor; empty when the file is missing or
/// unreadable.
async fn read_for_editing(state: &AppState, path: &Path) -> String {
    let real_path = match contained(&state.config.canonical_root, path).await {
        Ok(p) => p,
        Err(AppError::NotFound) => return String::new(),
        Err(e) => {
            tracing::warn!("Cannot open {}: {}", path.display(), e);
            return String::new();
        }
    };
    match tokio::fs::read(&real_path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!("Cannot read {}: {}", real_path.display(), e);
            String::new()
        }
    }
}

async fn serve_markdown(state: &AppState, source: &Path) -> Result<Response, AppError> {
    let real_path = contained(&state.config.canonical_root, source).await?;
    let raw = match tokio::fs::read(&real_path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!("Cannot read {}: {}", real_path.display(), e);
            String::new()
        }
    };

    let page = state.renderer.render_page(&raw);
    let css = find_css(&state.config.canonical_root, &real_path).await;

    if let Some(src) = site_template(state).await {
        match template::site_page(&src, &page, css.as_deref()) {
            Ok(html) => return Ok(Html(html).into_response()),
            Err(e) => tracing::warn!("Cannot render {}: {}", SITE_TEMPLATE, e),
        }
    }

    let markup = template::page(&page, css.as_deref());
    Ok(Html(markup.into_string()).into_response())
}

/// Source of `template.html` in the document root, re-read per request so
/// layout edits show up without a restart.
async fn site_template(state: &AppState) -> Option<String> {
    let path = state.config.canonical_root.join(SITE_TEMPLATE);
    match tokio::fs::read_to_string(&path).await {
        Ok(src) => Some(src),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!("Cannot read {}: {}", path.display(), e);
            None
        }
    }
}

/// Hand the file to `ServeFile`, which covers content types, HEAD,
/// conditional requests and ranges.
async fn serve_static(
    state: &AppState,
    fs_path: &Path,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let real_path = contained(&state.config.canonical_root, fs_path).await?;

    let mut req = Request::new(Body::empty());
    *req.method_mut() = method;
    *req.uri_mut() = uri;
    *req.headers_mut() = headers;

    let resp = ServeFile::new(real_path)
        .oneshot(req)
        .await
        .unwrap_or_else(|never: Infallible| match never {});
    Ok(resp.map(Body::new))
}

/// Whether the query string carries an `edit` key, with or without a value.
fn has_edit_param(query: Option<&str>) -> bool {
    query.is_some_and(|q| {
        form_urlencoded::parse(q.as_bytes()).any(|(key, _)| key == "edit")
    })
}
