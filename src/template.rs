use maud::{DOCTYPE, Markup, PreEscaped, html};
use tera::{Context, Tera};

use crate::render::{RenderedPage, render_markdown_safe};

/// Render a site-supplied tera layout. `title`, `toc` and `content` are
/// renderer output and bound as-is; `css` is the stylesheet URL, if any.
pub fn site_page(
    template_src: &str,
    doc: &RenderedPage,
    css_path: Option<&str>,
) -> Result<String, tera::Error> {
    let mut ctx = Context::new();
    ctx.insert("title", &doc.title);
    ctx.insert("toc", &doc.toc);
    ctx.insert("content", &doc.content);
    ctx.insert("css", &css_path);
    Tera::one_off(template_src, &ctx, false)
}

/// Full HTML page wrapping a rendered markdown document.
pub fn page(doc: &RenderedPage, css_path: Option<&str>) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                // Scraped from rendered HTML, so already escaped.
                title { (PreEscaped(&doc.title)) }
                @if let Some(css) = css_path {
                    link rel="stylesheet" href=(css);
                }
            }
            body {
                @if !doc.toc.is_empty() {
                    aside class="toc" { (PreEscaped(&doc.toc)) }
                }
                main {
                    (PreEscaped(&doc.content))
                }
                footer {
                    a href="?edit" rel="nofollow" { "Edit this page" }
                }
            }
        }
    }
}

/// Editor page for `url_path`, pre-filled with the raw file `content`.
/// Markdown sources get a live preview pane next to the textarea.
pub fn editor_page(url_path: &str, content: &str) -> Markup {
    let rendered = url_path
        .strip_suffix(".md")
        .map(|stem| format!("{stem}.html"));
    let preview = rendered.as_ref().map(|_| render_markdown_safe(content));
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { "Editing " (url_path) }
                link rel="stylesheet" href="/editor/editor.css";
            }
            body class="editor" {
                header class="editor-toolbar" {
                    span class="editor-path" { (url_path) }
                    @if let Some(view) = &rendered {
                        a class="toolbar-link" href=(view) { "View" }
                    }
                    span id="save-status" class="save-status" {}
                    button id="save-button" type="button" { "Save" }
                }
                div class="editor-panes" {
                    textarea id="editor" spellcheck="false" data-path=(url_path) { (content) }
                    @if let Some(html) = &preview {
                        div id="preview" class="preview" { (PreEscaped(html)) }
                    }
                }
                script src="/editor/editor.js" {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_binds_title_toc_and_content() {
        let doc = RenderedPage {
            title: "Q &amp; A".into(),
            toc: "<nav class=\"toc\"></nav>".into(),
            content: "<h1 id=\"q-a\">Q &amp; A</h1>".into(),
        };
        let html = page(&doc, Some("/style.css")).into_string();
        assert!(html.contains("<title>Q &amp; A</title>"));
        assert!(html.contains("<aside class=\"toc\"><nav class=\"toc\"></nav></aside>"));
        assert!(html.contains("<main><h1 id=\"q-a\">Q &amp; A</h1></main>"));
        assert!(html.contains("href=\"/style.css\""));
    }

    #[test]
    fn site_page_binds_template_variables() {
        let doc = RenderedPage {
            title: "Q &amp; A".into(),
            toc: "<nav class=\"toc\"></nav>".into(),
            content: "<p>body</p>".into(),
        };
        let src = "<title>{{ title }}</title>{{ toc }}<main>{{ content }}</main>\
                   {% if css %}<link href=\"{{ css }}\">{% endif %}";

        let html = site_page(src, &doc, Some("/style.css")).unwrap();
        assert_eq!(
            html,
            "<title>Q &amp; A</title><nav class=\"toc\"></nav><main><p>body</p></main>\
             <link href=\"/style.css\">"
        );

        let html = site_page(src, &doc, None).unwrap();
        assert!(!html.contains("<link"));
        assert!(site_page("{{ title", &doc, None).is_err());
    }

    #[test]
    fn markdown_editor_has_preview_pane() {
        let html = editor_page("/a.md", "# Hi\n\n<script>x</script>\n").into_string();
        assert!(html.contains("<div id=\"preview\" class=\"preview\"><h1>Hi</h1>"));
        assert!(!html.contains("<script>x"));
    }

    #[test]
    fn editor_escapes_content() {
        let html = editor_page("/notes/a.md", "</textarea><script>x</script>").into_string();
        assert!(html.contains("&lt;/textarea&gt;&lt;script&gt;"));
        assert!(html.contains("data-path=\"/notes/a.md\""));
        assert!(html.contains("href=\"/notes/a.html\""));
    }

    #[test]
    fn editor_for_non_markdown_has_no_view_link() {
        let html = editor_page("/style.css", "body{}").into_string();
        assert!(!html.contains("toolbar-link"));
        assert!(!html.contains("id=\"preview\""));
    }
}
