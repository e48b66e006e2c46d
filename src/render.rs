//! Markdown rendering plus the post-processing the page template needs:
//! a `<nav>` table of contents ahead of the body, the toc/content split and
//! the page title.

use maud::{PreEscaped, html};
use regex::Regex;
use std::collections::HashMap;

const NAV_CLOSE: &str = "</nav>";

/// Derived per request; never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPage {
    pub title: String,
    pub toc: String,
    pub content: String,
}

/// Renders markdown sources into [`RenderedPage`]s. Holds the compiled
/// patterns so they are built once at startup.
#[derive(Debug, Clone)]
pub struct PageRenderer {
    heading: Regex,
    tag: Regex,
    entity: Regex,
    title: Regex,
}

impl PageRenderer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            heading: Regex::new(r"(?s)<h([1-6])>(.*?)</h[1-6]>")?,
            tag: Regex::new(r"<[^>]*>")?,
            entity: Regex::new(r"&#?[0-9A-Za-z]+;")?,
            title: Regex::new(r"(?is)<h1(?:\s[^>]*)?>(.*?)</h1\s*>")?,
        })
    }

    pub fn render_page(&self, source: &str) -> RenderedPage {
        let output = self.render(source);
        let (toc, content) = split_toc(&output);
        RenderedPage {
            title: self.title(content),
            toc: toc.to_string(),
            content: content.to_string(),
        }
    }

    /// Render markdown to a `<nav>` toc block immediately followed by the
    /// body, with every heading given an anchor the toc links to.
    pub fn render(&self, source: &str) -> String {
        let body = render_markdown(source);

        let mut out = String::with_capacity(body.len());
        let mut entries: Vec<(u8, String, String)> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut last = 0;

        for caps in self.heading.captures_iter(&body) {
            let (Some(whole), Some(level), Some(inner)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            let level = level.as_str().as_bytes()[0] - b'0';
            let label = self.tag.replace_all(inner.as_str(), "").trim().to_string();
            let slug = unique_slug(&slugify(&self.entity.replace_all(&label, "")), &mut seen);

            out.push_str(&body[last..whole.start()]);
            out.push_str(&format!("<h{level} id=\"{slug}\">"));
            out.push_str(&body[inner.start()..whole.end()]);
            last = whole.end();

            entries.push((level, slug, label));
        }
        out.push_str(&body[last..]);

        let nav = html! {
            nav class="toc" {
                @if !entries.is_empty() {
                    ul {
                        @for (level, slug, label) in &entries {
                            li class={ "toc-h" (level) } {
                                a href={ "#" (slug) } { (PreEscaped(label)) }
                            }
                        }
                    }
                }
            }
        };

        let mut rendered = nav.into_string();
        rendered.push('\n');
        rendered.push_str(&out);
        rendered
    }

    /// Inner text of the first `<h1>` in `content`, or empty.
    pub fn title(&self, content: &str) -> String {
        self.title
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default()
    }
}

/// Split renderer output after the first `</nav>`. Output without one is
/// all content and an empty toc.
pub fn split_toc(output: &str) -> (&str, &str) {
    match output.find(NAV_CLOSE) {
        Some(idx) => output.split_at(idx + NAV_CLOSE.len()),
        None => ("", output),
    }
}

pub fn render_markdown(content: &str) -> String {
    let mut opts = markdown::Options::gfm();
    opts.parse.constructs.frontmatter = false;
    opts.compile.allow_dangerous_html = true;
    markdown::to_html_with_options(content, &opts).unwrap_or_else(|_| markdown::to_html(content))
}

/// Rendering for the editor preview: raw HTML passthrough is disabled so
/// the preview pane cannot run markup typed into the editor.
pub fn render_markdown_safe(content: &str) -> String {
    let mut opts = markdown::Options::gfm();
    opts.parse.constructs.frontmatter = false;
    opts.compile.allow_dangerous_html = false;
    markdown::to_html_with_options(content, &opts).unwrap_or_else(|_| markdown::to_html(content))
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug.to_string()
    }
}

fn unique_slug(base: &str, seen: &mut HashMap<String, usize>) -> String {
    let count = seen.entry(base.to_string()).or_insert(0);
    let slug = if *count == 0 {
        base.to_string()
    } else {
        format!("{base}-{count}")
    };
    *count += 1;
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> PageRenderer {
        PageRenderer::new().unwrap()
    }

    #[test]
    fn title_comes_from_the_h1() {
        let page = renderer().render_page("Intro text\n\n# Getting Started\n\nBody.\n");
        assert_eq!(page.title, "Getting Started");
        assert!(page.content.contains("<h1 id=\"getting-started\">Getting Started</h1>"));
        assert!(page.toc.starts_with("<nav"));
        assert!(page.toc.ends_with("</nav>"));
        assert!(page.toc.contains("href=\"#getting-started\""));
    }

    #[test]
    fn title_ignores_attributes_and_case() {
        let r = renderer();
        assert_eq!(r.title(r#"<p>x</p><H1 class="big" id="t">Hello</H1>"#), "Hello");
        assert_eq!(r.title("<h1>First</h1><h1>Second</h1>"), "First");
        assert_eq!(r.title("<h10>nope</h10>"), "");
    }

    #[test]
    fn wrapped_setext_heading_keeps_full_title() {
        let page = renderer().render_page("Release\nNotes\n=====\n\nBody.\n");
        assert_eq!(page.title, "Release\nNotes");
        assert!(page.content.contains("<h1 id=\"release-notes\">"));
    }

    #[test]
    fn safe_rendering_escapes_raw_html() {
        let html = render_markdown_safe("# Hi\n\n<script>alert(1)</script>\n");
        assert!(html.contains("<h1>Hi</h1>"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn no_h1_means_empty_title() {
        let page = renderer().render_page("## Only a subsection\n\ntext\n");
        assert_eq!(page.title, "");
        assert!(page.content.contains("<h2 id=\"only-a-subsection\">"));

        let page = renderer().render_page("");
        assert_eq!(page.title, "");
        assert_eq!(page.toc, "<nav class=\"toc\"></nav>");
    }

    #[test]
    fn split_without_nav_is_all_content() {
        let (toc, content) = split_toc("<p>no nav here</p>");
        assert_eq!(toc, "");
        assert_eq!(content, "<p>no nav here</p>");

        let (toc, content) = split_toc("<nav>a</nav><p>b</p></nav>");
        assert_eq!(toc, "<nav>a</nav>");
        assert_eq!(content, "<p>b</p></nav>");
    }

    #[test]
    fn duplicate_headings_get_distinct_anchors() {
        let page = renderer().render_page("## Usage\n\n## Usage\n\n### Q & A\n");
        assert!(page.content.contains("<h2 id=\"usage\">"));
        assert!(page.content.contains("<h2 id=\"usage-1\">"));
        assert!(page.content.contains("<h3 id=\"q-a\">"));
        assert!(page.toc.contains("class=\"toc-h3\""));
    }

    #[test]
    fn gfm_tables_render() {
        let page = renderer().render_page("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(page.content.contains("<table>"));
    }
}
