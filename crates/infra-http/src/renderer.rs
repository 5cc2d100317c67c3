// Minimal HTML renderer

use askama::Template;
use herald_core::domain::ContentRecord;
use herald_core::port::{ContentRenderer, RenderError};

#[derive(Template)]
#[template(path = "article.html")]
struct ArticleTemplate<'a> {
    title: &'a str,
    /// Trusted markup produced upstream, emitted unescaped
    body: &'a str,
}

/// Wraps the record body under an escaped `<h1>` title.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlRenderer;

impl ContentRenderer for HtmlRenderer {
    fn render(&self, record: &ContentRecord) -> Result<String, RenderError> {
        if record.title.trim().is_empty() {
            return Err(RenderError::MissingField("title"));
        }
        if record.body.trim().is_empty() {
            return Err(RenderError::MissingField("body"));
        }

        let article = ArticleTemplate {
            title: record.title.trim(),
            body: record.body.trim(),
        };
        let html = article
            .render()
            .map_err(|e| RenderError::Failed(e.to_string()))?;
        Ok(html.trim_end().to_string())
    }
}
