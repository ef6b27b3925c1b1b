use tera::{Context, Tera};

use crate::error::{AppError, Result};

const BODY_TEMPLATE: &str = "body.html";

// Escape first so that only the inserted <br> survives as markup.
const BODY_SOURCE: &str = "<div>{{ body | escape | linebreaksbr | safe }}</div>";

/// Renders the HTML alternative of a message body.
pub struct BodyRenderer {
    tera: Tera,
}

impl BodyRenderer {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(BODY_TEMPLATE, BODY_SOURCE)
            .map_err(|e| AppError::Render(e.to_string()))?;
        Ok(BodyRenderer { tera })
    }

    pub fn render_html(&self, body: &str) -> Result<String> {
        let mut ctx = Context::new();
        ctx.insert("body", body);
        self.tera
            .render(BODY_TEMPLATE, &ctx)
            .map_err(|e| AppError::Render(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newlines_become_line_breaks() {
        let renderer = BodyRenderer::new().unwrap();
        let html = renderer.render_html("line1\nline2\r\nline3").unwrap();
        assert_eq!(html, "<div>line1<br>line2<br>line3</div>");
    }

    #[test]
    fn markup_in_body_is_escaped() {
        let renderer = BodyRenderer::new().unwrap();
        let html = renderer.render_html("<script>alert(1)</script>\nok").unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("<br>ok"));
    }
}
