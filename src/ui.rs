use std::path::Path;

use anyhow::Context;

const PAGE_TEMPLATE: &str = include_str!("../assets/index.html");
const STYLESHEET_SLOT: &str = "{{STYLESHEET}}";

/// Reads the stylesheet and renders the page once. A missing stylesheet is a startup error.
pub fn load_page(stylesheet_path: &Path) -> anyhow::Result<String> {
  let css = std::fs::read_to_string(stylesheet_path)
    .with_context(|| format!("failed to read stylesheet {}", stylesheet_path.display()))?;
  Ok(render_page(&css))
}

pub fn render_page(css: &str) -> String {
  PAGE_TEMPLATE.replace(STYLESHEET_SLOT, css)
}

pub fn summary_html(summary: &str) -> String {
  format!("<div class='one-liner-box'>{}</div>", html_escape(summary))
}

fn html_escape(s: &str) -> String {
  s.replace('&', "&amp;")
    .replace('<', "&lt;")
    .replace('>', "&gt;")
    .replace('"', "&quot;")
    .replace('\'', "&#39;")
}
