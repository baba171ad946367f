//! Secondary document artifact rendered from the final Markdown.
//!
//! The renderer walks the Markdown line by line. It understands fenced code
//! blocks, `#`/`##`/`###` headings, bullet and numbered lists, blockquotes and
//! plain paragraphs; everything else is emitted as escaped text.

use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;

static NUMBERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\. ").expect("valid regex"));

/// Renders the final Markdown into a downloadable artifact.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, markdown: &str, title: &str) -> Result<Vec<u8>>;

    /// File extension of the artifact, without the dot.
    fn extension(&self) -> &str;

    fn content_type(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum List {
    Bullet,
    Numbered,
}

impl List {
    fn open(&self) -> &'static str {
        match self {
            List::Bullet => "<ul>",
            List::Numbered => "<ol>",
        }
    }

    fn close(&self) -> &'static str {
        match self {
            List::Bullet => "</ul>",
            List::Numbered => "</ol>",
        }
    }
}

/// Standalone HTML page.
#[derive(Debug, Clone, Default)]
pub struct HtmlRenderer;

impl HtmlRenderer {
    pub fn new() -> Self {
        Self
    }

    fn body(markdown: &str) -> String {
        let mut out = Vec::new();
        let mut code: Option<Vec<&str>> = None;
        let mut list: Option<List> = None;

        for line in markdown.lines() {
            let trimmed = line.trim();

            if trimmed.starts_with("```") {
                match code.take() {
                    Some(lines) => {
                        out.push(format!("<pre><code>{}</code></pre>", escape(&lines.join("\n"))));
                    }
                    None => {
                        close_list(&mut out, &mut list);
                        code = Some(Vec::new());
                    }
                }
                continue;
            }
            if let Some(lines) = code.as_mut() {
                lines.push(line);
                continue;
            }

            let item = if let Some(text) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
                Some((List::Bullet, text))
            } else if let Some(m) = NUMBERED_ITEM.find(trimmed) {
                Some((List::Numbered, &trimmed[m.end()..]))
            } else {
                None
            };

            if let Some((kind, text)) = item {
                if list != Some(kind) {
                    close_list(&mut out, &mut list);
                    out.push(kind.open().to_string());
                    list = Some(kind);
                }
                out.push(format!("<li>{}</li>", escape(text)));
                continue;
            }
            close_list(&mut out, &mut list);

            if let Some(text) = line.strip_prefix("### ") {
                out.push(format!("<h3>{}</h3>", escape(text)));
            } else if let Some(text) = line.strip_prefix("## ") {
                out.push(format!("<h2>{}</h2>", escape(text)));
            } else if let Some(text) = line.strip_prefix("# ") {
                out.push(format!("<h1>{}</h1>", escape(text)));
            } else if let Some(text) = trimmed.strip_prefix('>') {
                out.push(format!("<blockquote>{}</blockquote>", escape(text.trim())));
            } else if !trimmed.is_empty() {
                out.push(format!("<p>{}</p>", escape(line)));
            }
        }

        // An unterminated fence keeps its content.
        if let Some(lines) = code {
            out.push(format!("<pre><code>{}</code></pre>", escape(&lines.join("\n"))));
        }
        close_list(&mut out, &mut list);
        out.join("\n")
    }
}

fn close_list(out: &mut Vec<String>, list: &mut Option<List>) {
    if let Some(kind) = list.take() {
        out.push(kind.close().to_string());
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl DocumentRenderer for HtmlRenderer {
    fn render(&self, markdown: &str, title: &str) -> Result<Vec<u8>> {
        let page = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
            escape(title),
            Self::body(markdown)
        );
        Ok(page.into_bytes())
    }

    fn extension(&self) -> &str {
        "html"
    }

    fn content_type(&self) -> &str {
        "text/html; charset=utf-8"
    }
}
