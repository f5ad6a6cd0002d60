// ABOUTME: Reply rendering - code-fence to HTML transform, markdown to HTML, message chunking
// ABOUTME: Fenced code keeps its literal newlines while prose newlines become <br/>

use std::sync::LazyLock;

use pulldown_cmark::{html, Parser};
use regex::Regex;

// Lazy body: ends at the first line opening with three backticks
static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^```([A-Za-z0-9_+#.-]+)?\n((?s:.*?)\n)^```")
        .expect("code fence pattern is valid")
});

/// Line break markup used for prose newlines
const PROSE_BREAK: &str = "<br/>";

/// Maximum chunk size for chat messages (chars)
pub const MAX_CHUNK_SIZE: usize = 8000;

/// Whether `text` contains anything the fence transform would touch
pub fn has_code_fence(text: &str) -> bool {
    text.contains("```")
}

/// Render text containing fenced code blocks as HTML.
///
/// Each fence becomes `<pre><code class="language-..">` with its body
/// escaped and its newlines preserved verbatim; every newline outside a fence
/// becomes `<br/>`.
pub fn render_code_fences(text: &str) -> String {
    let placeholder = pick_placeholder(text);
    let placeholder_str = placeholder.to_string();

    let spans: Vec<(usize, usize, Option<String>, String)> = CODE_FENCE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let body = caps.get(2)?;
            let lang = caps.get(1).map(|m| m.as_str().to_string());
            Some((whole.start(), whole.end(), lang, body.as_str().to_string()))
        })
        .collect();

    let mut html = text.to_string();

    // Highest offset first so earlier offsets stay valid after each splice
    for (start, end, lang, body) in spans.into_iter().rev() {
        let class = lang
            .map(|l| format!(r#" class="language-{}""#, escape_html(&l)))
            .unwrap_or_default();
        let code = escape_html(&body).replace('\n', &placeholder_str);
        let element = format!("<pre><code{}>{}</code></pre>", class, code);
        html.replace_range(start..end, &element);
    }

    html.replace('\n', PROSE_BREAK)
        .replace(placeholder, "\n")
}

/// Convert markdown to HTML for rich message formatting
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new(markdown);
    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);
    html_output
}

/// Wrap rendered HTML in a collapsible block with a summary line
pub fn details_summary(summary: &str, html: &str) -> String {
    format!("<details><summary>{}</summary>\n{}\n</details>", summary, html)
}

/// Escape the characters HTML treats as markup
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Split long text into chunks, trying to break at line boundaries
pub fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if !current.is_empty() && current.len() + line.len() + 1 > max_chars {
            chunks.push(std::mem::take(&mut current));
        }

        if line.len() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let mut part = String::new();
            for c in line.chars() {
                if part.len() + c.len_utf8() > max_chars {
                    chunks.push(std::mem::take(&mut part));
                }
                part.push(c);
            }
            current = part;
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// First private-use character that does not already occur in `text`
fn pick_placeholder(text: &str) -> char {
    ('\u{E000}'..='\u{F8FF}')
        .find(|c| !text.contains(*c))
        .unwrap_or('\u{FFFF}')
}
