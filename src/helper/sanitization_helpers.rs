use pulldown_cmark::{Event, Parser, Tag};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn code_block_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[\s\S]*?```").ok()).as_ref()
}

/// Escapes all HTML outside fenced code blocks, leaving the blocks untouched.
/// Entities are decoded first so already-escaped input is not escaped twice.
pub fn sanitize_markdown_content(markdown_input: &str) -> String {
    let mut code_blocks: Vec<String> = Vec::new();

    let with_placeholders = match code_block_regex() {
        Some(re) => re
            .replace_all(markdown_input, |caps: &regex::Captures| {
                code_blocks.push(caps[0].to_string());
                format!("__CODE_BLOCK_PLACEHOLDER_{}__", code_blocks.len() - 1)
            })
            .into_owned(),
        None => markdown_input.to_string(),
    };

    let decoded = html_escape::decode_html_entities(&with_placeholders);
    let mut output = html_escape::encode_text(&decoded).to_string();

    for (i, block) in code_blocks.iter().enumerate() {
        let placeholder = format!("__CODE_BLOCK_PLACEHOLDER_{}__", i);
        output = output.replacen(&placeholder, block, 1);
    }
    output
}

/// Strips all HTML tags (for titles and short fields).
pub fn strip_all_html(input: &str) -> String {
    ammonia::Builder::new().tags(HashSet::new()).clean(input).to_string()
}

/// Plain text from an HTML fragment: tags removed, entities decoded, whitespace collapsed.
pub fn html_to_text(input: &str) -> String {
    let stripped = strip_all_html(input);
    let decoded = html_escape::decode_html_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A plain-text excerpt of a markdown body, cut on a char boundary.
pub fn excerpt(markdown: &str, max_chars: usize) -> String {
    let mut text = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak | Event::HardBreak | Event::End(Tag::Paragraph) | Event::End(Tag::Heading(..)) => {
                text.push(' ')
            }
            _ => {}
        }
    }
    let text = html_escape::decode_html_entities(&text);
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

/// Trims tags, drops empties and keeps the first spelling of case-insensitive duplicates.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|t| strip_all_html(t.trim()))
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}

/// `None` for absent or blank values, otherwise the stripped text.
pub fn clean_optional(input: Option<&str>) -> Option<String> {
    input.map(|s| strip_all_html(s.trim())).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_escapes_html_but_keeps_code_blocks() {
        let input = "Hello <script>alert(1)</script>\n```\n<b>code</b>\n```";
        let out = sanitize_markdown_content(input);
        assert!(out.contains("&lt;script&gt;"));
        assert!(out.contains("```\n<b>code</b>\n```"));
    }

    #[test]
    fn markdown_does_not_double_escape() {
        assert_eq!(sanitize_markdown_content("a &lt; b"), "a &lt; b");
    }

    #[test]
    fn html_to_text_decodes_entities() {
        assert_eq!(html_to_text("<p>Rates &amp; <b>bonds</b></p>\n<p>rally</p>"), "Rates & bonds rally");
    }

    #[test]
    fn excerpt_flattens_markdown_and_truncates() {
        let md = "# Fed holds\n\nRates stay **unchanged** this quarter.";
        assert_eq!(excerpt(md, 200), "Fed holds Rates stay unchanged this quarter.");
        assert_eq!(excerpt(md, 9), "Fed holds…");
    }

    #[test]
    fn tags_are_deduplicated_case_insensitively() {
        let tags = vec![" Markets ".to_string(), "markets".to_string(), "".to_string(), "FX".to_string()];
        assert_eq!(normalize_tags(&tags), vec!["Markets".to_string(), "FX".to_string()]);
    }
}
