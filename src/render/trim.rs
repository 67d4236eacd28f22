/// Apply block-level whitespace control to template source before Tera sees it.
///
/// Mirrors the `trim_blocks` + `lstrip_blocks` pair device templates are
/// written against:
/// - whitespace between the start of a line and a `{%` or `{#` tag is dropped
/// - the newline directly after a line-ending `%}` or `#}` is dropped
///
/// so a loop or conditional on a line of its own leaves no blank line behind.
/// Variable tags (`{{ }}`) are never touched. Line endings are normalized to
/// `\n` first.
pub fn trim_block_whitespace(source: &str) -> String {
    let normalized = source.replace("\r\n", "\n");
    let mut out = String::with_capacity(normalized.len());

    let mut lines = normalized.split('\n').peekable();
    while let Some(line) = lines.next() {
        let stripped = line.trim_start();
        let line = if is_tag_start(stripped) { stripped } else { line };
        out.push_str(line);

        if lines.peek().is_some() && !is_tag_end(line) {
            out.push('\n');
        }
    }

    out
}

fn is_tag_start(s: &str) -> bool {
    s.starts_with("{%") || s.starts_with("{#")
}

fn is_tag_end(s: &str) -> bool {
    s.ends_with("%}") || s.ends_with("#}")
}
