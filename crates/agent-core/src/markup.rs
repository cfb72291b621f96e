//! Tool Markup
//!
//! Scans model output for the two XML-like tool tags the system prompt
//! teaches the model:
//!
//! ```text
//! <read_file><path>PATH</path></read_file>
//! <write_to_file><path>PATH</path><content>TEXT</content></write_to_file>
//! ```
//!
//! The text is model-generated, so the scanner is lenient: anything that
//! does not parse is skipped without an error and scanning moves on.

use std::ops::Range;

use crate::tool::ToolInvocation;

const READ_OPEN: &str = "<read_file>";
const READ_CLOSE: &str = "</read_file>";
const WRITE_OPEN: &str = "<write_to_file>";
const WRITE_CLOSE: &str = "</write_to_file>";
const PATH_OPEN: &str = "<path>";
const PATH_CLOSE: &str = "</path>";
const CONTENT_OPEN: &str = "<content>";
const CONTENT_CLOSE: &str = "</content>";

/// A well-formed tool tag and where it sits in the scanned text
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkupMatch {
    /// Byte range of the whole tag, opening to closing
    pub span: Range<usize>,
    pub invocation: ToolInvocation,
}

#[derive(Clone, Copy, Debug)]
enum TagKind {
    Read,
    Write,
}

impl TagKind {
    const fn open(self) -> &'static str {
        match self {
            Self::Read => READ_OPEN,
            Self::Write => WRITE_OPEN,
        }
    }
}

/// Lazy iterator over the tool tags in a response
#[derive(Clone, Debug)]
pub struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

/// Start a fresh scan of `text`
pub fn scan(text: &str) -> Scanner<'_> {
    Scanner { text, pos: 0 }
}

/// Every well-formed invocation in `text`, in order of appearance
pub fn extract(text: &str) -> Vec<ToolInvocation> {
    scan(text).map(|m| m.invocation).collect()
}

/// `text` with every well-formed tool tag removed, trimmed for display
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in scan(text) {
        out.push_str(&text[last..m.span.start]);
        last = m.span.end;
    }
    out.push_str(&text[last..]);
    out.trim().to_string()
}

impl Iterator for Scanner<'_> {
    type Item = MarkupMatch;

    fn next(&mut self) -> Option<MarkupMatch> {
        loop {
            let (offset, kind) = next_opening(&self.text[self.pos..])?;
            let start = self.pos + offset;
            let body = start + kind.open().len();

            let parsed = match kind {
                TagKind::Read => parse_read(self.text, body),
                TagKind::Write => parse_write(self.text, body),
            };

            match parsed {
                Some((invocation, end)) => {
                    self.pos = end;
                    return Some(MarkupMatch {
                        span: start..end,
                        invocation,
                    });
                }
                None => {
                    tracing::trace!(
                        offset = start,
                        tag = kind.open(),
                        "skipping malformed tool markup"
                    );
                    self.pos = body;
                }
            }
        }
    }
}

/// Earliest opening tag in `rest`
fn next_opening(rest: &str) -> Option<(usize, TagKind)> {
    [TagKind::Read, TagKind::Write]
        .into_iter()
        .filter_map(|kind| rest.find(kind.open()).map(|i| (i, kind)))
        .min_by_key(|(i, _)| *i)
}

fn parse_read(text: &str, body: usize) -> Option<(ToolInvocation, usize)> {
    let mut cursor = Cursor { text, pos: body };
    let path = clean_path(cursor.field(PATH_OPEN, PATH_CLOSE)?)?;
    cursor.skip_whitespace();
    cursor.expect(READ_CLOSE)?;
    Some((ToolInvocation::ReadFile { path }, cursor.pos))
}

fn parse_write(text: &str, body: usize) -> Option<(ToolInvocation, usize)> {
    let mut cursor = Cursor { text, pos: body };
    let path = clean_path(cursor.field(PATH_OPEN, PATH_CLOSE)?)?;
    let content = cursor.field(CONTENT_OPEN, CONTENT_CLOSE)?.to_string();
    cursor.skip_whitespace();
    cursor.expect(WRITE_CLOSE)?;
    Some((ToolInvocation::WriteFile { path, content }, cursor.pos))
}

/// Trimmed path, or `None` when it is empty or ran into other markup
fn clean_path(raw: &str) -> Option<String> {
    let path = raw.trim();
    if path.is_empty() || path.contains('<') {
        return None;
    }
    Some(path.to_string())
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn expect(&mut self, tag: &str) -> Option<()> {
        if self.rest().starts_with(tag) {
            self.pos += tag.len();
            Some(())
        } else {
            None
        }
    }

    /// Everything up to the first `close`, leaving the cursor after it
    fn take_until(&mut self, close: &str) -> Option<&'a str> {
        let rest = self.rest();
        let end = rest.find(close)?;
        self.pos += end + close.len();
        Some(&rest[..end])
    }

    /// `open` (after optional whitespace), then the raw inner text up to `close`
    fn field(&mut self, open: &str, close: &str) -> Option<&'a str> {
        self.skip_whitespace();
        self.expect(open)?;
        self.take_until(close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: &str) -> ToolInvocation {
        ToolInvocation::ReadFile { path: path.into() }
    }

    fn write(path: &str, content: &str) -> ToolInvocation {
        ToolInvocation::WriteFile {
            path: path.into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_read_inside_prose() {
        let text = "I'll read that file.\n<read_file><path>config.json</path></read_file>\nDone.";
        assert_eq!(extract(text), vec![read("config.json")]);
    }

    #[test]
    fn test_path_is_trimmed() {
        let text = "<read_file>\n  <path>  src/main.rs \n</path>\n</read_file>";
        assert_eq!(extract(text), vec![read("src/main.rs")]);
    }

    #[test]
    fn test_write_content_is_verbatim() {
        let content = "\nfn main() {\n    println!(\"<b>hi</b>\");\n}\n\n";
        let text = format!(
            "Writing:\n<write_to_file>\n<path>src/main.rs</path>\n<content>{content}</content>\n</write_to_file>"
        );
        assert_eq!(extract(&text), vec![write("src/main.rs", content)]);
    }

    #[test]
    fn test_content_may_contain_tag_lookalikes() {
        let content = "<path>not a path</path>\n<read_file>";
        let text = format!(
            "<write_to_file><path>notes.md</path><content>{content}</content></write_to_file>"
        );
        assert_eq!(extract(&text), vec![write("notes.md", content)]);
    }

    #[test]
    fn test_order_follows_the_text() {
        let text = concat!(
            "<write_to_file><path>a.txt</path><content>1</content></write_to_file>\n",
            "<read_file><path>b.txt</path></read_file>\n",
            "<write_to_file><path>c.txt</path><content>3</content></write_to_file>",
        );
        assert_eq!(
            extract(text),
            vec![write("a.txt", "1"), read("b.txt"), write("c.txt", "3")]
        );
    }

    #[test]
    fn test_missing_path_close_is_skipped() {
        assert!(extract("<read_file><path>a.txt</read_file>").is_empty());
    }

    #[test]
    fn test_malformed_does_not_hide_later_markup() {
        let text =
            "<read_file><path>a.txt</read_file> then <read_file><path>b.txt</path></read_file>";
        assert_eq!(extract(text), vec![read("b.txt")]);
    }

    #[test]
    fn test_malformed_variants() {
        let cases = [
            "<read_file><path></path></read_file>",
            "<read_file><path>   </path></read_file>",
            "<read_file><path>a.txt</path>",
            "<read_file>a.txt</read_file>",
            "<write_to_file><path>a.txt</path></write_to_file>",
            "<write_to_file><content>x</content><path>a.txt</path></write_to_file>",
            "<write_to_file><path>a.txt</path><content>unterminated</write_to_file>",
            "<READ_FILE><path>a.txt</path></READ_FILE>",
            "<readfile><path>a.txt</path></readfile>",
        ];
        for case in cases {
            assert!(extract(case).is_empty(), "expected nothing from {case:?}");
        }
    }

    #[test]
    fn test_no_markup() {
        assert!(extract("Just an answer, no tools.").is_empty());
        assert!(extract("").is_empty());
    }

    #[test]
    fn test_scan_is_restartable() {
        let text = "<read_file><path>x</path></read_file>";
        assert_eq!(scan(text).count(), 1);
        assert_eq!(scan(text).count(), 1);
    }

    #[test]
    fn test_spans_cover_the_tag() {
        let text = "ab<read_file><path>x</path></read_file>cd";
        let m = scan(text).next().unwrap();
        assert_eq!(&text[m.span], "<read_file><path>x</path></read_file>");
    }

    #[test]
    fn test_strip_markup() {
        let text = "I'll read that file.\n<read_file><path>config.json</path></read_file>";
        assert_eq!(strip_markup(text), "I'll read that file.");

        let text =
            "Before\n<write_to_file><path>a</path><content>x</content></write_to_file>\nAfter";
        assert_eq!(strip_markup(text), "Before\n\nAfter");
    }

    #[test]
    fn test_strip_markup_leaves_malformed_text() {
        let text = "<read_file><path>a.txt</read_file>";
        assert_eq!(strip_markup(text), text);
    }
}
