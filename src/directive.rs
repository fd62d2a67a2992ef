//! Directive Extractor
//!
//! Reads the comment directives that steer instrumentation:
//!
//! - `@uniforms-ignore` within the first [`FILE_MARKER_WINDOW`] characters: leave the file alone.
//! - `@uniforms-include-only` anywhere in a comment: the file switches to opt-in mode.
//! - `@gui` / `@no-gui` before a declaration: opt in / opt out.
//! - `@range: { min: -5, max: 5, step: 0.1 }`: slider bounds. Keys may be unquoted.
//!
//! Comments are located by span only. Everything else is textual, so the
//! extractor is independent of how the parser attaches comments to nodes.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Step used for numeric sliders when no `@range` step is given.
pub const DEFAULT_STEP: f64 = 0.01;

/// How far into the file the skip marker is looked for.
pub const FILE_MARKER_WINDOW: usize = 300;

lazy_static! {
    static ref SKIP_FILE_RE: Regex = Regex::new(r"@uniforms-ignore\b").unwrap();
    static ref INCLUDE_ONLY_RE: Regex = Regex::new(r"@uniforms-include-only\b").unwrap();
    static ref OPT_IN_RE: Regex = Regex::new(r"(?:^|[^\w-])@gui(?:[^\w-]|$)").unwrap();
    static ref OPT_OUT_RE: Regex = Regex::new(r"@no-gui\b").unwrap();
    static ref RANGE_RE: Regex = Regex::new(r"@range\s*:?\s*(\{[^}]*\})").unwrap();
    static ref JSDOC_CONTINUATION_RE: Regex = Regex::new(r"\n\s*\*").unwrap();
    static ref BARE_KEY_RE: Regex =
        Regex::new(r"([{,]\s*)([A-Za-z_$][A-Za-z0-9_$]*)\s*:").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIRECTIVE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Whether every declaration is instrumented or only the ones marked `@gui`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InclusionMode {
    #[default]
    All,
    IncludeOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileDirectives {
    pub skip: bool,
    pub mode: InclusionMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeDirective {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: f64,
}

impl Default for RangeDirective {
    fn default() -> Self {
        RangeDirective {
            min: None,
            max: None,
            step: DEFAULT_STEP,
        }
    }
}

#[derive(Deserialize)]
struct RawRange {
    min: Option<f64>,
    max: Option<f64>,
    step: Option<f64>,
}

/// Per-declaration overrides parsed from the comments in front of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directive {
    pub mode: InclusionMode,
    pub opt_in: bool,
    pub opt_out: bool,
    pub range: Option<RangeDirective>,
}

impl Directive {
    pub fn is_included(&self) -> bool {
        if self.opt_out {
            return false;
        }
        match self.mode {
            InclusionMode::All => true,
            InclusionMode::IncludeOnly => self.opt_in,
        }
    }

    /// Slider settings with the default step filled in.
    pub fn range_or_default(&self) -> RangeDirective {
        self.range.unwrap_or_default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE-LEVEL MARKERS
// ═══════════════════════════════════════════════════════════════════════════════

/// The skip marker only counts near the top of the file.
pub fn has_skip_marker(source: &str) -> bool {
    SKIP_FILE_RE.is_match(head(source, FILE_MARKER_WINDOW))
}

pub fn file_directives(source: &str, comments: &[CommentRange]) -> FileDirectives {
    let include_only = comments
        .iter()
        .any(|c| INCLUDE_ONLY_RE.is_match(c.text(source)));
    FileDirectives {
        skip: has_skip_marker(source),
        mode: if include_only {
            InclusionMode::IncludeOnly
        } else {
            InclusionMode::All
        },
    }
}

fn head(source: &str, max: usize) -> &str {
    if source.len() <= max {
        return source;
    }
    let mut end = max;
    while !source.is_char_boundary(end) {
        end -= 1;
    }
    &source[..end]
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMENT LOCATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Byte range of one comment, delimiters included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentRange {
    pub start: usize,
    pub end: usize,
}

impl CommentRange {
    /// Builds a range from a parser span, widening it to cover `//`, `/*` and
    /// `*/` when the span only covers the comment body.
    pub fn from_span(source: &str, start: u32, end: u32) -> Self {
        let bytes = source.as_bytes();
        let mut start = start as usize;
        let mut end = (end as usize).min(bytes.len());

        let opens = |at: usize| {
            bytes.get(at..at + 2) == Some(b"//") || bytes.get(at..at + 2) == Some(b"/*")
        };
        if !opens(start) && start >= 2 && opens(start - 2) {
            let block = bytes.get(start - 2..start) == Some(b"/*");
            start -= 2;
            if block && bytes.get(end..end + 2) == Some(b"*/") {
                end += 2;
            }
        }
        CommentRange { start, end }
    }

    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.start..self.end).unwrap_or("")
    }

    /// A comment with code before it on the same line trails that code.
    fn is_trailing(&self, source: &str) -> bool {
        let line_start = source[..self.start].rfind('\n').map_or(0, |i| i + 1);
        !source[line_start..self.start].trim().is_empty()
    }
}

/// Collects the directive text that applies to a declaration.
///
/// `anchors` are the start offsets of the declarator, its statement and the
/// statement's parent (e.g. an `export`). Two sources are merged:
///
/// 1. the nearest comment before the outermost anchor, separated from it by
///    at most one line break and nothing but whitespace or `;`;
/// 2. every comment run directly in front of any anchor.
///
/// Comments that trail code on their own line belong to that code and are
/// ignored.
pub fn directive_text(source: &str, comments: &[CommentRange], anchors: &[usize]) -> String {
    let mut picked: Vec<CommentRange> = Vec::new();

    if let Some(&outer) = anchors.iter().min() {
        if let Some(nearest) = comments
            .iter()
            .filter(|c| c.end <= outer && !c.is_trailing(source))
            .max_by_key(|c| c.end)
        {
            let gap = &source[nearest.end..outer];
            let only_terminators = gap.chars().all(|ch| ch.is_whitespace() || ch == ';');
            if only_terminators && gap.matches('\n').count() <= 1 {
                picked.push(*nearest);
            }
        }
    }

    for &anchor in anchors {
        let mut pos = anchor;
        while let Some(prev) = comments
            .iter()
            .filter(|c| c.end <= pos && !c.is_trailing(source))
            .max_by_key(|c| c.end)
        {
            if !source[prev.end..pos].trim().is_empty() {
                break;
            }
            picked.push(*prev);
            pos = prev.start;
        }
    }

    picked.sort_by_key(|c| c.start);
    picked.dedup();
    picked
        .iter()
        .map(|c| c.text(source))
        .collect::<Vec<_>>()
        .join("\n")
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIRECTIVE PARSING
// ═══════════════════════════════════════════════════════════════════════════════

pub fn parse_directive(text: &str, mode: InclusionMode) -> Directive {
    Directive {
        mode,
        opt_in: OPT_IN_RE.is_match(text),
        opt_out: OPT_OUT_RE.is_match(text),
        range: parse_range(text),
    }
}

/// Parses the `@range` payload. Strict JSON is tried first, then again with
/// bare keys quoted. A payload that fails both is dropped with a warning.
pub fn parse_range(text: &str) -> Option<RangeDirective> {
    let caps = RANGE_RE.captures(text)?;
    let payload = JSDOC_CONTINUATION_RE.replace_all(&caps[1], " ");

    let raw = serde_json::from_str::<RawRange>(&payload).or_else(|_| {
        let quoted = BARE_KEY_RE.replace_all(&payload, "${1}\"${2}\":");
        serde_json::from_str::<RawRange>(&quoted)
    });

    match raw {
        Ok(raw) => Some(RangeDirective {
            min: raw.min,
            max: raw.max,
            step: raw.step.unwrap_or(DEFAULT_STEP),
        }),
        Err(e) => {
            log::warn!(
                "[tsl-uniform-gui] ignoring malformed @range directive {}: {}",
                payload.trim(),
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comments_of(source: &str, needles: &[&str]) -> Vec<CommentRange> {
        needles
            .iter()
            .map(|n| {
                let start = source.find(n).unwrap();
                CommentRange {
                    start,
                    end: start + n.len(),
                }
            })
            .collect()
    }

    #[test]
    fn test_range_with_bare_keys() {
        let range = parse_range("// @range: {min:-5,max:5,step:0.1}").unwrap();
        assert_eq!(range.min, Some(-5.0));
        assert_eq!(range.max, Some(5.0));
        assert_eq!(range.step, 0.1);
    }

    #[test]
    fn test_range_strict_json_and_default_step() {
        let range = parse_range(r#"/* @range: {"min": 0, "max": 2} */"#).unwrap();
        assert_eq!(range.min, Some(0.0));
        assert_eq!(range.max, Some(2.0));
        assert_eq!(range.step, DEFAULT_STEP);
    }

    #[test]
    fn test_range_inside_jsdoc() {
        let text = "/**\n * @gui\n * @range: { min: 0, max: 5, step: 0.01 }\n */";
        let range = parse_range(text).unwrap();
        assert_eq!(range.max, Some(5.0));
        assert_eq!(range.step, 0.01);
    }

    #[test]
    fn test_malformed_range_is_dropped() {
        assert!(parse_range("// @range: {min: low, max: 5}").is_none());
        let directive = parse_directive("// @range: {min: low}", InclusionMode::All);
        assert_eq!(directive.range_or_default().step, DEFAULT_STEP);
    }

    #[test]
    fn test_opt_in_does_not_match_opt_out() {
        let d = parse_directive("// @no-gui", InclusionMode::IncludeOnly);
        assert!(!d.opt_in);
        assert!(d.opt_out);
        assert!(!d.is_included());

        let d = parse_directive("//@gui", InclusionMode::IncludeOnly);
        assert!(d.opt_in);
        assert!(d.is_included());
    }

    #[test]
    fn test_opt_in_needs_whole_word() {
        assert!(!parse_directive("// @gui-hidden", InclusionMode::IncludeOnly).opt_in);
        assert!(!parse_directive("// @guide", InclusionMode::IncludeOnly).opt_in);
        assert!(parse_directive("/* @gui */", InclusionMode::IncludeOnly).opt_in);
        assert!(parse_directive("// @gui: slider", InclusionMode::IncludeOnly).opt_in);
    }

    #[test]
    fn test_inclusion_modes() {
        let plain = parse_directive("", InclusionMode::All);
        assert!(plain.is_included());
        let plain = parse_directive("", InclusionMode::IncludeOnly);
        assert!(!plain.is_included());
    }

    #[test]
    fn test_skip_marker_window() {
        assert!(has_skip_marker("// @uniforms-ignore\nconst a = 1;"));
        let late = format!("{}\n// @uniforms-ignore", "x".repeat(400));
        assert!(!has_skip_marker(&late));
    }

    #[test]
    fn test_comment_span_widening() {
        let source = "a; /* hi */ b; // yo\n";
        let body_start = source.find(" hi").unwrap() as u32;
        let block = CommentRange::from_span(source, body_start, body_start + 4);
        assert_eq!(block.text(source), "/* hi */");

        let full_start = source.find("//").unwrap() as u32;
        let line = CommentRange::from_span(source, full_start, full_start + 5);
        assert_eq!(line.text(source), "// yo");
    }

    #[test]
    fn test_nearest_comment_allows_one_line_break() {
        let source = "//@gui\nconst a = uniform(1);";
        let comments = comments_of(source, &["//@gui"]);
        let anchor = source.find("const").unwrap();
        assert_eq!(directive_text(source, &comments, &[anchor]), "//@gui");
    }

    #[test]
    fn test_trailing_comment_belongs_to_previous_statement() {
        let source = "const a = uniform(1); // @no-gui\nconst b = uniform(2);";
        let comments = comments_of(source, &["// @no-gui"]);
        let anchor = source.find("const b").unwrap();
        assert_eq!(directive_text(source, &comments, &[anchor]), "");
    }

    #[test]
    fn test_attached_comment_run_on_parent_statement() {
        let source = "/**\n * @gui\n */\n\nexport const a = uniform(1);";
        let comments = comments_of(source, &["/**\n * @gui\n */"]);
        let export_start = source.find("export").unwrap();
        let decl_start = source.find("const").unwrap();
        let text = directive_text(source, &comments, &[decl_start, export_start]);
        assert!(text.contains("@gui"));
    }

    #[test]
    fn test_code_between_comment_and_declaration_detaches_it() {
        let source = "// @gui\nfoo();\nconst a = uniform(1);";
        let comments = comments_of(source, &["// @gui"]);
        let anchor = source.find("const").unwrap();
        assert_eq!(directive_text(source, &comments, &[anchor]), "");
    }
}
