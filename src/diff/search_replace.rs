use lazy_static::lazy_static;
use regex::Regex;
use similar::{ChangeTag, TextDiff};
use std::fmt;
use tracing::debug;

use crate::error::{RepatchError, RepatchResult};

/// Defines tolerance levels for matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToleranceLevel {
    /// Exact match
    Exact,
    /// Ignore trailing whitespace
    IgnoreTrailingWhitespace,
    /// Ignore leading whitespace (indentation)
    IgnoreLeadingWhitespace,
    /// Ignore all whitespace
    IgnoreAllWhitespace,
}

impl ToleranceLevel {
    const ALL: [ToleranceLevel; 4] = [
        ToleranceLevel::Exact,
        ToleranceLevel::IgnoreTrailingWhitespace,
        ToleranceLevel::IgnoreLeadingWhitespace,
        ToleranceLevel::IgnoreAllWhitespace,
    ];

    /// Normalizes a line for comparison at this level
    pub fn normalize(&self, line: &str) -> String {
        match self {
            ToleranceLevel::Exact => line.to_string(),
            ToleranceLevel::IgnoreTrailingWhitespace => line.trim_end().to_string(),
            ToleranceLevel::IgnoreLeadingWhitespace => line.trim().to_string(),
            ToleranceLevel::IgnoreAllWhitespace => line.split_whitespace().collect(),
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ToleranceLevel::Exact => "Exact match",
            ToleranceLevel::IgnoreTrailingWhitespace => "Ignoring trailing whitespace",
            ToleranceLevel::IgnoreLeadingWhitespace => "Ignoring indentation",
            ToleranceLevel::IgnoreAllWhitespace => "Ignoring all whitespace",
        }
    }
}

/// A located search block
#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceMatch {
    pub level: ToleranceLevel,
    /// Inclusive line range (start, end)
    pub range: (usize, usize),
}

impl ToleranceMatch {
    pub fn warning_message(&self) -> Option<String> {
        if self.level == ToleranceLevel::Exact {
            return None;
        }
        Some(format!(
            "{} for block at lines {}-{}",
            self.level.message(),
            self.range.0 + 1,
            self.range.1 + 1
        ))
    }
}

/// A search/replace block
#[derive(Debug, Clone, PartialEq)]
pub struct SearchReplaceBlock {
    pub search_lines: Vec<String>,
    pub replace_lines: Vec<String>,
}

impl fmt::Display for SearchReplaceBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "<<<<<<< SEARCH")?;
        for line in &self.search_lines {
            writeln!(f, "{}", line)?;
        }
        writeln!(f, "=======")?;
        for line in &self.replace_lines {
            writeln!(f, "{}", line)?;
        }
        writeln!(f, ">>>>>>> REPLACE")?;
        Ok(())
    }
}

/// Result of applying a set of blocks
#[derive(Debug, Clone)]
pub struct BlockEdit {
    pub content: String,
    pub warnings: Vec<String>,
    pub replaced: usize,
}

lazy_static! {
    static ref SEARCH_MARKER: Regex = Regex::new(r"^<{7,}\s*SEARCH\s*$").unwrap();
    static ref DIVIDER_MARKER: Regex = Regex::new(r"^={7,}\s*$").unwrap();
    static ref REPLACE_MARKER: Regex = Regex::new(r"^>{7,}\s*REPLACE\s*$").unwrap();
}

fn syntax_error(message: impl Into<String>, line: Option<usize>) -> RepatchError {
    let message = message.into();
    match line {
        Some(line) => RepatchError::parse_error(format!("line {}: {}", line, message)),
        None => RepatchError::parse_error(message),
    }
}

/// Parses search/replace blocks, in marker form or in the
/// `search:` / `replace:` prefix form
pub fn parse_search_replace_blocks(text: &str) -> RepatchResult<Vec<SearchReplaceBlock>> {
    let marker_err = match parse_marker_format(text) {
        Ok(blocks) => return Ok(blocks),
        Err(e) => e,
    };

    if let Ok(blocks) = parse_prefix_format(text) {
        return Ok(blocks);
    }

    Err(marker_err)
}

fn parse_marker_format(text: &str) -> RepatchResult<Vec<SearchReplaceBlock>> {
    let lines: Vec<&str> = text.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if !SEARCH_MARKER.is_match(lines[i]) {
            if REPLACE_MARKER.is_match(lines[i]) || DIVIDER_MARKER.is_match(lines[i]) {
                return Err(syntax_error(
                    format!("unexpected marker outside a block: {}", lines[i]),
                    Some(i + 1),
                ));
            }
            i += 1;
            continue;
        }

        let opened_at = i + 1;
        let mut search_lines = Vec::new();
        i += 1;

        while i < lines.len() && !DIVIDER_MARKER.is_match(lines[i]) {
            if SEARCH_MARKER.is_match(lines[i]) || REPLACE_MARKER.is_match(lines[i]) {
                return Err(syntax_error(
                    format!("unexpected marker in SEARCH block: {}", lines[i]),
                    Some(i + 1),
                ));
            }
            search_lines.push(lines[i].to_string());
            i += 1;
        }

        if i >= lines.len() {
            return Err(syntax_error("unclosed SEARCH block, missing =======", Some(opened_at)));
        }
        if search_lines.is_empty() {
            return Err(syntax_error("SEARCH block cannot be empty", Some(opened_at)));
        }

        i += 1;
        let mut replace_lines = Vec::new();

        while i < lines.len() && !REPLACE_MARKER.is_match(lines[i]) {
            if SEARCH_MARKER.is_match(lines[i]) || DIVIDER_MARKER.is_match(lines[i]) {
                return Err(syntax_error(
                    format!("unexpected marker in REPLACE block: {}", lines[i]),
                    Some(i + 1),
                ));
            }
            replace_lines.push(lines[i].to_string());
            i += 1;
        }

        if i >= lines.len() {
            return Err(syntax_error("unclosed block, missing REPLACE marker", Some(opened_at)));
        }

        blocks.push(SearchReplaceBlock {
            search_lines,
            replace_lines,
        });
        i += 1;
    }

    if blocks.is_empty() {
        return Err(syntax_error("no search/replace blocks found", None));
    }

    Ok(blocks)
}

fn parse_prefix_format(text: &str) -> RepatchResult<Vec<SearchReplaceBlock>> {
    let mut blocks = Vec::new();
    let mut in_search = false;
    let mut in_replace = false;
    let mut search_lines = Vec::new();
    let mut replace_lines = Vec::new();

    for (i, line) in text.lines().enumerate() {
        match line.trim() {
            "search:" => {
                if in_search {
                    return Err(syntax_error("'search:' without 'replace:' for previous block", Some(i + 1)));
                }
                if in_replace {
                    blocks.push(SearchReplaceBlock {
                        search_lines: std::mem::take(&mut search_lines),
                        replace_lines: std::mem::take(&mut replace_lines),
                    });
                }
                in_search = true;
                in_replace = false;
            }
            "replace:" => {
                if !in_search || search_lines.is_empty() {
                    return Err(syntax_error("'replace:' without preceding 'search:'", Some(i + 1)));
                }
                in_search = false;
                in_replace = true;
            }
            _ if in_search => search_lines.push(line.to_string()),
            _ if in_replace => replace_lines.push(line.to_string()),
            _ => {}
        }
    }

    if in_search {
        return Err(syntax_error("missing 'replace:' for last search block", None));
    }
    if in_replace {
        blocks.push(SearchReplaceBlock {
            search_lines,
            replace_lines,
        });
    }

    if blocks.is_empty() {
        return Err(syntax_error("no search/replace blocks found", None));
    }

    Ok(blocks)
}

/// Finds every location of `search_lines` at the strictest tolerance level
/// that yields at least one match
pub fn find_matches(content_lines: &[String], search_lines: &[String]) -> Vec<ToleranceMatch> {
    let mut matches = Vec::new();
    if search_lines.is_empty() || search_lines.len() > content_lines.len() {
        return matches;
    }

    for level in ToleranceLevel::ALL {
        let content: Vec<String> = content_lines.iter().map(|l| level.normalize(l)).collect();
        let search: Vec<String> = search_lines.iter().map(|l| level.normalize(l)).collect();

        for start in 0..=content.len() - search.len() {
            if content[start..start + search.len()] == search[..] {
                matches.push(ToleranceMatch {
                    level,
                    range: (start, start + search.len() - 1),
                });
            }
        }

        if !matches.is_empty() {
            break;
        }
    }

    matches
}

/// Outcome of locating a single block
#[derive(Debug)]
pub enum BlockLookup {
    Found(Vec<ToleranceMatch>),
    /// The search text is gone and the replacement is present, or the
    /// block deletes and has nothing left to remove
    AlreadyApplied,
    Missing,
}

/// Looks up one block, recognizing blocks whose replacement is already in place
pub fn lookup_block(content_lines: &[String], block: &SearchReplaceBlock) -> BlockLookup {
    let replaced_present = !block.replace_lines.is_empty()
        && !find_matches(content_lines, &block.replace_lines).is_empty();

    // A replacement that contains its own search text would match again
    if replaced_present && !find_matches(&block.replace_lines, &block.search_lines).is_empty() {
        return BlockLookup::AlreadyApplied;
    }

    let found = find_matches(content_lines, &block.search_lines);
    if !found.is_empty() {
        return BlockLookup::Found(found);
    }
    // A deleting block is done once its search text is gone
    if replaced_present || block.replace_lines.is_empty() {
        return BlockLookup::AlreadyApplied;
    }
    BlockLookup::Missing
}

/// Applies blocks in order; each block searches the output of the previous.
///
/// `Ok(None)` means every block was already applied. A block that is
/// neither found nor already applied yields `Err` with its index.
pub fn apply_search_replace(
    content: &str,
    blocks: &[SearchReplaceBlock],
) -> Result<Option<BlockEdit>, usize> {
    let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let trailing_newline = content.ends_with('\n');
    let mut lines: Vec<String> = content.lines().map(ToString::to_string).collect();
    let mut warnings = Vec::new();
    let mut replaced = 0;

    for (idx, block) in blocks.iter().enumerate() {
        let matches = match lookup_block(&lines, block) {
            BlockLookup::Found(matches) => matches,
            BlockLookup::AlreadyApplied => continue,
            BlockLookup::Missing => return Err(idx),
        };

        let best = &matches[0];
        if let Some(warning) = best.warning_message() {
            warnings.push(warning);
        }
        if matches.len() > 1 {
            warnings.push(format!(
                "Search block #{} matches {} places, using the first",
                idx + 1,
                matches.len()
            ));
        }

        let (start, end) = best.range;
        debug!(
            "Replacing block #{} at lines {}-{} with {} lines",
            idx + 1,
            start + 1,
            end + 1,
            block.replace_lines.len()
        );

        let replacement = if best.level == ToleranceLevel::IgnoreLeadingWhitespace {
            adjust_indentation(&lines[start..=end], &block.search_lines, &block.replace_lines)
        } else {
            block.replace_lines.clone()
        };

        lines.splice(start..=end, replacement);
        replaced += 1;
    }

    if replaced == 0 {
        return Ok(None);
    }

    let mut content = lines.join(newline);
    if trailing_newline {
        content.push_str(newline);
    }

    Ok(Some(BlockEdit {
        content,
        warnings,
        replaced,
    }))
}

fn leading_whitespace(line: &str) -> &str {
    let end = line.len() - line.trim_start().len();
    &line[..end]
}

/// Re-indents replacement lines by the indentation the file adds on top
/// of the search block
pub fn adjust_indentation(
    original_lines: &[String],
    search_lines: &[String],
    replace_lines: &[String],
) -> Vec<String> {
    let pair = original_lines
        .iter()
        .zip(search_lines.iter())
        .find(|(o, s)| !o.trim().is_empty() && !s.trim().is_empty());

    let (orig_indent, search_indent) = match pair {
        Some((o, s)) => (leading_whitespace(o), leading_whitespace(s)),
        None => return replace_lines.to_vec(),
    };

    // Only the case where the file is indented deeper than the search text is
    // handled; otherwise the replacement is used verbatim.
    let extra = match orig_indent.strip_suffix(search_indent) {
        Some(extra) => extra,
        None => return replace_lines.to_vec(),
    };

    replace_lines
        .iter()
        .map(|line| {
            if line.trim().is_empty() {
                line.clone()
            } else {
                format!("{}{}", extra, line)
            }
        })
        .collect()
}

/// Finds the line closest to `needle`, for "did you mean" hints.
/// Returns the index and a distance score (0 is identical).
pub fn find_best_match_line(content_lines: &[&str], needle: &str) -> Option<(usize, f64)> {
    let needle = needle.trim();
    if needle.is_empty() {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for (i, line) in content_lines.iter().enumerate() {
        let line = line.trim();
        if line == needle {
            return Some((i, 0.0));
        }
        let score = 1.0 - similarity_score(line, needle);
        if best.map_or(true, |(_, s)| score < s) {
            best = Some((i, score));
        }
    }
    best
}

/// Similarity between two strings (0-1, higher is better)
pub fn similarity_score(s1: &str, s2: &str) -> f64 {
    let total = s1.chars().count() + s2.chars().count();
    if total == 0 {
        return 1.0;
    }

    let diff = TextDiff::from_chars(s1, s2);
    let unchanged: usize = diff
        .iter_all_changes()
        .filter(|c| c.tag() == ChangeTag::Equal)
        .map(|c| c.value().chars().count())
        .sum();

    (2.0 * unchanged as f64) / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_search_replace_blocks() {
        let text = r#"<<<<<<< SEARCH
function hello() {
    console.log("Hello");
}
=======
function hello() {
    console.log("Hello, World!");
}
>>>>>>> REPLACE
<<<<<<< SEARCH
const x = 5;
=======
const x = 10;
>>>>>>> REPLACE"#;

        let blocks = parse_search_replace_blocks(text).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].search_lines.len(), 3);
        assert_eq!(blocks[0].replace_lines.len(), 3);
        assert_eq!(blocks[1].search_lines, lines(&["const x = 5;"]));
    }

    #[test]
    fn test_parse_prefix_format() {
        let text = "search:\nconst a = 1;\nreplace:\nconst a = 2;\nsearch:\nlet b;\nreplace:\nlet b = 0;\n";
        let blocks = parse_search_replace_blocks(text).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].replace_lines, lines(&["let b = 0;"]));
    }

    #[test]
    fn test_parse_invalid_block() {
        let text = "<<<<<<< SEARCH\nfunction hello() {\n>>>>>>> REPLACE";
        assert!(parse_search_replace_blocks(text).is_err());
    }

    #[test]
    fn test_find_matches_with_tolerance() {
        let content = lines(&["function hello() {", "        console.log(\"Hello\");", "}"]);
        let search = lines(&["function hello() {", "    console.log(\"Hello\");", "}"]);

        let matches = find_matches(&content, &search);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].range, (0, 2));
        assert_eq!(matches[0].level, ToleranceLevel::IgnoreLeadingWhitespace);
    }

    #[test]
    fn test_apply_keeps_trailing_newline() {
        let content = "function hello() {\n    console.log(\"Hello\");\n}\n\nconst x = 5;\n";
        let blocks = vec![SearchReplaceBlock {
            search_lines: lines(&["const x = 5;"]),
            replace_lines: lines(&["const x = 10;"]),
        }];

        let edit = apply_search_replace(content, &blocks).unwrap().unwrap();
        assert_eq!(edit.replaced, 1);
        assert_eq!(
            edit.content,
            "function hello() {\n    console.log(\"Hello\");\n}\n\nconst x = 10;\n"
        );

        // Second run finds the replacement already in place
        assert!(apply_search_replace(&edit.content, &blocks).unwrap().is_none());
    }

    #[test]
    fn test_apply_reports_missing_block() {
        let blocks = vec![
            SearchReplaceBlock {
                search_lines: lines(&["a"]),
                replace_lines: lines(&["b"]),
            },
            SearchReplaceBlock {
                search_lines: lines(&["zzz"]),
                replace_lines: lines(&["yyy"]),
            },
        ];
        assert_eq!(apply_search_replace("a\nc\n", &blocks).unwrap_err(), 1);
    }

    #[test]
    fn test_deleting_block_is_idempotent() {
        let blocks = vec![SearchReplaceBlock {
            search_lines: lines(&["console.log('debug');"]),
            replace_lines: vec![],
        }];
        let content = "start();\nconsole.log('debug');\nend();\n";

        let edit = apply_search_replace(content, &blocks).unwrap().unwrap();
        assert_eq!(edit.content, "start();\nend();\n");
        assert!(apply_search_replace(&edit.content, &blocks).unwrap().is_none());
    }

    #[test]
    fn test_adjust_indentation() {
        let original = lines(&[
            "    function hello() {",
            "        console.log(\"Hello\");",
            "    }",
        ]);
        let search = lines(&["function hello() {", "    console.log(\"Hello\");", "}"]);
        let replace = lines(&["function hello() {", "    console.log(\"Hello, World!\");", "}"]);

        assert_eq!(
            adjust_indentation(&original, &search, &replace),
            lines(&[
                "    function hello() {",
                "        console.log(\"Hello, World!\");",
                "    }",
            ])
        );
    }

    #[test]
    fn test_best_match_line() {
        let content = ["const a = 1;", "    handleFormSubmit: async (e) => {", "}"];
        let (idx, score) = find_best_match_line(&content, "handleFormSubmit: async (event) => {").unwrap();
        assert_eq!(idx, 1);
        assert!(score > 0.0 && score < 0.5);
    }
}
