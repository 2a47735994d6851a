use regex::{Regex, RegexBuilder};
use std::ops::Range;

use crate::diff::search_replace::{apply_search_replace, parse_search_replace_blocks};
use crate::error::RepatchResult;
use crate::patch::{Edit, Occurrences};

/// Result of running one edit against some content
#[derive(Debug, Clone, PartialEq)]
pub enum EditEffect {
    Applied {
        content: String,
        count: usize,
        warnings: Vec<String>,
    },
    /// The anchor is gone and the edit's result is already in place
    AlreadyApplied,
    Missing {
        anchor: String,
    },
    CountMismatch {
        expected: usize,
        found: usize,
    },
}

impl EditEffect {
    fn applied(content: String, count: usize) -> Self {
        EditEffect::Applied {
            content,
            count,
            warnings: Vec::new(),
        }
    }

    fn missing(anchor: &str) -> Self {
        EditEffect::Missing {
            anchor: anchor.to_string(),
        }
    }
}

/// Apply a single edit to `content`. Never touches the filesystem.
pub fn apply_edit(content: &str, edit: &Edit) -> RepatchResult<EditEffect> {
    let effect = match edit {
        Edit::Replace {
            find,
            with,
            occurrences,
        } => replace_literal(content, find, with, *occurrences),
        Edit::Regex {
            pattern,
            with,
            dot_all,
            expand,
            occurrences,
        } => {
            let re = RegexBuilder::new(pattern)
                .dot_matches_new_line(*dot_all)
                .build()?;
            replace_regex(content, &re, with, *expand, *occurrences)
        }
        Edit::InsertBefore { anchor, text } => {
            if content.contains(&format!("{}{}", text, anchor)) {
                return Ok(EditEffect::AlreadyApplied);
            }
            match content.find(anchor.as_str()) {
                Some(pos) => EditEffect::applied(splice(content, pos, text), 1),
                None => EditEffect::missing(anchor),
            }
        }
        Edit::InsertAfter { anchor, text } => {
            if content.contains(&format!("{}{}", anchor, text)) {
                return Ok(EditEffect::AlreadyApplied);
            }
            match content.find(anchor.as_str()) {
                Some(pos) => EditEffect::applied(splice(content, pos + anchor.len(), text), 1),
                None => EditEffect::missing(anchor),
            }
        }
        Edit::InsertAfterBlock {
            anchor,
            close,
            text,
        } => insert_after_block(content, anchor, close, text),
        Edit::ReplaceLines {
            contains,
            start_marker,
            end_marker,
            text,
        } => replace_lines(content, contains, start_marker, end_marker, text),
        Edit::Append { text } => {
            if content.contains(text.as_str()) {
                EditEffect::AlreadyApplied
            } else {
                EditEffect::applied(format!("{}{}", content, text), 1)
            }
        }
        Edit::Blocks { blocks } => {
            let blocks = parse_search_replace_blocks(blocks)?;
            match apply_search_replace(content, &blocks) {
                Ok(Some(edit)) => EditEffect::Applied {
                    content: edit.content,
                    count: edit.replaced,
                    warnings: edit.warnings,
                },
                Ok(None) => EditEffect::AlreadyApplied,
                Err(idx) => EditEffect::Missing {
                    anchor: blocks[idx].search_lines.join("\n"),
                },
            }
        }
    };

    Ok(effect)
}

fn splice(content: &str, pos: usize, text: &str) -> String {
    let mut out = String::with_capacity(content.len() + text.len());
    out.push_str(&content[..pos]);
    out.push_str(text);
    out.push_str(&content[pos..]);
    out
}

fn replace_literal(content: &str, find: &str, with: &str, occurrences: Occurrences) -> EditEffect {
    let found: Vec<(Range<usize>, String)> = content
        .match_indices(find)
        .map(|(pos, m)| (pos..pos + m.len(), with.to_string()))
        .collect();

    // A replacement that extends its own anchor would match again on re-run
    let self_matching = !with.is_empty() && with.contains(find);
    substitute(content, find, found, with, self_matching, occurrences)
}

fn replace_regex(
    content: &str,
    re: &Regex,
    with: &str,
    expand: bool,
    occurrences: Occurrences,
) -> EditEffect {
    let found: Vec<(Range<usize>, String)> = re
        .captures_iter(content)
        .filter_map(|caps| {
            let m = caps.get(0)?;
            let mut replacement = String::new();
            if expand {
                caps.expand(with, &mut replacement);
            } else {
                replacement.push_str(with);
            }
            Some((m.range(), replacement))
        })
        .collect();

    if expand && found.is_empty() && !with.is_empty() {
        // The expanded text is unknown without a match; guards cover re-runs
        return EditEffect::missing(re.as_str());
    }

    let self_matching = !expand && !with.is_empty() && re.is_match(with);
    let presence = if expand { "" } else { with };
    substitute(content, re.as_str(), found, presence, self_matching, occurrences)
}

/// Replace the matches in `found` that are not already part of a `with`
/// occurrence. `with` is only consulted for presence checks; the replacement
/// text travels with each match.
fn substitute(
    content: &str,
    anchor: &str,
    found: Vec<(Range<usize>, String)>,
    with: &str,
    self_matching: bool,
    occurrences: Occurrences,
) -> EditEffect {
    let total = found.len();
    let bare: Vec<(Range<usize>, String)> = if self_matching {
        let applied: Vec<Range<usize>> = content
            .match_indices(with)
            .map(|(pos, m)| pos..pos + m.len())
            .collect();
        found
            .into_iter()
            .filter(|(m, _)| !applied.iter().any(|w| w.start <= m.start && m.end <= w.end))
            .collect()
    } else {
        found
    };

    if bare.is_empty() {
        // Every match is already inside a replacement, or a deletion is done
        if total > 0 || with.is_empty() || content.contains(with) {
            return EditEffect::AlreadyApplied;
        }
        return EditEffect::missing(anchor);
    }

    let selected = match occurrences {
        Occurrences::All => bare.len(),
        Occurrences::First => 1,
        Occurrences::Exactly(expected) if expected == bare.len() => expected,
        Occurrences::Exactly(expected) => {
            return EditEffect::CountMismatch {
                expected,
                found: bare.len(),
            }
        }
    };

    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for (range, replacement) in bare.iter().take(selected) {
        out.push_str(&content[last..range.start]);
        out.push_str(replacement);
        last = range.end;
    }
    out.push_str(&content[last..]);

    EditEffect::applied(out, selected)
}

fn insert_after_block(content: &str, anchor: &str, close: &str, text: &str) -> EditEffect {
    if !text.is_empty() && content.contains(text) {
        return EditEffect::AlreadyApplied;
    }

    let start = match content.find(anchor) {
        Some(pos) => pos + anchor.len(),
        None => return EditEffect::missing(anchor),
    };

    match content[start..].find(close) {
        Some(offset) => EditEffect::applied(splice(content, start + offset + close.len(), text), 1),
        None => EditEffect::missing(close),
    }
}

fn replace_lines(
    content: &str,
    contains: &str,
    start_marker: &str,
    end_marker: &str,
    text: &str,
) -> EditEffect {
    if !text.is_empty() && content.contains(text) {
        return EditEffect::AlreadyApplied;
    }

    let lines: Vec<&str> = content.split_inclusive('\n').collect();

    let hit = match lines.iter().position(|l| l.contains(contains)) {
        Some(i) => i,
        // An empty `text` deletes the range; once it is gone there is nothing to do
        None if text.is_empty() => return EditEffect::AlreadyApplied,
        None => return EditEffect::missing(contains),
    };

    let start = match (0..=hit).rev().find(|&i| lines[i].contains(start_marker)) {
        Some(i) => i,
        None => return EditEffect::missing(start_marker),
    };

    let end = match (hit..lines.len()).find(|&i| lines[i].contains(end_marker)) {
        Some(i) => i,
        None => return EditEffect::missing(end_marker),
    };

    let mut out = String::with_capacity(content.len() + text.len());
    for line in &lines[..start] {
        out.push_str(line);
    }
    out.push_str(text);
    for line in &lines[end + 1..] {
        out.push_str(line);
    }

    EditEffect::applied(out, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applied(effect: EditEffect) -> String {
        match effect {
            EditEffect::Applied { content, .. } => content,
            other => panic!("expected Applied, got {:?}", other),
        }
    }

    #[test]
    fn test_replace_all_and_first() {
        let edit = Edit::Replace {
            find: "item.item".to_string(),
            with: "item.item_id".to_string(),
            occurrences: Occurrences::All,
        };
        let out = apply_edit("a(item.item); b(item.item);", &edit).unwrap();
        assert_eq!(
            out,
            EditEffect::Applied {
                content: "a(item.item_id); b(item.item_id);".to_string(),
                count: 2,
                warnings: vec![],
            }
        );

        let edit = Edit::Replace {
            find: "x".to_string(),
            with: "y".to_string(),
            occurrences: Occurrences::First,
        };
        assert_eq!(applied(apply_edit("x x x", &edit).unwrap()), "y x x");
    }

    #[test]
    fn test_replace_exact_count() {
        let edit = Edit::Replace {
            find: "<button class=\"close-modal\">".to_string(),
            with: "<button type=\"button\" class=\"close-modal\">".to_string(),
            occurrences: Occurrences::Exactly(1),
        };
        let two = "<button class=\"close-modal\"></button><button class=\"close-modal\"></button>";
        assert_eq!(
            apply_edit(two, &edit).unwrap(),
            EditEffect::CountMismatch {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn test_replace_exact_count_too_few() {
        let edit = Edit::Replace {
            find: "App.renderGearShedCheckboxes(filteredItems);".to_string(),
            with: "App.renderGearShedDualPanel();".to_string(),
            occurrences: Occurrences::Exactly(2),
        };
        assert_eq!(
            apply_edit("App.renderGearShedCheckboxes(filteredItems);\n", &edit).unwrap(),
            EditEffect::CountMismatch {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_regex_exact_count() {
        let edit = |n| Edit::Regex {
            pattern: r"selectAll\w+Items".to_string(),
            with: "reorderItems".to_string(),
            dot_all: false,
            expand: false,
            occurrences: Occurrences::Exactly(n),
        };
        let content = "selectAllGearItems(); selectAllShedItems();";

        assert_eq!(
            apply_edit(content, &edit(1)).unwrap(),
            EditEffect::CountMismatch {
                expected: 1,
                found: 2
            }
        );
        assert_eq!(
            apply_edit(content, &edit(3)).unwrap(),
            EditEffect::CountMismatch {
                expected: 3,
                found: 2
            }
        );
        assert_eq!(
            apply_edit(content, &edit(2)).unwrap(),
            EditEffect::Applied {
                content: "reorderItems(); reorderItems();".to_string(),
                count: 2,
                warnings: vec![],
            }
        );
    }

    #[test]
    fn test_self_extending_replace_finishes_bare_occurrences() {
        let edit = Edit::Replace {
            find: "a();".to_string(),
            with: "a();b();".to_string(),
            occurrences: Occurrences::All,
        };
        let out = apply_edit("a();b();\nc();a();\n", &edit).unwrap();
        assert_eq!(
            out,
            EditEffect::Applied {
                content: "a();b();\nc();a();b();\n".to_string(),
                count: 1,
                warnings: vec![],
            }
        );
        assert_eq!(
            apply_edit("a();b();\nc();a();b();\n", &edit).unwrap(),
            EditEffect::AlreadyApplied
        );
    }

    #[test]
    fn test_deletions_are_idempotent() {
        let literal = Edit::Replace {
            find: "console.log('debug');\n".to_string(),
            with: String::new(),
            occurrences: Occurrences::All,
        };
        let out = applied(apply_edit("start();\nconsole.log('debug');\nend();\n", &literal).unwrap());
        assert_eq!(out, "start();\nend();\n");
        assert_eq!(apply_edit(&out, &literal).unwrap(), EditEffect::AlreadyApplied);

        let regex = Edit::Regex {
            pattern: r"// debug:.*\n".to_string(),
            with: String::new(),
            dot_all: false,
            expand: false,
            occurrences: Occurrences::All,
        };
        let out = applied(apply_edit("a();\n// debug: one\nb();\n// debug: two\n", &regex).unwrap());
        assert_eq!(out, "a();\nb();\n");
        assert_eq!(apply_edit(&out, &regex).unwrap(), EditEffect::AlreadyApplied);
    }

    #[test]
    fn test_replace_that_extends_its_anchor_is_idempotent() {
        let edit = Edit::Replace {
            find: "e.preventDefault();".to_string(),
            with: "e.preventDefault();\nconsole.log('submit');".to_string(),
            occurrences: Occurrences::All,
        };
        let once = applied(apply_edit("handler(e) { e.preventDefault(); }", &edit).unwrap());
        assert_eq!(apply_edit(&once, &edit).unwrap(), EditEffect::AlreadyApplied);
    }

    #[test]
    fn test_replace_missing_and_already_applied() {
        let edit = Edit::Replace {
            find: "🌆</div>".to_string(),
            with: "🏠</div>".to_string(),
            occurrences: Occurrences::All,
        };
        assert_eq!(apply_edit("<div>🏠</div>", &edit).unwrap(), EditEffect::AlreadyApplied);
        assert!(matches!(
            apply_edit("<div>??</div>", &edit).unwrap(),
            EditEffect::Missing { .. }
        ));
    }

    #[test]
    fn test_regex_dot_all_is_literal_by_default() {
        let content = "    a: () => {\n        x();\n    },\n    b: () => {\n        y();\n    },\n    c: 1,";
        let edit = Edit::Regex {
            pattern: r"    a:.*?},\s+b:.*?},".to_string(),
            with: "    merged: () => { $cost },".to_string(),
            dot_all: true,
            expand: false,
            occurrences: Occurrences::All,
        };
        let out = applied(apply_edit(content, &edit).unwrap());
        assert_eq!(out, "    merged: () => { $cost },\n    c: 1,");
        assert_eq!(apply_edit(&out, &edit).unwrap(), EditEffect::AlreadyApplied);

        let no_dot_all = Edit::Regex {
            pattern: r"    a:.*?},\s+b:.*?},".to_string(),
            with: "z".to_string(),
            dot_all: false,
            expand: false,
            occurrences: Occurrences::All,
        };
        assert!(matches!(
            apply_edit(content, &no_dot_all).unwrap(),
            EditEffect::Missing { .. }
        ));
    }

    #[test]
    fn test_regex_expand() {
        let edit = Edit::Regex {
            pattern: r"render(\w+)Checkboxes".to_string(),
            with: "render${1}DualPanel".to_string(),
            dot_all: false,
            expand: true,
            occurrences: Occurrences::First,
        };
        assert_eq!(
            applied(apply_edit("renderGearShedCheckboxes(); renderXCheckboxes();", &edit).unwrap()),
            "renderGearShedDualPanel(); renderXCheckboxes();"
        );
    }

    #[test]
    fn test_insert_before_at_offset_zero() {
        let edit = Edit::InsertBefore {
            anchor: "handleFormSubmit".to_string(),
            text: "handleClearSearch: () => {},\n".to_string(),
        };
        let out = applied(apply_edit("handleFormSubmit: async (e) => {}", &edit).unwrap());
        assert_eq!(out, "handleClearSearch: () => {},\nhandleFormSubmit: async (e) => {}");
        assert_eq!(apply_edit(&out, &edit).unwrap(), EditEffect::AlreadyApplied);
    }

    #[test]
    fn test_insert_after() {
        let edit = Edit::InsertAfter {
            anchor: "});\n".to_string(),
            text: "// back button\n".to_string(),
        };
        let out = applied(apply_edit("a});\nb", &edit).unwrap());
        assert_eq!(out, "a});\n// back button\nb");
        assert_eq!(apply_edit(&out, &edit).unwrap(), EditEffect::AlreadyApplied);
    }

    #[test]
    fn test_insert_after_block() {
        let css = ".modal {\n  display: flex;\n}\n.modal-content {\n  padding: 1rem;\n}\n.footer {}\n";
        let edit = Edit::InsertAfterBlock {
            anchor: ".modal-content {".to_string(),
            close: "}".to_string(),
            text: "\n\n.modal-header {\n  margin: 0;\n}\n".to_string(),
        };
        let out = applied(apply_edit(css, &edit).unwrap());
        assert_eq!(
            out,
            ".modal {\n  display: flex;\n}\n.modal-content {\n  padding: 1rem;\n}\n\n.modal-header {\n  margin: 0;\n}\n\n.footer {}\n"
        );
        assert_eq!(apply_edit(&out, &edit).unwrap(), EditEffect::AlreadyApplied);
    }

    #[test]
    fn test_replace_lines_range() {
        let html = "<form>\n  <!-- Search Bar -->\n  <input id=\"item-search\"\n    style=\"display:none;\">\n  <select></select>\n</form>\n";
        let edit = Edit::ReplaceLines {
            contains: "id=\"item-search\"".to_string(),
            start_marker: "<!-- Search Bar".to_string(),
            end_marker: "style=\"display:none;\">".to_string(),
            text: "  <div class=\"search-wrapper\"></div>\n".to_string(),
        };
        let out = applied(apply_edit(html, &edit).unwrap());
        assert_eq!(
            out,
            "<form>\n  <div class=\"search-wrapper\"></div>\n  <select></select>\n</form>\n"
        );
        assert_eq!(apply_edit(&out, &edit).unwrap(), EditEffect::AlreadyApplied);
    }

    #[test]
    fn test_replace_lines_empty_text_deletes_range() {
        let html = "<main>\n<!-- Old -->\n<div id=\"old\">\n</div>\n</main>\n";
        let edit = Edit::ReplaceLines {
            contains: "id=\"old\"".to_string(),
            start_marker: "<!-- Old".to_string(),
            end_marker: "</div>".to_string(),
            text: String::new(),
        };
        let out = apply_edit(html, &edit).unwrap();
        assert_eq!(
            out,
            EditEffect::Applied {
                content: "<main>\n</main>\n".to_string(),
                count: 1,
                warnings: vec![],
            }
        );
        assert_eq!(apply_edit("<main>\n</main>\n", &edit).unwrap(), EditEffect::AlreadyApplied);
    }

    #[test]
    fn test_replace_lines_requires_start_marker() {
        let edit = Edit::ReplaceLines {
            contains: "id=\"item-search\"".to_string(),
            start_marker: "<!-- Search Bar".to_string(),
            end_marker: ">".to_string(),
            text: "x\n".to_string(),
        };
        assert_eq!(
            apply_edit("<input id=\"item-search\">\n", &edit).unwrap(),
            EditEffect::Missing {
                anchor: "<!-- Search Bar".to_string()
            }
        );
    }

    #[test]
    fn test_append_does_not_duplicate() {
        let edit = Edit::Append {
            text: "\n\n/* Modal Header */\n.modal-header {}\n".to_string(),
        };
        let out = applied(apply_edit("body {}", &edit).unwrap());
        assert_eq!(out, "body {}\n\n/* Modal Header */\n.modal-header {}\n");
        assert_eq!(apply_edit(&out, &edit).unwrap(), EditEffect::AlreadyApplied);
    }

    #[test]
    fn test_blocks_edit() {
        let edit = Edit::Blocks {
            blocks: "<<<<<<< SEARCH\nitemSelect.style.display = 'none';\n=======\nitemSelect.style.display = 'none';\nitemSelect.removeAttribute('required');\n>>>>>>> REPLACE\n".to_string(),
        };
        let content = "if (gear) {\n        itemSelect.style.display = 'none';\n}\n";
        let out = applied(apply_edit(content, &edit).unwrap());
        assert_eq!(
            out,
            "if (gear) {\n        itemSelect.style.display = 'none';\n        itemSelect.removeAttribute('required');\n}\n"
        );
        assert_eq!(apply_edit(&out, &edit).unwrap(), EditEffect::AlreadyApplied);
    }
}
