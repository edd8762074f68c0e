//! Checks and cleanup on a rewritten translation before it is written.

use std::sync::LazyLock;

use regex::Regex;

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]*)\)").expect("link pattern is valid"));

/// A rewritten document plus anything worth telling the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostProcessed {
    pub lines: Vec<String>,
    pub warnings: Vec<String>,
}

/// Strip merge-conflict markers, then check the result against the upstream
/// document length and for obvious markdown damage.
pub fn postprocess(lines: Vec<String>, upstream_len: usize) -> PostProcessed {
    let (lines, stripped) = strip_conflict_markers(lines);
    let mut warnings = Vec::new();
    if stripped > 0 {
        warnings.push(format!("removed {stripped} conflict marker line(s)"));
    }
    if lines.len() != upstream_len {
        warnings.push(format!(
            "line count {} differs from upstream {}",
            lines.len(),
            upstream_len
        ));
    }
    warnings.extend(markdown_issues(&lines));
    PostProcessed { lines, warnings }
}

fn is_open_marker(line: &str) -> bool {
    line.starts_with("<<<<<<< ") || line == "<<<<<<<"
}

fn is_close_marker(line: &str) -> bool {
    line.starts_with(">>>>>>> ") || line == ">>>>>>>"
}

/// Remove `<<<<<<<` / `=======` / `>>>>>>>` lines.
///
/// `=======` and `>>>>>>>` are only markers inside a block opened by
/// `<<<<<<<`; elsewhere a row of `=` is a setext heading underline and is
/// kept. Content between the markers is kept. Returns the number of lines
/// removed.
pub fn strip_conflict_markers(lines: Vec<String>) -> (Vec<String>, usize) {
    let mut out = Vec::with_capacity(lines.len());
    let mut in_block = false;
    let mut removed = 0;
    for line in lines {
        let marker = if is_open_marker(&line) {
            in_block = true;
            true
        } else if in_block && line == "=======" {
            true
        } else if in_block && is_close_marker(&line) {
            in_block = false;
            true
        } else {
            false
        };
        if marker {
            removed += 1;
        } else {
            out.push(line);
        }
    }
    (out, removed)
}

fn markdown_issues(lines: &[String]) -> Vec<String> {
    let mut issues = Vec::new();
    let mut fences = 0usize;
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            fences += 1;
        }
        for caps in LINK_RE.captures_iter(line) {
            if caps[2].trim().is_empty() {
                issues.push(format!("line {}: empty link target", i + 1));
            }
        }
    }
    if fences % 2 != 0 {
        issues.push("unbalanced code fence".to_string());
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(s: &[&str]) -> Vec<String> {
        s.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn conflict_block_markers_are_removed() {
        let input = lines(&[
            "before",
            "<<<<<<< HEAD",
            "既存",
            "=======",
            "upstream",
            ">>>>>>> upstream/main",
            "after",
        ]);
        let (out, removed) = strip_conflict_markers(input);
        assert_eq!(out, lines(&["before", "既存", "upstream", "after"]));
        assert_eq!(removed, 3);
    }

    #[test]
    fn setext_underline_is_kept() {
        let input = lines(&["Title", "=======", "", "text"]);
        let (out, removed) = strip_conflict_markers(input.clone());
        assert_eq!(out, input);
        assert_eq!(removed, 0);
    }

    #[test]
    fn clean_document_has_no_warnings() {
        let out = postprocess(lines(&["# タイトル", "", "[JHipster](https://www.jhipster.tech)"]), 3);
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
    }

    #[test]
    fn warnings_for_count_links_and_fences() {
        let out = postprocess(lines(&["[broken]()", "```", "code"]), 5);
        assert_eq!(out.lines.len(), 3);
        assert!(out.warnings.iter().any(|w| w.contains("differs from upstream 5")));
        assert!(out.warnings.iter().any(|w| w.contains("line 1: empty link target")));
        assert!(out.warnings.iter().any(|w| w == "unbalanced code fence"));
    }
}
