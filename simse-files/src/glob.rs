//! Glob matching over `/`-separated locations.
//!
//! Supports `*` and `?` inside a segment, `**` across segments and `{a,b}`
//! alternatives. A pattern without a leading `/` is anchored at the end of
//! the path only, so `*.txt` matches `/docs/readme.txt`.

// ── Brace expansion ─────────────────────────────────────────────────────────

/// Expand `{a,b}` alternatives, nested braces included.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let open = match pattern.find('{') {
        Some(pos) => pos,
        None => return vec![pattern.to_string()],
    };

    let mut depth = 0i32;
    let mut close: Option<usize> = None;
    for (i, ch) in pattern[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(open + i);
                    break;
                }
            }
            _ => {}
        }
    }

    // Unbalanced braces are literal text.
    let close = match close {
        Some(pos) => pos,
        None => return vec![pattern.to_string()],
    };

    let head = &pattern[..open];
    let tail = &pattern[close + 1..];

    split_alternatives(&pattern[open + 1..close])
        .iter()
        .flat_map(|alt| expand_braces(&format!("{}{}{}", head, alt.trim(), tail)))
        .collect()
}

fn split_alternatives(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, ch) in inner.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&inner[start..]);
    parts
}

// ── Segment matching ────────────────────────────────────────────────────────

/// Match `c` against the class opening at `pat[start]`: `[abc]`, `[a-z]`,
/// negated with `[!...]` or `[^...]`. A `]` right after the opening is a
/// member. Returns whether `c` matched and the index after the closing `]`,
/// or `None` when the class is unterminated.
fn match_class(pat: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negated = matches!(pat.get(i), Some('!' | '^'));
    if negated {
        i += 1;
    }
    let first = i;
    let mut hit = false;

    while i < pat.len() {
        if pat[i] == ']' && i > first {
            return Some((hit != negated, i + 1));
        }
        if i + 2 < pat.len() && pat[i + 1] == '-' && pat[i + 2] != ']' {
            hit |= pat[i] <= c && c <= pat[i + 2];
            i += 3;
        } else {
            hit |= pat[i] == c;
            i += 1;
        }
    }
    None
}

/// Match one segment against a pattern containing `*`, `?` and `[...]`.
pub fn match_segment(segment: &str, pattern: &str) -> bool {
    let seg: Vec<char> = segment.chars().collect();
    let pat: Vec<char> = pattern.chars().collect();
    let (mut si, mut pi) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while si < seg.len() {
        // An unterminated `[` is a literal.
        let class = match pat.get(pi) {
            Some('[') => match_class(&pat, pi, seg[si]),
            _ => None,
        };
        if let Some((true, next)) = class {
            si += 1;
            pi = next;
        } else if pi < pat.len() && pat[pi] == '?' {
            si += 1;
            pi += 1;
        } else if pi < pat.len() && pat[pi] == '*' {
            backtrack = Some((pi, si));
            pi += 1;
        } else if class.is_none() && pi < pat.len() && seg[si] == pat[pi] {
            si += 1;
            pi += 1;
        } else if let Some((star_pi, star_si)) = backtrack {
            pi = star_pi + 1;
            si = star_si + 1;
            backtrack = Some((star_pi, si));
        } else {
            return false;
        }
    }

    while pi < pat.len() && pat[pi] == '*' {
        pi += 1;
    }

    pi == pat.len()
}

/// Match path segments against pattern segments, `**` spanning zero or more.
fn match_parts(path: &[&str], mut pi: usize, pattern: &[&str], mut gi: usize) -> bool {
    while pi < path.len() && gi < pattern.len() {
        if pattern[gi] == "**" {
            if gi == pattern.len() - 1 {
                return true;
            }
            return (pi..=path.len()).any(|skip| match_parts(path, skip, pattern, gi + 1));
        }
        if !match_segment(path[pi], pattern[gi]) {
            return false;
        }
        pi += 1;
        gi += 1;
    }

    while gi < pattern.len() && pattern[gi] == "**" {
        gi += 1;
    }

    pi == path.len() && gi == pattern.len()
}

// ── Top-level matching ──────────────────────────────────────────────────────

/// True when the pattern uses any glob syntax.
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

/// Match a normalized path such as `/a/b.txt` against a glob pattern.
pub fn match_glob(path: &str, pattern: &str) -> bool {
    let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    expand_braces(pattern).iter().any(|expanded| {
        let anchored = expanded.starts_with('/') || expanded.starts_with('\\');
        let mut pattern_parts: Vec<&str> = expanded
            .split(['/', '\\'])
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        if !anchored {
            pattern_parts.insert(0, "**");
        }
        match_parts(&path_parts, 0, &pattern_parts, 0)
    })
}

// ── Tests ───────────────────────────────────────────────────────────────────
