use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::glob::{is_glob, match_glob};

// ── Constants ───────────────────────────────────────────────────────────────

pub const SEPARATOR: char = '/';
pub const ROOT: &str = "/";

// ── Location ────────────────────────────────────────────────────────────────

/// A normalized, `/`-separated virtual path.
///
/// Backslashes are treated as separators, and empty, `.` and `..` segments
/// are dropped rather than resolved, so a `Location` can never climb above
/// the root. The root is `/`; every other location starts with `/` and has
/// no trailing separator.
///
/// All operations are total and return new values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    path: String,
}

impl Location {
    pub fn new(raw: &str) -> Self {
        Self {
            path: join_segments(split_segments(raw)),
        }
    }

    pub fn root() -> Self {
        Self {
            path: ROOT.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path == ROOT
    }

    /// Segments from the root down; empty for the root.
    pub fn segments(&self) -> Vec<&str> {
        split_segments(&self.path).collect()
    }

    /// Segments without the basename.
    pub fn parent_segments(&self) -> Vec<&str> {
        let mut segments = self.segments();
        segments.pop();
        segments
    }

    pub fn depth(&self) -> usize {
        split_segments(&self.path).count()
    }

    /// Append each argument, itself normalized, after this location.
    pub fn append<I, S>(&self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extra: Vec<S> = segments.into_iter().collect();
        let all = split_segments(&self.path).chain(extra.iter().flat_map(|s| split_segments(s.as_ref())));
        Self {
            path: join_segments(all),
        }
    }

    /// Insert each argument, itself normalized, before this location.
    pub fn prepend<I, S>(&self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extra: Vec<S> = segments.into_iter().collect();
        let all = extra
            .iter()
            .flat_map(|s| split_segments(s.as_ref()))
            .chain(split_segments(&self.path));
        Self {
            path: join_segments(all),
        }
    }

    pub fn join(&self, segment: &str) -> Self {
        self.append([segment])
    }

    /// Last segment, or `""` for the root.
    pub fn basename(&self) -> &str {
        match self.path.rfind(SEPARATOR) {
            Some(pos) => &self.path[pos + 1..],
            None => "",
        }
    }

    /// Basename without its extension.
    pub fn file_stem(&self) -> &str {
        let name = self.basename();
        match self.extension() {
            Some(ext) => &name[..name.len() - ext.len() - 1],
            None => name,
        }
    }

    /// Suffix after the last `.` of the basename. Leading-dot names such as
    /// `.env` have no extension.
    pub fn extension(&self) -> Option<&str> {
        let name = self.basename();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(pos) if pos + 1 == name.len() => None,
            Some(pos) => Some(&name[pos + 1..]),
        }
    }

    /// Parent location; the root is its own parent.
    pub fn up(&self) -> Self {
        match self.path.rfind(SEPARATOR) {
            Some(0) | None => Self::root(),
            Some(pos) => Self {
                path: self.path[..pos].to_string(),
            },
        }
    }

    /// Segment-wise prefix test: `/a/b` starts with `/a`, not with `/a/b/c`
    /// and `/ab` does not start with `/a`.
    pub fn starts_with(&self, other: &Location) -> bool {
        if other.is_root() {
            return true;
        }
        self.path == other.path
            || (self.path.starts_with(&other.path)
                && self.path[other.path.len()..].starts_with(SEPARATOR))
    }

    /// Glob match when the pattern has glob syntax, substring match otherwise.
    pub fn matches(&self, pattern: &str) -> bool {
        if is_glob(pattern) {
            match_glob(&self.path, pattern)
        } else {
            self.path.contains(pattern)
        }
    }

    pub fn matches_any<I, S>(&self, patterns: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        patterns.into_iter().any(|p| self.matches(p.as_ref()))
    }
}

fn split_segments(raw: &str) -> impl Iterator<Item = &str> {
    raw.split([SEPARATOR, '\\'])
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
}

fn join_segments<'a>(segments: impl Iterator<Item = &'a str>) -> String {
    let mut path = String::new();
    for segment in segments {
        path.push(SEPARATOR);
        path.push_str(segment);
    }
    if path.is_empty() {
        path.push(SEPARATOR);
    }
    path
}

// ── Conversions ─────────────────────────────────────────────────────────────

impl Default for Location {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl AsRef<str> for Location {
    fn as_ref(&self) -> &str {
        &self.path
    }
}

impl From<&str> for Location {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Location {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&Location> for Location {
    fn from(location: &Location) -> Self {
        location.clone()
    }
}

impl FromStr for Location {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl PartialEq<str> for Location {
    fn eq(&self, other: &str) -> bool {
        self.path == other
    }
}

impl PartialEq<&str> for Location {
    fn eq(&self, other: &&str) -> bool {
        self.path == *other
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.path)
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(&raw))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── new ─────────────────────────────────────────────────────────────

    #[test]
    fn normalize_basic_path() {
        assert_eq!(Location::new("/foo/bar"), "/foo/bar");
    }

    #[test]
    fn normalize_empty_and_root() {
        assert_eq!(Location::new(""), "/");
        assert_eq!(Location::new("/"), "/");
        assert_eq!(Location::new("///"), "/");
        assert!(Location::new("").is_root());
    }

    #[test]
    fn normalize_drops_dot_segments() {
        assert_eq!(Location::new("/foo/./bar"), "/foo/bar");
        assert_eq!(Location::new("/foo/../bar"), "/foo/bar");
        assert_eq!(Location::new("../../etc/passwd"), "/etc/passwd");
        assert_eq!(Location::new("./.."), "/");
    }

    #[test]
    fn normalize_separators() {
        assert_eq!(Location::new("foo//bar/"), "/foo/bar");
        assert_eq!(Location::new("foo\\bar\\baz.txt"), "/foo/bar/baz.txt");
        assert_eq!(Location::new("\\\\foo\\/bar"), "/foo/bar");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["", "/", "a", "a/b/", "\\x\\..\\y", "//a//./b//", "../a/b/c/.."] {
            let once = Location::new(raw);
            let twice = Location::new(once.as_str());
            assert_eq!(once, twice, "raw = {raw:?}");
        }
    }

    #[test]
    fn normalized_output_has_no_redundant_segments() {
        for raw in ["a//b", "./a/../b/", "\\a\\\\b\\", "a/./././b", "..", "/a/b/"] {
            let location = Location::new(raw);
            let s = location.as_str();
            assert!(s.starts_with('/'));
            assert!(!s.contains("//"), "{s}");
            assert!(location.segments().iter().all(|seg| *seg != "." && *seg != ".."));
            assert!(s == "/" || !s.ends_with('/'));
        }
    }

    // ── append / prepend ────────────────────────────────────────────────

    #[test]
    fn append_segments() {
        let base = Location::new("/a");
        assert_eq!(base.append(["b", "c"]), "/a/b/c");
        assert_eq!(base.append(["/b/", "//c/d"]), "/a/b/c/d");
        assert_eq!(Location::root().append(["x"]), "/x");
        assert_eq!(base.append(Vec::<String>::new()), "/a");
    }

    #[test]
    fn append_leaves_receiver_untouched() {
        let base = Location::new("/a");
        let _ = base.join("b");
        assert_eq!(base, "/a");
    }

    #[test]
    fn prepend_segments() {
        let base = Location::new("/c");
        assert_eq!(base.prepend(["a", "b"]), "/a/b/c");
        assert_eq!(base.prepend(["/a/"]), "/a/c");
        assert_eq!(Location::root().prepend(["a"]), "/a");
    }

    // ── basename / extension ────────────────────────────────────────────

    #[test]
    fn basename_of_paths() {
        assert_eq!(Location::new("/foo/bar.txt").basename(), "bar.txt");
        assert_eq!(Location::new("/foo").basename(), "foo");
        assert_eq!(Location::root().basename(), "");
    }

    #[test]
    fn extension_and_stem() {
        let location = Location::new("/a/photo.final.png");
        assert_eq!(location.extension(), Some("png"));
        assert_eq!(location.file_stem(), "photo.final");
        assert_eq!(Location::new("/a/.env").extension(), None);
        assert_eq!(Location::new("/a/Makefile").extension(), None);
        assert_eq!(Location::new("/a/trailing.").extension(), None);
        assert_eq!(Location::root().extension(), None);
    }

    // ── up ──────────────────────────────────────────────────────────────

    #[test]
    fn up_navigation() {
        assert_eq!(Location::new("/a/b/c").up(), Location::new("/a/b"));
        assert_eq!(Location::new("/a").up(), Location::root());
        assert_eq!(Location::root().up(), Location::root());
    }

    #[test]
    fn up_then_append_basename_round_trips() {
        for raw in ["/a", "/a/b", "x/y/z.txt", "\\deep\\er\\path"] {
            let location = Location::new(raw);
            assert_eq!(location.up().join(location.basename()), location);
        }
    }

    #[test]
    fn parent_segments_and_depth() {
        let location = Location::new("/a/b/c");
        assert_eq!(location.segments(), vec!["a", "b", "c"]);
        assert_eq!(location.parent_segments(), vec!["a", "b"]);
        assert_eq!(location.depth(), 3);
        assert_eq!(Location::root().depth(), 0);
        assert!(Location::root().segments().is_empty());
    }

    // ── starts_with / matches ───────────────────────────────────────────

    #[test]
    fn starts_with_is_segment_wise() {
        let location = Location::new("/a/b");
        assert!(location.starts_with(&Location::new("/a")));
        assert!(location.starts_with(&Location::new("/a/b")));
        assert!(location.starts_with(&Location::root()));
        assert!(!location.starts_with(&Location::new("/a/b/c")));
        assert!(!Location::new("/ab").starts_with(&Location::new("/a")));
    }

    #[test]
    fn matches_glob_or_substring() {
        let location = Location::new("/uploads/avatar.png");
        assert!(location.matches("*.png"));
        assert!(location.matches("/uploads/*.{png,jpg}"));
        assert!(location.matches("avatar"));
        assert!(!location.matches("*.gif"));
        assert!(!location.matches("banner"));
        assert!(location.matches_any(["*.gif", "uploads"]));
        assert!(!location.matches_any(Vec::<&str>::new()));
    }

    // ── conversions ─────────────────────────────────────────────────────

    #[test]
    fn equality_display_and_serde() {
        let location: Location = "a\\b".parse().unwrap();
        assert_eq!(location, Location::from("/a/b/"));
        assert_eq!(location.to_string(), "/a/b");
        let json = serde_json::to_string(&location).unwrap();
        assert_eq!(json, "\"/a/b\"");
        let back: Location = serde_json::from_str("\"//a/./b\"").unwrap();
        assert_eq!(back, location);
    }
}
