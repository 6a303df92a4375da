//! In-memory package listings and their HTML rendering.
//!
//! Two listings live in a bucket:
//! - a per-package [`Index`] at `<package>/index.html` linking every archive
//!   published for that package, and
//! - a [`MasterIndex`] at the bucket root linking every package directory.
//!
//! Both render through the same askama template, which HTML-escapes labels
//! and hrefs. [`Index::parse`] reverses that rendering and is lenient: input
//! it cannot make sense of yields an empty listing rather than an error.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use askama::Template;
use regex::{Captures, Regex};

static ANCHOR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[^\s"'>]+))[^>]*>(?P<label>.*?)</a\s*>"#,
    )
    .unwrap()
});

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

static ENTITY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
struct Link<'a> {
    href: &'a str,
    label: &'a str,
}

#[derive(Template)]
#[template(path = "listing.html")]
struct ListingTemplate<'a> {
    title: &'a str,
    links: Vec<Link<'a>>,
}

/// A single link in a per-package listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    label: String,
    href: String,
}

impl IndexEntry {
    pub fn new(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
        }
    }

    /// Display text, usually the archive filename
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Link target
    pub fn href(&self) -> &str {
        &self.href
    }
}

/// Listing of all archive files published for one package.
///
/// Entries are unique by label and always rendered sorted by label, so the
/// same set of entries renders to the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entries: BTreeMap<String, IndexEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract every `<a href="...">label</a>` from an HTML document.
    ///
    /// Never fails. Empty, truncated or hand-edited documents produce
    /// whatever anchors can be recognized, possibly none. When a label
    /// appears twice the first anchor wins.
    pub fn parse(html: &str) -> Self {
        let mut index = Self::new();
        for caps in ANCHOR_REGEX.captures_iter(html) {
            let href = caps
                .name("dq")
                .or_else(|| caps.name("sq"))
                .or_else(|| caps.name("bare"))
                .map(|m| m.as_str())
                .unwrap_or_default();
            let raw_label = caps.name("label").map(|m| m.as_str()).unwrap_or_default();
            let label = TAG_REGEX.replace_all(raw_label, "");

            index.add(unescape_html(&label), unescape_html(href));
        }
        index
    }

    /// Add an entry. If the label is already listed the existing entry is
    /// kept untouched, so adding is idempotent.
    ///
    /// Returns true if the entry was inserted.
    pub fn add(&mut self, label: impl Into<String>, href: impl Into<String>) -> bool {
        let label = label.into();
        if self.entries.contains_key(&label) {
            return false;
        }
        let entry = IndexEntry::new(label.clone(), href);
        self.entries.insert(label, entry);
        true
    }

    pub fn contains(&self, label: &str) -> bool {
        self.entries.contains_key(label)
    }

    pub fn get(&self, label: &str) -> Option<&IndexEntry> {
        self.entries.get(label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in render order (sorted by label)
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn to_html(&self) -> String {
        ListingTemplate {
            title: "Package Index",
            links: self
                .entries()
                .map(|e| Link {
                    href: &e.href,
                    label: &e.label,
                })
                .collect(),
        }
        .to_string()
    }
}

/// Listing of every package directory in the bucket.
///
/// Always derived from a live listing of bucket keys; it is never merged
/// with a previously rendered master index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterIndex {
    packages: BTreeSet<String>,
}

impl MasterIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the package set from object keys.
    ///
    /// The package name is the segment before the first `/`. Root-level keys
    /// (no `/`) are not package directories and are skipped.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let packages = keys
            .into_iter()
            .filter_map(|key| {
                key.as_ref()
                    .split_once('/')
                    .map(|(dir, _)| dir.to_string())
            })
            .filter(|dir| !dir.is_empty())
            .collect();
        Self { packages }
    }

    /// Add a package name, returning true if it was not listed yet.
    pub fn insert(&mut self, package: impl Into<String>) -> bool {
        self.packages.insert(package.into())
    }

    pub fn contains(&self, package: &str) -> bool {
        self.packages.contains(package)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Package names, sorted
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(String::as_str)
    }

    /// Render one link per package, pointing at the package's own listing.
    pub fn to_html(&self) -> String {
        let hrefs: Vec<String> = self.packages().map(|p| format!("{}/", p)).collect();
        ListingTemplate {
            title: "Simple Index",
            links: self
                .packages()
                .zip(hrefs.iter())
                .map(|(label, href)| Link {
                    href: href.as_str(),
                    label,
                })
                .collect(),
        }
        .to_string()
    }
}

/// Decode the character references askama (or a hand editor) may have
/// produced. Unknown named references are left as written.
fn unescape_html(text: &str) -> String {
    ENTITY_REGEX
        .replace_all(text, |caps: &Captures| {
            let whole = &caps[0];
            let body = &caps[1];
            let decoded = if let Some(hex) = body
                .strip_prefix("#x")
                .or_else(|| body.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match body {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    _ => None,
                }
            };
            decoded.map_or_else(|| whole.to_string(), String::from)
        })
        .into_owned()
}
