//! Loose semver handling: the registry hands us `14`, `14.1`, `v2.0.0-beta.2`
//! and worse. Every comparison in the planner goes through [`normalize_version`]
//! first so dirty input never panics a comparator.

use semver::{Version, VersionReq};

/// `latest` / `next` are not semver at all; they're resolved by the fetcher
/// before anything here ever sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Latest,
    Next,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedInput {
    Tag(Tag),
    Version(Version),
}

/// Passes `latest`/`next` through untouched; everything else goes through
/// [`normalize_version`]. Used at the one boundary where a tag is a legal
/// target (the planner's top-level target version).
pub fn normalize_version_with_tag_check(raw: &str) -> NormalizedInput {
    match raw.trim() {
        "latest" => NormalizedInput::Tag(Tag::Latest),
        "next" => NormalizedInput::Tag(Tag::Next),
        other => NormalizedInput::Version(normalize_version(other)),
    }
}

/// Best-effort coercion of a dirty version string into a `Version`, without
/// the zero-fill fallback ladder of [`normalize_version`]. Tries a direct
/// parse first (handles well-formed semver, including prerelease/build),
/// then falls back to pulling up to three leading numeric groups out of the
/// string (`v14.1-rc` -> `14.1.0`).
pub fn clean_semver(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let stripped = trimmed.strip_prefix('v').unwrap_or(trimmed);

    if let Ok(v) = Version::parse(stripped) {
        return Some(v);
    }

    let mut groups = [0u64; 3];
    let mut found_any = false;
    for (idx, part) in stripped.split('.').take(3).enumerate() {
        let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            break;
        }
        if let Ok(n) = digits.parse::<u64>() {
            groups[idx] = n;
            found_any = true;
        } else {
            break;
        }
    }

    if !found_any {
        return None;
    }

    Some(Version::new(groups[0], groups[1], groups[2]))
}

/// Try three zero-filled variants of `raw` in turn -- full, drop-patch,
/// drop-minor-and-patch -- keeping the first that parses to something
/// strictly greater than `0.0.0`. Anything that fails all three collapses to
/// `0.0.0` rather than erroring; downstream comparisons stay total.
pub fn normalize_version(raw: &str) -> Version {
    let zero = Version::new(0, 0, 0);
    let Some(cleaned) = clean_semver(raw) else {
        return zero;
    };

    let full = cleaned.clone();
    let drop_patch = Version::new(cleaned.major, cleaned.minor, 0);
    let drop_minor_and_patch = Version::new(cleaned.major, 0, 0);

    for candidate in [full, drop_patch, drop_minor_and_patch] {
        if candidate > zero {
            return candidate;
        }
    }
    zero
}

pub fn gt(a: &str, b: &str) -> bool {
    normalize_version(a) > normalize_version(b)
}

pub fn gte(a: &str, b: &str) -> bool {
    normalize_version(a) >= normalize_version(b)
}

pub fn lte(a: &str, b: &str) -> bool {
    normalize_version(a) <= normalize_version(b)
}

/// `includePrerelease: true` semantics: the `semver` crate's own
/// [`VersionReq::matches`] refuses to match a prerelease version against a
/// range whose comparators don't themselves carry a prerelease tag. We widen
/// that by retrying the match with the prerelease component stripped, which
/// is the closest approximation to "match ignoring the prerelease gate" the
/// stock crate allows.
pub fn satisfies(raw_version: &str, range: &str) -> bool {
    let version = normalize_version(raw_version);
    let Ok(req) = VersionReq::parse(range.trim()) else {
        return false;
    };

    if req.matches(&version) {
        return true;
    }

    if !version.pre.is_empty() {
        let mut stable = version;
        stable.pre = semver::Prerelease::EMPTY;
        return req.matches(&stable);
    }

    false
}
