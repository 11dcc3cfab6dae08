use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

/// A pre-release marker: alpha, beta or release candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreRelease {
    /// `1.2.3a1`
    Alpha,
    /// `1.2.3b1`
    Beta,
    /// `1.2.3rc1`
    Rc,
}

impl Display for PreRelease {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alpha => f.write_str("a"),
            Self::Beta => f.write_str("b"),
            Self::Rc => f.write_str("rc"),
        }
    }
}

/// A segment of a local version identifier (the part after `+`).
///
/// Numeric segments compare numerically and sort after string segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalSegment {
    /// `ubuntu` in `1.0+ubuntu.1`
    String(String),
    /// `1` in `1.0+ubuntu.1`
    Number(u64),
}

impl Display for LocalSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(string) => string.fmt(f),
            Self::Number(number) => number.fmt(f),
        }
    }
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(lhs), Self::Number(rhs)) => lhs.cmp(rhs),
            (Self::String(lhs), Self::String(rhs)) => lhs.cmp(rhs),
            (Self::Number(_), Self::String(_)) => Ordering::Greater,
            (Self::String(_), Self::Number(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A PEP 440 version: an epoch, a release tuple, and optional pre-, post-, dev-
/// and local-version segments.
///
/// Ordering follows PEP 440: the epoch dominates, then the release compared
/// with zero padding, then pre < final < post within the same release, with dev
/// releases sorting below their anchor.
///
/// Equality goes through [`Ord`], so `1.0` equals `1.0.0`. There is
/// deliberately no `Hash` impl; use ordered maps for version keys.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    /// The epoch, `1` in `1!2.3`. Zero for almost all real versions.
    pub epoch: u64,
    /// The release segments, `[2, 3]` in `1!2.3`.
    pub release: Vec<u64>,
    /// The pre-release marker and number, if any.
    pub pre: Option<(PreRelease, u64)>,
    /// The post-release number, if any.
    pub post: Option<u64>,
    /// The dev-release number, if any.
    pub dev: Option<u64>,
    /// The local version segments (after `+`), if any.
    pub local: Vec<LocalSegment>,
}

impl Version {
    /// A plain release version without epoch or any extra segments.
    pub fn from_release(release: Vec<u64>) -> Self {
        Self {
            epoch: 0,
            release,
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    /// Whether this is a pre-release in the PEP 440 sense: any alpha/beta/rc or
    /// dev marker makes a version a pre-release.
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    /// Whether this version carries a local segment (`1.0+cpu`).
    pub fn is_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// This version with the local segment dropped, for `==` matching where
    /// `==1.0` accepts `1.0+anything`.
    pub fn without_local(&self) -> Self {
        Self {
            local: Vec::new(),
            ..self.clone()
        }
    }

    /// Compare the release tuples only, with zero padding on the shorter side.
    pub fn compare_release(&self, other: &[u64]) -> Ordering {
        compare_release(&self.release, other)
    }
}

fn compare_release(lhs: &[u64], rhs: &[u64]) -> Ordering {
    let len = lhs.len().max(rhs.len());
    for i in 0..len {
        let left = lhs.get(i).copied().unwrap_or(0);
        let right = rhs.get(i).copied().unwrap_or(0);
        match left.cmp(&right) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

/// The position of a version within its release, following the pypa/packaging
/// sort key: a dev-only release sorts below any pre-release, which sorts below
/// the final release, which sorts below post releases.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum PhaseKey {
    DevOnly,
    Pre(PreRelease, u64),
    Final,
}

impl Version {
    fn phase_key(&self) -> PhaseKey {
        match self.pre {
            Some((kind, number)) => PhaseKey::Pre(kind, number),
            None if self.post.is_none() && self.dev.is_some() => PhaseKey::DevOnly,
            None => PhaseKey::Final,
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_release(&self.release, &other.release))
            .then_with(|| self.phase_key().cmp(&other.phase_key()))
            // No post sorts below any post.
            .then_with(|| self.post.map(|n| (1, n)).unwrap_or((0, 0)).cmp(
                &other.post.map(|n| (1, n)).unwrap_or((0, 0)),
            ))
            // A dev marker sorts below the devless equivalent.
            .then_with(|| self.dev.map(|n| (0, n)).unwrap_or((1, 0)).cmp(
                &other.dev.map(|n| (0, n)).unwrap_or((1, 0)),
            ))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release = self
            .release
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<String>>()
            .join(".");
        write!(f, "{release}")?;
        if let Some((kind, number)) = self.pre {
            write!(f, "{kind}{number}")?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        if !self.local.is_empty() {
            let local = self
                .local
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<String>>()
                .join(".");
            write!(f, "+{local}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    /// Parse a version such as `1.19`, `1!2.3.4rc1.post2.dev3+ubuntu.1`.
    ///
    /// Accepts the common normalizations: a leading `v`, uppercase letters,
    /// `alpha`/`beta`/`c`/`pre`/`preview` spellings, and `.`/`-`/`_` separators
    /// before the pre/post/dev markers.
    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let original = version;
        let version = version.trim().to_ascii_lowercase();
        let version = version.strip_prefix('v').unwrap_or(&version);
        if version.is_empty() {
            return Err(VersionParseError::new(original, "empty version"));
        }

        let mut cursor = Cursor::new(version, original);

        let Some(first) = cursor.take_number() else {
            return Err(cursor.error("expected a number"));
        };
        let epoch = if cursor.eat('!') {
            // The number was the epoch; the release starts after the `!`.
            match cursor.take_number() {
                Some(number) => cursor.release.push(number),
                None => return Err(cursor.error("expected a release segment after the epoch")),
            }
            first
        } else {
            cursor.release.push(first);
            0
        };
        // Further release segments: consume `.N` pairs, leaving a dot that
        // introduces a suffix (`.post1`, `.dev0`) untouched.
        loop {
            let checkpoint = cursor.rest;
            if !cursor.eat('.') {
                break;
            }
            match cursor.take_number() {
                Some(number) => cursor.release.push(number),
                None => {
                    cursor.rest = checkpoint;
                    break;
                }
            }
        }

        let pre = cursor.take_pre()?;
        let post = cursor.take_post()?;
        let dev = cursor.take_dev()?;
        let local = cursor.take_local()?;

        if !cursor.at_end() {
            return Err(cursor.error("unexpected trailing characters"));
        }

        Ok(Self {
            epoch,
            release: cursor.release,
            pre,
            post,
            dev,
            local,
        })
    }
}

/// A malformed version such as `x.y.z`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Version `{version}` doesn't match PEP 440 rules: {message}")]
pub struct VersionParseError {
    pub(crate) version: String,
    pub(crate) message: String,
}

impl VersionParseError {
    fn new(version: &str, message: impl Into<String>) -> Self {
        Self {
            version: version.to_string(),
            message: message.into(),
        }
    }
}

/// A tiny hand-rolled cursor over the lowercased version string.
struct Cursor<'a> {
    rest: &'a str,
    original: &'a str,
    release: Vec<u64>,
}

impl<'a> Cursor<'a> {
    fn new(rest: &'a str, original: &'a str) -> Self {
        Self {
            rest,
            original,
            release: Vec::new(),
        }
    }

    fn at_end(&self) -> bool {
        self.rest.is_empty()
    }

    fn error(&self, message: impl Into<String>) -> VersionParseError {
        VersionParseError::new(self.original, message)
    }

    fn eat(&mut self, char: char) -> bool {
        if let Some(rest) = self.rest.strip_prefix(char) {
            self.rest = rest;
            true
        } else {
            false
        }
    }

    /// Eat one of `.`, `-`, `_` if present. The separators before pre/post/dev
    /// markers are all interchangeable.
    fn eat_separator(&mut self) -> bool {
        self.eat('.') || self.eat('-') || self.eat('_')
    }

    fn eat_keyword(&mut self, keywords: &[&str]) -> bool {
        for keyword in keywords {
            if let Some(rest) = self.rest.strip_prefix(keyword) {
                self.rest = rest;
                return true;
            }
        }
        false
    }

    fn take_number(&mut self) -> Option<u64> {
        let digits = self.rest.len() - self.rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            return None;
        }
        let (number, rest) = self.rest.split_at(digits);
        self.rest = rest;
        // Leading zeros are allowed ("1.01" == "1.1"), overflow is not.
        number.parse().ok()
    }

    fn take_pre(&mut self) -> Result<Option<(PreRelease, u64)>, VersionParseError> {
        let checkpoint = self.rest;
        self.eat_separator();
        // Order matters: `rc` before `c`, `alpha`/`beta` before `a`/`b`.
        let kind = if self.eat_keyword(&["alpha", "a"]) {
            PreRelease::Alpha
        } else if self.eat_keyword(&["beta", "b"]) {
            PreRelease::Beta
        } else if self.eat_keyword(&["rc", "preview", "pre", "c"]) {
            PreRelease::Rc
        } else {
            self.rest = checkpoint;
            return Ok(None);
        };
        self.eat_separator();
        let number = self.take_number().unwrap_or(0);
        Ok(Some((kind, number)))
    }

    fn take_post(&mut self) -> Result<Option<u64>, VersionParseError> {
        let checkpoint = self.rest;
        // Implicit post release: `1.0-1`.
        if self.eat('-') {
            if let Some(number) = self.take_number() {
                return Ok(Some(number));
            }
            self.rest = checkpoint;
        }
        self.eat_separator();
        if self.eat_keyword(&["post", "rev", "r"]) {
            self.eat_separator();
            return Ok(Some(self.take_number().unwrap_or(0)));
        }
        self.rest = checkpoint;
        Ok(None)
    }

    fn take_dev(&mut self) -> Result<Option<u64>, VersionParseError> {
        let checkpoint = self.rest;
        self.eat_separator();
        if self.eat_keyword(&["dev"]) {
            self.eat_separator();
            return Ok(Some(self.take_number().unwrap_or(0)));
        }
        self.rest = checkpoint;
        Ok(None)
    }

    fn take_local(&mut self) -> Result<Vec<LocalSegment>, VersionParseError> {
        if !self.eat('+') {
            return Ok(Vec::new());
        }
        let mut segments = Vec::new();
        for segment in self.rest.split(['.', '-', '_']) {
            if segment.is_empty() {
                return Err(self.error("empty local version segment"));
            }
            if !segment.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(self.error("invalid character in local version"));
            }
            match segment.parse::<u64>() {
                Ok(number) => segments.push(LocalSegment::Number(number)),
                Err(_) => segments.push(LocalSegment::String(segment.to_string())),
            }
        }
        self.rest = "";
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;
    use std::str::FromStr;

    use super::{PreRelease, Version};

    fn version(s: &str) -> Version {
        Version::from_str(s).unwrap()
    }

    #[test]
    fn parse_simple() {
        let v = version("1.19");
        assert_eq!(v.epoch, 0);
        assert_eq!(v.release, vec![1, 19]);
        assert!(v.pre.is_none() && v.post.is_none() && v.dev.is_none());
    }

    #[test]
    fn parse_everything() {
        let v = version("1!2.3.4rc1.post2.dev3+ubuntu.1");
        assert_eq!(v.epoch, 1);
        assert_eq!(v.release, vec![2, 3, 4]);
        assert_eq!(v.pre, Some((PreRelease::Rc, 1)));
        assert_eq!(v.post, Some(2));
        assert_eq!(v.dev, Some(3));
        assert_eq!(v.local.len(), 2);
    }

    #[test]
    fn parse_normalizations() {
        assert_eq!(version("v1.0"), version("1.0"));
        assert_eq!(version("1.0alpha1"), version("1.0a1"));
        assert_eq!(version("1.0-beta-2"), version("1.0b2"));
        assert_eq!(version("1.0c3"), version("1.0rc3"));
        assert_eq!(version("1.0-post1"), version("1.0.post1"));
        assert_eq!(version("1.0-1"), version("1.0.post1"));
        assert_eq!(version("1.0.REV2"), version("1.0.post2"));
        assert_eq!(version("1.01"), version("1.1"));
    }

    #[test]
    fn parse_errors() {
        for bad in ["", "x.y.z", "1.0!", "1.0+", "1.0.", "not-a-version"] {
            assert!(Version::from_str(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn ordering() {
        // From lowest to highest, per PEP 440's example chain.
        let ordered = [
            "1.0.dev1", "1.0a1", "1.0a2.dev1", "1.0a2", "1.0b1", "1.0rc1", "1.0", "1.0+local",
            "1.0.post1", "1.1.dev1", "1.1",
        ];
        for window in ordered.windows(2) {
            assert_eq!(
                version(window[0]).cmp(&version(window[1])),
                Ordering::Less,
                "{} < {}",
                window[0],
                window[1]
            );
        }
    }

    #[test]
    fn epoch_dominates() {
        assert!(version("1!0.1") > version("999.0"));
    }

    #[test]
    fn zero_padding() {
        assert_eq!(version("1.0"), version("1.0.0"));
        assert!(version("1.0.1") > version("1.0"));
    }

    #[test]
    fn prerelease_detection() {
        assert!(version("1.0a1").is_prerelease());
        assert!(version("1.0.dev1").is_prerelease());
        assert!(!version("1.0.post1").is_prerelease());
        assert!(!version("1.0").is_prerelease());
    }

    #[test]
    fn display_round_trip() {
        for s in ["1.19", "1!2.3.4rc1.post2.dev3+ubuntu.1", "1.0a0", "2.0.post0"] {
            assert_eq!(version(s).to_string(), s);
        }
    }
}
