//! Locators and versioned locators (spec.md §3).
//!
//! A [`Locator`] is a URL-shaped module identifier. Only `file://` locators
//! are ever read, watched, hashed or cached; any other scheme is opaque to
//! the core.

use rand::RngCore;
use url::Url;

/// A URL-shaped string identifying a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator(Url);

impl Locator {
    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        Url::parse(raw).map(Locator)
    }

    pub fn from_file_path(path: &std::path::Path) -> Option<Self> {
        Url::from_file_path(path).ok().map(Locator)
    }

    pub fn is_file(&self) -> bool {
        self.0.scheme() == "file"
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn join(&self, specifier: &str) -> Result<Locator, url::ParseError> {
        self.0.join(specifier).map(Locator)
    }

    pub fn to_file_path(&self) -> Option<std::path::PathBuf> {
        self.0.to_file_path().ok()
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The per-instance random tag embedded in every versioned locator path.
///
/// Stable for the lifetime of the core instance (spec.md §3 invariant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unguessable(String);

impl Unguessable {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Unguessable(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Inject `/v<version>/<unguessable>/` immediately after the scheme of a
/// `file://` locator, producing the externally visible, cache-busting URL.
///
/// `locator` must be a `file://` locator; non-file locators have no
/// versioned form and callers should not call this for them (see
/// [`crate::hasher::versionize`]).
pub fn version_locator(locator: &Locator, version: u64, tag: &Unguessable) -> String {
    debug_assert!(locator.is_file());
    let rest = locator
        .as_str()
        .strip_prefix("file://")
        .unwrap_or_else(|| locator.as_str());
    format!("file:///v{}/{}{}", version, tag.as_str(), rest)
}

/// The inverse of [`version_locator`]: strip a versioned segment bearing
/// this instance's tag, returning the underlying (unversioned) locator
/// string. Returns `None` if the path does not carry *this* instance's tag
/// (so it is not mistaken for a versioned locator - spec.md §3).
pub fn strip_version(path: &str, tag: &Unguessable) -> Option<String> {
    let rest = path.strip_prefix('/')?;
    let rest = rest.strip_prefix('v')?;
    let slash = rest.find('/')?;
    let (version_str, after_version) = rest.split_at(slash);
    if version_str.parse::<u64>().is_err() {
        return None;
    }
    let after_version = &after_version[1..]; // drop the leading '/'
    let after_tag = after_version.strip_prefix(tag.as_str())?;
    Some(after_tag.to_string())
}
