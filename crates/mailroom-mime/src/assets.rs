//! Asset resolution and request context.
//!
//! Attachments given by a relative path are resolved against a library's
//! `mails/_assets` directory. Base URL discovery asks a [`RequestContext`]
//! for the ambient host.

use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Options passed to an [`AssetResolver`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetOptions {
    /// Report failure if the resolved file does not exist.
    pub check: bool,
    /// Library whose asset directory relative paths resolve against. `None`
    /// selects the default library.
    pub library: Option<String>,
}

/// Resolves attachment paths.
pub trait AssetResolver: Send + Sync + fmt::Debug {
    /// Resolves `path` to an absolute path or URL, or `None` on failure.
    fn resolve(&self, path: &str, options: &AssetOptions) -> Option<String>;
}

/// Returns true if the path is a URL with a `scheme://` prefix.
#[must_use]
pub fn is_url(path: &str) -> bool {
    Url::parse(path).is_ok_and(|url| {
        path.get(url.scheme().len()..)
            .is_some_and(|rest| rest.starts_with("://"))
    })
}

/// Filesystem backed asset resolver.
///
/// URLs and absolute paths are returned unchanged, relative paths resolve to
/// `{library root}/mails/_assets/{path}`.
#[derive(Debug, Clone)]
pub struct FsAssets {
    root: PathBuf,
    libraries: IndexMap<String, PathBuf>,
}

impl Default for FsAssets {
    fn default() -> Self {
        Self::new(".")
    }
}

impl FsAssets {
    /// Creates a resolver whose default library lives at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            libraries: IndexMap::new(),
        }
    }

    /// Adds a named library root.
    #[must_use]
    pub fn with_library(mut self, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.libraries.insert(name.into(), root.into());
        self
    }

    fn library_root(&self, library: Option<&str>) -> Option<&Path> {
        match library {
            None => Some(&self.root),
            Some(name) => self.libraries.get(name).map(PathBuf::as_path),
        }
    }
}

impl AssetResolver for FsAssets {
    fn resolve(&self, path: &str, options: &AssetOptions) -> Option<String> {
        if is_url(path) {
            return Some(path.to_string());
        }
        let resolved = if path.starts_with('/') {
            PathBuf::from(path)
        } else {
            let Some(root) = self.library_root(options.library.as_deref()) else {
                tracing::warn!(library = ?options.library, "Unknown asset library");
                return None;
            };
            root.join("mails").join("_assets").join(path)
        };
        if options.check && !resolved.is_file() {
            tracing::debug!(path = %resolved.display(), "Asset does not exist");
            return None;
        }
        Some(resolved.to_string_lossy().into_owned())
    }
}

/// Ambient request information used to discover a message's base URL.
pub trait RequestContext: Send + Sync + fmt::Debug {
    /// Host name (with port, if any) of the current request.
    fn host(&self) -> Option<String>;
    /// Whether the current request was made over HTTPS.
    fn https(&self) -> bool;
    /// Base path of the application, e.g. `/app`.
    fn base(&self) -> String;

    /// Builds the base URL, or `None` when there is no host.
    fn base_url(&self) -> Option<String> {
        let host = self.host().filter(|h| !h.is_empty())?;
        let scheme = if self.https() { "https://" } else { "http://" };
        Some(format!("{scheme}{host}{}", self.base()))
    }
}

/// Fixed request context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticRequest {
    /// Request host.
    pub host: Option<String>,
    /// Whether HTTPS was used.
    pub https: bool,
    /// Application base path.
    pub base: String,
}

impl StaticRequest {
    /// Creates a context for a plain HTTP host.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Self::default()
        }
    }

    /// Marks the context as HTTPS.
    #[must_use]
    pub const fn secure(mut self) -> Self {
        self.https = true;
        self
    }

    /// Sets the base path.
    #[must_use]
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }
}

impl RequestContext for StaticRequest {
    fn host(&self) -> Option<String> {
        self.host.clone()
    }

    fn https(&self) -> bool {
        self.https
    }

    fn base(&self) -> String {
        self.base.clone()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_url() {
        assert!(is_url("http://example.com/a.png"));
        assert!(is_url("HTTPS://example.com"));
        assert!(is_url("s3-bucket://x"));
        assert!(!is_url("/tmp/file"));
        assert!(!is_url("relative/file.txt"));
        assert!(!is_url("C:/mails/file.txt"));
        assert!(!is_url("mailto:user@example.com"));
        assert!(!is_url("http://bad host/x"));
    }

    #[test]
    fn test_resolve_passthrough() {
        let assets = FsAssets::new("/srv/app");
        let options = AssetOptions::default();
        assert_eq!(
            assets.resolve("http://example.com/x.png", &options).as_deref(),
            Some("http://example.com/x.png")
        );
        assert_eq!(assets.resolve("/tmp/x.png", &options).as_deref(), Some("/tmp/x.png"));
    }

    #[test]
    fn test_resolve_relative() {
        let assets = FsAssets::new("/srv/app").with_library("other", "/srv/other");
        let resolved = assets.resolve("logo.png", &AssetOptions::default()).unwrap();
        assert_eq!(resolved, "/srv/app/mails/_assets/logo.png");

        let options = AssetOptions {
            check: false,
            library: Some("other".to_string()),
        };
        let resolved = assets.resolve("logo.png", &options).unwrap();
        assert_eq!(resolved, "/srv/other/mails/_assets/logo.png");

        let options = AssetOptions {
            check: false,
            library: Some("missing".to_string()),
        };
        assert_eq!(assets.resolve("logo.png", &options), None);
    }

    #[test]
    fn test_resolve_check() {
        let dir = tempfile::tempdir().unwrap();
        let assets_dir = dir.path().join("mails").join("_assets");
        fs::create_dir_all(&assets_dir).unwrap();
        fs::write(assets_dir.join("present.txt"), "x").unwrap();

        let assets = FsAssets::new(dir.path());
        let checked = AssetOptions {
            check: true,
            library: None,
        };
        assert!(assets.resolve("present.txt", &checked).is_some());
        assert!(assets.resolve("absent.txt", &checked).is_none());
        assert!(assets.resolve("absent.txt", &AssetOptions::default()).is_some());
    }

    #[test]
    fn test_static_request_base_url() {
        assert_eq!(
            StaticRequest::new("foo.local").base_url().as_deref(),
            Some("http://foo.local")
        );
        assert_eq!(
            StaticRequest::new("foo.local").secure().with_base("/app").base_url().as_deref(),
            Some("https://foo.local/app")
        );
        assert_eq!(StaticRequest::default().base_url(), None);
    }
}
