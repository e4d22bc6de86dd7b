//! Media type registries.
//!
//! [`MediaTypes`] maps the short type names a message is rendered in
//! (`html`, `text`, ...) to content types. [`MimeTypes`] maps file
//! extensions to content types for attachments.

use indexmap::IndexMap;

/// Content type used when nothing more specific is known.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Short type name to content type mapping.
///
/// A type is handled by the rendering pipeline only while it is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTypes {
    types: IndexMap<String, String>,
}

impl Default for MediaTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaTypes {
    /// Creates the registry with `html` and `text` registered.
    #[must_use]
    pub fn new() -> Self {
        let types = [("html", "text/html"), ("text", "text/plain")]
            .into_iter()
            .map(|(name, content_type)| (name.to_string(), content_type.to_string()))
            .collect();
        Self { types }
    }

    /// Registers (or replaces) a type.
    pub fn register(&mut self, name: impl Into<String>, content_type: impl Into<String>) {
        self.types.insert(name.into(), content_type.into());
    }

    /// Removes a type, returning its content type.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.types.shift_remove(name)
    }

    /// Looks up the content type for a short type name.
    #[must_use]
    pub fn content_type(&self, name: &str) -> Option<&str> {
        self.types.get(name).map(String::as_str)
    }

    /// Returns true if the type is registered.
    #[must_use]
    pub fn is_handled(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Returns all registered types.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.types.iter().map(|(n, c)| (n.as_str(), c.as_str()))
    }
}

const DEFAULT_MIME_TYPES: &[(&str, &str)] = &[
    ("aif", "audio/x-aiff"),
    ("aiff", "audio/x-aiff"),
    ("avi", "video/avi"),
    ("bmp", "image/bmp"),
    ("bz2", "application/x-bz2"),
    ("csv", "text/csv"),
    ("dmg", "application/x-apple-diskimage"),
    ("doc", "application/msword"),
    ("eml", "message/rfc822"),
    ("aps", "application/postscript"),
    ("exe", "application/x-ms-dos-executable"),
    ("flv", "video/x-flv"),
    ("gif", "image/gif"),
    ("gz", "application/x-gzip"),
    ("hqx", "application/stuffit"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("jar", "application/x-java-archive"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("m3u", "audio/x-mpegurl"),
    ("m4a", "audio/mp4"),
    ("mdb", "application/x-msaccess"),
    ("mid", "audio/midi"),
    ("midi", "audio/midi"),
    ("mov", "video/quicktime"),
    ("mp3", "audio/mpeg"),
    ("mp4", "video/mp4"),
    ("mpeg", "video/mpeg"),
    ("mpg", "video/mpeg"),
    ("odg", "vnd.oasis.opendocument.graphics"),
    ("odp", "vnd.oasis.opendocument.presentation"),
    ("odt", "vnd.oasis.opendocument.text"),
    ("ods", "vnd.oasis.opendocument.spreadsheet"),
    ("ogg", "audio/ogg"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("ps", "application/postscript"),
    ("rar", "application/x-rar-compressed"),
    ("rtf", "application/rtf"),
    ("tar", "application/x-tar"),
    ("sit", "application/x-stuffit"),
    ("svg", "image/svg+xml"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("ttf", "application/x-font-truetype"),
    ("txt", "text/plain"),
    ("vcf", "text/x-vcard"),
    ("wav", "audio/wav"),
    ("wma", "audio/x-ms-wma"),
    ("wmv", "audio/x-ms-wmv"),
    ("xls", "application/excel"),
    ("xml", "application/xml"),
    ("zip", "application/zip"),
];

const OPENXML: &str = "application/vnd.openxmlformats-officedocument";

/// File extension to content type table used for attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeTypes {
    types: IndexMap<String, String>,
}

impl Default for MimeTypes {
    fn default() -> Self {
        Self::with_overrides(std::iter::empty::<(String, String)>())
    }
}

impl MimeTypes {
    /// Creates the table, applying caller supplied entries over the
    /// built-in ones.
    ///
    /// The OpenXML office types are only added when the caller did not
    /// provide them.
    #[must_use]
    pub fn with_overrides<I, E, C>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (E, C)>,
        E: Into<String>,
        C: Into<String>,
    {
        let mut types: IndexMap<String, String> = DEFAULT_MIME_TYPES
            .iter()
            .map(|(ext, ct)| ((*ext).to_string(), (*ct).to_string()))
            .collect();
        types.extend(overrides.into_iter().map(|(e, c)| (e.into(), c.into())));

        for (ext, kind) in [
            ("docx", "wordprocessingml.document"),
            ("pptx", "presentationml.presentation"),
            ("xlsx", "spreadsheetml.sheet"),
        ] {
            types
                .entry(ext.to_string())
                .or_insert_with(|| format!("{OPENXML}.{kind}"));
        }
        Self { types }
    }

    /// Looks up the content type for an extension (case-sensitive).
    #[must_use]
    pub fn get(&self, extension: &str) -> Option<&str> {
        self.types.get(extension).map(String::as_str)
    }

    /// Sets the content type for an extension.
    pub fn insert(&mut self, extension: impl Into<String>, content_type: impl Into<String>) {
        self.types.insert(extension.into(), content_type.into());
    }

    /// Infers the content type from a file name's extension.
    #[must_use]
    pub fn for_filename(&self, filename: &str) -> Option<&str> {
        extension(filename).and_then(|ext| self.get(ext))
    }
}

/// Returns the extension of the last path component, without the dot.
#[must_use]
pub fn extension(path: &str) -> Option<&str> {
    basename(path)
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}

/// Returns the last component of a path or URL, ignoring trailing slashes.
#[must_use]
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
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

    #[test]
    fn test_media_defaults() {
        let media = MediaTypes::new();
        assert_eq!(media.content_type("html"), Some("text/html"));
        assert_eq!(media.content_type("text"), Some("text/plain"));
        assert_eq!(media.content_type("foo"), None);
    }

    #[test]
    fn test_media_register_remove() {
        let mut media = MediaTypes::new();
        media.register("foo", "text/foo");
        assert_eq!(media.content_type("foo"), Some("text/foo"));
        assert!(media.is_handled("foo"));

        assert_eq!(media.remove("foo"), Some("text/foo".to_string()));
        assert!(!media.is_handled("foo"));
        assert_eq!(media.iter().count(), 2);
    }

    #[test]
    fn test_mime_defaults() {
        let mime = MimeTypes::default();
        assert_eq!(mime.get("pdf"), Some("application/pdf"));
        assert_eq!(mime.get("PDF"), None);
        assert_eq!(
            mime.get("docx"),
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        );
        assert_eq!(
            mime.for_filename("/tmp/sheet.xlsx"),
            Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        );
        assert_eq!(mime.for_filename("README"), None);
    }

    #[test]
    fn test_mime_overrides() {
        let mime = MimeTypes::with_overrides([("foo", "text/foo"), ("pdf", "x/pdf"), ("docx", "x/docx")]);
        assert_eq!(mime.get("foo"), Some("text/foo"));
        assert_eq!(mime.get("pdf"), Some("x/pdf"));
        assert_eq!(mime.get("docx"), Some("x/docx"));
    }

    #[test]
    fn test_basename_extension() {
        assert_eq!(basename("/tmp/foo/bar.txt"), "bar.txt");
        assert_eq!(basename("bar.txt"), "bar.txt");
        assert_eq!(basename("http://example.com/img/logo.png"), "logo.png");
        assert_eq!(extension("/tmp/archive.tar.gz"), Some("gz"));
        assert_eq!(extension("/tmp.d/file"), None);
        assert_eq!(extension("name."), None);
    }
}
