//! Shared message configuration.

use crate::assets::{AssetResolver, FsAssets, RequestContext};
use crate::grammar::Grammar;
use crate::media::{MediaTypes, MimeTypes};
use std::fmt;
use std::sync::Arc;

/// Collaborators and tables every [`Message`](crate::Message) consults.
///
/// Built once at startup and shared between messages through an `Arc`.
#[derive(Clone)]
pub struct Registry {
    /// Short type name to content type mapping.
    pub media: MediaTypes,
    /// Extension to content type table for attachments.
    pub mime_types: MimeTypes,
    /// Grammar used to validate generated Content-IDs.
    pub grammar: Grammar,
    /// Resolver for attachment paths.
    pub assets: Arc<dyn AssetResolver>,
    /// Ambient request used for base URL discovery.
    pub request: Option<Arc<dyn RequestContext>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            media: MediaTypes::new(),
            mime_types: MimeTypes::default(),
            grammar: Grammar::new(),
            assets: Arc::new(FsAssets::default()),
            request: None,
        }
    }
}

impl Registry {
    /// Creates a registry with the built-in tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the asset resolver.
    #[must_use]
    pub fn with_assets(mut self, assets: impl AssetResolver + 'static) -> Self {
        self.assets = Arc::new(assets);
        self
    }

    /// Sets the request context.
    #[must_use]
    pub fn with_request(mut self, request: impl RequestContext + 'static) -> Self {
        self.request = Some(Arc::new(request));
        self
    }

    /// Replaces the media types.
    #[must_use]
    pub fn with_media(mut self, media: MediaTypes) -> Self {
        self.media = media;
        self
    }

    /// Replaces the extension table.
    #[must_use]
    pub fn with_mime_types(mut self, mime_types: MimeTypes) -> Self {
        self.mime_types = mime_types;
        self
    }

    /// Replaces the grammar.
    #[must_use]
    pub fn with_grammar(mut self, grammar: Grammar) -> Self {
        self.grammar = grammar;
        self
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("media", &self.media)
            .field("assets", &self.assets)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}
