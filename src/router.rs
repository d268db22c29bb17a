//! Collection-to-embedding routing.
//!
//! Maps a collection name to the embedding profile it is indexed with. The
//! mapping is an ordered rule table checked top to bottom; the first matching
//! rule picks the [`ProfileKind`], and names matching no rule fall back to
//! [`ProfileKind::Code`]. Routing is pure: no I/O, no errors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{EmbeddingProfileConfig, ProfilesConfig};

/// Prefix shared by every documentation collection.
pub const DOCS_PREFIX: &str = "docs_";

/// Which family of embedding settings a collection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    Code,
    Documentation,
    Conversation,
}

impl ProfileKind {
    pub const ALL: [ProfileKind; 3] = [
        ProfileKind::Code,
        ProfileKind::Documentation,
        ProfileKind::Conversation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProfileKind::Code => "code",
            ProfileKind::Documentation => "documentation",
            ProfileKind::Conversation => "conversation",
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    OpenAi,
    Ollama,
    Mock,
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EmbeddingProvider::OpenAi => "openai",
            EmbeddingProvider::Ollama => "ollama",
            EmbeddingProvider::Mock => "mock",
        })
    }
}

/// Provider, model and dimensionality used to embed one family of collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddingProfile {
    pub kind: ProfileKind,
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimensions: usize,
    pub url: Option<String>,
}

impl EmbeddingProfile {
    fn from_config(kind: ProfileKind, cfg: &EmbeddingProfileConfig) -> Self {
        Self {
            kind,
            provider: cfg.provider,
            model: cfg.model.clone(),
            dimensions: cfg.dimensions,
            url: cfg.url.clone(),
        }
    }
}

/// How a rule matches a collection name. Matching is case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamePattern {
    Prefix(&'static str),
    Contains(&'static str),
}

impl NamePattern {
    pub fn matches(self, name: &str) -> bool {
        match self {
            NamePattern::Prefix(p) => name.starts_with(p),
            NamePattern::Contains(s) => name.contains(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRule {
    pub pattern: NamePattern,
    pub kind: ProfileKind,
}

/// Checked in order; first match wins.
pub const ROUTE_RULES: &[RouteRule] = &[
    RouteRule {
        pattern: NamePattern::Prefix(DOCS_PREFIX),
        kind: ProfileKind::Documentation,
    },
    RouteRule {
        pattern: NamePattern::Contains("conversation"),
        kind: ProfileKind::Conversation,
    },
    RouteRule {
        pattern: NamePattern::Contains("memory"),
        kind: ProfileKind::Conversation,
    },
];

pub const DEFAULT_KIND: ProfileKind = ProfileKind::Code;

/// Classify a collection name against [`ROUTE_RULES`].
pub fn classify(name: &str) -> ProfileKind {
    ROUTE_RULES
        .iter()
        .find(|rule| rule.pattern.matches(name))
        .map_or(DEFAULT_KIND, |rule| rule.kind)
}

/// Canonical collection name for a library's documentation.
///
/// `docs_collection("Llama-Index")` → `"docs_llama_index"`.
pub fn docs_collection(library: &str) -> String {
    format!("{DOCS_PREFIX}{}", library.to_lowercase().replace('-', "_"))
}

/// Library name for a documentation collection, or `None` for other collections.
pub fn framework_name(collection: &str) -> Option<&str> {
    collection.strip_prefix(DOCS_PREFIX)
}

/// Resolves collection names to their configured embedding profiles.
#[derive(Debug, Clone)]
pub struct CollectionRouter {
    code: EmbeddingProfile,
    documentation: EmbeddingProfile,
    conversation: EmbeddingProfile,
}

impl CollectionRouter {
    pub fn new(profiles: ProfilesConfig) -> Self {
        Self {
            code: EmbeddingProfile::from_config(ProfileKind::Code, &profiles.code),
            documentation: EmbeddingProfile::from_config(
                ProfileKind::Documentation,
                &profiles.documentation,
            ),
            conversation: EmbeddingProfile::from_config(
                ProfileKind::Conversation,
                &profiles.conversation,
            ),
        }
    }

    pub fn profile(&self, kind: ProfileKind) -> &EmbeddingProfile {
        match kind {
            ProfileKind::Code => &self.code,
            ProfileKind::Documentation => &self.documentation,
            ProfileKind::Conversation => &self.conversation,
        }
    }

    /// Embedding profile for `name`. Total: every string routes somewhere.
    pub fn route(&self, name: &str) -> &EmbeddingProfile {
        self.profile(classify(name))
    }
}

impl Default for CollectionRouter {
    fn default() -> Self {
        Self::new(ProfilesConfig::default())
    }
}
