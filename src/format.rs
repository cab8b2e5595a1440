//! Format registry: maps format names to templates or custom render
//! functions.

use crate::exchange::{RequestInfo, ResponseInfo};
use dashmap::DashMap;
use std::sync::Arc;

/// A custom render function. Returning `None` skips the line entirely.
pub type FormatFn = Arc<dyn Fn(&RequestInfo, &ResponseInfo) -> Option<String> + Send + Sync>;

/// The single built-in format, registered under the name `"default"`.
pub const DEFAULT_FORMAT: &str = ":remote-addr - [:date] \":method :url HTTP/:http-version\" :status :res[content-length] \":referrer\" \":user-agent\" :response-time ms :cpu s :memory mb";

/// A named format entry: either a template string compiled later, or an
/// already-executable render function.
#[derive(Clone)]
pub enum Format {
    Template(String),
    Custom(FormatFn),
}

impl Format {
    /// Wrap a render function as a format entry.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&RequestInfo, &ResponseInfo) -> Option<String> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }
}

impl From<&str> for Format {
    fn from(template: &str) -> Self {
        Self::Template(template.to_string())
    }
}

impl From<String> for Format {
    fn from(template: String) -> Self {
        Self::Template(template)
    }
}

impl std::fmt::Debug for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Self::Custom(_) => f.debug_tuple("Custom").finish(),
        }
    }
}

/// Named format map with the same ownership and last-write-wins semantics as
/// [`TokenRegistry`](crate::token::TokenRegistry).
pub struct FormatRegistry {
    formats: DashMap<String, Format>,
}

impl FormatRegistry {
    /// A registry holding only the `"default"` entry.
    pub fn with_builtins() -> Self {
        let registry = Self {
            formats: DashMap::new(),
        };
        registry.define("default", DEFAULT_FORMAT);
        registry
    }

    /// Store (or overwrite) the format under `name`.
    pub fn define(&self, name: &str, format: impl Into<Format>) {
        self.formats.insert(name.to_string(), format.into());
    }

    /// Look up the format registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<Format> {
        self.formats.get(name).map(|entry| entry.value().clone())
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format_registered() {
        let registry = FormatRegistry::with_builtins();
        match registry.lookup("default") {
            Some(Format::Template(t)) => assert_eq!(t, DEFAULT_FORMAT),
            other => panic!("expected default template, got {other:?}"),
        }
    }

    #[test]
    fn test_define_overwrites() {
        let registry = FormatRegistry::with_builtins();
        registry.define("short", ":method :url");
        registry.define("short", ":method :url :status");

        match registry.lookup("short") {
            Some(Format::Template(t)) => assert_eq!(t, ":method :url :status"),
            other => panic!("expected template, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_format_entry() {
        let registry = FormatRegistry::with_builtins();
        registry.define("skip-all", Format::custom(|_req, _res| None));

        assert!(matches!(registry.lookup("skip-all"), Some(Format::Custom(_))));
        assert!(registry.lookup("unknown").is_none());
    }
}
