//! Template compiler: parses a format string into segments and renders them
//! against an exchange.
//!
//! A template is data, never generated code: the compiler produces an ordered
//! list of literal fragments and token references, and the renderer walks
//! that list. Literal text in a template can therefore never escape into
//! anything executable.

use crate::error::RenderError;
use crate::exchange::{RequestInfo, ResponseInfo};
use crate::format::FormatFn;
use crate::token::TokenRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the renderer does when a template references a token nobody
/// registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingTokenPolicy {
    /// Fail the render with [`RenderError::UnknownToken`]. The default:
    /// an unregistered token is a configuration bug worth surfacing.
    #[default]
    Strict,
    /// Render `-`, the same placeholder used for legitimately absent data.
    Placeholder,
}

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Verbatim text between token references.
    Literal(String),
    /// A token reference `:name` or `:name[arg]`.
    Token { name: String, arg: Option<String> },
}

/// A parsed template: concatenating the rendered segments in order yields the
/// log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

impl Template {
    /// Parse a template string.
    ///
    /// A token reference is a `:` immediately followed by a name of two or
    /// more characters from `[A-Za-z0-9_-]`, optionally followed immediately
    /// by a bracketed argument (characters up to the first `]`, no nesting).
    /// Anything that does not match, including one-character names, stays
    /// literal. Parsing never fails.
    pub fn parse(input: &str) -> Self {
        let bytes = input.as_bytes();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] == b':' {
                let name_start = i + 1;
                let mut name_end = name_start;
                while name_end < bytes.len() && is_token_char(bytes[name_end]) {
                    name_end += 1;
                }

                if name_end - name_start >= 2 {
                    let name = input[name_start..name_end].to_string();
                    let mut next = name_end;
                    let mut arg = None;

                    if next < bytes.len() && bytes[next] == b'[' {
                        if let Some(close) = input[next + 1..].find(']') {
                            if close > 0 {
                                arg = Some(input[next + 1..next + 1 + close].to_string());
                                next = next + 1 + close + 1;
                            }
                        }
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Token { name, arg });
                    i = next;
                    continue;
                }
            }

            let ch = input[i..].chars().next().unwrap_or('\u{FFFD}');
            literal.push(ch);
            i += ch.len_utf8();
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

#[derive(Clone)]
enum RendererKind {
    Template(Arc<Template>),
    Custom(FormatFn),
}

/// A compiled renderer: closed over a fixed template (or custom format
/// function) plus a token registry handle.
///
/// Token names resolve against the registry at *render* time, so tokens may
/// be registered after compilation as long as they exist before the first
/// render. Renderers hold no mutable state and are safe to invoke from many
/// in-flight exchanges at once.
#[derive(Clone)]
pub struct Renderer {
    kind: RendererKind,
    tokens: Arc<TokenRegistry>,
    missing: MissingTokenPolicy,
}

impl Renderer {
    /// Compile a parsed template against a token registry.
    pub fn template(
        template: Template,
        tokens: Arc<TokenRegistry>,
        missing: MissingTokenPolicy,
    ) -> Self {
        Self {
            kind: RendererKind::Template(Arc::new(template)),
            tokens,
            missing,
        }
    }

    /// Wrap a custom format function. The registry handle is kept so the
    /// function could be swapped for a template without rebuilding state.
    pub fn custom(format: FormatFn, tokens: Arc<TokenRegistry>) -> Self {
        Self {
            kind: RendererKind::Custom(format),
            tokens,
            missing: MissingTokenPolicy::default(),
        }
    }

    /// The token registry this renderer resolves against.
    pub fn tokens(&self) -> &Arc<TokenRegistry> {
        &self.tokens
    }

    /// Render one log line for an exchange.
    ///
    /// `Ok(None)` means "skip this line" and only occurs for custom format
    /// functions. An extractor returning `None` renders as `-`.
    pub fn render(
        &self,
        req: &RequestInfo,
        res: &ResponseInfo,
    ) -> Result<Option<String>, RenderError> {
        let template = match &self.kind {
            RendererKind::Custom(format) => return Ok(format(req, res)),
            RendererKind::Template(template) => template,
        };

        let mut line = String::with_capacity(128);
        for segment in template.segments() {
            match segment {
                Segment::Literal(text) => line.push_str(text),
                Segment::Token { name, arg } => {
                    let extractor = match self.tokens.resolve(name) {
                        Some(extractor) => extractor,
                        None => match self.missing {
                            MissingTokenPolicy::Strict => {
                                return Err(RenderError::UnknownToken(name.clone()))
                            }
                            MissingTokenPolicy::Placeholder => {
                                line.push('-');
                                continue;
                            }
                        },
                    };
                    match extractor(req, res, arg.as_deref()) {
                        Some(value) => line.push_str(&value),
                        None => line.push('-'),
                    }
                }
            }
        }
        Ok(Some(line))
    }
}

/// Compile a template string into a standalone renderer over the built-in
/// token set, with the strict missing-token policy.
///
/// Loggers built through [`Builder`](crate::middleware::Builder) share one
/// registry instead; this entry point covers direct, one-off rendering.
pub fn compile(template: &str) -> Renderer {
    Renderer::template(
        Template::parse(template),
        Arc::new(TokenRegistry::with_builtins()),
        MissingTokenPolicy::Strict,
    )
}
