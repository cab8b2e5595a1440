//! Middleware orchestrator: wires timing capture to the request lifecycle and
//! emits one log line per completed exchange.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http_body::{Body as HttpBody, Frame, SizeHint};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::config::LoggerConfig;
use crate::error::Error;
use crate::exchange::{RequestInfo, ResponseInfo};
use crate::format::{Format, FormatRegistry};
use crate::sink::{BufferedSink, FileSink, Sink, StdoutSink};
use crate::template::{MissingTokenPolicy, Renderer, Template};
use crate::token::TokenRegistry;

struct Inner {
    tokens: Arc<TokenRegistry>,
    formats: FormatRegistry,
    renderer: Renderer,
    sink: Arc<dyn Sink>,
}

/// Access logger handle: owns the registries, the active renderer and the
/// sink. Cheap to clone; use one per process (or per test) and share it.
///
/// Wire it into a router with axum's state-middleware pattern:
///
/// ```ignore
/// let logger = RequestLogger::builder().build()?;
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(middleware::from_fn_with_state(logger, reqlog::log_requests));
/// ```
#[derive(Clone)]
pub struct RequestLogger {
    inner: Arc<Inner>,
}

impl RequestLogger {
    /// Start building a logger.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Convenience constructor: default format, writing to the given file
    /// path, or to standard output when `output` is `None` or empty.
    pub fn new(output: Option<&str>) -> Result<Self, Error> {
        let mut builder = Self::builder();
        if let Some(path) = output.filter(|p| !p.is_empty()) {
            builder = builder.file(path);
        }
        builder.build()
    }

    /// The token registry this logger renders against. Tokens registered
    /// here are visible to the active renderer immediately, as long as they
    /// exist before the first exchange that references them.
    pub fn tokens(&self) -> &Arc<TokenRegistry> {
        &self.inner.tokens
    }

    /// The format registry. Defining formats here affects later `build`s
    /// sharing these registries, not the already-active renderer.
    pub fn formats(&self) -> &FormatRegistry {
        &self.inner.formats
    }

    /// Render and write the line for one finished exchange. At most one line
    /// per exchange; `Ok(None)` from a custom format means no write at all.
    fn emit(&self, req: &RequestInfo, res: &ResponseInfo) {
        let line = match self.inner.renderer.render(req, res) {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::debug!("skip line");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to render access log line");
                return;
            }
        };
        if let Err(e) = self.inner.sink.write_line(&line) {
            tracing::error!(error = %e, "failed to write access log line");
        }
    }
}

/// Builder for [`RequestLogger`].
pub struct Builder {
    format: String,
    output: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    buffer: Option<Duration>,
    missing: MissingTokenPolicy,
    tokens: Arc<TokenRegistry>,
    formats: FormatRegistry,
    sink: Option<Arc<dyn Sink>>,
}

impl Builder {
    fn new() -> Self {
        Self {
            format: "default".to_string(),
            output: None,
            base_dir: None,
            buffer: None,
            missing: MissingTokenPolicy::default(),
            tokens: Arc::new(TokenRegistry::with_builtins()),
            formats: FormatRegistry::with_builtins(),
            sink: None,
        }
    }

    /// Apply a declarative [`LoggerConfig`].
    pub fn from_config(config: LoggerConfig) -> Self {
        let mut builder = Self::new();
        builder.format = config.format.clone();
        builder.output = config.output.clone();
        builder.base_dir = config.base_dir.clone();
        builder.buffer = config.buffer_interval();
        builder.missing = config.missing_tokens;
        builder
    }

    /// Name of the format to render (must exist in the format registry by
    /// build time).
    pub fn format(mut self, name: &str) -> Self {
        self.format = name.to_string();
        self
    }

    /// Log to an append-mode file instead of standard output.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Base directory for relative log file paths.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Batch writes and flush them on the given interval. Requires a tokio
    /// runtime at build time.
    pub fn buffered(mut self, interval: Duration) -> Self {
        self.buffer = Some(interval);
        self
    }

    /// Behavior for template references to unregistered tokens.
    pub fn missing_tokens(mut self, policy: MissingTokenPolicy) -> Self {
        self.missing = policy;
        self
    }

    /// Register a custom token.
    pub fn token<F>(self, name: &str, extractor: F) -> Self
    where
        F: Fn(&RequestInfo, &ResponseInfo, Option<&str>) -> Option<String>
            + Send
            + Sync
            + 'static,
    {
        self.tokens.register(name, extractor);
        self
    }

    /// Use an existing token registry, shared with other loggers or owned by
    /// the host, instead of a fresh built-in set.
    pub fn token_registry(mut self, tokens: Arc<TokenRegistry>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Define a named format (template string or custom function).
    pub fn define_format(self, name: &str, format: impl Into<Format>) -> Self {
        self.formats.define(name, format);
        self
    }

    /// Replace the sink entirely; overrides `file`. Useful for tests and for
    /// hosts with their own output plumbing.
    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Compile the active format and construct the sink.
    ///
    /// Fails on an unknown format name and on file sink construction errors
    /// (unwritable path), both configuration errors surfaced here rather
    /// than at request time.
    pub fn build(self) -> Result<RequestLogger, Error> {
        let format = self
            .formats
            .lookup(&self.format)
            .ok_or_else(|| Error::UnknownFormat(self.format.clone()))?;

        let renderer = match format {
            Format::Template(template) => Renderer::template(
                Template::parse(&template),
                self.tokens.clone(),
                self.missing,
            ),
            Format::Custom(f) => Renderer::custom(f, self.tokens.clone()),
        };

        let mut sink: Arc<dyn Sink> = match (self.sink, self.output) {
            (Some(sink), _) => sink,
            (None, Some(path)) => Arc::new(FileSink::open(path, self.base_dir.as_deref())?),
            (None, None) => Arc::new(StdoutSink),
        };
        if let Some(interval) = self.buffer {
            sink = Arc::new(BufferedSink::spawn(sink, interval));
        }

        Ok(RequestLogger {
            inner: Arc::new(Inner {
                tokens: self.tokens,
                formats: self.formats,
                renderer,
                sink,
            }),
        })
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Axum middleware function: stamps the exchange start, runs the inner
/// service, stamps the headers-sent instant on the produced response, and
/// hooks line emission to body completion. The handler pipeline never waits
/// on logging.
pub async fn log_requests(
    State(logger): State<RequestLogger>,
    req: Request,
    next: Next,
) -> Response {
    // Started: snapshot + request start stamp.
    let req_info = RequestInfo::capture(&req);

    let response = next.run(req).await;

    // HeadersSent: the response value exists, headers go out before any body
    // bytes, explicit or implicit.
    let (parts, body) = response.into_parts();
    let res_info = ResponseInfo {
        status: parts.status,
        headers: parts.headers.clone(),
        headers_sent: true,
        start_at: Some(std::time::Instant::now()),
    };

    // Finished: fire exactly once when the body completes, errors, or is
    // dropped on an abnormal close. An exchange that never finishes emits
    // nothing.
    let hooked = OnFinish::new(body, move || logger.emit(&req_info, &res_info));
    Response::from_parts(parts, Body::new(hooked))
}

/// Body wrapper invoking a hook exactly once when the stream ends.
struct OnFinish<B> {
    inner: B,
    hook: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl<B> OnFinish<B> {
    fn new(inner: B, hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner,
            hook: Some(Box::new(hook)),
        }
    }

    fn finish(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook();
        }
    }
}

impl<B> HttpBody for OnFinish<B>
where
    B: HttpBody + Unpin,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish();
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for OnFinish<B> {
    fn drop(&mut self) {
        self.finish();
    }
}
