//! reqlog: template-driven HTTP access logging middleware for axum.
//!
//! One formatted line per completed request/response exchange, rendered from
//! a human-written template of `:token` placeholders and written to a sink
//! (stdout or an append-mode file, optionally buffered).
//!
//! ```ignore
//! use axum::{middleware, routing::get, Router};
//!
//! let logger = reqlog::RequestLogger::builder()
//!     .file("access.log")
//!     .build()?;
//!
//! let app = Router::new()
//!     .route("/", get(|| async { "hello" }))
//!     .layer(middleware::from_fn_with_state(logger, reqlog::log_requests));
//! ```

pub mod config;
pub mod error;
pub mod exchange;
pub mod format;
pub mod middleware;
pub mod proc_stats;
pub mod sink;
pub mod template;
pub mod token;

pub use config::LoggerConfig;
pub use error::{Error, RenderError};
pub use exchange::{ClientIp, RequestInfo, ResponseInfo};
pub use format::{Format, FormatRegistry, DEFAULT_FORMAT};
pub use middleware::{log_requests, Builder, RequestLogger};
pub use sink::{BufferedSink, FileSink, MemorySink, Sink, StdoutSink, DEFAULT_BUFFER_INTERVAL};
pub use template::{compile, MissingTokenPolicy, Renderer, Segment, Template};
pub use token::{Extractor, TokenRegistry};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging for binaries embedding the logger.
///
/// Note: this can only be called once per process. Library code only ever
/// emits through `tracing` macros and works under whatever subscriber the
/// host installed.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
