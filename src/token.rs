//! Token registry: maps placeholder names to extractor functions.
//!
//! Extractors run lazily at render time against the current exchange's
//! snapshots. Any extractor may return `None`, which the renderer prints as
//! `-`; `None` means "data legitimately absent", never a malfunction.

use crate::exchange::{RequestInfo, ResponseInfo};
use crate::proc_stats;
use dashmap::DashMap;
use std::sync::Arc;

/// A token extractor: `(request, response, optional argument) -> value`.
pub type Extractor =
    Arc<dyn Fn(&RequestInfo, &ResponseInfo, Option<&str>) -> Option<String> + Send + Sync>;

/// Default number of decimal places for the `response-time` token.
const DEFAULT_RESPONSE_TIME_DIGITS: usize = 3;

/// Process-wide-style token map, owned by a logger (or a test) instead of
/// living as a hidden global.
///
/// Reads during rendering are concurrent-safe. Registration is last-write-wins
/// and intended as an initialization-time activity; registering while requests
/// are being rendered is not a supported discipline, though it will not
/// corrupt the map.
pub struct TokenRegistry {
    tokens: DashMap<String, Extractor>,
}

impl TokenRegistry {
    /// An empty registry with no tokens at all.
    pub fn empty() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    /// A registry pre-populated with the built-in token set.
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.register_builtins();
        registry
    }

    /// Store (or overwrite) the extractor for `name`.
    pub fn register<F>(&self, name: &str, extractor: F)
    where
        F: Fn(&RequestInfo, &ResponseInfo, Option<&str>) -> Option<String>
            + Send
            + Sync
            + 'static,
    {
        self.tokens.insert(name.to_string(), Arc::new(extractor));
    }

    /// Look up the extractor for `name`. There is no removal operation.
    pub fn resolve(&self, name: &str) -> Option<Extractor> {
        self.tokens.get(name).map(|entry| entry.value().clone())
    }

    fn register_builtins(&self) {
        self.register("method", |req, _res, _arg| Some(req.method.to_string()));

        self.register("url", |req, _res, _arg| {
            Some(req.path_and_query().to_string())
        });

        self.register("status", |_req, res, _arg| {
            if res.headers_sent {
                Some(res.status.as_u16().to_string())
            } else {
                None
            }
        });

        self.register("referrer", |req, _res, _arg| {
            req.header("referer")
                .or_else(|| req.header("referrer"))
                .map(str::to_string)
        });

        self.register("remote-addr", |req, _res, _arg| {
            req.client_addr().map(|ip| ip.to_string())
        });

        self.register("http-version", |req, _res, _arg| {
            Some(req.http_version().to_string())
        });

        self.register("user-agent", |req, _res, _arg| {
            req.header("user-agent").map(str::to_string)
        });

        self.register("res", |_req, res, arg| {
            res.header_joined(arg?)
        });

        self.register("date", |_req, _res, _arg| {
            // RFC 7231 IMF-fixdate, always UTC.
            Some(
                chrono::Utc::now()
                    .format("%a, %d %b %Y %H:%M:%S GMT")
                    .to_string(),
            )
        });

        self.register("response-time", |req, res, arg| {
            let start = req.start_at?;
            let headers_at = res.start_at?;
            let digits = arg
                .and_then(|a| a.parse::<usize>().ok())
                .unwrap_or(DEFAULT_RESPONSE_TIME_DIGITS);
            let ms = headers_at.duration_since(start).as_secs_f64() * 1e3;
            Some(format!("{ms:.digits$}"))
        });

        self.register("cpu", |_req, _res, _arg| {
            proc_stats::cpu_seconds().map(|secs| format!("{secs:.2}"))
        });

        self.register("memory", |_req, _res, _arg| {
            proc_stats::memory_scaled().map(|mem| format!("{mem:.2}"))
        });
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::HeaderValue;
    use std::time::{Duration, Instant};

    fn call(registry: &TokenRegistry, name: &str, req: &RequestInfo, res: &ResponseInfo) -> Option<String> {
        registry.resolve(name).expect("builtin registered")(req, res, None)
    }

    #[test]
    fn test_last_write_wins() {
        let registry = TokenRegistry::empty();
        registry.register("who", |_, _, _| Some("first".into()));
        registry.register("who", |_, _, _| Some("second".into()));

        let req = RequestInfo::empty();
        let res = ResponseInfo::pending();
        assert_eq!(call(&registry, "who", &req, &res).unwrap(), "second");
    }

    #[test]
    fn test_resolve_unregistered() {
        let registry = TokenRegistry::empty();
        assert!(registry.resolve("nope").is_none());
    }

    #[test]
    fn test_method_and_url() {
        let registry = TokenRegistry::with_builtins();
        let mut req = RequestInfo::empty();
        req.method = http::Method::DELETE;
        req.uri = http::Uri::from_static("/items/7?force=1");
        let res = ResponseInfo::pending();

        assert_eq!(call(&registry, "method", &req, &res).unwrap(), "DELETE");
        assert_eq!(call(&registry, "url", &req, &res).unwrap(), "/items/7?force=1");
    }

    #[test]
    fn test_status_requires_headers_sent() {
        let registry = TokenRegistry::with_builtins();
        let req = RequestInfo::empty();

        let mut res = ResponseInfo::pending();
        res.status = http::StatusCode::NOT_FOUND;
        assert!(call(&registry, "status", &req, &res).is_none());

        res.headers_sent = true;
        assert_eq!(call(&registry, "status", &req, &res).unwrap(), "404");
    }

    #[test]
    fn test_referrer_fallback_spelling() {
        let registry = TokenRegistry::with_builtins();
        let res = ResponseInfo::pending();

        let mut req = RequestInfo::empty();
        req.headers
            .insert("referer", HeaderValue::from_static("https://a.example/"));
        assert_eq!(
            call(&registry, "referrer", &req, &res).unwrap(),
            "https://a.example/"
        );

        let mut req = RequestInfo::empty();
        req.headers
            .insert("referrer", HeaderValue::from_static("https://b.example/"));
        assert_eq!(
            call(&registry, "referrer", &req, &res).unwrap(),
            "https://b.example/"
        );

        let req = RequestInfo::empty();
        assert!(call(&registry, "referrer", &req, &res).is_none());
    }

    #[test]
    fn test_res_header_argument() {
        let registry = TokenRegistry::with_builtins();
        let req = RequestInfo::empty();
        let mut res = ResponseInfo::pending();
        res.headers_sent = true;
        res.headers
            .insert("content-length", HeaderValue::from_static("42"));

        let extractor = registry.resolve("res").unwrap();
        assert_eq!(
            extractor(&req, &res, Some("content-length")).unwrap(),
            "42"
        );
        assert!(extractor(&req, &res, Some("x-missing")).is_none());
        assert!(extractor(&req, &res, None).is_none());
    }

    #[test]
    fn test_response_time_precision() {
        let registry = TokenRegistry::with_builtins();
        let extractor = registry.resolve("response-time").unwrap();

        let start = Instant::now();
        let mut req = RequestInfo::empty();
        req.start_at = Some(start);
        let mut res = ResponseInfo::pending();
        res.start_at = Some(start + Duration::from_micros(12_345));

        assert_eq!(extractor(&req, &res, None).unwrap(), "12.345");
        assert_eq!(extractor(&req, &res, Some("0")).unwrap(), "12");
        assert_eq!(extractor(&req, &res, Some("1")).unwrap(), "12.3");
    }

    #[test]
    fn test_response_time_missing_stamps() {
        let registry = TokenRegistry::with_builtins();
        let extractor = registry.resolve("response-time").unwrap();

        let req = RequestInfo::empty();
        let res = ResponseInfo::pending();
        assert!(extractor(&req, &res, None).is_none());

        let mut req = RequestInfo::empty();
        req.start_at = Some(Instant::now());
        assert!(extractor(&req, &res, None).is_none());
    }

    #[test]
    fn test_date_is_http_date() {
        let registry = TokenRegistry::with_builtins();
        let date = call(
            &registry,
            "date",
            &RequestInfo::empty(),
            &ResponseInfo::pending(),
        )
        .unwrap();
        assert!(date.ends_with(" GMT"), "unexpected date: {date}");
        assert!(
            chrono::DateTime::parse_from_rfc2822(&date).is_ok(),
            "unexpected date: {date}"
        );
    }

    #[test]
    fn test_cpu_and_memory_render_as_numbers() {
        let registry = TokenRegistry::with_builtins();
        let req = RequestInfo::empty();
        let res = ResponseInfo::pending();

        let cpu = call(&registry, "cpu", &req, &res).unwrap();
        assert!(cpu.parse::<f64>().is_ok(), "unexpected cpu: {cpu}");

        let mem = call(&registry, "memory", &req, &res).unwrap();
        assert!(mem.parse::<f64>().unwrap() > 0.0, "unexpected memory: {mem}");
    }

    #[test]
    fn test_http_version() {
        let registry = TokenRegistry::with_builtins();
        let mut req = RequestInfo::empty();
        req.version = http::Version::HTTP_2;
        assert_eq!(
            call(&registry, "http-version", &req, &ResponseInfo::pending()).unwrap(),
            "2.0"
        );
    }
}
