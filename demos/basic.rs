//! Minimal axum server with access logging on stdout.
//!
//! Run with `cargo run --example basic`, then:
//!
//! ```text
//! curl -H 'user-agent: demo' http://127.0.0.1:3000/hello
//! ```

use anyhow::Result;
use axum::{middleware, routing::get, Router};
use reqlog::RequestLogger;
use std::net::SocketAddr;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    reqlog::init_tracing();

    let logger = RequestLogger::builder()
        .buffered(Duration::from_millis(1000))
        .build()?;

    let app = Router::new()
        .route("/hello", get(|| async { "hello\n" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(150)).await;
                "done\n"
            }),
        )
        .layer(middleware::from_fn_with_state(logger, reqlog::log_requests));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
