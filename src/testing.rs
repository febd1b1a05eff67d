// src/testing.rs
// =============================================================================
// Test helpers: a tiny local website to crawl.
//
// Tests never touch the public internet. TestSite::spawn() binds an axum app
// to 127.0.0.1:0 and counts how often each path is requested, which is how
// the dedup tests prove a page was fetched exactly once.
//
// Site map:
//   /         -> /a, /a/, /a#top, /b, /missing, and one external link
//   /a        -> /, /b, /deep/1
//   /b        -> (no links)
//   /deep/1   -> /deep/2
//   /deep/2   -> (no links)
//   /missing  -> 404
//   /plain    -> text/plain
//   /slow     -> answers after 2 seconds
//   /flaky    -> 503
//   /robots.txt    -> disallows /private for everyone
//   /guarded       -> /private/page, /b
//   /private/page  -> (no links)
//   /outbound      -> /b, and two links to the same site under the name
//                     "localhost" (an external domain as far as a crawl
//                     seeded at 127.0.0.1 is concerned)
//
// A worker given PANIC_PATH panics instead of fetching it.
// =============================================================================

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::Router;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crate::config::CrawlConfig;

pub const PANIC_PATH: &str = "/panic";

// Settings for tests: no politeness delay, short timeout, small pool.
// robots.txt and external domain checks are off unless a test turns them on.
pub fn test_config() -> CrawlConfig {
    CrawlConfig {
        workers: 2,
        politeness_interval: Duration::ZERO,
        fetch_timeout: Duration::from_secs(1),
        retry_backoff: Duration::from_millis(10),
        obey_robots: false,
        check_domains: false,
        ..CrawlConfig::default()
    }
}

#[derive(Clone)]
struct SiteState {
    hits: Arc<Mutex<HashMap<String, usize>>>,
    port: u16,
}

pub struct TestSite {
    pub base: Url,
    state: SiteState,
}

impl TestSite {
    pub async fn spawn() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = SiteState {
            hits: Arc::default(),
            port: addr.port(),
        };
        let app = Router::new().fallback(serve_page).with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: Url::parse(&format!("http://{}/", addr)).unwrap(),
            state,
        }
    }

    pub fn url(&self, path: &str) -> Url {
        self.base.join(path).unwrap()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.state.hits.lock().unwrap().values().sum()
    }
}

async fn serve_page(State(state): State<SiteState>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    *state.hits.lock().unwrap().entry(path.clone()).or_default() += 1;

    match path.as_str() {
        "/" => Html(
            r#"<html><body>
                <a href="/a">A</a>
                <a href="/a/">A again</a>
                <a href="/a#top">A top</a>
                <a href="/b">B</a>
                <a href="/missing">Gone</a>
                <a href="https://elsewhere.example/">External</a>
            </body></html>"#,
        )
        .into_response(),
        "/a" => Html(
            r#"<a href="/">Home</a><a href="/b">B</a><a href="/deep/1">Deeper</a>"#,
        )
        .into_response(),
        "/b" => Html("<p>leaf</p>").into_response(),
        "/deep/1" => Html(r#"<a href="/deep/2">Next</a>"#).into_response(),
        "/deep/2" => Html("<p>bottom</p>").into_response(),
        "/plain" => (
            [(header::CONTENT_TYPE, "text/plain")],
            "<a href=\"/b\">not html</a>",
        )
            .into_response(),
        "/slow" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Html("<p>late</p>").into_response()
        }
        "/flaky" => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        "/robots.txt" => (
            [(header::CONTENT_TYPE, "text/plain")],
            "User-agent: *\nDisallow: /private\n",
        )
            .into_response(),
        "/guarded" => {
            Html(r#"<a href="/private/page">Secret</a><a href="/b">B</a>"#).into_response()
        }
        "/private/page" => Html("<p>secret</p>").into_response(),
        "/outbound" => Html(format!(
            r#"<a href="http://localhost:{port}/b">B elsewhere</a>
               <a href="http://LOCALHOST:{port}/deep/2">Same domain again</a>
               <a href="/b">B</a>"#,
            port = state.port
        ))
        .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
