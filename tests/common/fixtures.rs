//! A mock catalog site and bucket served by wiremock

use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Bucket name the mock object store accepts uploads for
pub const BUCKET: &str = "media";

/// Catalog listing, item and payload pages plus an S3-style bucket, all on one server
pub struct CatalogSite {
    pub server: MockServer,
}

impl CatalogSite {
    /// Start a server that accepts every upload to [`BUCKET`]
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(format!("^/{BUCKET}/.+")))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Self { server }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Listing page `page` of `category`, linking `items` and advertising `max_page` pages
    pub async fn listing(&self, category: &str, page: u32, max_page: u32, items: &[&str]) {
        let route = if page <= 1 {
            format!("/dictionary/{category}")
        } else {
            format!("/dictionary/{category}/{page}")
        };
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(html(listing_html(category, max_page, items)))
            .mount(&self.server)
            .await;
    }

    /// Item page referencing a payload, and the payload itself
    pub async fn item(&self, id: &str, payload: &[u8]) {
        let body = format!(
            r#"<html><head>
                <meta property="og:video" content="/files/{id}.mp4">
                <meta property="og:description" content="Sign for {id}">
            </head><body>
                <div class="related"><a href="/sign/other">other</a></div>
                <div class="categories"><a href="/c/1">Common</a></div>
            </body></html>"#
        );
        Mock::given(method("GET"))
            .and(path(format!("/sign/{id}")))
            .respond_with(html(body))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/files/{id}.mp4")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.to_vec()))
            .mount(&self.server)
            .await;
    }

    /// Item page with no payload reference
    pub async fn bare_item(&self, id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/sign/{id}")))
            .respond_with(html("<html><body><p>nothing to see</p></body></html>".into()))
            .mount(&self.server)
            .await;
    }

    /// Paths of every upload the bucket received, in arrival order
    pub async fn uploads(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.method.as_str() == "PUT")
            .map(|r| r.url.path().to_string())
            .collect()
    }

    /// Number of GET requests whose path starts with `prefix`
    pub async fn gets(&self, prefix: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == "GET" && r.url.path().starts_with(prefix))
            .count()
    }
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/html; charset=utf-8")
}

fn listing_html(category: &str, max_page: u32, items: &[&str]) -> String {
    let links: String = items
        .iter()
        .map(|id| format!(r#"<li><a href="/sign/{id}">{id}</a></li>"#))
        .collect();
    let pages: String = (1..=max_page)
        .map(|p| format!(r#"<li><a href="/dictionary/{category}/{p}">{p}</a></li>"#))
        .collect();
    format!(
        r#"<html><body>
            <ul class="items">{links}</ul>
            <ul class="pagination">{pages}</ul>
            <a href="/about">about</a>
        </body></html>"#
    )
}
