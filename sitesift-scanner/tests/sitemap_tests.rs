// Tests for sitemap discovery

use sitesift_scanner::{SitemapFetcher, SitemapOptions};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn urlset(urls: &[String]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
    );
    for url in urls {
        xml.push_str(&format!("<url><loc>{}</loc></url>", url));
    }
    xml.push_str("</urlset>");
    xml
}

fn index(children: &[String]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
    );
    for child in children {
        xml.push_str(&format!("<sitemap><loc>{}</loc></sitemap>", child));
    }
    xml.push_str("</sitemapindex>");
    xml
}

fn xml(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "application/xml")
}

fn fetcher(max_urls: usize) -> SitemapFetcher {
    SitemapFetcher::new(SitemapOptions {
        max_urls,
        ..SitemapOptions::default()
    })
    .unwrap()
}

fn pages(base: &str, prefix: &str, n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("{}/{}/{}", base, prefix, i)).collect()
}

#[tokio::test]
async fn test_urlset_at_well_known_location() {
    let server = MockServer::start().await;
    let urls = pages(&server.uri(), "page", 3);
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(xml(urlset(&urls)))
        .mount(&server)
        .await;

    let found = fetcher(100).discover(&server.uri()).await;
    assert_eq!(found, urls);
}

#[tokio::test]
async fn test_index_is_resolved_recursively_and_bounded() {
    let server = MockServer::start().await;
    let children = vec![format!("{}/s1.xml", server.uri()), format!("{}/s2.xml", server.uri())];
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(xml(index(&children)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/s1.xml"))
        .respond_with(xml(urlset(&pages(&server.uri(), "a", 5))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/s2.xml"))
        .respond_with(xml(urlset(&pages(&server.uri(), "b", 5))))
        .mount(&server)
        .await;

    let found = fetcher(7).discover(&server.uri()).await;
    assert_eq!(found.len(), 7);
    assert_eq!(found[0], format!("{}/a/1", server.uri()));
    assert_eq!(found[6], format!("{}/b/2", server.uri()));
}

#[tokio::test]
async fn test_index_recursion_stops_once_full() {
    let server = MockServer::start().await;
    let children = vec![format!("{}/s1.xml", server.uri()), format!("{}/s2.xml", server.uri())];
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(xml(index(&children)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/s1.xml"))
        .respond_with(xml(urlset(&pages(&server.uri(), "a", 5))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/s2.xml"))
        .respond_with(xml(urlset(&pages(&server.uri(), "b", 5))))
        .expect(0)
        .mount(&server)
        .await;

    let found = fetcher(3).discover(&server.uri()).await;
    assert_eq!(found.len(), 3);
}

#[tokio::test]
async fn test_falls_back_to_robots_sitemap_directive() {
    let server = MockServer::start().await;
    let urls = pages(&server.uri(), "blog", 2);
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("User-agent: *\nDisallow:\nSitemap: {}/custom-map.xml\n", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/custom-map.xml"))
        .respond_with(xml(urlset(&urls)))
        .mount(&server)
        .await;

    let found = fetcher(100).discover(&server.uri()).await;
    assert_eq!(found, urls);
}

#[tokio::test]
async fn test_no_sitemap_falls_back_to_seed() {
    let server = MockServer::start().await;
    let seed = format!("{}/start", server.uri());

    let found = fetcher(100).discover(&seed).await;
    assert_eq!(found, vec![seed]);
}

#[tokio::test]
async fn test_malformed_sitemap_is_treated_as_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>not xml"))
        .mount(&server)
        .await;
    let urls = pages(&server.uri(), "p", 1);
    Mock::given(method("GET"))
        .and(path("/sitemap_index.xml"))
        .respond_with(xml(urlset(&urls)))
        .mount(&server)
        .await;

    let found = fetcher(100).discover(&server.uri()).await;
    assert_eq!(found, urls);
}

#[tokio::test]
async fn test_filters_and_exact_dedupe() {
    let server = MockServer::start().await;
    let mut urls = pages(&server.uri(), "keep", 2);
    urls.push(format!("{}/keep/1", server.uri()));
    urls.push(format!("{}/admin/panel", server.uri()));
    urls.push("https://cdn.other.org/asset".to_string());
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(xml(urlset(&urls)))
        .mount(&server)
        .await;

    let fetcher = SitemapFetcher::new(SitemapOptions {
        max_urls: 100,
        allow_domains: vec!["127.0.0.1".to_string()],
        deny_patterns: vec!["/admin/".to_string()],
        ..SitemapOptions::default()
    })
    .unwrap();

    let found = fetcher.discover(&server.uri()).await;
    assert_eq!(found, pages(&server.uri(), "keep", 2));
}

#[tokio::test]
async fn test_single_redirect_is_followed() {
    let server = MockServer::start().await;
    let urls = pages(&server.uri(), "moved", 1);
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", format!("{}/real.xml", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/real.xml"))
        .respond_with(xml(urlset(&urls)))
        .mount(&server)
        .await;

    let found = fetcher(100).discover(&server.uri()).await;
    assert_eq!(found, urls);
}
