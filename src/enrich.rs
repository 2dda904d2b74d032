use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::{Captures, NoExpand, Regex};
use reqwest::StatusCode;
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use url::Url;

use crate::config::EnrichConfig;

// Located with regex so untouched markup is written back byte for byte;
// text, classes and attribute values are read through the HTML parser.
static H2_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<h2\b([^>]*)>(.*?)</h2>").unwrap());
static ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?i)\sid\s*=\s*["'][^"']*["']"#).unwrap());
static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a>").unwrap());
static SPAN_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<(/?)span\b[^>]*>").unwrap());
static IMG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<img\b([^>]*?)(\s*/?)>").unwrap());
static ALT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?i)\salt\s*=\s*["']([^"']*)["']"#).unwrap());
static YT_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"- YouTube$").unwrap());

static SECTION_TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2.section-title").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static IMG_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());

// Checked in order; "part ii" is tested before "part iii".
const PART_TABLE: &[(&[&str], &str)] = &[
    (&["part 1", "part i:"], "part1"),
    (&["part ii", "part 2"], "part2"),
    (&["part iii", "part 3"], "part3"),
    (&["part iv", "part 4"], "part4"),
    (&["part v", "part 5"], "part5"),
    (&["part vi", "part 6"], "part6"),
    (&["part vii", "part 7"], "part7"),
];

const GENERIC_TEXTS: &[&str] = &["link", "watch video"];

fn escape_text(s: &str) -> String {
    html_escape::encode_text(s).into_owned()
}

fn escape_attr(s: &str) -> String {
    html_escape::encode_double_quoted_attribute(s).into_owned()
}

/// Visible text of an HTML fragment, entities decoded.
fn text_content(html: &str) -> String {
    Html::parse_fragment(html)
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}

/// Decoded value of `name` on the first `sel` element of a parsed open tag.
fn tag_attr(tag: &str, attrs: &str, sel: &Selector, name: &str) -> Option<String> {
    let fragment = Html::parse_fragment(&format!("<{}{}>", tag, attrs));
    let value = fragment.select(sel).next()?.value().attr(name)?.to_string();
    Some(value)
}

fn is_section_title(attrs: &str) -> bool {
    let fragment = Html::parse_fragment(&format!("<h2{}></h2>", attrs));
    fragment.select(&SECTION_TITLE_SEL).next().is_some()
}

fn part_id(heading: &str) -> Option<&'static str> {
    let lower = heading.to_lowercase();
    PART_TABLE
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, id)| *id)
}

fn set_id(attrs: &str, id: &str) -> String {
    let attr = format!(" id=\"{}\"", id);
    if ID_RE.is_match(attrs) {
        ID_RE.replace(attrs, NoExpand(&attr)).into_owned()
    } else {
        format!("{}{}", attrs, attr)
    }
}

/// Give `h2.section-title` part headings stable anchor ids.
pub fn assign_part_ids(html: &str) -> (String, usize) {
    let mut assigned = 0;
    let out = H2_RE.replace_all(html, |caps: &Captures| {
        let attrs = &caps[1];
        match part_id(&text_content(&caps[2])).filter(|_| is_section_title(attrs)) {
            Some(id) => {
                assigned += 1;
                format!("<h2{}>{}</h2>", set_id(attrs, id), &caps[2])
            }
            None => caps[0].to_string(),
        }
    });
    (out.into_owned(), assigned)
}

pub fn is_video_link(href: &str) -> bool {
    href.contains("youtube.com") || href.contains("youtu.be")
}

/// Absolute, non-mail, non-file hrefs whose text says nothing useful.
fn generic_href(attrs: &str, inner: &str) -> Option<String> {
    let href = tag_attr("a", attrs, &ANCHOR_SEL, "href")?;
    if href.is_empty() || href.starts_with("mailto:") || href.starts_with("file:") || !href.contains("://") {
        return None;
    }
    let text = text_content(inner);
    let lower = text.to_lowercase();
    (GENERIC_TEXTS.contains(&lower.as_str()) || text == href).then_some(href)
}

/// Hrefs of every anchor that needs a better label, in document order.
pub fn generic_links(html: &str) -> Vec<String> {
    ANCHOR_RE
        .captures_iter(html)
        .filter_map(|c| generic_href(&c[1], &c[2]))
        .collect()
}

/// Uppercase the first ASCII word character of every word.
fn title_case(s: &str) -> String {
    let mut prev_word = false;
    s.chars()
        .map(|c| {
            let word = c.is_ascii_alphanumeric() || c == '_';
            let out = if word && !prev_word { c.to_ascii_uppercase() } else { c };
            prev_word = word;
            out
        })
        .collect()
}

/// Readable title from the last path segment, or the host for bare domains.
/// `None` when the URL does not parse or the result is too short.
pub fn slug_title(href: &str) -> Option<String> {
    let url = Url::parse(href).ok()?;
    let mut slug = url
        .path_segments()
        .and_then(|segs| segs.filter(|s| !s.is_empty()).last())
        .or_else(|| url.host_str())?
        .to_string();
    if let Some((stem, _ext)) = slug.rsplit_once('.') {
        slug = stem.to_string();
    }
    let title = title_case(&slug.replace(['-', '_'], " "));
    (title.chars().count() >= 3).then_some(title)
}

/// `<title>` of a fetched page, whitespace collapsed.
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let raw: String = document.select(&TITLE_SEL).next()?.text().collect();
    let title = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

pub fn clean_video_title(title: &str) -> String {
    YT_SUFFIX_RE.replace(title.trim(), "").trim().to_string()
}

fn relabel_img(inner: &str, title: &str) -> String {
    IMG_RE
        .replacen(inner, 1, |caps: &Captures| {
            let attrs = &caps[1];
            let alt = format!(" alt=\"{}\"", escape_attr(title));
            let attrs = match tag_attr("img", attrs, &IMG_SEL, "alt") {
                Some(a) if a == "Link" || a.is_empty() => ALT_RE.replace(attrs, NoExpand(&alt)).into_owned(),
                Some(_) => attrs.to_string(),
                None => format!("{}{}", attrs, alt),
            };
            format!("<img{}{}>", attrs, &caps[2])
        })
        .into_owned()
}

/// Replace everything inside the first balanced `<span>` with `text`.
/// `None` when there is no span or it never closes.
fn replace_span_text(inner: &str, text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut content_start = 0;
    for caps in SPAN_TAG_RE.captures_iter(inner) {
        let tag = caps.get(0)?;
        if caps[1].is_empty() {
            if depth == 0 {
                content_start = tag.end();
            }
            depth += 1;
        } else if depth > 0 {
            depth -= 1;
            if depth == 0 {
                return Some(format!(
                    "{}{}{}",
                    &inner[..content_start],
                    escape_text(text),
                    &inner[tag.start()..]
                ));
            }
        }
    }
    None
}

/// Relabel generic anchors. Video links take their title from
/// `video_titles`; a missing entry leaves the anchor alone.
pub fn rewrite_links(html: &str, video_titles: &HashMap<String, String>, fallback: &str) -> (String, usize) {
    let mut rewritten = 0;
    let out = ANCHOR_RE.replace_all(html, |caps: &Captures| {
        let (attrs, inner) = (&caps[1], &caps[2]);
        let Some(href) = generic_href(attrs, inner) else {
            return caps[0].to_string();
        };
        let title = if is_video_link(&href) {
            match video_titles.get(&href) {
                Some(t) => t.clone(),
                None => return caps[0].to_string(),
            }
        } else {
            slug_title(&href).unwrap_or_else(|| fallback.to_string())
        };

        rewritten += 1;
        let inner = match replace_span_text(inner, &title) {
            Some(with_span) => relabel_img(&with_span, &title),
            None => escape_text(&title),
        };
        format!("<a{}>{}</a>", attrs, inner)
    });
    (out.into_owned(), rewritten)
}

/// Non-success HTTP status of a title fetch.
#[derive(Debug)]
struct HttpStatus(StatusCode);

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.0.as_u16())
    }
}

impl std::error::Error for HttpStatus {}

/// Rate limits and server errors are worth another attempt.
fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

async fn fetch_title(client: &reqwest::Client, url: &str) -> Result<String> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(HttpStatus(status).into());
    }
    let body = resp.text().await?;
    page_title(&body).ok_or_else(|| anyhow::anyhow!("no <title> in page"))
}

async fn fetch_with_retry(client: &reqwest::Client, url: &str, max_retries: u32, base_backoff_ms: u64) -> Result<String> {
    let mut attempt = 0;
    loop {
        let err = match fetch_title(client, url).await {
            Ok(title) => return Ok(title),
            Err(e) => e,
        };
        let should_retry = err
            .downcast_ref::<HttpStatus>()
            .is_some_and(|s| is_retryable(s.0));
        if !should_retry || attempt >= max_retries {
            return Err(err);
        }

        let backoff = Duration::from_millis(base_backoff_ms * 2u64.pow(attempt));
        warn!(
            "Retrying {} (attempt {}/{}), backing off {:.1}s",
            url,
            attempt + 1,
            max_retries,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

/// Fetch video titles concurrently. Failures map to the fallback label;
/// empty titles are left out so their anchors stay untouched.
async fn fetch_video_titles(urls: Vec<String>, config: &EnrichConfig) -> Result<HashMap<String, String>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let (tx, mut rx) = tokio::sync::mpsc::channel::<(String, Result<String>)>(config.concurrency.max(1) * 2);

    let pb = ProgressBar::new(urls.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    for url in urls {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let (retries, backoff) = (config.max_retries, config.base_backoff_ms);
        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let result = fetch_with_retry(&client, &url, retries, backoff).await;
            let _ = tx.send((url, result)).await;
        });
    }
    drop(tx);

    let mut titles = HashMap::new();
    while let Some((url, result)) = rx.recv().await {
        pb.inc(1);
        let title = match result {
            Ok(t) => clean_video_title(&t),
            Err(e) => {
                warn!("Failed to fetch title for {}: {:#}", url, e);
                config.fallback_video_title.clone()
            }
        };
        info!("  -> Title: {}", title);
        if !title.is_empty() {
            titles.insert(url, title);
        }
    }
    pb.finish_and_clear();
    Ok(titles)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichReport {
    pub part_ids: usize,
    pub candidates: usize,
    pub rewritten: usize,
}

/// Rewrite one show-notes document in place.
pub async fn enrich_file(path: &Path, config: &EnrichConfig) -> Result<EnrichReport> {
    info!("Processing {}...", path.display());
    let html = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let (html, part_ids) = assign_part_ids(&html);
    let links = generic_links(&html);
    info!("Found {} links to enrich.", links.len());

    let mut videos: Vec<String> = links.iter().filter(|h| is_video_link(h)).cloned().collect();
    videos.sort();
    videos.dedup();
    let titles = fetch_video_titles(videos, config).await?;

    let (html, rewritten) = rewrite_links(&html, &titles, &config.fallback_article_title);
    tokio::fs::write(path, html)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Saved updated HTML.");

    Ok(EnrichReport { part_ids, candidates: links.len(), rewritten })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_headings_get_ids() {
        let html = r#"<h2 class="section-title">Part 1: Basics</h2>
<h2 class="big section-title" id="old">PART 2 - Tools</h2>
<h2 class="subtitle">Part 3</h2>
<h2 class="section-title">Introduction</h2>"#;
        let (out, n) = assign_part_ids(html);
        assert_eq!(n, 2);
        assert!(out.contains(r#"<h2 class="section-title" id="part1">Part 1: Basics</h2>"#));
        assert!(out.contains(r#"<h2 class="big section-title" id="part2">PART 2 - Tools</h2>"#));
        assert!(out.contains(r#"<h2 class="subtitle">Part 3</h2>"#));
        assert!(out.contains(r#"<h2 class="section-title">Introduction</h2>"#));
    }

    #[test]
    fn roman_numerals() {
        assert_eq!(part_id("Part I: Why"), Some("part1"));
        assert_eq!(part_id("Part IV - Practice"), Some("part4"));
        assert_eq!(part_id("Part 6"), Some("part6"));
        assert_eq!(part_id("Overview"), None);
    }

    #[test]
    fn generic_link_detection() {
        let html = r#"
<a href="https://example.com/a">Link</a>
<a href="https://youtu.be/xyz"><span>Watch Video</span></a>
<a href="https://example.com/b">https://example.com/b</a>
<a href="https://example.com/c">A proper title</a>
<a href="mailto:me@example.com">link</a>
<a href="notes/local.html">Link</a>
"#;
        assert_eq!(
            generic_links(html),
            vec!["https://example.com/a", "https://youtu.be/xyz", "https://example.com/b"]
        );
    }

    #[test]
    fn slug_titles() {
        assert_eq!(
            slug_title("https://example.com/blog/my-great_post.html").as_deref(),
            Some("My Great Post")
        );
        assert_eq!(slug_title("https://www.example.com/").as_deref(), Some("Www.Example"));
        assert_eq!(slug_title("https://example.com/papers/ab/").as_deref(), None);
        assert_eq!(slug_title("http://exa mple.com/x"), None);
    }

    #[test]
    fn video_title_cleanup() {
        let page = "<html><head><title>\n  Attention Is All You Need - YouTube\n</title></head></html>";
        let t = page_title(page).unwrap();
        assert_eq!(clean_video_title(&t), "Attention Is All You Need");
        assert_eq!(page_title("<html></html>"), None);
    }

    #[test]
    fn rewrites_plain_and_span_anchors() {
        let html = r#"<p><a href="https://example.com/guides/prompt-engineering">Link</a></p>
<a class="video-card" href="https://www.youtube.com/watch?v=1"><img src="t.jpg" alt="Link"><span>Watch Video</span></a>
<a href="https://youtu.be/none">Watch Video</a>
<a href="https://x.io/ab">link</a>"#;
        let mut titles = HashMap::new();
        titles.insert("https://www.youtube.com/watch?v=1".to_string(), "Tips & Tricks".to_string());

        let (out, n) = rewrite_links(html, &titles, "Read Article");
        assert_eq!(n, 3);
        assert!(out.contains(r#"<a href="https://example.com/guides/prompt-engineering">Prompt Engineering</a>"#));
        assert!(out.contains(r#"<img src="t.jpg" alt="Tips &amp; Tricks"><span>Tips &amp; Tricks</span>"#));
        assert!(out.contains(r#"<a href="https://youtu.be/none">Watch Video</a>"#));
        assert!(out.contains(r#"<a href="https://x.io/ab">Read Article</a>"#));
    }

    #[test]
    fn missing_alt_is_added() {
        let out = relabel_img(r#"<img src="a.png" />"#, "Title");
        assert_eq!(out, r#"<img src="a.png" alt="Title" />"#);
        let kept = relabel_img(r#"<img src="a.png" alt="Cover">"#, "Title");
        assert_eq!(kept, r#"<img src="a.png" alt="Cover">"#);
    }

    #[tokio::test]
    async fn file_without_video_links_is_rewritten_offline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        std::fs::write(
            &path,
            r#"<h2 class="section-title">Part 1</h2><a href="https://example.com/ai-literacy">Link</a>"#,
        )
        .unwrap();

        let report = enrich_file(&path, &EnrichConfig::default()).await.unwrap();
        assert_eq!(report, EnrichReport { part_ids: 1, candidates: 1, rewritten: 1 });
        let out = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            out,
            r#"<h2 class="section-title" id="part1">Part 1</h2><a href="https://example.com/ai-literacy">Ai Literacy</a>"#
        );
    }

    #[test]
    fn numeric_entities_in_titles_are_decoded() {
        let t = page_title("<title>Rock &#8211; Roll &#x2019;n &amp; more - YouTube</title>").unwrap();
        let t = clean_video_title(&t);
        assert_eq!(t, "Rock \u{2013} Roll \u{2019}n & more");

        let mut titles = HashMap::new();
        titles.insert("https://youtu.be/a".to_string(), t);
        let (out, n) = rewrite_links(r#"<a href="https://youtu.be/a">Link</a>"#, &titles, "Read Article");
        assert_eq!(n, 1);
        assert_eq!(out, "<a href=\"https://youtu.be/a\">Rock \u{2013} Roll \u{2019}n &amp; more</a>");
    }

    #[test]
    fn entity_encoded_hrefs_and_text_are_read_decoded() {
        let html = r#"<a href="https://example.com/a?x=1&amp;y=2">https://example.com/a?x=1&amp;y=2</a>"#;
        assert_eq!(generic_links(html), vec!["https://example.com/a?x=1&y=2"]);
    }

    #[test]
    fn nested_span_is_replaced_whole() {
        let html = r#"<a href="https://x.com/some-article"><span class="c"><span>Link</span></span></a>"#;
        let (out, n) = rewrite_links(html, &HashMap::new(), "Read Article");
        assert_eq!(n, 1);
        assert_eq!(
            out,
            r#"<a href="https://x.com/some-article"><span class="c">Some Article</span></a>"#
        );
        assert_eq!(out.matches("<span").count(), out.matches("</span>").count());
    }

    #[test]
    fn unclosed_span_falls_back_to_anchor_text() {
        assert_eq!(replace_span_text("<span>Link", "T"), None);
        assert_eq!(replace_span_text("a<span>b</span>c", "T").as_deref(), Some("a<span>T</span>c"));
    }

    #[test]
    fn only_rate_limits_and_server_errors_retry() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable(StatusCode::GATEWAY_TIMEOUT));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn transport_errors_are_not_retried() {
        let client = reqwest::Client::new();
        // The digits in the URL must not look like a status code.
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            fetch_with_retry(&client, "http://127.0.0.1:9/watch?v=a500", 3, 60_000),
        )
        .await
        .expect("no backoff on connection errors");
        assert!(result.is_err());
    }

    async fn serve(responses: Vec<String>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for response in responses {
                let (mut sock, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                sock.write_all(response.as_bytes()).await.unwrap();
                let _ = sock.shutdown().await;
            }
        });
        format!("http://{}/watch?v=1", addr)
    }

    fn response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let url = serve(vec![
            response("503 Service Unavailable", ""),
            response("200 OK", "<html><head><title>Second Try - YouTube</title></head></html>"),
        ])
        .await;
        let client = reqwest::Client::new();
        let title = fetch_with_retry(&client, &url, 3, 1).await.unwrap();
        assert_eq!(title, "Second Try - YouTube");
    }

    #[tokio::test]
    async fn client_errors_fail_at_once() {
        let url = serve(vec![response("404 Not Found", "")]).await;
        let client = reqwest::Client::new();
        let err = fetch_with_retry(&client, &url, 3, 1).await.unwrap_err();
        assert_eq!(err.downcast_ref::<HttpStatus>().map(|s| s.0), Some(StatusCode::NOT_FOUND));
    }
}
