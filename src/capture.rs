use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::{CaptureConfig, CaptureTarget};

const IMAGE_COLUMN: &str = "image_url";

/// Renders a URL to a PNG file.
pub trait Screenshotter {
    async fn capture(&self, url: &str, out: &Path) -> Result<()>;
}

/// Headless Chrome/Chromium driven through its `--screenshot` switch.
pub struct ChromeScreenshotter {
    chrome: String,
    timeout: Duration,
    settle_ms: u64,
    viewport: (u32, u32),
}

impl ChromeScreenshotter {
    pub fn new(config: &CaptureConfig) -> Self {
        ChromeScreenshotter {
            chrome: config.chrome.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            settle_ms: config.settle_ms,
            viewport: config.viewport,
        }
    }
}

impl Screenshotter for ChromeScreenshotter {
    async fn capture(&self, url: &str, out: &Path) -> Result<()> {
        let mut cmd = tokio::process::Command::new(&self.chrome);
        cmd.arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .arg(format!("--window-size={},{}", self.viewport.0, self.viewport.1))
            .arg(format!("--virtual-time-budget={}", self.settle_ms))
            .arg(format!("--screenshot={}", out.display()))
            .arg(url)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| anyhow::anyhow!("timed out after {}s", self.timeout.as_secs()))?
            .with_context(|| format!("Failed to start {}", self.chrome))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} exited with {}: {}", self.chrome, output.status, stderr.trim());
        }
        if !out.is_file() {
            bail!("no screenshot written to {}", out.display());
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    pub rows: usize,
    pub captured: usize,
    pub existing: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Lowercase, every char outside `[a-z0-9]` becomes `_`.
pub fn image_file_name(title: &str) -> String {
    let stem: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
        .collect();
    format!("{}.png", stem)
}

struct Sheet {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Sheet {
    fn parse(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.trim_start_matches('\u{feff}').as_bytes());
        let mut headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows: Vec<Vec<String>> = Vec::new();
        for result in reader.records() {
            match result {
                Ok(r) => rows.push(r.iter().map(str::to_string).collect()),
                Err(e) => warn!("CSV parsing error: {}", e),
            }
        }

        // Overflow cells get unnamed columns of their own so a rewrite keeps them.
        let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(headers.len());
        if width > headers.len() {
            let ragged = rows.iter().filter(|r| r.len() > headers.len()).count();
            warn!("{} rows are wider than the header, keeping the extra cells", ragged);
            headers.resize(width, String::new());
        }
        for row in &mut rows {
            row.resize(width, String::new());
        }
        Ok(Sheet { headers, rows })
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(i) = self.column(name) {
            return i;
        }
        self.headers.push(name.to_string());
        let i = self.headers.len() - 1;
        for row in &mut self.rows {
            row.resize(i + 1, String::new());
        }
        i
    }

    fn get<'a>(&self, row: &'a [String], name: &str) -> Option<&'a str> {
        self.column(name)
            .and_then(|i| row.get(i))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Every field quoted, CRLF line ends.
    fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .terminator(csv::Terminator::CRLF)
            .flexible(true)
            .from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.into_inner().map_err(|e| anyhow::anyhow!("{}", e))
    }
}

fn resolve_url<'a>(sheet: &Sheet, row: &'a [String], target: &CaptureTarget) -> Option<&'a str> {
    std::iter::once(target.url_field.as_str())
        .chain(target.fallback_url_fields.iter().map(String::as_str))
        .find_map(|f| sheet.get(row, f))
}

/// Capture missing screenshots for one target and rewrite its CSV in place.
pub async fn capture_target<S: Screenshotter>(shooter: &S, target: &CaptureTarget) -> Result<CaptureReport> {
    info!("Processing {}...", target.csv_path.display());
    tokio::fs::create_dir_all(&target.img_dir)
        .await
        .with_context(|| format!("Failed to create {}", target.img_dir.display()))?;

    let text = tokio::fs::read_to_string(&target.csv_path)
        .await
        .with_context(|| format!("Failed to read {}", target.csv_path.display()))?;
    let mut sheet = Sheet::parse(&text)?;
    let image_col = sheet.ensure_column(IMAGE_COLUMN);

    let mut report = CaptureReport { rows: sheet.rows.len(), ..Default::default() };

    let pb = ProgressBar::new(sheet.rows.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    for i in 0..sheet.rows.len() {
        pb.inc(1);
        let row = &sheet.rows[i];
        let title = sheet
            .get(row, &target.title_field)
            .map(str::to_string)
            .unwrap_or_else(|| format!("item_{}", i));
        let url = match resolve_url(&sheet, row, target) {
            Some(u) if u.starts_with("http") => u.to_string(),
            _ => {
                info!("Skipping invalid URL for: {}", title);
                report.skipped += 1;
                continue;
            }
        };

        let filename = image_file_name(&title);
        let output = target.img_dir.join(&filename);
        let public = format!("{}{}", target.base_url, filename);

        if output.exists() {
            info!("Skipping existing: {}", filename);
            sheet.rows[i][image_col] = public;
            report.existing += 1;
            continue;
        }

        pb.set_message(title.clone());
        match shooter.capture(&url, &output).await {
            Ok(()) => {
                sheet.rows[i][image_col] = public;
                report.captured += 1;
            }
            Err(e) => {
                warn!("Failed to capture {}: {:#}", url, e);
                report.failed += 1;
            }
        }
    }
    pb.finish_and_clear();

    tokio::fs::write(&target.csv_path, sheet.to_csv()?)
        .await
        .with_context(|| format!("Failed to write {}", target.csv_path.display()))?;
    info!(
        "Updated {} ({} captured, {} existing, {} skipped, {} failed)",
        target.csv_path.display(),
        report.captured,
        report.existing,
        report.skipped,
        report.failed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct FakeShooter {
        calls: Mutex<Vec<String>>,
    }

    impl Screenshotter for FakeShooter {
        async fn capture(&self, url: &str, out: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(url.to_string());
            if url.contains("broken") {
                bail!("net::ERR_NAME_NOT_RESOLVED");
            }
            std::fs::write(out, b"png")?;
            Ok(())
        }
    }

    fn target(dir: &Path) -> CaptureTarget {
        CaptureTarget {
            name: "tools".into(),
            csv_path: dir.join("tools.csv"),
            img_dir: dir.join("img/tools"),
            base_url: "/img/tools/".into(),
            url_field: "Website URL".into(),
            fallback_url_fields: vec!["Link".into()],
            title_field: "Title".into(),
        }
    }

    const CSV: &str = "Title,Website URL,Link\n\
        Claude Code,https://claude.ai,\n\
        Old One,,https://old.example\n\
        Broken,https://broken.example,\n\
        No Link,,\n\
        Relative,/docs,\n";

    #[test]
    fn file_names() {
        assert_eq!(image_file_name("Claude Code"), "claude_code.png");
        assert_eq!(image_file_name("GPT-4o (mini)"), "gpt_4o__mini_.png");
    }

    #[tokio::test]
    async fn captures_skips_and_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let t = target(dir.path());
        std::fs::write(&t.csv_path, CSV).unwrap();
        std::fs::create_dir_all(&t.img_dir).unwrap();
        std::fs::write(t.img_dir.join("old_one.png"), b"png").unwrap();

        let shooter = FakeShooter { calls: Mutex::new(Vec::new()) };
        let report = capture_target(&shooter, &t).await.unwrap();

        assert_eq!(
            report,
            CaptureReport { rows: 5, captured: 1, existing: 1, skipped: 2, failed: 1 }
        );
        assert_eq!(
            *shooter.calls.lock().unwrap(),
            vec!["https://claude.ai".to_string(), "https://broken.example".to_string()]
        );

        let written = std::fs::read_to_string(&t.csv_path).unwrap();
        assert!(written.starts_with("\"Title\",\"Website URL\",\"Link\",\"image_url\"\r\n"));
        let sheet = Sheet::parse(&written).unwrap();
        let images: Vec<&str> = sheet.rows.iter().map(|r| r[3].as_str()).collect();
        assert_eq!(
            images,
            vec!["/img/tools/claude_code.png", "/img/tools/old_one.png", "", "", ""]
        );
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let t = target(dir.path());
        std::fs::write(&t.csv_path, CSV).unwrap();

        let shooter = FakeShooter { calls: Mutex::new(Vec::new()) };
        capture_target(&shooter, &t).await.unwrap();
        let first = std::fs::read_to_string(&t.csv_path).unwrap();
        let report = capture_target(&shooter, &t).await.unwrap();

        assert_eq!(report.captured, 0);
        assert_eq!(report.existing, 2);
        // Three calls on the first run, then only the broken row again.
        assert_eq!(shooter.calls.lock().unwrap().len(), 4);
        assert_eq!(std::fs::read_to_string(&t.csv_path).unwrap(), first);
    }

    #[tokio::test]
    async fn missing_csv_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = target(dir.path());
        t.csv_path = dir.path().join("none.csv");
        let shooter = FakeShooter { calls: Mutex::new(Vec::new()) };
        assert!(capture_target(&shooter, &t).await.is_err());
    }

    #[tokio::test]
    async fn overflow_cells_survive_the_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let t = target(dir.path());
        std::fs::write(&t.csv_path, "Title,Website URL\nA,https://a,note one,note two\nB,https://b\n").unwrap();

        let shooter = FakeShooter { calls: Mutex::new(Vec::new()) };
        let report = capture_target(&shooter, &t).await.unwrap();
        assert_eq!(report.captured, 2);

        let sheet = Sheet::parse(&std::fs::read_to_string(&t.csv_path).unwrap()).unwrap();
        assert_eq!(sheet.headers, vec!["Title", "Website URL", "", "", "image_url"]);
        assert_eq!(sheet.rows[0], vec!["A", "https://a", "note one", "note two", "/img/tools/a.png"]);
        assert_eq!(sheet.rows[1], vec!["B", "https://b", "", "", "/img/tools/b.png"]);
    }
}
