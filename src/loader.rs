use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::normalize::{normalize, RawRow};
use crate::record::{Category, ContentRecord};

/// Where category CSV files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Dir(PathBuf),
    Url(String),
}

impl DataSource {
    /// `http(s)://` prefixes select the URL form, anything else is a directory.
    pub fn parse(s: &str) -> Self {
        if s.starts_with("http://") || s.starts_with("https://") {
            DataSource::Url(s.trim_end_matches('/').to_string())
        } else {
            DataSource::Dir(PathBuf::from(s))
        }
    }

    pub fn describe(&self, file: &str) -> String {
        match self {
            DataSource::Dir(dir) => dir.join(file).display().to_string(),
            DataSource::Url(base) => format!("{}/{}", base, file),
        }
    }
}

/// One category's current record collection.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub category: Category,
    pub records: Vec<ContentRecord>,
}

pub struct ParsedCsv {
    pub records: Vec<ContentRecord>,
    /// Row-level parse errors; the rows were skipped.
    pub errors: Vec<String>,
    /// Rows dropped because no title resolved.
    pub untitled: usize,
}

/// Parse CSV text with a header row into normalized, titled records.
pub fn parse_csv(text: &str, category: Category) -> ParsedCsv {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut out = ParsedCsv {
        records: Vec::new(),
        errors: Vec::new(),
        untitled: 0,
    };

    let headers = match reader.headers() {
        Ok(h) => h.clone(),
        Err(e) => {
            out.errors.push(e.to_string());
            return out;
        }
    };

    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                out.errors.push(e.to_string());
                continue;
            }
        };
        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        let item = normalize(&row, category);
        if item.title.is_empty() {
            out.untitled += 1;
            continue;
        }
        out.records.push(item);
    }

    out
}

async fn fetch_text(source: &DataSource, file: &str) -> Result<String> {
    match source {
        DataSource::Dir(dir) => {
            let path = dir.join(file);
            tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))
        }
        DataSource::Url(base) => {
            let url = format!("{}/{}", base, file);
            let text = reqwest::get(&url)
                .await?
                .error_for_status()?
                .text()
                .await
                .with_context(|| format!("Failed to fetch {}", url))?;
            Ok(text)
        }
    }
}

/// Load one category. Failures are logged and yield an empty dataset.
pub async fn load(source: &DataSource, file: &str, category: Category) -> Dataset {
    let text = match fetch_text(source, file).await {
        Ok(t) => t,
        Err(e) => {
            error!("Error loading {}: {:#}", source.describe(file), e);
            return Dataset { category, records: Vec::new() };
        }
    };

    let parsed = parse_csv(&text, category);
    if !parsed.errors.is_empty() {
        error!("Errors parsing {}: {:?}", file, parsed.errors);
    }
    if parsed.untitled > 0 {
        debug!("{}: dropped {} rows without a title", file, parsed.untitled);
    }
    info!("Loaded {} items for {}", parsed.records.len(), category);

    Dataset { category, records: parsed.records }
}

/// Load every `(category, file)` pair concurrently, one task each.
pub async fn load_all(source: &DataSource, files: Vec<(Category, String)>) -> Vec<Dataset> {
    let mut set = JoinSet::new();
    for (category, file) in files {
        let source = source.clone();
        set.spawn(async move { load(&source, &file, category).await });
    }

    let mut datasets = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(ds) => datasets.push(ds),
            Err(e) => warn!("Dataset task failed: {}", e),
        }
    }
    datasets.sort_by_key(|d| d.category);
    datasets
}
