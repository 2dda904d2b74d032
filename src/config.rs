use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::loader::DataSource;
use crate::record::Category;

const DEFAULT_CONFIG_FILE: &str = "radar.toml";
const CONFIG_ENV: &str = "RADAR_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory or `http(s)` base URL holding the category CSVs.
    pub data: String,
    /// Site root that image paths resolve against.
    pub public_dir: Option<PathBuf>,
    pub datasets: Vec<DatasetFile>,
    pub capture: CaptureConfig,
    pub enrich: EnrichConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetFile {
    pub category: String,
    pub file: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub chrome: String,
    pub timeout_secs: u64,
    pub settle_ms: u64,
    pub viewport: (u32, u32),
    pub targets: Vec<CaptureTarget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureTarget {
    pub name: String,
    pub csv_path: PathBuf,
    pub img_dir: PathBuf,
    pub base_url: String,
    pub url_field: String,
    #[serde(default)]
    pub fallback_url_fields: Vec<String>,
    pub title_field: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub concurrency: usize,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub fallback_video_title: String,
    pub fallback_article_title: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data: "public/data".into(),
            public_dir: Some(PathBuf::from("public")),
            datasets: Category::ALL
                .into_iter()
                .map(|c| DatasetFile { category: c.id().into(), file: c.default_file().into() })
                .collect(),
            capture: CaptureConfig::default(),
            enrich: EnrichConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            chrome: "chromium".into(),
            timeout_secs: 30,
            settle_ms: 2000,
            viewport: (1366, 768),
            targets: default_targets(),
        }
    }
}

impl Default for EnrichConfig {
    fn default() -> Self {
        EnrichConfig {
            concurrency: 4,
            max_retries: 3,
            base_backoff_ms: 2000,
            fallback_video_title: "Watch Video".into(),
            fallback_article_title: "Read Article".into(),
        }
    }
}

fn target(name: &str, url_field: &str, fallbacks: &[&str], title_field: &str) -> CaptureTarget {
    CaptureTarget {
        name: name.into(),
        csv_path: PathBuf::from("public/data").join(format!("{}.csv", name)),
        img_dir: PathBuf::from("public/img").join(name),
        base_url: format!("/img/{}/", name),
        url_field: url_field.into(),
        fallback_url_fields: fallbacks.iter().map(|s| s.to_string()).collect(),
        title_field: title_field.into(),
    }
}

fn default_targets() -> Vec<CaptureTarget> {
    vec![
        target("tools", "Website URL", &["Link", "link_primary"], "Title"),
        target("blogs", "link_primary", &["Link", "Website URL"], "title"),
        target("benchmarks", "link_primary", &["Link", "Website URL"], "title"),
        target("prompt_frameworks", "URL to explanation", &["Link", "Website URL"], "Name"),
        target("extratools", "Website URL", &["Link", "link_primary"], "Title"),
    ]
}

impl Config {
    /// Explicit path, then `$RADAR_CONFIG`, then `./radar.toml` if present,
    /// else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(|| {
                let p = PathBuf::from(DEFAULT_CONFIG_FILE);
                p.exists().then_some(p)
            });

        let Some(path) = path else {
            debug!("No config file, using defaults");
            return Ok(Config::default());
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Config::from_toml(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn source(&self) -> DataSource {
        DataSource::parse(&self.data)
    }

    /// `(category, file)` pairs, optionally narrowed to one category.
    /// Each category may be listed once.
    pub fn dataset_files(&self, only: Option<Category>) -> Result<Vec<(Category, String)>> {
        let mut files = Vec::new();
        let mut seen = BTreeSet::new();
        for d in &self.datasets {
            let category: Category = d.category.parse()?;
            if !seen.insert(category) {
                bail!("{} is listed more than once in datasets ({})", category, d.file);
            }
            if only.map_or(true, |c| c == category) {
                files.push((category, d.file.clone()));
            }
        }
        Ok(files)
    }
}
