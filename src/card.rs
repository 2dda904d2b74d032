use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::classify::{color_class_for, country_code_for, flag_url, ColorTag, FLAG_PLACEHOLDER};
use crate::record::{Category, ContentRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagPill {
    pub label: String,
    #[serde(serialize_with = "css_class")]
    pub color: ColorTag,
}

fn css_class<S: serde::Serializer>(color: &ColorTag, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(color.css_class())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LinkKind {
    Website,
    YouTube,
    ApplePodcasts,
    Spotify,
    YouTubePodcast,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardLink {
    pub kind: LinkKind,
    pub title: &'static str,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Flag {
    Image { code: &'static str, url: String },
    Placeholder,
}

/// Display model of one record.
#[derive(Debug, Clone, Serialize)]
pub struct CardView {
    pub title: String,
    pub image: Option<String>,
    /// First character of the title, shown when there is no image.
    pub placeholder: String,
    pub meta: Vec<(&'static str, String)>,
    pub description: String,
    pub use_cases: Option<String>,
    pub tags: Vec<TagPill>,
    pub country: Option<String>,
    pub flag: Option<Flag>,
    pub links: Vec<CardLink>,
}

/// Keep an image path only if it resolves to a file under `public_dir`.
fn resolve_image(image_url: Option<&str>, public_dir: Option<&Path>) -> Option<String> {
    let url = image_url.filter(|u| !u.is_empty())?;
    let Some(root) = public_dir else {
        return Some(url.to_string());
    };
    if url.starts_with("http://") || url.starts_with("https://") {
        return Some(url.to_string());
    }
    let path = root.join(url.trim_start_matches('/'));
    if path.is_file() {
        Some(url.to_string())
    } else {
        debug!("Image {} not found under {}", url, root.display());
        None
    }
}

fn links_for(r: &ContentRecord) -> Vec<CardLink> {
    let is_podcast = r.category == Category::Podcasts;
    let is_youtube = r.category == Category::YouTube;
    let mut links = Vec::new();
    let mut push = |kind, title, href: &Option<String>| {
        if let Some(href) = href.as_deref().filter(|h| !h.is_empty()) {
            links.push(CardLink { kind, title, href: href.to_string() });
        }
    };

    if !is_youtube && !is_podcast {
        push(LinkKind::Website, "Visit Website", &r.link_primary);
    }
    if is_youtube {
        push(LinkKind::YouTube, "Watch on YouTube", &r.link_primary);
    }
    push(LinkKind::ApplePodcasts, "Apple Podcasts", &r.apple_podcasts_link);
    push(LinkKind::Spotify, "Spotify", &r.spotify_podcasts_link);
    push(LinkKind::YouTubePodcast, "Watch on YouTube", &r.youtube_podcast_link);
    if !is_podcast {
        push(LinkKind::Secondary, "Secondary Link", &r.link_secondary);
    }
    links
}

impl CardView {
    pub fn from_record(r: &ContentRecord, public_dir: Option<&Path>) -> Self {
        let meta = [
            ("Host", &r.host),
            ("Provided by", &r.provided_by),
            ("Vendor", &r.vendor),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.clone().map(|v| (k, v)))
        .collect();

        let tags = r
            .tag_labels()
            .into_iter()
            .map(|label| TagPill { color: color_class_for(&label), label })
            .collect();

        let flag = r.country.as_deref().map(|c| match country_code_for(Some(c)) {
            Some(code) => Flag::Image { code, url: flag_url(code) },
            None => Flag::Placeholder,
        });

        CardView {
            title: r.title.clone(),
            image: resolve_image(r.image_url.as_deref(), public_dir),
            placeholder: r.title.chars().next().map(String::from).unwrap_or_default(),
            meta,
            description: r.description.clone(),
            use_cases: r.use_cases.clone(),
            tags,
            country: r.country.clone(),
            flag,
            links: links_for(r),
        }
    }

    /// Glyph shown on the card's flag spot.
    pub fn flag_glyph(&self) -> Option<&str> {
        match self.flag.as_ref()? {
            Flag::Image { code, .. } => Some(*code),
            Flag::Placeholder => Some(FLAG_PLACEHOLDER),
        }
    }
}
