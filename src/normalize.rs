use std::collections::BTreeMap;

use crate::record::{Category, ContentRecord};

pub type RawRow = BTreeMap<String, String>;

const TITLE: &[&str] = &["Title", "title", "Name"];
const DESCRIPTION: &[&str] = &["Description", "description"];
const TAGS: &[&str] = &["Tags", "tags"];
const FREQUENCY: &[&str] = &["Frequency", "frequency"];
const SUBCATEGORY: &[&str] = &["Subcategory", "subcategory"];
const HOST: &[&str] = &["Host", "host"];
const PROVIDED_BY: &[&str] = &["provided_by"];
const VENDOR: &[&str] = &["vendor", "Vendor"];
const USE_CASES: &[&str] = &["My use cases for it", "When to use it", "use_cases"];
const COUNTRY: &[&str] = &["country of origin", "Country", "country"];
const IMAGE_URL: &[&str] = &["image_url"];
const LINK_SECONDARY: &[&str] = &["link_secondary"];
const APPLE: &[&str] = &["apple_podcasts_link"];
const SPOTIFY: &[&str] = &["spotify_podcasts_link"];
const YOUTUBE_PODCAST: &[&str] = &["youtube_podcast_link"];

const LINK_GENERIC: &[&str] = &["Website URL", "Link", "link_primary", "URL", "URL to explanation"];
const LINK_ARTICLES: &[&str] = &["link_primary", "Link", "Website URL"];

/// Assigned by the loader, never read from data.
const CATEGORY_COLUMN: &str = "category";

const KNOWN: &[&[&str]] = &[
    TITLE, DESCRIPTION, TAGS, FREQUENCY, SUBCATEGORY, HOST, PROVIDED_BY, VENDOR, USE_CASES,
    COUNTRY, IMAGE_URL, LINK_SECONDARY, APPLE, SPOTIFY, YOUTUBE_PODCAST, LINK_GENERIC,
    LINK_ARTICLES,
];

/// Link alias priority for a category's dataset.
pub fn link_aliases(category: Category) -> &'static [&'static str] {
    match category {
        Category::Blogs | Category::Benchmarks => LINK_ARTICLES,
        _ => LINK_GENERIC,
    }
}

fn is_known(column: &str) -> bool {
    column == CATEGORY_COLUMN || KNOWN.iter().any(|aliases| aliases.contains(&column))
}

/// First alias with a non-empty value wins; later ones are ignored.
fn resolve(row: &RawRow, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .filter_map(|a| row.get(*a))
        .find(|v| !v.is_empty())
        .cloned()
}

/// Map a raw CSV row onto a [`ContentRecord`]. The title may come back empty.
pub fn normalize(row: &RawRow, category: Category) -> ContentRecord {
    let extra = row
        .iter()
        .filter(|(k, v)| !v.is_empty() && !is_known(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    ContentRecord {
        title: resolve(row, TITLE).unwrap_or_default(),
        description: resolve(row, DESCRIPTION).unwrap_or_default(),
        tags: resolve(row, TAGS),
        frequency: resolve(row, FREQUENCY),
        subcategory: resolve(row, SUBCATEGORY),
        host: resolve(row, HOST),
        provided_by: resolve(row, PROVIDED_BY),
        vendor: resolve(row, VENDOR),
        country: resolve(row, COUNTRY),
        use_cases: resolve(row, USE_CASES),
        link_primary: resolve(row, link_aliases(category)),
        link_secondary: resolve(row, LINK_SECONDARY),
        apple_podcasts_link: resolve(row, APPLE),
        spotify_podcasts_link: resolve(row, SPOTIFY),
        youtube_podcast_link: resolve(row, YOUTUBE_PODCAST),
        image_url: resolve(row, IMAGE_URL),
        category,
        extra,
    }
}
