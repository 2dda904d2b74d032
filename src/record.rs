use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::labels::parse_list;

/// The nine fixed content types. Declaration order is page order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Category {
    Podcasts,
    Newsletters,
    Blogs,
    YouTube,
    Courses,
    Tools,
    Benchmarks,
    Libraries,
    PromptFrameworks,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Podcasts,
        Category::Newsletters,
        Category::Blogs,
        Category::YouTube,
        Category::Courses,
        Category::Tools,
        Category::Benchmarks,
        Category::Libraries,
        Category::PromptFrameworks,
    ];

    /// Section heading shown on the page.
    pub fn title(self) -> &'static str {
        match self {
            Category::Podcasts => "Podcasts",
            Category::Newsletters => "Newsletters",
            Category::Blogs => "Blogs",
            Category::YouTube => "YouTube Channels",
            Category::Courses => "Courses",
            Category::Tools => "Tools",
            Category::Benchmarks => "Benchmarks & Reports",
            Category::Libraries => "Libraries",
            Category::PromptFrameworks => "Prompt Frameworks",
        }
    }

    /// Anchor id of the section, also the nav key.
    pub fn id(self) -> &'static str {
        match self {
            Category::Podcasts => "podcasts",
            Category::Newsletters => "newsletters",
            Category::Blogs => "blogs",
            Category::YouTube => "youtube",
            Category::Courses => "courses",
            Category::Tools => "tools",
            Category::Benchmarks => "benchmarks",
            Category::Libraries => "libraries",
            Category::PromptFrameworks => "frameworks",
        }
    }

    /// Short label used in the sticky nav bar.
    pub fn nav_label(self) -> &'static str {
        match self {
            Category::YouTube => "YouTube",
            Category::Benchmarks => "Benchmarks",
            Category::PromptFrameworks => "Frameworks",
            other => other.title(),
        }
    }

    pub fn default_file(self) -> &'static str {
        match self {
            Category::Podcasts => "podcasts.csv",
            Category::Newsletters => "newsletters.csv",
            Category::Blogs => "blogs.csv",
            Category::YouTube => "youtube.csv",
            Category::Courses => "courses.csv",
            Category::Tools => "tools.csv",
            Category::Benchmarks => "benchmarks.csv",
            Category::Libraries => "libraries.csv",
            Category::PromptFrameworks => "prompt_frameworks.csv",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    /// Accepts the section id, the variant name or the heading, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| {
                wanted == c.id()
                    || wanted == format!("{:?}", c).to_lowercase()
                    || wanted == c.title().to_lowercase()
                    || wanted == c.nav_label().to_lowercase()
            })
            .ok_or_else(|| anyhow::anyhow!("unknown category: {}", s))
    }
}

/// One normalized row of a category CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentRecord {
    pub title: String,
    pub description: String,
    pub tags: Option<String>,
    pub frequency: Option<String>,
    pub subcategory: Option<String>,
    pub host: Option<String>,
    pub provided_by: Option<String>,
    pub vendor: Option<String>,
    pub country: Option<String>,
    pub use_cases: Option<String>,
    pub link_primary: Option<String>,
    pub link_secondary: Option<String>,
    pub apple_podcasts_link: Option<String>,
    pub spotify_podcasts_link: Option<String>,
    pub youtube_podcast_link: Option<String>,
    pub image_url: Option<String>,
    pub category: Category,
    /// Columns no alias claims, kept verbatim.
    pub extra: BTreeMap<String, String>,
}

impl ContentRecord {
    pub fn new(title: impl Into<String>, category: Category) -> Self {
        ContentRecord {
            title: title.into(),
            description: String::new(),
            tags: None,
            frequency: None,
            subcategory: None,
            host: None,
            provided_by: None,
            vendor: None,
            country: None,
            use_cases: None,
            link_primary: None,
            link_secondary: None,
            apple_podcasts_link: None,
            spotify_podcasts_link: None,
            youtube_podcast_link: None,
            image_url: None,
            category,
            extra: BTreeMap::new(),
        }
    }

    /// Raw label list used for tag pills and tag matching.
    /// Podcasts keep theirs in the `Frequency` column.
    pub fn label_source(&self) -> Option<&str> {
        self.tags.as_deref().or(self.frequency.as_deref())
    }

    pub fn tag_labels(&self) -> Vec<String> {
        parse_list(self.label_source())
    }

    pub fn subcategory_labels(&self) -> Vec<String> {
        parse_list(self.subcategory.as_deref())
    }

    /// True when either the subcategory or the tag list names `label`.
    pub fn has_label(&self, label: &str) -> bool {
        self.subcategory_labels().iter().any(|l| l == label)
            || self.tag_labels().iter().any(|l| l == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_from_str_accepts_id_title_and_variant() {
        assert_eq!("frameworks".parse::<Category>().unwrap(), Category::PromptFrameworks);
        assert_eq!("Prompt Frameworks".parse::<Category>().unwrap(), Category::PromptFrameworks);
        assert_eq!("YOUTUBE".parse::<Category>().unwrap(), Category::YouTube);
        assert_eq!("Benchmarks & Reports".parse::<Category>().unwrap(), Category::Benchmarks);
        assert!("radio".parse::<Category>().is_err());
    }

    #[test]
    fn label_source_falls_back_to_frequency() {
        let mut r = ContentRecord::new("Daily Brief", Category::Podcasts);
        r.frequency = Some("[Daily, News]".into());
        assert_eq!(r.tag_labels(), vec!["Daily", "News"]);
        r.tags = Some("[AI]".into());
        assert_eq!(r.tag_labels(), vec!["AI"]);
    }

    #[test]
    fn has_label_checks_both_lists() {
        let mut r = ContentRecord::new("Foo", Category::Tools);
        r.subcategory = Some("[coding]".into());
        r.tags = Some("[agents, mcp]".into());
        assert!(r.has_label("coding"));
        assert!(r.has_label("mcp"));
        assert!(!r.has_label("agent"));
    }
}
