use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::labels::parse_list;
use crate::record::{Category, ContentRecord};

/// Filter value that passes every record.
pub const ALL: &str = "All";

/// Below this viewport width sections start collapsed.
const MOBILE_BREAKPOINT: u32 = 768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SortOrder {
    #[default]
    Default,
    AZ,
    ZA,
    Subcategory,
    Vendor,
    Country,
}

const COMMON_ORDERS: &[SortOrder] = &[
    SortOrder::Default,
    SortOrder::AZ,
    SortOrder::ZA,
    SortOrder::Subcategory,
];

const TOOLS_ORDERS: &[SortOrder] = &[
    SortOrder::Default,
    SortOrder::AZ,
    SortOrder::ZA,
    SortOrder::Subcategory,
    SortOrder::Vendor,
    SortOrder::Country,
];

impl SortOrder {
    /// Orders offered in a section's sort dropdown.
    pub fn available_for(category: Category) -> &'static [SortOrder] {
        match category {
            Category::Tools => TOOLS_ORDERS,
            _ => COMMON_ORDERS,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortOrder::Default => "Default",
            SortOrder::AZ => "A-Z",
            SortOrder::ZA => "Z-A",
            SortOrder::Subcategory => "Subcategory",
            SortOrder::Vendor => "Vendor",
            SortOrder::Country => "Country",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(SortOrder::Default),
            "a-z" | "az" => Ok(SortOrder::AZ),
            "z-a" | "za" => Ok(SortOrder::ZA),
            "subcategory" => Ok(SortOrder::Subcategory),
            "vendor" => Ok(SortOrder::Vendor),
            "country" => Ok(SortOrder::Country),
            other => anyhow::bail!("unknown sort order: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

impl FromStr for ViewMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "grid" => Ok(ViewMode::Grid),
            "list" => Ok(ViewMode::List),
            other => anyhow::bail!("unknown view mode: {}", other),
        }
    }
}

/// Per-section UI state. Updates return a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionState {
    pub category: Category,
    pub active_filter: String,
    pub sort_order: SortOrder,
    pub view_mode: ViewMode,
    pub collapsed: bool,
}

impl SectionState {
    pub fn new(category: Category) -> Self {
        SectionState {
            category,
            active_filter: ALL.to_string(),
            sort_order: SortOrder::Default,
            view_mode: ViewMode::Grid,
            collapsed: false,
        }
    }

    pub fn for_viewport(category: Category, width: u32) -> Self {
        SectionState {
            collapsed: width < MOBILE_BREAKPOINT,
            ..SectionState::new(category)
        }
    }

    pub fn with_filter(self, label: impl Into<String>) -> Self {
        SectionState { active_filter: label.into(), ..self }
    }

    pub fn clear_filter(self) -> Self {
        self.with_filter(ALL)
    }

    /// Orders the section does not offer are ignored.
    pub fn with_sort(self, order: SortOrder) -> Self {
        if !SortOrder::available_for(self.category).contains(&order) {
            debug!("{} does not offer sort order {}", self.category, order);
            return self;
        }
        SectionState { sort_order: order, ..self }
    }

    pub fn with_view(self, view_mode: ViewMode) -> Self {
        SectionState { view_mode, ..self }
    }

    pub fn toggle_collapsed(self) -> Self {
        SectionState { collapsed: !self.collapsed, ..self }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facet {
    pub label: String,
    pub count: usize,
}

/// Everything one section shows for the current inputs.
#[derive(Debug, Clone, Serialize)]
pub struct SectionView<'a> {
    pub state: SectionState,
    /// Size of the search-narrowed collection, shown on the "All" pill.
    pub all_count: usize,
    pub facets: Vec<Facet>,
    /// Active filter that is not a facet (set by clicking a card tag).
    pub custom_tag: Option<String>,
    pub sort_choices: &'static [SortOrder],
    pub records: Vec<&'a ContentRecord>,
}

impl SectionView<'_> {
    /// The filter bar only shows when there is something to pick or clear.
    pub fn shows_filter_bar(&self) -> bool {
        !self.state.collapsed && (!self.facets.is_empty() || self.state.active_filter != ALL)
    }
}

/// Case-insensitive substring search over title, description and raw tags.
pub fn search<'a>(records: &[&'a ContentRecord], term: Option<&str>) -> Vec<&'a ContentRecord> {
    let Some(term) = term.filter(|t| !t.is_empty()) else {
        return records.to_vec();
    };
    let needle = term.to_lowercase();
    records
        .iter()
        .copied()
        .filter(|r| {
            r.title.to_lowercase().contains(&needle)
                || r.description.to_lowercase().contains(&needle)
                || r.tags.as_deref().is_some_and(|t| t.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Subcategory labels with the number of records carrying each label in
/// either their subcategory or tag list. Sorted by label.
pub fn facets(records: &[&ContentRecord]) -> Vec<Facet> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for r in records {
        for sub in parse_list(r.subcategory.as_deref()) {
            counts.entry(sub).or_insert(0);
        }
    }
    for (label, count) in counts.iter_mut() {
        *count = records.iter().filter(|r| r.has_label(label)).count();
    }
    counts
        .into_iter()
        .map(|(label, count)| Facet { label, count })
        .collect()
}

pub fn filter<'a>(records: &[&'a ContentRecord], active: &str) -> Vec<&'a ContentRecord> {
    if active == ALL {
        return records.to_vec();
    }
    records.iter().copied().filter(|r| r.has_label(active)).collect()
}

fn by_key(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

fn then_title(primary: Ordering, a: &ContentRecord, b: &ContentRecord) -> Ordering {
    primary.then_with(|| a.title.cmp(&b.title))
}

/// Stable sort; `Default` keeps input order.
pub fn sort<'a>(records: &[&'a ContentRecord], order: SortOrder) -> Vec<&'a ContentRecord> {
    let mut out = records.to_vec();
    let opt = |s: &Option<String>| s.clone().unwrap_or_default();
    match order {
        SortOrder::Default => {}
        SortOrder::AZ => out.sort_by(|a, b| then_title(by_key(&a.title, &b.title), a, b)),
        SortOrder::ZA => out.sort_by(|a, b| then_title(by_key(&b.title, &a.title), a, b)),
        SortOrder::Subcategory => {
            out.sort_by(|a, b| then_title(by_key(&opt(&a.subcategory), &opt(&b.subcategory)), a, b))
        }
        SortOrder::Vendor => {
            let vendor = |r: &ContentRecord| r.vendor.clone().or_else(|| r.host.clone()).unwrap_or_default();
            out.sort_by(|a, b| then_title(by_key(&vendor(a), &vendor(b)), a, b))
        }
        SortOrder::Country => {
            out.sort_by(|a, b| then_title(by_key(&opt(&a.country), &opt(&b.country)), a, b))
        }
    }
    out
}

/// A category section: its state plus view derivation over a collection.
#[derive(Debug, Clone)]
pub struct Section {
    pub state: SectionState,
}

impl Section {
    pub fn new(state: SectionState) -> Self {
        Section { state }
    }

    /// `sort(filter(search(records)))`. `None` when nothing survives the
    /// search, in which case the section is not rendered at all.
    pub fn view<'a>(&self, records: &'a [ContentRecord], term: Option<&str>) -> Option<SectionView<'a>> {
        let all: Vec<&ContentRecord> = records.iter().collect();
        let found = search(&all, term);
        if found.is_empty() {
            return None;
        }

        let facets = facets(&found);
        let active = self.state.active_filter.as_str();
        let custom_tag = (active != ALL && !facets.iter().any(|f| f.label == active))
            .then(|| active.to_string());
        let visible = sort(&filter(&found, active), self.state.sort_order);

        Some(SectionView {
            state: self.state.clone(),
            all_count: found.len(),
            facets,
            custom_tag,
            sort_choices: SortOrder::available_for(self.state.category),
            records: visible,
        })
    }
}

const EXPORT_COLUMNS: &[&str] = &[
    "title",
    "description",
    "tags",
    "frequency",
    "subcategory",
    "host",
    "provided_by",
    "vendor",
    "country",
    "use_cases",
    "link_primary",
    "link_secondary",
    "apple_podcasts_link",
    "spotify_podcasts_link",
    "youtube_podcast_link",
    "image_url",
    "category",
];

fn export_cells(r: &ContentRecord) -> Vec<String> {
    let opt = |s: &Option<String>| s.clone().unwrap_or_default();
    vec![
        r.title.clone(),
        r.description.clone(),
        opt(&r.tags),
        opt(&r.frequency),
        opt(&r.subcategory),
        opt(&r.host),
        opt(&r.provided_by),
        opt(&r.vendor),
        opt(&r.country),
        opt(&r.use_cases),
        opt(&r.link_primary),
        opt(&r.link_secondary),
        opt(&r.apple_podcasts_link),
        opt(&r.spotify_podcasts_link),
        opt(&r.youtube_podcast_link),
        opt(&r.image_url),
        r.category.title().to_string(),
    ]
}

/// Serialize a full collection as CSV, every field quoted.
/// Pass-through columns follow the named ones.
pub fn export_csv(records: &[ContentRecord]) -> Result<String> {
    let mut extra_keys: Vec<&str> = records
        .iter()
        .flat_map(|r| r.extra.keys().map(String::as_str))
        .collect();
    extra_keys.sort_unstable();
    extra_keys.dedup();

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .double_quote(true)
        .delimiter(b',')
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());

    writer.write_record(EXPORT_COLUMNS.iter().copied().chain(extra_keys.iter().copied()))?;
    for r in records {
        let mut cells = export_cells(r);
        cells.extend(
            extra_keys
                .iter()
                .map(|k| r.extra.get(*k).cloned().unwrap_or_default()),
        );
        writer.write_record(&cells)?;
    }

    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(String::from_utf8(bytes)?)
}

/// Download name: whitespace runs in the title become `_`.
pub fn export_file_name(category: Category) -> String {
    let stem = category.title().split_whitespace().collect::<Vec<_>>().join("_");
    format!("{}_export.csv", stem)
}
