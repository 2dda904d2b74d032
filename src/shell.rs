use std::collections::BTreeMap;

use serde::Serialize;

use crate::loader::Dataset;
use crate::record::{Category, ContentRecord};
use crate::section::{Section, SectionState, SectionView};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub id: &'static str,
    pub label: &'static str,
    pub count: usize,
}

/// Owns every category collection, each section's state and the global
/// search term. Sections only ever read the term.
#[derive(Debug, Default)]
pub struct Shell {
    collections: BTreeMap<Category, Vec<ContentRecord>>,
    sections: BTreeMap<Category, Section>,
    search: Option<String>,
}

impl Shell {
    pub fn new() -> Self {
        Shell::default()
    }

    pub fn from_datasets(datasets: Vec<Dataset>) -> Self {
        let mut shell = Shell::new();
        for ds in datasets {
            shell.replace(ds.category, ds.records);
        }
        shell
    }

    /// A reload fully replaces the previous collection.
    pub fn replace(&mut self, category: Category, records: Vec<ContentRecord>) {
        self.collections.insert(category, records);
    }

    pub fn records(&self, category: Category) -> &[ContentRecord] {
        self.collections.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_search(&mut self, term: impl Into<String>) {
        let term = term.into();
        self.search = (!term.is_empty()).then_some(term);
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn state(&self, category: Category) -> SectionState {
        self.sections
            .get(&category)
            .map(|s| s.state.clone())
            .unwrap_or_else(|| SectionState::new(category))
    }

    pub fn set_state(&mut self, state: SectionState) {
        self.sections.insert(state.category, Section::new(state));
    }

    pub fn view(&self, category: Category) -> Option<SectionView<'_>> {
        Section::new(self.state(category)).view(self.records(category), self.search())
    }

    /// Views of every non-empty section, in page order.
    pub fn sections(&self) -> Vec<(Category, SectionView<'_>)> {
        Category::ALL
            .into_iter()
            .filter_map(|c| self.view(c).map(|v| (c, v)))
            .collect()
    }

    /// Nav entries for populated categories, counted before search.
    pub fn nav_items(&self) -> Vec<NavItem> {
        Category::ALL
            .into_iter()
            .map(|c| NavItem { id: c.id(), label: c.nav_label(), count: self.records(c).len() })
            .filter(|n| n.count > 0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::SortOrder;

    fn rec(title: &str, category: Category) -> ContentRecord {
        ContentRecord::new(title, category)
    }

    fn shell() -> Shell {
        Shell::from_datasets(vec![
            Dataset {
                category: Category::Tools,
                records: vec![rec("Zed", Category::Tools), rec("Aider", Category::Tools)],
            },
            Dataset {
                category: Category::Blogs,
                records: vec![rec("Simon Willison", Category::Blogs)],
            },
            Dataset { category: Category::Courses, records: vec![] },
        ])
    }

    #[test]
    fn nav_skips_empty_categories() {
        let nav = shell().nav_items();
        let ids: Vec<_> = nav.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["blogs", "tools"]);
        assert_eq!(nav[1].count, 2);
    }

    #[test]
    fn search_fans_into_every_section() {
        let mut s = shell();
        s.set_search("simon");
        let sections = s.sections();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].0, Category::Blogs);
        // Nav counts ignore the search.
        assert_eq!(s.nav_items().len(), 2);
    }

    #[test]
    fn section_state_is_per_category() {
        let mut s = shell();
        s.set_state(SectionState::new(Category::Tools).with_sort(SortOrder::AZ));
        let tools = s.view(Category::Tools).unwrap();
        assert_eq!(tools.records[0].title, "Aider");
        assert_eq!(s.state(Category::Blogs).sort_order, SortOrder::Default);
    }

    #[test]
    fn replace_discards_previous_collection() {
        let mut s = shell();
        s.replace(Category::Tools, vec![rec("Only", Category::Tools)]);
        assert_eq!(s.records(Category::Tools).len(), 1);
        s.set_search("");
        assert!(s.search().is_none());
    }
}
