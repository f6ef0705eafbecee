use passcore_index::{Entry, Index};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerms {
    parts: Vec<String>,
}

impl QueryTerms {
    pub fn parse(term: &str) -> Self {
        Self {
            parts: term.to_lowercase().split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn matches(&self, name: &str) -> bool {
        if self.parts.is_empty() {
            return true;
        }

        let name_lc = name.to_lowercase();
        self.parts.iter().all(|part| name_lc.contains(part.as_str()))
    }
}

pub trait QueryEngine {
    fn search(&self, term: &str) -> Vec<Entry>;
}

impl QueryEngine for Index {
    fn search(&self, term: &str) -> Vec<Entry> {
        filter_entries(self.entries(), term)
    }
}

pub fn filter_entries(entries: &[Entry], term: &str) -> Vec<Entry> {
    let terms = QueryTerms::parse(term);
    if terms.is_empty() {
        return entries.to_vec();
    }

    entries
        .iter()
        .filter(|entry| terms.matches(&entry.name))
        .cloned()
        .collect()
}
