use passcore_index::Entry;

pub(crate) const SAVE_LINE: &str = ".";
pub(crate) const CANCEL_LINE: &str = "/cancel";

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum EditStep {
    Continue,
    Save(String),
    Cancel,
}

#[derive(Debug)]
pub(crate) struct EditSession {
    entry: Entry,
    lines: Vec<String>,
}

impl EditSession {
    pub(crate) fn new(entry: Entry) -> Self {
        Self {
            entry,
            lines: Vec::new(),
        }
    }

    pub(crate) fn entry(&self) -> &Entry {
        &self.entry
    }

    pub(crate) fn feed(&mut self, line: &str) -> EditStep {
        match line.trim_end_matches(['\r', '\n']) {
            SAVE_LINE if self.lines.is_empty() => EditStep::Cancel,
            SAVE_LINE => {
                let mut content = self.lines.join("\n");
                content.push('\n');
                EditStep::Save(content)
            }
            CANCEL_LINE => EditStep::Cancel,
            other => {
                self.lines.push(other.to_string());
                EditStep::Continue
            }
        }
    }
}
