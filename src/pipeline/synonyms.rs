use std::collections::HashMap;
use std::path::Path;

use crate::analysis::splitter::TextSplitter;
use crate::core::error::{Error, ErrorKind, Result};

/// Synonym groups. Single-word members expand each other at query time.
/// Multi-word members additionally participate at index time: when the
/// pipeline sees a run of terms matching one, it emits the group's first
/// member as the canonical form, and the query translator turns them into
/// phrase alternatives.
#[derive(Debug, Clone, Default)]
pub struct SynGroups {
    groups: Vec<Vec<String>>,
    by_member: HashMap<String, usize>,
    /// Multi-word members, split, with their group index.
    multiword: Vec<(Vec<String>, usize)>,
}

impl SynGroups {
    pub fn new() -> Self {
        SynGroups::default()
    }

    /// One group per line, members whitespace-separated, multi-word members
    /// double-quoted. '#' starts a comment line.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut groups = SynGroups::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let members = TextSplitter::string_to_strings(line).ok_or_else(|| {
                Error::new(
                    ErrorKind::Parse,
                    format!("{}:{}: unbalanced quotes", path.display(), lineno + 1),
                )
            })?;
            groups.add_group(members);
        }
        Ok(groups)
    }

    pub fn add_group(&mut self, members: Vec<String>) {
        if members.len() < 2 {
            return;
        }
        let idx = self.groups.len();
        for m in &members {
            let m = m.to_lowercase();
            let words: Vec<String> = m.split_whitespace().map(|s| s.to_string()).collect();
            if words.len() > 1 {
                self.multiword.push((words, idx));
            }
            self.by_member.entry(m).or_insert(idx);
        }
        self.groups.push(members.into_iter().map(|m| m.to_lowercase()).collect());
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// All members of the group containing `term`, excluding `term` itself.
    pub fn expand(&self, term: &str) -> Vec<String> {
        match self.by_member.get(term) {
            Some(&idx) => self.groups[idx]
                .iter()
                .filter(|m| m.as_str() != term)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Canonical (first) member of the group containing the given word run,
    /// if some multi-word member matches it exactly.
    pub fn canonical_for_run(&self, run: &[String]) -> Option<&str> {
        for (words, idx) in &self.multiword {
            if words.as_slice() == run {
                return self.groups[*idx].first().map(|s| s.as_str());
            }
        }
        None
    }

    /// Longest multi-word member length, bounding the index-time window.
    pub fn max_multiword_len(&self) -> usize {
        self.multiword.iter().map(|(w, _)| w.len()).max().unwrap_or(0)
    }

    /// Number of extra positions a multi-word expansion of any member of
    /// `term`'s group can introduce, used to widen phrase slack.
    pub fn extra_positions(&self, term: &str) -> u32 {
        match self.by_member.get(term) {
            Some(&idx) => self.groups[idx]
                .iter()
                .map(|m| m.split_whitespace().count().saturating_sub(1) as u32)
                .max()
                .unwrap_or(0),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups() -> SynGroups {
        let mut sg = SynGroups::new();
        sg.add_group(vec!["usa".into(), "united states".into(), "america".into()]);
        sg.add_group(vec!["car".into(), "automobile".into()]);
        sg
    }

    #[test]
    fn test_expand() {
        let sg = groups();
        let mut e = sg.expand("car");
        e.sort();
        assert_eq!(e, vec!["automobile"]);
        let e = sg.expand("usa");
        assert!(e.contains(&"united states".to_string()));
        assert!(sg.expand("unknown").is_empty());
    }

    #[test]
    fn test_multiword_run() {
        let sg = groups();
        let run = vec!["united".to_string(), "states".to_string()];
        assert_eq!(sg.canonical_for_run(&run), Some("usa"));
        assert_eq!(sg.max_multiword_len(), 2);
        assert_eq!(sg.extra_positions("usa"), 1);
    }
}
