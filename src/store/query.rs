/// Posting-store query tree. The query translator compiles `SearchData`
/// into this; the runner evaluates it against the postings.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreQuery {
    MatchAll,
    /// Matches nothing, the identity for OR composition.
    MatchNothing,
    Term(String),
    And(Vec<StoreQuery>),
    Or(Vec<StoreQuery>),
    /// Left matches, right must not.
    AndNot(Box<StoreQuery>, Box<StoreQuery>),
    /// Left matches; right only contributes weight.
    AndMaybe(Box<StoreQuery>, Box<StoreQuery>),
    /// Left matches and is scored; right restricts without weighting.
    Filter(Box<StoreQuery>, Box<StoreQuery>),
    /// Terms in order within a window of `terms.len() + slack` positions.
    Phrase { terms: Vec<String>, slack: u32 },
    /// Terms in any order within a window of `terms.len() + slack` positions.
    Near { terms: Vec<String>, slack: u32 },
    /// Lexicographic comparison against a document value slot.
    ValueRange { slot: u32, lo: Option<String>, hi: Option<String> },
    ScaleWeight(f32, Box<StoreQuery>),
}

impl StoreQuery {
    pub fn and(clauses: Vec<StoreQuery>) -> StoreQuery {
        match clauses.len() {
            0 => StoreQuery::MatchAll,
            1 => clauses.into_iter().next().unwrap(),
            _ => StoreQuery::And(clauses),
        }
    }

    pub fn or(clauses: Vec<StoreQuery>) -> StoreQuery {
        match clauses.len() {
            0 => StoreQuery::MatchNothing,
            1 => clauses.into_iter().next().unwrap(),
            _ => StoreQuery::Or(clauses),
        }
    }

    /// Number of term leaves, for the clause cap.
    pub fn leaf_count(&self) -> usize {
        match self {
            StoreQuery::MatchAll | StoreQuery::MatchNothing => 0,
            StoreQuery::Term(_) | StoreQuery::ValueRange { .. } => 1,
            StoreQuery::Phrase { terms, .. } | StoreQuery::Near { terms, .. } => terms.len(),
            StoreQuery::And(cs) | StoreQuery::Or(cs) => cs.iter().map(|c| c.leaf_count()).sum(),
            StoreQuery::AndNot(a, b) | StoreQuery::AndMaybe(a, b) | StoreQuery::Filter(a, b) => {
                a.leaf_count() + b.leaf_count()
            }
            StoreQuery::ScaleWeight(_, q) => q.leaf_count(),
        }
    }

    /// Human-readable description, kept on the search object for the UI.
    pub fn describe(&self) -> String {
        match self {
            StoreQuery::MatchAll => "<all>".to_string(),
            StoreQuery::MatchNothing => "<none>".to_string(),
            StoreQuery::Term(t) => t.clone(),
            StoreQuery::And(cs) => {
                format!("({})", cs.iter().map(|c| c.describe()).collect::<Vec<_>>().join(" AND "))
            }
            StoreQuery::Or(cs) => {
                format!("({})", cs.iter().map(|c| c.describe()).collect::<Vec<_>>().join(" OR "))
            }
            StoreQuery::AndNot(a, b) => format!("({} ANDNOT {})", a.describe(), b.describe()),
            StoreQuery::AndMaybe(a, b) => format!("({} ANDMAYBE {})", a.describe(), b.describe()),
            StoreQuery::Filter(a, b) => format!("({} FILTER {})", a.describe(), b.describe()),
            StoreQuery::Phrase { terms, slack } => {
                format!("PHRASE{}({})", slack, terms.join(" "))
            }
            StoreQuery::Near { terms, slack } => format!("NEAR{}({})", slack, terms.join(" ")),
            StoreQuery::ValueRange { slot, lo, hi } => format!(
                "VALUE{}[{}..{}]",
                slot,
                lo.as_deref().unwrap_or(""),
                hi.as_deref().unwrap_or("")
            ),
            StoreQuery::ScaleWeight(f, q) => format!("{}*{}", f, q.describe()),
        }
    }
}

/// Result ordering for the query runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Relevance,
    /// Lexicographic on a value slot.
    Value { slot: u32, ascending: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composition_helpers() {
        assert_eq!(StoreQuery::and(vec![]), StoreQuery::MatchAll);
        assert_eq!(StoreQuery::or(vec![]), StoreQuery::MatchNothing);
        let t = StoreQuery::Term("a".to_string());
        assert_eq!(StoreQuery::and(vec![t.clone()]), t);
    }

    #[test]
    fn test_leaf_count() {
        let q = StoreQuery::And(vec![
            StoreQuery::Term("a".into()),
            StoreQuery::Phrase { terms: vec!["b".into(), "c".into()], slack: 0 },
        ]);
        assert_eq!(q.leaf_count(), 3);
    }
}
