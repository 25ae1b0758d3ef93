use bitflags::bitflags;

bitflags! {
    /// Per-clause behavior switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u32 {
        const NOSTEMMING = 0x1;
        const ANCHORSTART = 0x2;
        const ANCHOREND = 0x4;
        const CASESENS = 0x8;
        const DIACSENS = 0x10;
        /// Don't contribute terms to highlight data.
        const NOTERMS = 0x20;
        /// Don't perform synonym expansion.
        const NOSYNS = 0x40;
        const PATHELT = 0x80;
        /// Pure filter: no relevance contribution.
        const FILTER = 0x100;
        /// Expand terms inside phrases too.
        const EXPANDPHRASE = 0x200;
        const NOWILDEXP = 0x400;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    And,
    Or,
    Filename,
    Phrase,
    Near,
    Path,
    Range,
    Sub,
}

/// Comparison for simple clauses that are really field predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Relation {
    #[default]
    Contains,
    Equals,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchClause {
    pub kind: ClauseKind,
    pub field: String,
    pub text: String,
    /// Range upper bound.
    pub text2: String,
    pub slack: u32,
    pub exclude: bool,
    pub modifiers: Modifiers,
    /// Relevance multiplier.
    pub weight: f32,
    pub rel: Relation,
    /// Sub-search for `ClauseKind::Sub`.
    pub sub: Option<Box<SearchData>>,
}

impl SearchClause {
    pub fn simple(kind: ClauseKind, text: impl Into<String>, field: impl Into<String>) -> Self {
        SearchClause {
            kind,
            field: field.into(),
            text: text.into(),
            text2: String::new(),
            slack: 0,
            exclude: false,
            modifiers: Modifiers::default(),
            weight: 1.0,
            rel: Relation::Contains,
            sub: None,
        }
    }

    pub fn phrase(text: impl Into<String>, slack: u32) -> Self {
        let mut c = SearchClause::simple(ClauseKind::Phrase, text, "");
        c.slack = slack;
        c
    }

    pub fn near(text: impl Into<String>, slack: u32) -> Self {
        let mut c = SearchClause::simple(ClauseKind::Near, text, "");
        c.slack = slack;
        c
    }

    pub fn filename(text: impl Into<String>) -> Self {
        let mut c = SearchClause::simple(ClauseKind::Filename, text, "");
        c.modifiers |= Modifiers::FILTER;
        c
    }

    pub fn path(text: impl Into<String>, exclude: bool) -> Self {
        let mut c = SearchClause::simple(ClauseKind::Path, text, "dir");
        c.modifiers |= Modifiers::FILTER | Modifiers::PATHELT;
        c.exclude = exclude;
        c
    }

    pub fn range(
        field: impl Into<String>,
        lo: impl Into<String>,
        hi: impl Into<String>,
    ) -> Self {
        let mut c = SearchClause::simple(ClauseKind::Range, lo, field);
        c.text2 = hi.into();
        c
    }

    pub fn sub(sub: SearchData) -> Self {
        let mut c = SearchClause::simple(ClauseKind::Sub, "", "");
        c.sub = Some(Box::new(sub));
        c
    }

    pub fn with_modifiers(mut self, mods: Modifiers) -> Self {
        self.modifiers |= mods;
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn excluded(mut self) -> Self {
        self.exclude = true;
        self
    }
}

/// Date interval bound, zero meaning unset, matching the historical
/// serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateBound {
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

impl DateBound {
    pub fn ymd(year: i32, month: u32, day: u32) -> Self {
        DateBound { day, month, year }
    }

    pub fn is_set(&self) -> bool {
        self.year != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub min: DateBound,
    pub max: DateBound,
}

/// Sub-document restriction for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubdocSpec {
    #[default]
    Any,
    TopOnly,
    SubOnly,
}

/// Top-level combination, AND or OR only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
    And,
    Or,
}

/// The structured query: a composite of clauses plus the auxiliary result
/// filters (dates, size, mime types, sub-document spec).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchData {
    pub kind: CompositeKind,
    pub clauses: Vec<SearchClause>,
    pub dates: Option<DateRange>,
    /// Birth-time range, kept separate from the modification dates.
    pub birth_dates: Option<DateRange>,
    /// Bytes; negative means unset.
    pub min_size: i64,
    pub max_size: i64,
    pub filetypes: Vec<String>,
    pub nfiletypes: Vec<String>,
    pub subspec: SubdocSpec,
    /// Extra index directories to search along the main one.
    pub extindexes: Vec<String>,
    /// Soft expansion cap from the UI; 0 means none.
    pub soft_max_expand: usize,
    pub auto_phrase: bool,
}

impl SearchData {
    pub fn new(kind: CompositeKind) -> Self {
        SearchData {
            kind,
            clauses: Vec::new(),
            dates: None,
            birth_dates: None,
            min_size: -1,
            max_size: -1,
            filetypes: Vec::new(),
            nfiletypes: Vec::new(),
            subspec: SubdocSpec::Any,
            extindexes: Vec::new(),
            soft_max_expand: 0,
            auto_phrase: false,
        }
    }

    pub fn with_clause(mut self, clause: SearchClause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn add_clause(&mut self, clause: SearchClause) {
        self.clauses.push(clause);
    }

    pub fn set_date_span(&mut self, range: DateRange) {
        self.dates = Some(range);
    }

    pub fn add_filetype(&mut self, ft: impl Into<String>) {
        self.filetypes.push(ft.into());
    }

    pub fn rem_filetype(&mut self, ft: impl Into<String>) {
        self.nfiletypes.push(ft.into());
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
            && self.dates.is_none()
            && self.birth_dates.is_none()
            && self.min_size < 0
            && self.max_size < 0
            && self.filetypes.is_empty()
            && self.nfiletypes.is_empty()
    }
}
