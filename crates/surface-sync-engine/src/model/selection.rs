use serde::{Deserialize, Serialize};

/// A direction-preserving pair of linear offsets.
///
/// `from` is the anchor and `to` the focus; `from > to` is a backwards range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub from: usize,
    pub to: usize,
}

impl Range {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    pub fn collapsed(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn start(&self) -> usize {
        self.from.min(self.to)
    }

    pub fn end(&self) -> usize {
        self.from.max(self.to)
    }

    pub fn len(&self) -> usize {
        self.end() - self.start()
    }

    pub fn is_collapsed(&self) -> bool {
        self.from == self.to
    }

    pub fn is_backwards(&self) -> bool {
        self.from > self.to
    }

    pub fn flip(&self) -> Self {
        Self::new(self.to, self.from)
    }

    /// Same interval regardless of direction
    pub fn equals_selection(&self, other: &Range) -> bool {
        self.start() == other.start() && self.end() == other.end()
    }

    pub fn contains_offset(&self, offset: usize) -> bool {
        self.start() <= offset && offset <= self.end()
    }

    pub fn collapse_to_start(&self) -> Self {
        Self::collapsed(self.start())
    }

    pub fn collapse_to_end(&self) -> Self {
        Self::collapsed(self.end())
    }
}

/// The model's selection: a linear range or nothing at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Selection {
    Linear(Range),
    #[default]
    Null,
}

impl Selection {
    pub fn collapsed(offset: usize) -> Self {
        Self::Linear(Range::collapsed(offset))
    }

    pub fn range(&self) -> Option<Range> {
        match self {
            Self::Linear(range) => Some(*range),
            Self::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_collapsed(&self) -> bool {
        self.range().is_some_and(|r| r.is_collapsed())
    }
}

impl From<Range> for Selection {
    fn from(range: Range) -> Self {
        Self::Linear(range)
    }
}

impl From<Option<Range>> for Selection {
    fn from(range: Option<Range>) -> Self {
        range.map_or(Self::Null, Self::Linear)
    }
}
