use std::fmt;

/// Where a factory call places the context or object it creates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReservedIndex {
    /// Allocate dynamically. Refused while the calling thread is in
    /// real-time mode.
    #[default]
    Heap,
    /// Place into a previously reserved slot.
    Slot(usize),
}

/// Placement of a context.
pub type ReservedContextIndex = ReservedIndex;

/// Placement of an object.
pub type ReservedObjectIndex = ReservedIndex;

impl ReservedIndex {
    /// Returns `true` for the heap sentinel.
    pub fn is_heap(&self) -> bool {
        matches!(self, Self::Heap)
    }

    /// The slot number, if any.
    pub fn slot(&self) -> Option<usize> {
        match self {
            Self::Heap => None,
            Self::Slot(i) => Some(*i),
        }
    }
}

impl fmt::Display for ReservedIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heap => write!(f, "heap"),
            Self::Slot(i) => write!(f, "slot[{i}]"),
        }
    }
}

impl From<usize> for ReservedIndex {
    fn from(index: usize) -> Self {
        Self::Slot(index)
    }
}
