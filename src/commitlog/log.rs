use std::convert::TryFrom;
use std::num::NonZeroU64;
use std::{fmt, io};

/// Index is the position of an entry in a `Log`. Indexes start at 1; there is never an entry at
/// index 0.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
pub struct Index(NonZeroU64);

impl Index {
    /// Panics on 0. Use `try_new()` for values that came off the wire.
    pub fn new(index: u64) -> Self {
        Self::try_new(index).expect("Log index must be non-zero")
    }

    pub fn try_new(index: u64) -> Option<Self> {
        NonZeroU64::new(index).map(Index)
    }

    pub fn start_index() -> Self {
        Self::new(1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }

    pub fn checked_minus(&self, delta: u64) -> Option<Index> {
        self.as_u64().checked_sub(delta).and_then(Index::try_new)
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Log is the durable, append-only storage collaborator underneath a node's operation log.
///
/// Implementations only need to be internally consistent. Serializing writers against readers is
/// the caller's job.
pub trait Log<E: Entry>: Send + Sync {
    /// Appends `entry` at `next_index()` and returns the index it landed on.
    fn append(&mut self, entry: E) -> Result<Index, io::Error>;

    /// Read the entry at `index`. `Ok(None)` if nothing has been written there.
    fn read(&self, index: Index) -> Result<Option<E>, io::Error>;

    /// Removes the entry at `index` and everything after it.
    fn truncate(&mut self, index: Index) -> Result<(), io::Error>;

    /// The index the next `append()` will use.
    fn next_index(&self) -> Index;

    fn last_index(&self) -> Option<Index> {
        self.next_index().checked_minus(1)
    }
}

/// Entry is anything that can be stored as an opaque byte blob. Decoding is fallible because
/// the bytes come from storage.
pub trait Entry: Clone + Into<Vec<u8>> + TryFrom<Vec<u8>, Error = io::Error> {}
