use crate::commitlog::{Entry, Index, Log};
use std::convert::TryFrom;
use std::io;
use std::marker::PhantomData;

// Durability is delegated to whatever `Log` the node is wired with. This one keeps encoded
// entries in a Vec, which is enough for a demo cluster and for tests.
pub struct InMemoryLog<E: Entry> {
    // Store encoded bytes rather than `E` so the encode/decode path is exercised like it would
    // be against disk.
    entries: Vec<Vec<u8>>,
    _pd: PhantomData<fn() -> E>,
}

impl<E: Entry> InMemoryLog<E> {
    pub fn new() -> Self {
        InMemoryLog {
            entries: vec![],
            _pd: PhantomData,
        }
    }

    fn vec_index(index: Index) -> usize {
        (index.as_u64() - 1) as usize
    }
}

impl<E: Entry> Log<E> for InMemoryLog<E> {
    fn append(&mut self, entry: E) -> Result<Index, io::Error> {
        self.entries.push(entry.into());

        Ok(Index::new(self.entries.len() as u64))
    }

    fn read(&self, index: Index) -> Result<Option<E>, io::Error> {
        match self.entries.get(Self::vec_index(index)) {
            Some(bytes) => E::try_from(bytes.clone()).map(Some),
            None => Ok(None),
        }
    }

    fn truncate(&mut self, index: Index) -> Result<(), io::Error> {
        self.entries.truncate(Self::vec_index(index));
        Ok(())
    }

    fn next_index(&self) -> Index {
        Index::new(self.entries.len() as u64 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Blob(Vec<u8>);

    impl Entry for Blob {}

    impl From<Blob> for Vec<u8> {
        fn from(blob: Blob) -> Self {
            blob.0
        }
    }

    impl TryFrom<Vec<u8>> for Blob {
        type Error = io::Error;

        fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
            if bytes.is_empty() {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "empty blob"));
            }
            Ok(Blob(bytes))
        }
    }

    #[test]
    fn indexes_start_at_one_and_are_gap_free() {
        let mut log = InMemoryLog::<Blob>::new();
        assert_eq!(log.next_index(), Index::start_index());
        assert_eq!(log.last_index(), None);

        for i in 1..=5u8 {
            let index = log.append(Blob(vec![i])).unwrap();
            assert_eq!(index, Index::new(i as u64));
        }

        assert_eq!(log.last_index(), Some(Index::new(5)));
        assert_eq!(log.read(Index::new(3)).unwrap(), Some(Blob(vec![3])));
        assert_eq!(log.read(Index::new(6)).unwrap(), None);
    }

    #[test]
    fn truncate_drops_index_and_everything_after() {
        let mut log = InMemoryLog::<Blob>::new();
        for i in 1..=5u8 {
            log.append(Blob(vec![i])).unwrap();
        }

        log.truncate(Index::new(3)).unwrap();

        assert_eq!(log.last_index(), Some(Index::new(2)));
        assert_eq!(log.read(Index::new(3)).unwrap(), None);
        assert_eq!(log.append(Blob(vec![9])).unwrap(), Index::new(3));
    }

    #[test]
    fn decode_failure_surfaces_as_io_error() {
        let mut log = InMemoryLog::<Blob>::new();
        log.entries.push(vec![]);

        let err = log.read(Index::start_index()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn index_checked_minus_never_reaches_zero() {
        assert_eq!(Index::new(3).checked_minus(2), Some(Index::start_index()));
        assert_eq!(Index::new(3).checked_minus(3), None);
        assert_eq!(Index::new(3).checked_minus(7), None);
    }
}
