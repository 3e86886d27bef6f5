use crate::media::MediaId;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Bounded batch of media items handled by one deferred job.
/// `index` is only used for scheduling stagger and logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub ids: Vec<MediaId>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Payload handed to the scheduler for one chunk job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub run_id: String,
    pub index: usize,
    pub chunk: Vec<MediaId>,
}

/// Splits `ids` into consecutive chunks of at most `size` items.
pub fn split_into_chunks(ids: &[MediaId], size: usize) -> Vec<Chunk> {
    let size = size.max(1);
    ids.chunks(size)
        .enumerate()
        .map(|(index, ids)| Chunk {
            index,
            ids: ids.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: u64) -> Vec<MediaId> {
        (1..=n).map(MediaId).collect()
    }

    #[test]
    fn splits_250_into_three_chunks() {
        let chunks = split_into_chunks(&ids(250), DEFAULT_CHUNK_SIZE);
        let sizes: Vec<_> = chunks.iter().map(Chunk::len).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(chunks[2].index, 2);
        assert_eq!(chunks[2].ids.first(), Some(&MediaId(201)));
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split_into_chunks(&[], DEFAULT_CHUNK_SIZE).is_empty());
    }

    #[test]
    fn zero_size_is_treated_as_one() {
        assert_eq!(split_into_chunks(&ids(3), 0).len(), 3);
    }
}
