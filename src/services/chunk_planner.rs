//! Splits long trajectories into overlapping, size-bounded windows
//!
//! Consecutive windows share `overlap` points so a provider call on chunk
//! i+1 starts where chunk i ended, leaving no gap at the seam.

use crate::domain::types::Point;

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan {
    pub chunks: Vec<Vec<Point>>,
    /// Start index of each chunk in the source sequence
    pub starts: Vec<usize>,
    /// Points shared between consecutive chunks
    pub overlap: usize,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[Point]> {
        self.chunks.iter().map(Vec::as_slice)
    }

    /// Concatenate chunks, dropping the leading overlap of every chunk after the first
    pub fn reassemble(&self) -> Vec<Point> {
        let mut out = Vec::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            let skip = if i == 0 { 0 } else { self.overlap };
            out.extend_from_slice(&chunk[skip.min(chunk.len())..]);
        }
        out
    }
}

/// Plan windows of at most `max_size` points sharing `overlap` points.
///
/// Invalid parameters are clamped: `max_size` to at least 2 and `overlap` to
/// at most `max_size - 1`, so planning always makes progress. An empty input
/// yields one empty chunk.
pub fn plan_chunks(coords: &[Point], max_size: usize, overlap: usize) -> ChunkPlan {
    let max_size = max_size.max(2);
    let overlap = overlap.min(max_size - 1);

    if coords.len() <= max_size {
        return ChunkPlan { chunks: vec![coords.to_vec()], starts: vec![0], overlap };
    }

    let mut chunks = Vec::new();
    let mut starts = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + max_size).min(coords.len());
        chunks.push(coords[start..end].to_vec());
        starts.push(start);
        if end >= coords.len() {
            break;
        }
        start = end - overlap;
    }

    ChunkPlan { chunks, starts, overlap }
}
