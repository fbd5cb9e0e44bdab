//! Batch nearest-neighbour pass
//!
//! Builds the dense pairwise matrix over every item that has an embedding,
//! so cost grows as O(n²) in both time and memory. That is fine for
//! catalogs of hundreds to a few thousand items; beyond that an ANN index
//! would be needed.

use std::cmp::Ordering;
use std::collections::HashSet;

/// One item taking part in the pass. `position` is the item's index in the
/// catalog so results can be merged back.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedItem<'a> {
    pub position: usize,
    pub id: &'a str,
    pub vector: &'a [f32],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Neighbors {
    pub position: usize,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SimilarityRanker {
    top_n: usize,
}

impl SimilarityRanker {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    /// Neighbour lists for every item, or `None` when fewer than two items
    /// have embeddings (nothing to compare).
    ///
    /// Duplicate records share an id; a neighbour list never contains the
    /// item's own id and never repeats one.
    pub fn rank(&self, items: &[EmbeddedItem<'_>]) -> Option<Vec<Neighbors>> {
        if items.len() < 2 {
            return None;
        }

        let vectors: Vec<&[f32]> = items.iter().map(|item| item.vector).collect();
        let matrix = similarity_matrix(&vectors);

        let neighbors = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let mut others: Vec<usize> = (0..items.len())
                    .filter(|&j| items[j].id != item.id)
                    .collect();
                others.sort_by(|&a, &b| by_score_desc(matrix[i][a], matrix[i][b]));

                let mut seen = HashSet::new();
                Neighbors {
                    position: item.position,
                    ids: others
                        .into_iter()
                        .map(|j| items[j].id)
                        .filter(|id| seen.insert(*id))
                        .take(self.top_n)
                        .map(str::to_string)
                        .collect(),
                }
            })
            .collect();
        Some(neighbors)
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Descending score order for stable sorts. NaN ranks last and signed
/// zeros compare equal, so ties keep their input order.
pub(crate) fn by_score_desc(a: f32, b: f32) -> Ordering {
    let key = |score: f32| {
        if score.is_nan() {
            f32::NEG_INFINITY
        } else {
            score + 0.0
        }
    };
    key(b).total_cmp(&key(a))
}

/// Dense symmetric matrix of pairwise dot products
pub fn similarity_matrix(vectors: &[&[f32]]) -> Vec<Vec<f32>> {
    let n = vectors.len();
    let mut matrix = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        for j in i..n {
            let score = dot(vectors[i], vectors[j]);
            matrix[i][j] = score;
            matrix[j][i] = score;
        }
    }
    matrix
}
