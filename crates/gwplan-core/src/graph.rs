//! Device connectivity within radio range.

use gwplan_geo::{GeoPoint, SpatialIndex};
use tracing::debug;

/// Undirected adjacency over points addressed by index.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityGraph {
    adjacency: Vec<Vec<usize>>,
}

impl ConnectivityGraph {
    /// Links every pair of points at most `hop_distance_m` apart.
    ///
    /// Candidates come from the spatial index windows, including the wrapped
    /// side of the antimeridian, and are confirmed by exact distance. Each
    /// accepted pair is inserted in both directions, so the relation is
    /// symmetric no matter which side discovered it.
    pub fn build(points: &[GeoPoint], hop_distance_m: f64) -> Self {
        let index = SpatialIndex::bulk_load(points);
        let mut adjacency = vec![Vec::new(); points.len()];
        for (i, p) in points.iter().enumerate() {
            for j in index.within(*p, hop_distance_m) {
                if j > i {
                    adjacency[i].push(j);
                    adjacency[j].push(i);
                }
            }
        }
        for list in &mut adjacency {
            list.sort_unstable();
        }
        let edges: usize = adjacency.iter().map(Vec::len).sum::<usize>() / 2;
        debug!(nodes = points.len(), edges, hop_distance_m, "connectivity graph built");
        Self { adjacency }
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn neighbors(&self, i: usize) -> &[usize] {
        &self.adjacency[i]
    }

    pub fn degree(&self, i: usize) -> usize {
        self.adjacency[i].len()
    }
}
