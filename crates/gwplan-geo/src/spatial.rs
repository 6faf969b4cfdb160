//! Static R-tree over device coordinates.
//!
//! The tree is bulk loaded once with Sort-Tile-Recursive packing and never
//! mutated afterwards; nodes live in a flat arena and reference each other by
//! index. Queries return indices into the slice the index was built from.

use crate::geo::{search_windows, BoundingBox, GeoPoint};

const MAX_ENTRIES: usize = 9;

#[derive(Debug, Clone)]
enum Node {
    Leaf { bbox: BoundingBox, entries: Vec<usize> },
    Internal { bbox: BoundingBox, children: Vec<usize> },
}

impl Node {
    fn bbox(&self) -> &BoundingBox {
        match self {
            Node::Leaf { bbox, .. } | Node::Internal { bbox, .. } => bbox,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpatialIndex {
    points: Vec<GeoPoint>,
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl SpatialIndex {
    pub fn bulk_load(points: &[GeoPoint]) -> Self {
        let mut index = Self { points: points.to_vec(), nodes: Vec::new(), root: None };
        if points.is_empty() {
            return index;
        }

        let items: Vec<usize> = (0..points.len()).collect();
        let mut level: Vec<usize> = str_pack(&items, |i| points[i])
            .into_iter()
            .map(|entries| {
                let bbox = entries.iter().fold(BoundingBox::empty(), |mut b, &i| {
                    b.extend(&BoundingBox::from_point(points[i]));
                    b
                });
                index.push(Node::Leaf { bbox, entries })
            })
            .collect();

        while level.len() > 1 {
            let centers: Vec<GeoPoint> =
                level.iter().map(|&n| center_of(index.nodes[n].bbox())).collect();
            let slots: Vec<usize> = (0..level.len()).collect();
            let groups = str_pack(&slots, |s| centers[s]);
            level = groups
                .into_iter()
                .map(|group| {
                    let children: Vec<usize> = group.iter().map(|&s| level[s]).collect();
                    let bbox = children.iter().fold(BoundingBox::empty(), |mut b, &c| {
                        b.extend(index.nodes[c].bbox());
                        b
                    });
                    index.push(Node::Internal { bbox, children })
                })
                .collect();
        }

        index.root = level.first().copied();
        index
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, i: usize) -> GeoPoint {
        self.points[i]
    }

    /// Indices of every point inside `window` (inclusive bounds).
    pub fn query(&self, window: &BoundingBox) -> Vec<usize> {
        let mut out = Vec::new();
        let Some(root) = self.root else {
            return out;
        };
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            match &self.nodes[n] {
                Node::Leaf { bbox, entries } => {
                    if !bbox.intersects(window) {
                        continue;
                    }
                    let points = &self.points;
                    out.extend(entries.iter().copied().filter(|&i| window.contains(&points[i])));
                }
                Node::Internal { bbox, children } => {
                    if bbox.intersects(window) {
                        stack.extend(children.iter().copied());
                    }
                }
            }
        }
        out
    }

    /// Indices of every point within `radius_m` meters of `center`, by exact distance.
    ///
    /// Circles crossing the antimeridian are searched on both sides of it.
    pub fn within(&self, center: GeoPoint, radius_m: f64) -> Vec<usize> {
        self.candidates(center, radius_m)
            .into_iter()
            .filter(|&i| center.distance_m(&self.points[i]) <= radius_m)
            .collect()
    }

    // Deduplicated hits over every window of the circle.
    fn candidates(&self, center: GeoPoint, radius_m: f64) -> Vec<usize> {
        let mut out: Vec<usize> =
            search_windows(center, radius_m).iter().flat_map(|w| self.query(w)).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Distance to the closest other point, `None` when the index holds a single point.
    ///
    /// The search window doubles until it yields a candidate whose distance is
    /// within the window radius, which makes the answer exact.
    pub fn nearest_other_distance(&self, i: usize, start_radius_m: f64) -> Option<f64> {
        if self.points.len() < 2 {
            return None;
        }
        let center = self.points[i];
        let mut radius = start_radius_m.max(1.0);
        loop {
            let windows = search_windows(center, radius);
            let best = windows
                .iter()
                .flat_map(|w| self.query(w))
                .filter(|&j| j != i)
                .map(|j| center.distance_m(&self.points[j]))
                .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d))));
            match best {
                Some(d) if d <= radius => return Some(d),
                _ if windows[0].is_global() => return best,
                _ => radius *= 2.0,
            }
        }
    }
}

fn center_of(b: &BoundingBox) -> GeoPoint {
    GeoPoint::new((b.min_lat + b.max_lat) / 2.0, (b.min_lng + b.max_lng) / 2.0)
}

// Sort-Tile-Recursive: slice by longitude into vertical slabs, then each slab by latitude.
fn str_pack<F>(items: &[usize], pos: F) -> Vec<Vec<usize>>
where
    F: Fn(usize) -> GeoPoint,
{
    let leaf_count = items.len().div_ceil(MAX_ENTRIES);
    let slabs = (leaf_count as f64).sqrt().ceil().max(1.0) as usize;
    let slab_size = MAX_ENTRIES * slabs;

    let mut by_lng = items.to_vec();
    by_lng.sort_by(|&a, &b| pos(a).lng.total_cmp(&pos(b).lng));

    let mut groups = Vec::with_capacity(leaf_count);
    for slab in by_lng.chunks(slab_size) {
        let mut slab = slab.to_vec();
        slab.sort_by(|&a, &b| pos(a).lat.total_cmp(&pos(b).lat));
        groups.extend(slab.chunks(MAX_ENTRIES).map(|c| c.to_vec()));
    }
    groups
}
