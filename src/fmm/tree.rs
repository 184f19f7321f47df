//! Uniform-depth sparse octree over element centroids.
//!
//! Only occupied boxes are stored. A box at level `l` is addressed by its
//! integer coordinates in the `2^l × 2^l × 2^l` grid covering the root cube,
//! packed into a `u64` key (21 bits per axis).

use crate::error::BemError;
use crate::surface::Point3;
use log::debug;
use std::collections::HashMap;

const AXIS_BITS: u32 = 21;

pub type NodeKey = u64;

pub fn pack_key(c: [u32; 3]) -> NodeKey {
    ((c[0] as u64) << (2 * AXIS_BITS)) | ((c[1] as u64) << AXIS_BITS) | c[2] as u64
}

pub fn unpack_key(key: NodeKey) -> [u32; 3] {
    let mask = (1u64 << AXIS_BITS) - 1;
    [(key >> (2 * AXIS_BITS)) as u32, ((key >> AXIS_BITS) & mask) as u32, (key & mask) as u32]
}

/// Chebyshev distance between two boxes of the same level, in boxes.
pub fn box_distance(a: [u32; 3], b: [u32; 3]) -> u32 {
    (0..3).map(|i| a[i].abs_diff(b[i])).max().unwrap_or(0)
}

#[derive(Clone, Debug)]
pub struct Node {
    pub key: NodeKey,
    pub center: Point3,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Elements whose centroid falls in this box (leaf level only).
    pub elements: Vec<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct Level {
    pub nodes: Vec<Node>,
    index: HashMap<NodeKey, usize>,
}

impl Level {
    pub fn find(&self, key: NodeKey) -> Option<usize> {
        self.index.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Octree {
    origin: Point3,
    width: f64,
    levels: Vec<Level>,
    neighbor_order: u32,
}

impl Octree {
    /// Builds the tree for `points`. The depth is the smallest at which no
    /// leaf holds more than `leaf_capacity` points, capped at `max_depth`.
    pub fn build(points: &[Point3], leaf_capacity: usize, max_depth: usize, neighbor_order: usize) -> Result<Self, BemError> {
        if points.is_empty() {
            return Err(BemError::InvalidConfig("multipole tree over zero elements".into()));
        }
        if points.iter().any(|p| !p.iter().all(|v| v.is_finite())) {
            return Err(BemError::DegenerateGeometry("non-finite element centroid".into()));
        }
        let mut lo = points[0];
        let mut hi = points[0];
        for p in points {
            lo = lo.inf(p);
            hi = hi.sup(p);
        }
        let extent = (hi - lo).max();
        // pad so points on the upper faces stay inside the last box
        let width = if extent > 0.0 { extent * (1.0 + 1e-9) } else { 1.0 };
        let center = (lo + hi) * 0.5;
        let origin = center - Point3::repeat(0.5 * width);
        let max_depth = max_depth.min(AXIS_BITS as usize - 1);

        let mut tree = Octree { origin, width, levels: Vec::new(), neighbor_order: neighbor_order as u32 };
        let mut depth = 0;
        loop {
            let occupancy = tree.max_occupancy(points, depth);
            if occupancy <= leaf_capacity || depth >= max_depth {
                break;
            }
            depth += 1;
        }
        tree.populate(points, depth);
        debug!(
            "octree: depth {depth}, {} leaves, {} points",
            tree.levels[depth].len(),
            points.len()
        );
        Ok(tree)
    }

    fn coords(&self, p: &Point3, level: usize) -> [u32; 3] {
        let boxes = 1u32 << level;
        let mut c = [0u32; 3];
        for (i, ci) in c.iter_mut().enumerate() {
            let t = ((p[i] - self.origin[i]) / self.width * boxes as f64).floor();
            *ci = (t.max(0.0) as u32).min(boxes - 1);
        }
        c
    }

    fn max_occupancy(&self, points: &[Point3], level: usize) -> usize {
        let mut counts: HashMap<NodeKey, usize> = HashMap::new();
        for p in points {
            *counts.entry(pack_key(self.coords(p, level))).or_default() += 1;
        }
        counts.into_values().max().unwrap_or(0)
    }

    fn populate(&mut self, points: &[Point3], depth: usize) {
        self.levels = vec![Level::default(); depth + 1];
        for (e, p) in points.iter().enumerate() {
            let leaf = self.coords(p, depth);
            let mut child: Option<usize> = None;
            // walk from the leaf to the root, creating missing boxes
            for level in (0..=depth).rev() {
                let shift = (depth - level) as u32;
                let c = [leaf[0] >> shift, leaf[1] >> shift, leaf[2] >> shift];
                let key = pack_key(c);
                let center = self.box_center(c, level);
                let lvl = &mut self.levels[level];
                let (idx, existed) = match lvl.index.get(&key) {
                    Some(&idx) => (idx, true),
                    None => {
                        lvl.nodes.push(Node { key, center, parent: None, children: Vec::new(), elements: Vec::new() });
                        let idx = lvl.nodes.len() - 1;
                        lvl.index.insert(key, idx);
                        (idx, false)
                    }
                };
                if level == depth {
                    lvl.nodes[idx].elements.push(e);
                }
                if let Some(ch) = child {
                    if !lvl.nodes[idx].children.contains(&ch) {
                        lvl.nodes[idx].children.push(ch);
                    }
                    self.levels[level + 1].nodes[ch].parent = Some(idx);
                }
                if existed && level < depth {
                    break;
                }
                child = Some(idx);
            }
        }
    }

    fn box_center(&self, c: [u32; 3], level: usize) -> Point3 {
        let w = self.box_width(level);
        self.origin + Point3::new((c[0] as f64 + 0.5) * w, (c[1] as f64 + 0.5) * w, (c[2] as f64 + 0.5) * w)
    }

    pub fn box_width(&self, level: usize) -> f64 {
        self.width / (1u64 << level) as f64
    }

    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn level(&self, l: usize) -> &Level {
        &self.levels[l]
    }

    pub fn leaves(&self) -> &[Node] {
        &self.levels[self.depth()].nodes
    }

    /// Occupied boxes of `level` within the neighbour order of `node`,
    /// including `node` itself.
    pub fn neighbors(&self, level: usize, node: usize) -> Vec<usize> {
        let lvl = &self.levels[level];
        let c = unpack_key(lvl.nodes[node].key);
        let k = self.neighbor_order as i64;
        let limit = (1i64 << level) - 1;
        let mut out = Vec::new();
        for dx in -k..=k {
            for dy in -k..=k {
                for dz in -k..=k {
                    let n = [c[0] as i64 + dx, c[1] as i64 + dy, c[2] as i64 + dz];
                    if n.iter().any(|&v| v < 0 || v > limit) {
                        continue;
                    }
                    if let Some(idx) = lvl.find(pack_key([n[0] as u32, n[1] as u32, n[2] as u32])) {
                        out.push(idx);
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }

    /// Boxes of `level` whose expansions translate into `node`: children of
    /// the parent's neighbours that are not neighbours themselves.
    pub fn interaction_list(&self, level: usize, node: usize) -> Vec<usize> {
        let Some(parent) = self.levels[level].nodes[node].parent else {
            return Vec::new();
        };
        let c = unpack_key(self.levels[level].nodes[node].key);
        let mut out = Vec::new();
        for pn in self.neighbors(level - 1, parent) {
            for &ch in &self.levels[level - 1].nodes[pn].children {
                if box_distance(c, unpack_key(self.levels[level].nodes[ch].key)) > self.neighbor_order {
                    out.push(ch);
                }
            }
        }
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn cloud(n: usize) -> Vec<Point3> {
        let mut rng = StdRng::seed_from_u64(7);
        (0..n).map(|_| Point3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))).collect()
    }

    #[test]
    fn keys_pack_and_unpack() {
        let c = [3, (1 << 20) + 5, 0];
        assert_eq!(unpack_key(pack_key(c)), c);
    }

    #[test]
    fn every_point_in_exactly_one_leaf() {
        let pts = cloud(500);
        let tree = Octree::build(&pts, 8, 6, 1).unwrap();
        let mut seen: Vec<usize> = tree.leaves().iter().flat_map(|n| n.elements.iter().copied()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..500).collect::<Vec<_>>());
        assert!(tree.leaves().iter().all(|n| n.elements.len() <= 8) || tree.depth() == 6);
    }

    #[test]
    fn near_and_far_partition_all_pairs() {
        let pts = cloud(300);
        let tree = Octree::build(&pts, 4, 5, 1).unwrap();
        let depth = tree.depth();
        // leaf index of every point
        let mut leaf_of = vec![0; pts.len()];
        for (li, node) in tree.leaves().iter().enumerate() {
            for &e in &node.elements {
                leaf_of[e] = li;
            }
        }
        // ancestors of every leaf, per level
        let ancestor = |mut idx: usize, level: usize| {
            for l in (level + 1..=depth).rev() {
                idx = tree.level(l).nodes[idx].parent.unwrap();
            }
            idx
        };
        let far: Vec<Vec<HashSet<usize>>> = (0..=depth)
            .map(|l| (0..tree.level(l).len()).map(|n| tree.interaction_list(l, n).into_iter().collect()).collect())
            .collect();
        let near: Vec<HashSet<usize>> = (0..tree.leaves().len()).map(|n| tree.neighbors(depth, n).into_iter().collect()).collect();
        for t in 0..pts.len() {
            for s in 0..pts.len() {
                let (lt, ls) = (leaf_of[t], leaf_of[s]);
                let direct = near[lt].contains(&ls) as usize;
                let translated = (1..=depth).filter(|&l| far[l][ancestor(lt, l)].contains(&ancestor(ls, l))).count();
                assert_eq!(direct + translated, 1, "pair ({t}, {s}) covered {} times", direct + translated);
            }
        }
    }
}
