// kdtree.rs — balanced k-d tree over fixed-dimension points
//
// Nodes live in one arena and refer to their children by index. Each node
// names the point it splits on; indices returned by queries are positions
// in the point array the tree was built from, which the tree keeps as-is.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

type NodeId = u32;

#[derive(Clone, Copy, Debug)]
struct KdNode {
    point: u32,
    axis: u8,
    left: Option<NodeId>,
    right: Option<NodeId>,
}

/// A query hit: the index of the point and its Euclidean distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f32,
}

#[derive(Clone, Debug)]
pub struct KdTree<const D: usize> {
    points: Vec<[f32; D]>,
    nodes: Vec<KdNode>,
    root: Option<NodeId>,
}

#[inline]
fn dist2<const D: usize>(a: &[f32; D], b: &[f32; D]) -> f32 {
    let mut sum = 0.0;
    for i in 0..D {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

/// Order by `axis`, falling through the remaining axes cyclically on ties.
fn cmp_cyclic<const D: usize>(a: &[f32; D], b: &[f32; D], axis: usize) -> Ordering {
    for step in 0..D {
        let k = (axis + step) % D;
        match a[k].total_cmp(&b[k]) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    Ordering::Equal
}

/// Axis along which the points spread the most. Ties keep the lower axis.
fn max_variance_axis<const D: usize>(points: &[[f32; D]]) -> usize {
    if points.is_empty() {
        return 0;
    }
    let n = points.len() as f64;
    let mut best_axis = 0;
    let mut best_var = 0.0f64;
    for axis in 0..D {
        let mean = points.iter().map(|p| p[axis] as f64).sum::<f64>() / n;
        let var = points
            .iter()
            .map(|p| {
                let d = p[axis] as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        if var > best_var {
            best_var = var;
            best_axis = axis;
        }
    }
    best_axis
}

impl<const D: usize> KdTree<D> {
    pub fn build(points: Vec<[f32; D]>) -> Self {
        let mut tree = KdTree {
            nodes: Vec::with_capacity(points.len()),
            root: None,
            points,
        };
        let mut order: Vec<u32> = (0..tree.points.len() as u32).collect();
        let axis = max_variance_axis(&tree.points);
        tree.root = tree.build_r(&mut order, axis);
        log::debug!("kd-tree: {} points, depth {}", tree.points.len(), tree.depth());
        tree
    }

    fn build_r(&mut self, order: &mut [u32], axis: usize) -> Option<NodeId> {
        if order.is_empty() {
            return None;
        }
        let points = &self.points;
        order.sort_by(|&a, &b| {
            cmp_cyclic(&points[a as usize], &points[b as usize], axis).then(a.cmp(&b))
        });

        let pivot = order.len() / 2;
        let id = self.nodes.len() as NodeId;
        self.nodes.push(KdNode {
            point: order[pivot],
            axis: axis as u8,
            left: None,
            right: None,
        });

        let next = (axis + 1) % D;
        let (lo, rest) = order.split_at_mut(pivot);
        let left = self.build_r(lo, next);
        let right = self.build_r(&mut rest[1..], next);
        let node = &mut self.nodes[id as usize];
        node.left = left;
        node.right = right;
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, index: usize) -> Option<&[f32; D]> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[[f32; D]] {
        &self.points
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack: Vec<(NodeId, usize)> = self.root.map(|r| (r, 1)).into_iter().collect();
        while let Some((id, d)) = stack.pop() {
            deepest = deepest.max(d);
            let node = &self.nodes[id as usize];
            for child in [node.left, node.right].into_iter().flatten() {
                stack.push((child, d + 1));
            }
        }
        deepest
    }

    pub fn nearest(&self, query: &[f32; D]) -> Option<Neighbor> {
        self.k_nearest(query, 1).into_iter().next()
    }

    /// The `k` closest points, nearest first. Asking for more points than
    /// the tree holds returns all of them.
    pub fn k_nearest(&self, query: &[f32; D], k: usize) -> Vec<Neighbor> {
        if k == 0 {
            return Vec::new();
        }
        let mut best = Nearest {
            k,
            heap: BinaryHeap::with_capacity(k.min(self.points.len()) + 1),
        };
        self.search(query, &mut best);

        let mut found = best.heap.into_vec();
        found.sort();
        found
            .into_iter()
            .map(|c| Neighbor {
                index: c.index as usize,
                distance: c.dist2.sqrt(),
            })
            .collect()
    }

    /// Every point within `radius` (inclusive), nearest first.
    pub fn within_radius(&self, query: &[f32; D], radius: f32) -> Vec<Neighbor> {
        if radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }
        let mut within = Within {
            radius2: radius * radius,
            found: Vec::new(),
        };
        self.search(query, &mut within);

        within.found.sort();
        within
            .found
            .into_iter()
            .map(|c| Neighbor {
                index: c.index as usize,
                distance: c.dist2.sqrt(),
            })
            .collect()
    }

    /// Depth-first descent toward the query, with far children kept on an
    /// explicit stack alongside their squared distance to the split plane.
    /// A far child is only entered if that distance is still within the
    /// collector's bound when it is popped.
    fn search<C: Collector>(&self, query: &[f32; D], collector: &mut C) {
        let Some(root) = self.root else {
            return;
        };
        let mut stack: Vec<(NodeId, f32)> = vec![(root, 0.0)];
        while let Some((start, plane_dist2)) = stack.pop() {
            if plane_dist2 > collector.bound() {
                continue;
            }
            let mut next = Some(start);
            while let Some(id) = next {
                let node = &self.nodes[id as usize];
                let p = &self.points[node.point as usize];
                collector.offer(node.point, dist2(query, p));

                let diff = query[node.axis as usize] - p[node.axis as usize];
                let (near, far) = if diff < 0.0 {
                    (node.left, node.right)
                } else {
                    (node.right, node.left)
                };
                if let Some(far) = far {
                    stack.push((far, diff * diff));
                }
                next = near;
            }
        }
    }
}

// ============================================================
// Collectors
// ============================================================

/// Heap entry ordered by squared distance, then index.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    dist2: f32,
    index: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist2
            .total_cmp(&other.dist2)
            .then(self.index.cmp(&other.index))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

trait Collector {
    /// Largest squared distance still worth visiting.
    fn bound(&self) -> f32;
    fn offer(&mut self, index: u32, dist2: f32);
}

/// Bounded max-heap of the best `k` so far.
struct Nearest {
    k: usize,
    heap: BinaryHeap<Candidate>,
}

impl Collector for Nearest {
    fn bound(&self) -> f32 {
        if self.heap.len() < self.k {
            f32::INFINITY
        } else {
            self.heap.peek().map_or(f32::INFINITY, |c| c.dist2)
        }
    }

    fn offer(&mut self, index: u32, dist2: f32) {
        let cand = Candidate { dist2, index };
        if self.heap.len() < self.k {
            self.heap.push(cand);
        } else if self.heap.peek().is_some_and(|worst| cand < *worst) {
            self.heap.pop();
            self.heap.push(cand);
        }
    }
}

struct Within {
    radius2: f32,
    found: Vec<Candidate>,
}

impl Collector for Within {
    fn bound(&self) -> f32 {
        self.radius2
    }

    fn offer(&mut self, index: u32, dist2: f32) {
        if dist2 <= self.radius2 {
            self.found.push(Candidate { dist2, index });
        }
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn random_points(rng: &mut StdRng, n: usize) -> Vec<[f32; 3]> {
        (0..n)
            .map(|_| {
                [
                    rng.gen_range(-100.0..100.0),
                    rng.gen_range(-100.0..100.0),
                    rng.gen_range(-10.0..10.0),
                ]
            })
            .collect()
    }

    fn brute_force(points: &[[f32; 3]], q: &[f32; 3]) -> Vec<(usize, f32)> {
        let mut all: Vec<(usize, f32)> = points.iter().enumerate().map(|(i, p)| (i, dist2(q, p))).collect();
        all.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        all
    }

    #[test]
    fn test_k_nearest_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);
        let n = 200;
        let points = random_points(&mut rng, n);
        let tree = KdTree::build(points.clone());
        for _ in 0..50 {
            let q = [
                rng.gen_range(-120.0..120.0),
                rng.gen_range(-120.0..120.0),
                rng.gen_range(-20.0..20.0),
            ];
            let expected = brute_force(&points, &q);
            for k in [1, n / 2, n] {
                let got = tree.k_nearest(&q, k);
                assert_eq!(got.len(), k);
                let got_set: HashSet<usize> = got.iter().map(|nb| nb.index).collect();
                let want_set: HashSet<usize> = expected[..k].iter().map(|e| e.0).collect();
                assert_eq!(got_set, want_set, "k = {k} at {q:?}");
                assert!(
                    got.windows(2).all(|w| w[0].distance <= w[1].distance),
                    "results are sorted nearest first"
                );
            }
        }
    }

    #[test]
    fn test_within_radius_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        let points = random_points(&mut rng, 300);
        let tree = KdTree::build(points.clone());
        for _ in 0..50 {
            let q = [rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0), 0.0];
            let radius = rng.gen_range(0.0..60.0f32);
            let got: HashSet<usize> = tree.within_radius(&q, radius).iter().map(|nb| nb.index).collect();
            let want: HashSet<usize> = points
                .iter()
                .enumerate()
                .filter(|(_, p)| dist2(&q, p) <= radius * radius)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(got, want, "radius {radius} at {q:?}");
        }
    }

    #[test]
    fn test_radius_is_inclusive() {
        let tree = KdTree::build(vec![[0.0, 0.0], [3.0, 4.0], [6.0, 8.0]]);
        let hits = tree.within_radius(&[0.0, 0.0], 5.0);
        assert_eq!(hits.len(), 2, "a point exactly on the radius counts");
        assert_eq!(hits[1], Neighbor { index: 1, distance: 5.0 });
        assert!(tree.within_radius(&[0.0, 0.0], -1.0).is_empty());
    }

    #[test]
    fn test_k_larger_than_tree_returns_everything() {
        let tree = KdTree::build(vec![[1.0], [5.0], [3.0]]);
        let all = tree.k_nearest(&[0.0], 10);
        assert_eq!(all.iter().map(|nb| nb.index).collect::<Vec<_>>(), vec![0, 2, 1]);
        assert!(tree.k_nearest(&[0.0], 0).is_empty());
    }

    #[test]
    fn test_nearest_reports_distance() {
        let tree = KdTree::build(vec![[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0]]);
        let hit = tree.nearest(&[9.0, 1.0, 0.0]).unwrap();
        assert_eq!(hit.index, 1);
        assert!((hit.distance - 2.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_empty_and_single() {
        let empty: KdTree<3> = KdTree::build(Vec::new());
        assert!(empty.is_empty());
        assert_eq!(empty.depth(), 0);
        assert_eq!(empty.nearest(&[0.0; 3]), None);
        assert!(empty.within_radius(&[0.0; 3], 100.0).is_empty());

        let single = KdTree::build(vec![[2.0, 2.0]]);
        assert_eq!(single.depth(), 1);
        assert_eq!(single.nearest(&[-50.0, 9.0]).map(|nb| nb.index), Some(0));
    }

    #[test]
    fn test_root_splits_on_widest_axis() {
        // spread along y, flat in x
        let points: Vec<[f32; 2]> = (0..9).map(|i| [0.5, i as f32 * 10.0]).collect();
        let tree = KdTree::build(points);
        let root = tree.nodes[tree.root.unwrap() as usize];
        assert_eq!(root.axis, 1);
        assert_eq!(root.point, 4, "median of nine");
    }

    #[test]
    fn test_tree_is_balanced() {
        let mut rng = StdRng::seed_from_u64(11);
        let tree = KdTree::build(random_points(&mut rng, 1023));
        assert_eq!(tree.depth(), 10, "1023 points fill ten levels");
        assert_eq!(tree.len(), 1023);
    }

    #[test]
    fn test_ties_on_split_axis() {
        // every point shares x, so ordering falls through to y
        let points: Vec<[f32; 2]> = (0..16).map(|i| [1.0, (i * 7 % 16) as f32]).collect();
        let tree = KdTree::build(points.clone());
        for q in [[1.0, 3.2], [0.0, 15.0], [2.0, -1.0]] {
            let got = tree.nearest(&q).unwrap();
            let flat: Vec<[f32; 3]> = points.iter().map(|p| [p[0], p[1], 0.0]).collect();
            let want = brute_force(&flat, &[q[0], q[1], 0.0])[0];
            assert_eq!(got.index, want.0, "at {q:?}");
        }
    }

    #[test]
    fn test_duplicate_points_all_found() {
        let tree = KdTree::build(vec![[1.0, 1.0]; 5]);
        assert_eq!(tree.within_radius(&[1.0, 1.0], 0.0).len(), 5);
        assert_eq!(tree.k_nearest(&[0.0, 0.0], 3).len(), 3);
    }

    #[test]
    fn test_points_keep_their_order() {
        let points = vec![[3.0, 1.0], [1.0, 2.0], [2.0, 0.0]];
        let tree = KdTree::build(points.clone());
        assert_eq!(tree.points(), points.as_slice());
        assert_eq!(tree.point(2), Some(&[2.0, 0.0]));
        assert_eq!(tree.point(3), None);
    }
}
