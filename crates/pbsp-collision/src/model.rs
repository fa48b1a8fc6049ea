// model.rs — static BSP collision data: planes, brushes, nodes and leafs
//
// Built once per level and never mutated afterwards, so any number of
// threads may trace against a shared `&CollisionModel`.

use pbsp_common::config::PARALLEL_LUMP_THRESHOLD;
use pbsp_common::error::{LevelError, LumpError};
use pbsp_common::shared::{Contents, Plane, Vec3};

use crate::brush_index::BrushIndex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrushSide {
    pub plane: usize,
    pub surface: Option<u16>,
    /// Corner-rounding plane, ignored by point traces.
    pub bevel: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Brush {
    pub contents: Contents,
    pub first_side: usize,
    pub num_sides: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Node {
    pub plane: usize,
    /// `>= 0` is a node index, `< 0` is `!leaf_index`.
    pub children: [i32; 2],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Leaf {
    pub contents: Contents,
    /// -1 when the leaf is never potentially visible.
    pub cluster: i32,
    pub area: i32,
    pub flags: i32,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub first_leaf_brush: usize,
    pub num_leaf_brushes: usize,
}

impl Default for Leaf {
    fn default() -> Self {
        Leaf {
            contents: Contents::EMPTY,
            cluster: -1,
            area: 0,
            flags: 0,
            mins: [0.0; 3],
            maxs: [0.0; 3],
            first_leaf_brush: 0,
            num_leaf_brushes: 0,
        }
    }
}

/// Decoded but not yet validated level geometry.
#[derive(Clone, Debug, Default)]
pub struct ModelParts {
    pub planes: Vec<Plane>,
    pub brushes: Vec<Brush>,
    pub brush_sides: Vec<BrushSide>,
    pub nodes: Vec<Node>,
    pub leafs: Vec<Leaf>,
    pub leaf_brushes: Vec<u32>,
}

/// Leaf index encoded as a negative child.
#[inline]
pub fn leaf_child(leaf: usize) -> i32 {
    !(leaf as i32)
}

#[derive(Debug)]
pub struct CollisionModel {
    pub(crate) planes: Vec<Plane>,
    pub(crate) brushes: Vec<Brush>,
    pub(crate) brush_sides: Vec<BrushSide>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) leafs: Vec<Leaf>,
    pub(crate) leaf_brushes: Vec<u32>,
    pub(crate) brush_index: BrushIndex,
}

impl CollisionModel {
    /// Validate every cross reference, then classify brushes.
    pub fn new(parts: ModelParts) -> Result<Self, LevelError> {
        Self::with_threshold(parts, PARALLEL_LUMP_THRESHOLD)
    }

    pub fn with_threshold(parts: ModelParts, parallel_threshold: usize) -> Result<Self, LevelError> {
        validate(&parts)?;
        let brush_index = BrushIndex::build(
            &parts.brushes,
            &parts.brush_sides,
            &parts.planes,
            parallel_threshold,
        );
        Ok(CollisionModel {
            planes: parts.planes,
            brushes: parts.brushes,
            brush_sides: parts.brush_sides,
            nodes: parts.nodes,
            leafs: parts.leafs,
            leaf_brushes: parts.leaf_brushes,
            brush_index,
        })
    }

    /// Head of the world tree. A level without nodes is a single leaf.
    pub fn world_head(&self) -> i32 {
        if self.nodes.is_empty() {
            leaf_child(0)
        } else {
            0
        }
    }

    pub fn check_head(&self, head: i32) -> Result<(), LevelError> {
        let ok = if head >= 0 {
            (head as usize) < self.nodes.len()
        } else {
            ((!head) as usize) < self.leafs.len()
        };
        if ok {
            Ok(())
        } else {
            Err(LevelError::BadHeadNode(head))
        }
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_leafs(&self) -> usize {
        self.leafs.len()
    }

    pub fn num_brushes(&self) -> usize {
        self.brushes.len()
    }

    pub fn leaf(&self, leaf: usize) -> Option<&Leaf> {
        self.leafs.get(leaf)
    }

    pub fn leafs(&self) -> &[Leaf] {
        &self.leafs
    }

    pub fn brush(&self, brush: usize) -> Option<&Brush> {
        self.brushes.get(brush)
    }

    pub fn brush_index(&self) -> &BrushIndex {
        &self.brush_index
    }

    /// Cluster of a leaf, -1 for unknown leafs.
    pub fn leaf_cluster(&self, leaf: usize) -> i32 {
        self.leafs.get(leaf).map_or(-1, |l| l.cluster)
    }

    /// One past the highest cluster any leaf references.
    pub fn cluster_count(&self) -> usize {
        self.leafs
            .iter()
            .map(|l| l.cluster + 1)
            .max()
            .unwrap_or(0)
            .max(0) as usize
    }

    pub(crate) fn brush_sides_of(&self, brush: &Brush) -> &[BrushSide] {
        &self.brush_sides[brush.first_side..brush.first_side + brush.num_sides]
    }

    pub(crate) fn leaf_brush_ids(&self, leaf: &Leaf) -> &[u32] {
        &self.leaf_brushes[leaf.first_leaf_brush..leaf.first_leaf_brush + leaf.num_leaf_brushes]
    }
}

// ============================================================
// Validation
// ============================================================

fn validate(parts: &ModelParts) -> Result<(), LevelError> {
    if parts.leafs.is_empty() {
        return Err(LumpError::Missing("leafs").into());
    }
    let num_planes = parts.planes.len();

    for (i, side) in parts.brush_sides.iter().enumerate() {
        if side.plane >= num_planes {
            return Err(LevelError::BadPlane {
                what: "brush side",
                index: i,
                plane: side.plane as i64,
                count: num_planes,
            });
        }
    }

    for (i, brush) in parts.brushes.iter().enumerate() {
        let end = brush.first_side + brush.num_sides;
        if end > parts.brush_sides.len() {
            return Err(LevelError::BadSideRange {
                brush: i,
                first: brush.first_side as i64,
                end: end as i64,
                count: parts.brush_sides.len(),
            });
        }
    }

    for (i, &brush) in parts.leaf_brushes.iter().enumerate() {
        if brush as usize >= parts.brushes.len() {
            return Err(LevelError::BadBrush {
                index: i,
                brush: brush as usize,
                count: parts.brushes.len(),
            });
        }
    }

    for (i, leaf) in parts.leafs.iter().enumerate() {
        let end = leaf.first_leaf_brush + leaf.num_leaf_brushes;
        if end > parts.leaf_brushes.len() {
            return Err(LevelError::BadLeafBrushRange {
                leaf: i,
                first: leaf.first_leaf_brush,
                end,
                count: parts.leaf_brushes.len(),
            });
        }
    }

    let num_nodes = parts.nodes.len();
    let num_leafs = parts.leafs.len();
    for (i, node) in parts.nodes.iter().enumerate() {
        if node.plane >= num_planes {
            return Err(LevelError::BadPlane {
                what: "node",
                index: i,
                plane: node.plane as i64,
                count: num_planes,
            });
        }
        for &child in &node.children {
            let ok = if child >= 0 {
                (child as usize) < num_nodes
            } else {
                ((!child) as usize) < num_leafs
            };
            if !ok {
                return Err(LevelError::BadChild {
                    node: i,
                    child,
                    nodes: num_nodes,
                    leafs: num_leafs,
                });
            }
        }
    }

    check_node_forest(&parts.nodes)
}

/// Every node has at most one parent and no node lies on a cycle, so
/// descent from any head is guaranteed to reach a leaf.
fn check_node_forest(nodes: &[Node]) -> Result<(), LevelError> {
    let mut parents = vec![0u8; nodes.len()];
    for node in nodes {
        for &child in &node.children {
            if child >= 0 {
                let c = child as usize;
                if parents[c] == 1 {
                    return Err(LevelError::NodeCycle(c));
                }
                parents[c] = 1;
            }
        }
    }

    // walk down from every root; anything left unvisited hangs off a cycle
    let mut visited = vec![false; nodes.len()];
    let mut stack: Vec<usize> = (0..nodes.len()).filter(|&i| parents[i] == 0).collect();
    while let Some(n) = stack.pop() {
        visited[n] = true;
        for &child in &nodes[n].children {
            if child >= 0 {
                stack.push(child as usize);
            }
        }
    }
    match visited.iter().position(|v| !v) {
        Some(n) => Err(LevelError::NodeCycle(n)),
        None => Ok(()),
    }
}

// ============================================================
// Test fixtures
// ============================================================


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_leaf_child_is_bitwise_not() {
        assert_eq!(leaf_child(0), -1);
        assert_eq!(leaf_child(5), -6);
        assert_eq!(!leaf_child(7), 7);
    }

    #[test]
    fn test_fixture_validates() {
        let model = single_box_model([0.0; 3], [10.0; 3]);
        assert_eq!(model.num_nodes(), 6);
        assert_eq!(model.num_leafs(), 2);
        assert_eq!(model.world_head(), 0);
        assert_eq!(model.cluster_count(), 2);
    }

    #[test]
    fn test_world_head_without_nodes() {
        let parts = ModelParts {
            leafs: vec![Leaf::default()],
            ..ModelParts::default()
        };
        let model = CollisionModel::new(parts).unwrap();
        assert_eq!(model.world_head(), -1, "single leaf world uses leaf 0");
        assert!(model.check_head(-1).is_ok());
        assert!(model.check_head(0).is_err());
    }

    #[test]
    fn test_rejects_missing_leafs() {
        let err = CollisionModel::new(ModelParts::default()).unwrap_err();
        assert!(matches!(err, LevelError::Lump(LumpError::Missing("leafs"))));
    }

    #[test]
    fn test_rejects_side_with_bad_plane() {
        let mut parts = single_box_parts([0.0; 3], [1.0; 3], Contents::SOLID);
        parts.brush_sides[3].plane = 999;
        let err = CollisionModel::new(parts).unwrap_err();
        assert!(
            matches!(err, LevelError::BadPlane { what: "brush side", index: 3, .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn test_rejects_brush_side_overrun() {
        let mut parts = single_box_parts([0.0; 3], [1.0; 3], Contents::SOLID);
        parts.brushes[0].num_sides = 7;
        assert!(matches!(
            CollisionModel::new(parts).unwrap_err(),
            LevelError::BadSideRange { brush: 0, .. }
        ));
    }

    #[test]
    fn test_rejects_bad_leaf_brush() {
        let mut parts = single_box_parts([0.0; 3], [1.0; 3], Contents::SOLID);
        parts.leaf_brushes[0] = 4;
        assert!(matches!(
            CollisionModel::new(parts).unwrap_err(),
            LevelError::BadBrush { brush: 4, .. }
        ));
    }

    #[test]
    fn test_rejects_out_of_range_child() {
        let mut parts = single_box_parts([0.0; 3], [1.0; 3], Contents::SOLID);
        parts.nodes[2].children[0] = leaf_child(9);
        assert!(matches!(
            CollisionModel::new(parts).unwrap_err(),
            LevelError::BadChild { node: 2, .. }
        ));
    }

    #[test]
    fn test_rejects_node_cycle() {
        let mut parts = single_box_parts([0.0; 3], [1.0; 3], Contents::SOLID);
        // node 5 points back at the root
        parts.nodes[5].children[0] = 0;
        assert!(matches!(
            CollisionModel::new(parts).unwrap_err(),
            LevelError::NodeCycle(_)
        ));
    }

    #[test]
    fn test_rejects_shared_child() {
        let mut parts = single_box_parts([0.0; 3], [1.0; 3], Contents::SOLID);
        parts.nodes[0].children[0] = 3;
        assert!(matches!(
            CollisionModel::new(parts).unwrap_err(),
            LevelError::NodeCycle(3)
        ));
    }
}
