// leaf.rs — point and box classification against the node tree

use pbsp_common::shared::{BoxSide, Contents, Vec3};

use crate::model::CollisionModel;

/// Leafs touched by a box, and the first node whose plane split it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoxLeafs {
    pub leafs: Vec<usize>,
    /// -1 when the box never straddled a plane.
    pub top_node: i32,
}

impl CollisionModel {
    /// Walk from `head` to the leaf containing `p`. Points on a plane go to
    /// the front child.
    pub fn find_leaf(&self, p: &Vec3, head: i32) -> usize {
        let mut num = head;
        while num >= 0 {
            let node = &self.nodes[num as usize];
            let d = self.planes[node.plane].distance_to(p);
            num = if d >= 0.0 {
                node.children[0]
            } else {
                node.children[1]
            };
        }
        (!num) as usize
    }

    pub fn point_contents(&self, p: &Vec3, head: i32) -> Contents {
        self.leafs[self.find_leaf(p, head)].contents
    }

    /// Every leaf the box `mins..maxs` reaches from `head`, up to
    /// `max_count`.
    pub fn box_leafs(&self, mins: &Vec3, maxs: &Vec3, head: i32, max_count: usize) -> BoxLeafs {
        let mut out = BoxLeafs {
            leafs: Vec::with_capacity(max_count.min(64)),
            top_node: -1,
        };
        self.box_leafs_r(head, mins, maxs, max_count, &mut out);
        out
    }

    fn box_leafs_r(&self, mut num: i32, mins: &Vec3, maxs: &Vec3, max_count: usize, out: &mut BoxLeafs) {
        loop {
            if num < 0 {
                if out.leafs.len() < max_count {
                    out.leafs.push((!num) as usize);
                }
                return;
            }

            let node = &self.nodes[num as usize];
            match self.planes[node.plane].box_side(mins, maxs) {
                BoxSide::Front => num = node.children[0],
                BoxSide::Back => num = node.children[1],
                BoxSide::Both => {
                    if out.top_node == -1 {
                        out.top_node = num;
                    }
                    self.box_leafs_r(node.children[0], mins, maxs, max_count, out);
                    num = node.children[1];
                }
            }
        }
    }

    /// True if any leaf under `num` belongs to a cluster set in `row`.
    pub fn headnode_visible(&self, num: i32, row: &[u8]) -> bool {
        if num < 0 {
            let cluster = self.leaf_cluster((!num) as usize);
            if cluster < 0 {
                return false;
            }
            let byte = (cluster >> 3) as usize;
            return row.get(byte).is_some_and(|b| b & (1 << (cluster & 7)) != 0);
        }

        let node = &self.nodes[num as usize];
        self.headnode_visible(node.children[0], row) || self.headnode_visible(node.children[1], row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;
    use pbsp_common::shared::dot_product;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_find_leaf_inside_and_outside() {
        let model = single_box_model([0.0; 3], [10.0; 3]);
        let head = model.world_head();
        assert_eq!(model.find_leaf(&[5.0, 5.0, 5.0], head), SOLID_LEAF);
        assert_eq!(model.find_leaf(&[5.0, 5.0, 15.0], head), EMPTY_LEAF);
        assert_eq!(model.find_leaf(&[-1.0, 5.0, 5.0], head), EMPTY_LEAF);
    }

    #[test]
    fn test_point_on_plane_goes_front() {
        let model = single_box_model([0.0; 3], [10.0; 3]);
        // z = 10 is on the upper plane, whose front side is outside
        assert_eq!(model.find_leaf(&[5.0, 5.0, 10.0], 0), EMPTY_LEAF);
        // z = 0 is on the lower plane, whose front side is inside
        assert_eq!(model.find_leaf(&[5.0, 5.0, 0.0], 0), SOLID_LEAF);
    }

    #[test]
    fn test_point_contents() {
        let model = single_box_model([0.0; 3], [10.0; 3]);
        assert_eq!(model.point_contents(&[1.0, 2.0, 3.0], 0), Contents::SOLID);
        assert_eq!(model.point_contents(&[1.0, 2.0, 30.0], 0), Contents::EMPTY);
    }

    #[test]
    fn test_find_leaf_agrees_with_plane_side() {
        let model = single_box_model([-8.0, -8.0, 0.0], [8.0, 8.0, 32.0]);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            let p: Vec3 = [
                rng.gen_range(-20.0..20.0),
                rng.gen_range(-20.0..20.0),
                rng.gen_range(-10.0..40.0),
            ];
            // walk by hand with the full dot product
            let mut num = 0i32;
            while num >= 0 {
                let node = model.nodes[num as usize];
                let plane = model.planes[node.plane];
                let d = dot_product(&plane.normal, &p) - plane.dist;
                num = node.children[if d >= 0.0 { 0 } else { 1 }];
            }
            assert_eq!(model.find_leaf(&p, 0), (!num) as usize, "disagree at {p:?}");
        }
    }

    #[test]
    fn test_find_leaf_matches_leaf_bounds() {
        let model = single_box_model([0.0; 3], [10.0; 3]);
        let leaf = model.leaf(SOLID_LEAF).unwrap();
        let centre = [
            (leaf.mins[0] + leaf.maxs[0]) * 0.5,
            (leaf.mins[1] + leaf.maxs[1]) * 0.5,
            (leaf.mins[2] + leaf.maxs[2]) * 0.5,
        ];
        assert_eq!(model.find_leaf(&centre, 0), SOLID_LEAF);
    }

    #[test]
    fn test_box_leafs_straddling() {
        let model = single_box_model([0.0; 3], [10.0; 3]);
        let inside = model.box_leafs(&[2.0; 3], &[4.0; 3], 0, 16);
        assert_eq!(inside.leafs, vec![SOLID_LEAF]);
        assert_eq!(inside.top_node, -1);

        let across = model.box_leafs(&[5.0, 5.0, 5.0], &[5.0, 5.0, 15.0], 0, 16);
        assert!(across.leafs.contains(&SOLID_LEAF));
        assert!(across.leafs.contains(&EMPTY_LEAF));
        assert_eq!(across.top_node, 4, "the upper z plane splits the box first");
    }

    #[test]
    fn test_box_leafs_respects_max_count() {
        let model = single_box_model([0.0; 3], [10.0; 3]);
        let all = model.box_leafs(&[-5.0; 3], &[15.0; 3], 0, 64);
        assert!(all.leafs.len() > 2, "empty leaf is reached through several nodes");
        let capped = model.box_leafs(&[-5.0; 3], &[15.0; 3], 0, 2);
        assert_eq!(capped.leafs.len(), 2);
        assert_eq!(capped.top_node, 0);
    }

    #[test]
    fn test_headnode_visible() {
        let model = single_box_model([0.0; 3], [10.0; 3]);
        // cluster 0 is the solid leaf, cluster 1 the empty one
        assert!(model.headnode_visible(0, &[0b01]));
        assert!(model.headnode_visible(0, &[0b10]));
        assert!(!model.headnode_visible(0, &[0b00]));
        assert!(!model.headnode_visible(0, &[]), "short rows see nothing");
        assert!(model.headnode_visible(!(SOLID_LEAF as i32), &[0b01]));
        assert!(!model.headnode_visible(!(SOLID_LEAF as i32), &[0b10]));
    }
}
