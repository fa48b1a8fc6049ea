// trace.rs — sweep a point or axis-aligned box through the BSP tree
//
// Recursive hull check: descend the node tree splitting the segment at
// each plane, and clip against every brush in each leaf the segment
// reaches. Box brushes go through a 4-wide path that produces exactly the
// same result as the per-side loop.

use std::cell::RefCell;

use pbsp_common::shared::{
    dot_product, dot_product_abs, vector_add, vector_length_squared, vector_lerp, vector_ma,
    vector_scale, vector_subtract, Contents, Plane, PlaneAxis, Vec3, VEC3_ORIGIN,
};
use pbsp_common::simd::{F32x4, Mask4};

use crate::brush_index::{BoxBrush, BrushKind};
use crate::model::{Brush, CollisionModel};

/// Crossing points are pushed this far toward the near side of a plane so
/// that a segment lying on a brush face still hits it.
pub const DIST_EPSILON: f32 = 0.03125;

/// Initial entry fraction, below anything a real side can produce.
const NEVER_UPDATED: f32 = -99999.0;

/// Extents below this squared length are treated as a point.
const POINT_EXTENTS_EPSILON: f32 = 1e-6;

// ============================================================
// Ray
// ============================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    /// Start of the box centre.
    pub start: Vec3,
    pub delta: Vec3,
    /// Half-size of the swept box, zero for a point.
    pub extents: Vec3,
    /// Added back to `start` when reporting positions, for boxes that are
    /// not centred on the traced origin.
    pub start_offset: Vec3,
    pub is_point: bool,
}

impl Ray {
    pub fn point(start: Vec3, end: Vec3) -> Self {
        Self::with_bounds(start, end, VEC3_ORIGIN, VEC3_ORIGIN)
    }

    /// A box centred on the traced origin.
    pub fn with_extents(start: Vec3, end: Vec3, half_extents: Vec3) -> Self {
        let mins = vector_scale(&half_extents, -1.0);
        Self::with_bounds(start, end, mins, half_extents)
    }

    /// A box spanning `mins..maxs` relative to the traced origin.
    pub fn with_bounds(start: Vec3, end: Vec3, mins: Vec3, maxs: Vec3) -> Self {
        let delta = vector_subtract(&end, &start);
        let extents = vector_scale(&vector_subtract(&maxs, &mins), 0.5);
        let centre = vector_scale(&vector_add(&mins, &maxs), 0.5);
        Ray {
            start: vector_add(&start, &centre),
            delta,
            extents,
            start_offset: vector_scale(&centre, -1.0),
            is_point: vector_length_squared(&extents) < POINT_EXTENTS_EPSILON,
        }
    }

    pub fn end(&self) -> Vec3 {
        vector_add(&self.start, &self.delta)
    }
}

// ============================================================
// Trace result
// ============================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Trace {
    /// 1.0 when nothing was hit.
    pub fraction: f32,
    /// How far along the ray a point trace stays inside solid.
    pub fraction_left_solid: f32,
    pub start_solid: bool,
    pub all_solid: bool,
    pub plane: Option<Plane>,
    pub surface: Option<u16>,
    pub hit_contents: Contents,
    /// Filled in only when endpoints are requested.
    pub start_pos: Vec3,
    pub end_pos: Vec3,
}

impl Default for Trace {
    fn default() -> Self {
        Trace {
            fraction: 1.0,
            fraction_left_solid: 0.0,
            start_solid: false,
            all_solid: false,
            plane: None,
            surface: None,
            hit_contents: Contents::EMPTY,
            start_pos: VEC3_ORIGIN,
            end_pos: VEC3_ORIGIN,
        }
    }
}

impl Trace {
    pub fn has_hit(&self) -> bool {
        self.fraction < 1.0
    }

    /// Axis and direction of the hit plane, when it is axial.
    pub fn hit_axis(&self) -> Option<(PlaneAxis, f32)> {
        let plane = self.plane?;
        let axis = plane.axis.index()?;
        Some((plane.axis, plane.normal[axis].signum()))
    }
}

// ============================================================
// Per-query state
// ============================================================

/// Per-brush check counts, so a brush reached through several leafs is
/// clipped once per trace without clearing anything between traces.
#[derive(Debug, Default)]
pub(crate) struct BrushStamps {
    check_count: u32,
    stamps: Vec<u32>,
}

impl BrushStamps {
    /// Start a new trace over a model with `num_brushes` brushes.
    pub(crate) fn begin(&mut self, num_brushes: usize) {
        if self.stamps.len() < num_brushes {
            self.stamps.resize(num_brushes, 0);
        }
        self.check_count = self.check_count.wrapping_add(1);
        if self.check_count == 0 {
            // wrapped; old stamps could collide with the new count
            self.stamps.fill(0);
            self.check_count = 1;
        }
    }

    /// True the first time `brush` is seen in the current trace.
    pub(crate) fn mark(&mut self, brush: usize) -> bool {
        let stamp = &mut self.stamps[brush];
        if *stamp == self.check_count {
            return false;
        }
        *stamp = self.check_count;
        true
    }
}

// Reused by every trace on the thread; only grows.
thread_local! {
    static BRUSH_STAMPS: RefCell<BrushStamps> = RefCell::new(BrushStamps::default());
}

/// Trace inputs packed into lanes, loaded the first time a box brush is met.
struct SimdRay {
    start: F32x4,
    end: F32x4,
    neg_start: F32x4,
    neg_end: F32x4,
    extents: F32x4,
}

pub(crate) struct TraceWork<'a> {
    model: &'a CollisionModel,
    pub(crate) trace: Trace,
    mask: Contents,
    start: Vec3,
    end: Vec3,
    extents: Vec3,
    is_point: bool,
    simd: Option<SimdRay>,
    checked: &'a mut BrushStamps,
}

/// Accumulated per-side state for one brush, shared by both clip paths.
struct BrushClip {
    enter_frac: f32,
    leave_frac: f32,
    start_out: bool,
    get_out: bool,
    lead: Option<(Plane, Option<u16>)>,
}

impl<'a> TraceWork<'a> {
    pub(crate) fn new(
        model: &'a CollisionModel,
        ray: &Ray,
        mask: Contents,
        checked: &'a mut BrushStamps,
    ) -> Self {
        checked.begin(model.brushes.len());
        TraceWork {
            model,
            trace: Trace::default(),
            mask,
            start: ray.start,
            end: ray.end(),
            extents: ray.extents,
            is_point: ray.is_point,
            simd: None,
            checked,
        }
    }

    fn recursive_hull_check(&mut self, mut num: i32, p1f: f32, p2f: f32, p1: Vec3, p2: Vec3) {
        // already hit something nearer
        if self.trace.fraction <= p1f {
            return;
        }

        let (mut t1, mut t2, mut offset) = (0.0f32, 0.0f32, 0.0f32);
        while num >= 0 {
            let node = self.model.nodes[num as usize];
            let plane = &self.model.planes[node.plane];

            t1 = plane.distance_to(&p1);
            t2 = plane.distance_to(&p2);
            offset = if self.is_point && plane.axis == PlaneAxis::Other {
                0.0
            } else {
                plane.extent_offset(&self.extents)
            };

            if t1 > offset && t2 > offset {
                num = node.children[0];
                continue;
            }
            if t1 < -offset && t2 < -offset {
                num = node.children[1];
                continue;
            }
            break;
        }

        if num < 0 {
            self.trace_to_leaf((!num) as usize);
            return;
        }
        let node = self.model.nodes[num as usize];

        // put the crosspoint DIST_EPSILON on the near side
        let (side, frac, frac2) = if t1 < t2 {
            let idist = 1.0 / (t1 - t2);
            (
                1usize,
                (t1 - offset - DIST_EPSILON) * idist,
                (t1 + offset + DIST_EPSILON) * idist,
            )
        } else if t1 > t2 {
            let idist = 1.0 / (t1 - t2);
            (
                0usize,
                (t1 + offset + DIST_EPSILON) * idist,
                (t1 - offset - DIST_EPSILON) * idist,
            )
        } else {
            (0usize, 1.0, 0.0)
        };

        // move up to the node
        let frac = frac.clamp(0.0, 1.0);
        let midf = p1f + (p2f - p1f) * frac;
        let mid = vector_lerp(&p1, &p2, frac);
        self.recursive_hull_check(node.children[side], p1f, midf, p1, mid);

        // go past the node
        let frac2 = frac2.clamp(0.0, 1.0);
        let midf = p1f + (p2f - p1f) * frac2;
        let mid = vector_lerp(&p1, &p2, frac2);
        self.recursive_hull_check(node.children[side ^ 1], midf, p2f, mid, p2);
    }

    fn trace_to_leaf(&mut self, leaf_num: usize) {
        let model = self.model;
        let leaf = &model.leafs[leaf_num];
        for &brush_num in model.leaf_brush_ids(leaf) {
            let brush_num = brush_num as usize;
            let brush = &model.brushes[brush_num];
            if !brush.contents.intersects(self.mask) {
                continue;
            }
            // a brush reached through several leafs is clipped once
            if !self.checked.mark(brush_num) {
                continue;
            }

            match model.brush_index.kind(brush_num) {
                BrushKind::Box(bb) => self.clip_box(brush, bb),
                BrushKind::General => self.clip_general(brush),
            }
            if self.trace.fraction == 0.0 {
                return;
            }
        }
    }

    // ============================================================
    // General brushes
    // ============================================================

    pub(crate) fn clip_general(&mut self, brush: &Brush) {
        if brush.num_sides == 0 {
            return;
        }

        let mut clip = BrushClip {
            enter_frac: NEVER_UPDATED,
            leave_frac: 1.0,
            start_out: false,
            get_out: false,
            lead: None,
        };

        for side in self.model.brush_sides_of(brush) {
            let plane = &self.model.planes[side.plane];

            let dist = if self.is_point {
                // rays ignore bevels
                if side.bevel {
                    continue;
                }
                plane.dist
            } else {
                // push the plane out for the box extents
                plane.dist + dot_product_abs(&plane.normal, &self.extents)
            };

            let d1 = dot_product(&self.start, &plane.normal) - dist;
            let d2 = dot_product(&self.end, &plane.normal) - dist;

            // completely in front of this face, no intersection
            if d1 > 0.0 {
                clip.start_out = true;
                if d2 > 0.0 {
                    return;
                }
            } else {
                if d2 <= 0.0 {
                    continue;
                }
                clip.get_out = true;
            }

            if d1 > d2 {
                // entering
                let mut f = d1 - DIST_EPSILON;
                if f < 0.0 {
                    f = 0.0;
                }
                f /= d1 - d2;
                if f > clip.enter_frac {
                    clip.enter_frac = f;
                    clip.lead = Some((*plane, side.surface));
                }
            } else {
                // leaving
                let f = (d1 + DIST_EPSILON) / (d1 - d2);
                if f < clip.leave_frac {
                    clip.leave_frac = f;
                }
            }
        }

        self.finish_clip(brush.contents, clip);
    }

    // ============================================================
    // Box brushes
    // ============================================================

    fn load_simd(&mut self) -> &SimdRay {
        let (start, end, extents, is_point) = (self.start, self.end, self.extents, self.is_point);
        self.simd.get_or_insert_with(|| {
            let start = F32x4::from_vec3(&start);
            let end = F32x4::from_vec3(&end);
            SimdRay {
                start,
                end,
                neg_start: F32x4::zero() - start,
                neg_end: F32x4::zero() - end,
                extents: if is_point {
                    F32x4::zero()
                } else {
                    F32x4::from_vec3(&extents)
                },
            }
        })
    }

    /// Same per-side rules as `clip_general`, evaluated for three faces per
    /// lane group. The -axis faces have normal `-e`, so their distances use
    /// the negated start and end.
    pub(crate) fn clip_box(&mut self, brush: &Brush, bb: &BoxBrush) {
        let ray = self.load_simd();

        let min_dist = bb.min_dist + ray.extents;
        let max_dist = bb.max_dist + ray.extents;
        let d1_min = ray.neg_start - min_dist;
        let d2_min = ray.neg_end - min_dist;
        let d1_max = ray.start - max_dist;
        let d2_max = ray.end - max_dist;

        let zero = F32x4::zero();
        let out1_min = d1_min.cmp_gt(zero);
        let out2_min = d2_min.cmp_gt(zero);
        let out1_max = d1_max.cmp_gt(zero);
        let out2_max = d2_max.cmp_gt(zero);

        // in front of any face at both ends: no intersection
        if out1_min.and(out2_min).or(out1_max.and(out2_max)).any_xyz() {
            return;
        }

        let enter_min = out1_min.and_not(out2_min);
        let enter_max = out1_max.and_not(out2_max);
        let leave_min = out2_min.and_not(out1_min);
        let leave_max = out2_max.and_not(out1_max);

        let eps = F32x4::splat(DIST_EPSILON);
        let enter_f = |d1: F32x4, d2: F32x4| (d1 - eps).max(zero) / (d1 - d2);
        let leave_f = |d1: F32x4, d2: F32x4| (d1 + eps) / (d1 - d2);

        let enter_lanes = [
            enter_f(d1_min, d2_min).to_array(),
            enter_f(d1_max, d2_max).to_array(),
        ];
        let leave_lanes = [
            leave_f(d1_min, d2_min).to_array(),
            leave_f(d1_max, d2_max).to_array(),
        ];
        let enter_masks: [Mask4; 2] = [enter_min, enter_max];
        let leave_masks: [Mask4; 2] = [leave_min, leave_max];

        let mut clip = BrushClip {
            enter_frac: NEVER_UPDATED,
            leave_frac: 1.0,
            start_out: out1_min.or(out1_max).any_xyz(),
            get_out: leave_min.or(leave_max).any_xyz(),
            lead: None,
        };

        // walk faces in side-list order so ties pick the same face as the
        // general path
        for &slot in &bb.slots_by_order {
            let slot = slot as usize;
            let (group, lane) = (slot / 3, slot % 3);
            if enter_masks[group].lane(lane) {
                let f = enter_lanes[group][lane];
                if f > clip.enter_frac {
                    let face = &bb.faces[slot];
                    clip.enter_frac = f;
                    clip.lead = Some((face.plane, face.surface));
                }
            } else if leave_masks[group].lane(lane) {
                let f = leave_lanes[group][lane];
                if f < clip.leave_frac {
                    clip.leave_frac = f;
                }
            }
        }

        self.finish_clip(brush.contents, clip);
    }

    // ============================================================
    // Shared resolution
    // ============================================================

    fn finish_clip(&mut self, contents: Contents, mut clip: BrushClip) {
        let trace = &mut self.trace;

        // Entered this brush only after leaving a previous one, so still
        // outside. Only point traces track fraction_left_solid.
        if self.is_point && clip.start_out && trace.fraction_left_solid - clip.enter_frac > 0.0 {
            clip.start_out = false;
        }

        if !clip.start_out {
            // started inside this brush
            trace.start_solid = true;
            trace.hit_contents = contents;

            if !clip.get_out {
                trace.all_solid = true;
                trace.fraction = 0.0;
                trace.fraction_left_solid = 1.0;
            } else if clip.leave_frac != 1.0 && clip.leave_frac > trace.fraction_left_solid {
                // leave_frac == 1 means no side was ever crossed on the way out
                trace.fraction_left_solid = clip.leave_frac;
            }
            return;
        }

        if clip.enter_frac < clip.leave_frac
            && clip.enter_frac > NEVER_UPDATED
            && clip.enter_frac < trace.fraction
        {
            trace.fraction = clip.enter_frac.max(0.0);
            if let Some((plane, surface)) = clip.lead {
                trace.plane = Some(plane);
                trace.surface = surface;
            }
            trace.hit_contents = contents;
        }
    }
}

// ============================================================
// Entry points
// ============================================================

impl CollisionModel {
    /// Sweep `ray` from node `head` against every brush whose contents
    /// intersect `mask`.
    ///
    /// # Panics
    ///
    /// If `head` is not a valid node or complemented leaf index; see
    /// [`CollisionModel::check_head`].
    pub fn box_trace(&self, ray: &Ray, head: i32, mask: Contents, compute_endpoint: bool) -> Trace {
        let mut trace = BRUSH_STAMPS.with(|cell| match cell.try_borrow_mut() {
            Ok(mut stamps) => self.hull_trace(ray, head, mask, &mut stamps),
            // only reachable if a trace is started from inside another one
            Err(_) => self.hull_trace(ray, head, mask, &mut BrushStamps::default()),
        });
        if compute_endpoint {
            compute_trace_endpoints(ray, &mut trace);
        }
        trace
    }

    fn hull_trace(&self, ray: &Ray, head: i32, mask: Contents, stamps: &mut BrushStamps) -> Trace {
        let mut work = TraceWork::new(self, ray, mask, stamps);
        let (start, end) = (work.start, work.end);
        work.recursive_hull_check(head, 0.0, 1.0, start, end);
        work.trace
    }
}

/// Turn `fraction` and `fraction_left_solid` into positions along the ray.
pub fn compute_trace_endpoints(ray: &Ray, trace: &mut Trace) {
    let start = vector_add(&ray.start, &ray.start_offset);

    trace.end_pos = if trace.fraction == 1.0 {
        vector_add(&start, &ray.delta)
    } else {
        vector_ma(&start, trace.fraction, &ray.delta)
    };

    if trace.fraction_left_solid == 0.0 {
        trace.start_pos = start;
    } else {
        if trace.fraction_left_solid == 1.0 {
            trace.start_solid = true;
            trace.all_solid = true;
            trace.fraction = 0.0;
            trace.end_pos = start;
        }
        trace.start_pos = vector_ma(&start, trace.fraction_left_solid, &ray.delta);
    }
}

// ============================================================
// Tests
// ============================================================
