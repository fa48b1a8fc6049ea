// brush_index.rs — classify brushes as general convex hulls or axis-aligned boxes
//
// A box brush gets its six faces unpacked into 4-wide lanes so the trace
// can clip all three axes at once instead of walking six planes.

use rayon::prelude::*;

use pbsp_common::shared::Plane;
use pbsp_common::simd::F32x4;

use crate::model::{Brush, BrushSide};

/// One face of a box brush.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxFace {
    pub plane: Plane,
    pub surface: Option<u16>,
}

#[derive(Clone, Copy, Debug)]
pub struct BoxBrush {
    /// Plane distances of the -x, -y, -z faces, i.e. the negated mins.
    pub(crate) min_dist: F32x4,
    /// Plane distances of the +x, +y, +z faces, i.e. the maxs.
    pub(crate) max_dist: F32x4,
    /// Faces in slot order -x, -y, -z, +x, +y, +z.
    pub faces: [BoxFace; 6],
    /// Slots listed in side-list order.
    pub(crate) slots_by_order: [u8; 6],
}

#[derive(Clone, Copy, Debug)]
pub enum BrushKind {
    General,
    Box(BoxBrush),
}

impl BrushKind {
    pub fn is_box(&self) -> bool {
        matches!(self, BrushKind::Box(_))
    }
}

#[derive(Debug, Default)]
pub struct BrushIndex {
    kinds: Vec<BrushKind>,
    box_count: usize,
}

impl BrushIndex {
    pub fn build(
        brushes: &[Brush],
        sides: &[BrushSide],
        planes: &[Plane],
        parallel_threshold: usize,
    ) -> Self {
        let kinds: Vec<BrushKind> = if brushes.len() >= parallel_threshold {
            brushes
                .par_iter()
                .map(|b| classify(b, sides, planes))
                .collect()
        } else {
            brushes.iter().map(|b| classify(b, sides, planes)).collect()
        };
        let box_count = kinds.iter().filter(|k| k.is_box()).count();
        log::debug!("brush index: {} of {} brushes are boxes", box_count, kinds.len());
        BrushIndex { kinds, box_count }
    }

    /// Kind of a brush. Unknown indices are treated as general.
    #[inline]
    pub fn kind(&self, brush: usize) -> &BrushKind {
        self.kinds.get(brush).unwrap_or(&BrushKind::General)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn box_count(&self) -> usize {
        self.box_count
    }
}

/// A brush is a box when it has exactly six non-bevel sides, each on an
/// axial plane with a unit normal, covering both directions of every axis
/// exactly once.
pub fn classify(brush: &Brush, sides: &[BrushSide], planes: &[Plane]) -> BrushKind {
    if brush.num_sides != 6 {
        return BrushKind::General;
    }

    let mut filled: [Option<BoxFace>; 6] = [None; 6];
    let mut slots_by_order = [0u8; 6];
    for (order, side) in sides[brush.first_side..brush.first_side + 6].iter().enumerate() {
        if side.bevel {
            return BrushKind::General;
        }
        let plane = planes[side.plane];
        let Some(axis) = plane.axis.index() else {
            return BrushKind::General;
        };
        let others_zero = (0..3).all(|i| i == axis || plane.normal[i] == 0.0);
        let slot = match plane.normal[axis] {
            n if n == -1.0 && others_zero => axis,
            n if n == 1.0 && others_zero => axis + 3,
            _ => return BrushKind::General,
        };
        if filled[slot].is_some() {
            return BrushKind::General;
        }
        filled[slot] = Some(BoxFace {
            plane,
            surface: side.surface,
        });
        slots_by_order[order] = slot as u8;
    }

    let mut faces = [BoxFace {
        plane: Plane::default(),
        surface: None,
    }; 6];
    for (slot, face) in filled.iter().enumerate() {
        match face {
            Some(f) => faces[slot] = *f,
            None => return BrushKind::General,
        }
    }

    BrushKind::Box(BoxBrush {
        min_dist: F32x4::new(
            faces[0].plane.dist,
            faces[1].plane.dist,
            faces[2].plane.dist,
            0.0,
        ),
        max_dist: F32x4::new(
            faces[3].plane.dist,
            faces[4].plane.dist,
            faces[5].plane.dist,
            0.0,
        ),
        faces,
        slots_by_order,
    })
}
