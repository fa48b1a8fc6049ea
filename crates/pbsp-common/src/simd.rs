// simd.rs — 4-wide float vector used by the box-brush trace path
//
// Thin wrapper over `wide::f32x4`, which lowers to SSE on x86_64. Only
// lanes x, y, z carry data; callers keep w at zero and test masks with
// `any_xyz`.

use std::ops::{Add, Div, Sub};

use wide::{f32x4, CmpGt};

use crate::shared::Vec3;

const XYZ_BITS: u32 = 0b0111;
const ALL_BITS: u32 = 0b1111;

#[derive(Clone, Copy, Debug)]
pub struct F32x4(f32x4);

/// Per-lane comparison result, one bit per lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mask4(u32);

impl F32x4 {
    #[inline]
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        F32x4(f32x4::from([x, y, z, w]))
    }

    /// Load a vector into x, y, z with w = 0.
    #[inline]
    pub fn from_vec3(v: &Vec3) -> Self {
        Self::new(v[0], v[1], v[2], 0.0)
    }

    #[inline]
    pub fn splat(v: f32) -> Self {
        F32x4(f32x4::splat(v))
    }

    #[inline]
    pub fn zero() -> Self {
        Self::splat(0.0)
    }

    /// Lane-wise `if a > b { a } else { b }`, the same rule the scalar
    /// clip uses to clamp entry distances.
    #[inline]
    pub fn max(self, o: Self) -> Self {
        let a = self.to_array();
        let b = o.to_array();
        let mut out = [0.0f32; 4];
        for i in 0..4 {
            out[i] = if a[i] > b[i] { a[i] } else { b[i] };
        }
        F32x4(f32x4::from(out))
    }

    #[inline]
    pub fn cmp_gt(self, o: Self) -> Mask4 {
        Mask4(self.0.cmp_gt(o.0).move_mask() as u32 & ALL_BITS)
    }

    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        self.0.to_array()
    }
}

impl Mask4 {
    #[inline]
    pub fn and(self, o: Self) -> Self {
        Mask4(self.0 & o.0)
    }

    #[inline]
    pub fn or(self, o: Self) -> Self {
        Mask4(self.0 | o.0)
    }

    /// `self & !o`
    #[inline]
    pub fn and_not(self, o: Self) -> Self {
        Mask4(self.0 & !o.0 & ALL_BITS)
    }

    #[inline]
    pub fn any_xyz(self) -> bool {
        self.0 & XYZ_BITS != 0
    }

    #[inline]
    pub fn lane(self, i: usize) -> bool {
        self.0 & (1 << i) != 0
    }
}

macro_rules! lane_binop {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait for F32x4 {
            type Output = F32x4;
            #[inline]
            fn $method(self, o: F32x4) -> F32x4 {
                F32x4(self.0 $op o.0)
            }
        }
    };
}

lane_binop!(Add, add, +);
lane_binop!(Sub, sub, -);
lane_binop!(Div, div, /);
