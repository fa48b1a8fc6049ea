// shared.rs — vector math, planes and contents flags shared by every crate

pub type Vec3 = [f32; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

// ============================================================
// Contents
// ============================================================

bitflags::bitflags! {
    /// What kind of matter fills a brush or leaf.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Contents: i32 {
        const EMPTY        = 1 << 0;
        const SOLID        = 1 << 1;
        const WATER        = 1 << 2;
        const SLIME        = 1 << 3;
        const LAVA         = 1 << 4;
        const SKY          = 1 << 5;
        const ORIGIN       = 1 << 6;
        const CURRENT_0    = 1 << 7;
        const CURRENT_90   = 1 << 8;
        const CURRENT_180  = 1 << 9;
        const CURRENT_270  = 1 << 10;
        const CURRENT_UP   = 1 << 11;
        const CURRENT_DOWN = 1 << 12;
        const TRANSLUCENT  = 1 << 13;
        const HINT         = 1 << 14;
        const NULL         = 1 << 15;
        const BOUNDINGBOX  = 1 << 16;
        const TOEMPTY      = 1 << 17;
        const PROP         = 1 << 18;

        const MASK_SOLID = Self::SOLID.bits();
        const MASK_WATER = Self::WATER.bits() | Self::SLIME.bits() | Self::LAVA.bits();
        const MASK_CURRENT = Self::CURRENT_0.bits()
            | Self::CURRENT_90.bits()
            | Self::CURRENT_180.bits()
            | Self::CURRENT_270.bits()
            | Self::CURRENT_UP.bits()
            | Self::CURRENT_DOWN.bits();
        const MASK_ALL = -1;
    }
}

impl Contents {
    /// Keeps unknown bits from level data instead of dropping them.
    #[inline]
    pub fn from_raw(bits: i32) -> Self {
        Self::from_bits_retain(bits)
    }
}

// ============================================================
// Vector helpers
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Dot product against the absolute value of each component of `b`.
#[inline]
pub fn dot_product_abs(a: &Vec3, b: &Vec3) -> f32 {
    (a[0] * b[0]).abs() + (a[1] * b[1]).abs() + (a[2] * b[2]).abs()
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

/// `start + scale * dir`
#[inline]
pub fn vector_ma(start: &Vec3, scale: f32, dir: &Vec3) -> Vec3 {
    [
        start[0] + scale * dir[0],
        start[1] + scale * dir[1],
        start[2] + scale * dir[2],
    ]
}

#[inline]
pub fn vector_lerp(a: &Vec3, b: &Vec3, t: f32) -> Vec3 {
    [
        a[0] + t * (b[0] - a[0]),
        a[1] + t * (b[1] - a[1]),
        a[2] + t * (b[2] - a[2]),
    ]
}

#[inline]
pub fn vector_length_squared(v: &Vec3) -> f32 {
    dot_product(v, v)
}

// ============================================================
// Planes
// ============================================================

/// Axis classification stored with every plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PlaneAxis {
    X,
    Y,
    Z,
    #[default]
    Other,
}

impl PlaneAxis {
    /// Decode the on-disk type tag. Tags 0..=2 are axial, anything else
    /// (including the "mostly X/Y/Z" tags 3..=5) is treated as general.
    pub fn from_raw(tag: i32) -> Self {
        match tag {
            0 => PlaneAxis::X,
            1 => PlaneAxis::Y,
            2 => PlaneAxis::Z,
            _ => PlaneAxis::Other,
        }
    }

    #[inline]
    pub fn index(self) -> Option<usize> {
        match self {
            PlaneAxis::X => Some(0),
            PlaneAxis::Y => Some(1),
            PlaneAxis::Z => Some(2),
            PlaneAxis::Other => None,
        }
    }

    pub fn from_index(axis: usize) -> Self {
        match axis {
            0 => PlaneAxis::X,
            1 => PlaneAxis::Y,
            2 => PlaneAxis::Z,
            _ => PlaneAxis::Other,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
    pub axis: PlaneAxis,
    /// Bit `i` set when `normal[i]` is negative.
    pub signbits: u8,
}

impl Plane {
    pub fn new(normal: Vec3, dist: f32, axis: PlaneAxis) -> Self {
        let mut signbits = 0u8;
        for (i, n) in normal.iter().enumerate() {
            if *n < 0.0 {
                signbits |= 1 << i;
            }
        }
        Plane {
            normal,
            dist,
            axis,
            signbits,
        }
    }

    /// Build a plane and derive its axis tag from the normal.
    pub fn from_normal(normal: Vec3, dist: f32) -> Self {
        let axis = (0..3)
            .find(|&i| normal[i].abs() == 1.0)
            .map(PlaneAxis::from_index)
            .unwrap_or(PlaneAxis::Other);
        Plane::new(normal, dist, axis)
    }

    /// Signed distance of `p` from the plane. Axial planes skip the dot product.
    ///
    /// This is the one side test used by both the hull check and the leaf
    /// locator, so the two can never disagree about which child a point
    /// belongs to.
    #[inline]
    pub fn distance_to(&self, p: &Vec3) -> f32 {
        match self.axis.index() {
            Some(a) => p[a] * self.normal[a] - self.dist,
            None => dot_product(&self.normal, p) - self.dist,
        }
    }

    /// Half-size of a box with the given half-extents, projected on the normal.
    #[inline]
    pub fn extent_offset(&self, extents: &Vec3) -> f32 {
        match self.axis.index() {
            Some(a) => extents[a],
            None => dot_product_abs(extents, &self.normal),
        }
    }

    /// Which side of the plane an axis-aligned box lies on.
    pub fn box_side(&self, mins: &Vec3, maxs: &Vec3) -> BoxSide {
        if let Some(a) = self.axis.index() {
            // axial planes are stored facing +axis in node planes
            let lo = mins[a] * self.normal[a];
            let hi = maxs[a] * self.normal[a];
            let (near, far) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            if self.dist <= near {
                return BoxSide::Front;
            }
            if self.dist >= far {
                return BoxSide::Back;
            }
            return BoxSide::Both;
        }

        // the corner furthest along the normal and the one furthest against it
        let mut front = [0.0f32; 3];
        let mut back = [0.0f32; 3];
        for i in 0..3 {
            if self.signbits & (1 << i) != 0 {
                front[i] = mins[i];
                back[i] = maxs[i];
            } else {
                front[i] = maxs[i];
                back[i] = mins[i];
            }
        }
        let dist1 = dot_product(&self.normal, &front);
        let dist2 = dot_product(&self.normal, &back);

        let in_front = dist1 >= self.dist;
        let in_back = dist2 < self.dist;
        match (in_front, in_back) {
            (true, false) => BoxSide::Front,
            (false, true) => BoxSide::Back,
            _ => BoxSide::Both,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxSide {
    Front,
    Back,
    Both,
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contents_values() {
        assert_eq!(Contents::EMPTY.bits(), 1);
        assert_eq!(Contents::SOLID.bits(), 2);
        assert_eq!(Contents::PROP.bits(), 1 << 18);
        assert!(Contents::MASK_WATER.contains(Contents::SLIME));
        assert!(!Contents::MASK_WATER.contains(Contents::SOLID));
        assert!(Contents::MASK_ALL.contains(Contents::PROP | Contents::SOLID));
    }

    #[test]
    fn test_contents_from_raw_keeps_unknown_bits() {
        let c = Contents::from_raw(1 << 30 | 2);
        assert_eq!(c.bits(), 1 << 30 | 2);
        assert!(c.intersects(Contents::SOLID));
    }

    #[test]
    fn test_dot_product_abs() {
        let e = [1.0, 2.0, 3.0];
        let n = [0.0, -1.0, 0.0];
        assert_eq!(dot_product_abs(&e, &n), 2.0);
        assert_eq!(dot_product(&e, &n), -2.0);
    }

    #[test]
    fn test_vector_lerp_endpoints() {
        let a = [0.0, 0.0, 0.0];
        let b = [10.0, -4.0, 2.0];
        assert_eq!(vector_lerp(&a, &b, 0.0), a);
        assert_eq!(vector_lerp(&a, &b, 1.0), b);
        assert_eq!(vector_lerp(&a, &b, 0.5), [5.0, -2.0, 1.0]);
    }

    #[test]
    fn test_plane_signbits() {
        let p = Plane::new([-1.0, 0.0, -0.0], 4.0, PlaneAxis::X);
        assert_eq!(p.signbits, 0b001, "-0.0 is not negative");
        let p = Plane::new([-0.6, 0.0, -0.8], 4.0, PlaneAxis::Other);
        assert_eq!(p.signbits, 0b101);
    }

    #[test]
    fn test_plane_from_normal_classifies_axis() {
        assert_eq!(Plane::from_normal([0.0, 0.0, 1.0], 0.0).axis, PlaneAxis::Z);
        assert_eq!(Plane::from_normal([0.0, -1.0, 0.0], 0.0).axis, PlaneAxis::Y);
        assert_eq!(
            Plane::from_normal([0.6, 0.8, 0.0], 0.0).axis,
            PlaneAxis::Other
        );
    }

    #[test]
    fn test_axial_distance_matches_dot_product() {
        let planes = [
            Plane::new([1.0, 0.0, 0.0], 3.0, PlaneAxis::X),
            Plane::new([0.0, -1.0, 0.0], -2.0, PlaneAxis::Y),
            Plane::new([0.0, 0.0, 1.0], 7.5, PlaneAxis::Z),
        ];
        let points = [[1.0, 2.0, 3.0], [-5.0, 0.25, 100.0], [3.0, 2.0, 7.5]];
        for plane in &planes {
            for p in &points {
                let general = dot_product(&plane.normal, p) - plane.dist;
                assert_eq!(
                    plane.distance_to(p),
                    general,
                    "axial fast path disagrees for {:?} at {:?}",
                    plane,
                    p
                );
            }
        }
    }

    #[test]
    fn test_extent_offset() {
        let e = [1.0, 2.0, 3.0];
        let axial = Plane::new([0.0, 0.0, 1.0], 0.0, PlaneAxis::Z);
        assert_eq!(axial.extent_offset(&e), 3.0);
        let slanted = Plane::new([0.6, -0.8, 0.0], 0.0, PlaneAxis::Other);
        assert!((slanted.extent_offset(&e) - (0.6 + 1.6)).abs() < 1e-6);
    }

    #[test]
    fn test_box_side_axial() {
        let p = Plane::new([0.0, 0.0, 1.0], 5.0, PlaneAxis::Z);
        assert_eq!(p.box_side(&[0.0, 0.0, 6.0], &[1.0, 1.0, 8.0]), BoxSide::Front);
        assert_eq!(p.box_side(&[0.0, 0.0, 0.0], &[1.0, 1.0, 4.0]), BoxSide::Back);
        assert_eq!(p.box_side(&[0.0, 0.0, 0.0], &[1.0, 1.0, 8.0]), BoxSide::Both);
    }

    #[test]
    fn test_box_side_general() {
        let n = [std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2, 0.0];
        let p = Plane::new(n, 0.0, PlaneAxis::Other);
        assert_eq!(p.box_side(&[1.0, 1.0, 0.0], &[2.0, 2.0, 1.0]), BoxSide::Front);
        assert_eq!(p.box_side(&[-2.0, -2.0, 0.0], &[-1.0, -1.0, 1.0]), BoxSide::Back);
        assert_eq!(p.box_side(&[-1.0, -1.0, 0.0], &[1.0, 1.0, 1.0]), BoxSide::Both);
    }
}
