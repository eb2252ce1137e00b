//! Scalar types and the dense vector used for whole-system state

use std::ops::{
    Add, AddAssign, Deref, DerefMut, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign,
};

/// Scalar type for physics calculations (f64 for precision)
pub type Scalar = f64;

/// 3D vector type used when composing scenes out of point masses
pub type Vector = bevy::math::DVec3;

/// Dense vector of scalars with elementwise arithmetic
///
/// Used for the concatenated position/velocity state, the mass vector,
/// generalized forces and Lagrange multipliers. Binary operators between two
/// `VecN`s are elementwise and require equal lengths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VecN(Vec<Scalar>);

impl VecN {
    pub fn new(values: Vec<Scalar>) -> Self {
        Self(values)
    }

    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Copy of `count` elements starting at `start`
    pub fn slice(&self, start: usize, count: usize) -> Self {
        Self(self.0[start..start + count].to_vec())
    }

    pub fn concat(a: &[Scalar], b: &[Scalar]) -> Self {
        let mut values = Vec::with_capacity(a.len() + b.len());
        values.extend_from_slice(a);
        values.extend_from_slice(b);
        Self(values)
    }

    pub fn dot(&self, other: &[Scalar]) -> Scalar {
        debug_assert_eq!(self.len(), other.len());
        self.iter().zip(other).map(|(a, b)| a * b).sum()
    }

    pub fn sum(&self) -> Scalar {
        self.iter().sum()
    }

    /// Elementwise reciprocal
    pub fn recip(&self) -> Self {
        self.map(|value| 1.0 / value)
    }

    pub fn map(&self, f: impl Fn(Scalar) -> Scalar) -> Self {
        Self(self.iter().map(|&value| f(value)).collect())
    }

    /// `self += other * factor`
    pub fn add_scaled(&mut self, other: &[Scalar], factor: Scalar) {
        debug_assert_eq!(self.len(), other.len());
        for (a, b) in self.0.iter_mut().zip(other) {
            *a += b * factor;
        }
    }

    pub fn fill(&mut self, value: Scalar) {
        self.0.fill(value);
    }

    /// Resize to `len` and zero every element, keeping the allocation
    pub fn reset(&mut self, len: usize) {
        self.0.clear();
        self.0.resize(len, 0.0);
    }

    pub fn push(&mut self, value: Scalar) {
        self.0.push(value);
    }

    pub fn push_vector(&mut self, vector: Vector) {
        self.0.extend_from_slice(&[vector.x, vector.y, vector.z]);
    }

    /// Read three consecutive components starting at `offset` as a `Vector`
    pub fn vector_at(&self, offset: usize) -> Vector {
        Vector::new(self.0[offset], self.0[offset + 1], self.0[offset + 2])
    }
}

impl Deref for VecN {
    type Target = [Scalar];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for VecN {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<Scalar>> for VecN {
    fn from(values: Vec<Scalar>) -> Self {
        Self(values)
    }
}

impl From<&[Scalar]> for VecN {
    fn from(values: &[Scalar]) -> Self {
        Self(values.to_vec())
    }
}

impl<const N: usize> From<[Scalar; N]> for VecN {
    fn from(values: [Scalar; N]) -> Self {
        Self(values.to_vec())
    }
}

impl Extend<Scalar> for VecN {
    fn extend<I: IntoIterator<Item = Scalar>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl FromIterator<Scalar> for VecN {
    fn from_iter<I: IntoIterator<Item = Scalar>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

macro_rules! impl_elementwise_op {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident, $op:tt) => {
        impl $assign_trait<&VecN> for VecN {
            fn $assign_method(&mut self, rhs: &VecN) {
                debug_assert_eq!(self.len(), rhs.len());
                for (a, b) in self.0.iter_mut().zip(rhs.iter()) {
                    *a = *a $op *b;
                }
            }
        }

        impl $trait<&VecN> for VecN {
            type Output = VecN;

            fn $method(mut self, rhs: &VecN) -> VecN {
                self.$assign_method(rhs);
                self
            }
        }

        impl $trait<VecN> for VecN {
            type Output = VecN;

            fn $method(mut self, rhs: VecN) -> VecN {
                self.$assign_method(&rhs);
                self
            }
        }

        impl $trait<&VecN> for &VecN {
            type Output = VecN;

            fn $method(self, rhs: &VecN) -> VecN {
                self.clone().$method(rhs)
            }
        }

        impl $trait<Scalar> for VecN {
            type Output = VecN;

            fn $method(mut self, rhs: Scalar) -> VecN {
                for a in self.0.iter_mut() {
                    *a = *a $op rhs;
                }
                self
            }
        }

        impl $trait<Scalar> for &VecN {
            type Output = VecN;

            fn $method(self, rhs: Scalar) -> VecN {
                self.clone().$method(rhs)
            }
        }
    };
}

impl_elementwise_op!(Add, add, AddAssign, add_assign, +);
impl_elementwise_op!(Sub, sub, SubAssign, sub_assign, -);
impl_elementwise_op!(Mul, mul, MulAssign, mul_assign, *);
impl_elementwise_op!(Div, div, DivAssign, div_assign, /);

impl MulAssign<Scalar> for VecN {
    fn mul_assign(&mut self, rhs: Scalar) {
        for a in self.0.iter_mut() {
            *a *= rhs;
        }
    }
}

impl Mul<VecN> for Scalar {
    type Output = VecN;

    fn mul(self, rhs: VecN) -> VecN {
        rhs * self
    }
}

impl Mul<&VecN> for Scalar {
    type Output = VecN;

    fn mul(self, rhs: &VecN) -> VecN {
        rhs * self
    }
}

impl Neg for VecN {
    type Output = VecN;

    fn neg(mut self) -> VecN {
        for a in self.0.iter_mut() {
            *a = -*a;
        }
        self
    }
}

impl Neg for &VecN {
    type Output = VecN;

    fn neg(self) -> VecN {
        -self.clone()
    }
}
