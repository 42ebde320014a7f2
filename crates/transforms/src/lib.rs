//! 2D rigid-body transforms and pose algebra for localization and
//! scan matching.
//!
//! Two views of relative motion are used in the stack:
//! - [`Transform2D`]: a rigid transform (rotation + translation), used where
//!   frames compose.
//! - [`Move2D`]: a forward/sideward/rotation triple in the robot frame, the
//!   natural parameterization for the scan matcher's hill climb.

use nalgebra::{Isometry2, Vector2};
use std::f64::consts::PI;
use types::Pose;

/// A 2D rigid body transform (translation + rotation).
#[derive(Debug, Clone, Copy)]
pub struct Transform2D {
    inner: Isometry2<f64>,
}

impl Transform2D {
    /// Create identity transform.
    pub fn identity() -> Self {
        Self {
            inner: Isometry2::identity(),
        }
    }

    /// Create transform from translation and rotation angle.
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self {
            inner: Isometry2::new(Vector2::new(x, y), theta),
        }
    }

    /// Create from a Pose struct.
    pub fn from_pose(pose: &Pose) -> Self {
        Self::new(pose.x, pose.y, pose.theta)
    }

    /// Convert to a Pose struct.
    pub fn to_pose(&self) -> Pose {
        Pose {
            x: self.inner.translation.x,
            y: self.inner.translation.y,
            theta: self.inner.rotation.angle(),
        }
    }

    /// Get translation component.
    pub fn translation(&self) -> Vector2<f64> {
        self.inner.translation.vector
    }

    /// Get rotation angle in radians.
    pub fn rotation(&self) -> f64 {
        self.inner.rotation.angle()
    }

    /// Compute inverse transform.
    pub fn inverse(&self) -> Self {
        Self {
            inner: self.inner.inverse(),
        }
    }

    /// Compose transforms: self * other.
    /// If self is A->B and other is B->C, result is A->C.
    pub fn compose(&self, other: &Transform2D) -> Transform2D {
        Transform2D {
            inner: self.inner * other.inner,
        }
    }

    /// Transform a point from child frame to parent frame.
    pub fn transform_point(&self, point: Vector2<f64>) -> Vector2<f64> {
        self.inner
            .transform_point(&nalgebra::Point2::from(point))
            .coords
    }

    /// Compute relative transform: from self to other.
    /// If self is A and other is B (both in same frame), returns A->B.
    pub fn relative_to(&self, other: &Transform2D) -> Transform2D {
        Transform2D {
            inner: self.inner.inverse() * other.inner,
        }
    }
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for Transform2D {
    type Output = Transform2D;

    fn mul(self, rhs: Transform2D) -> Transform2D {
        self.compose(&rhs)
    }
}

impl std::ops::Mul<&Transform2D> for &Transform2D {
    type Output = Transform2D;

    fn mul(self, rhs: &Transform2D) -> Transform2D {
        self.compose(rhs)
    }
}

/// Relative motion expressed in the robot frame: forward along the heading,
/// sideward to the right, and a rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Move2D {
    pub forward: f64,
    pub sideward: f64,
    pub rotation: f64,
}

impl Move2D {
    pub const ZERO: Move2D = Move2D {
        forward: 0.0,
        sideward: 0.0,
        rotation: 0.0,
    };

    pub fn new(forward: f64, sideward: f64, rotation: f64) -> Self {
        Self {
            forward,
            sideward,
            rotation,
        }
    }

    /// Decompose the motion from `start` to `end` into the start frame.
    pub fn between(start: &Pose, end: &Pose) -> Move2D {
        let (sin_t, cos_t) = start.theta.sin_cos();
        Move2D {
            forward: (end.y - start.y) * sin_t + (end.x - start.x) * cos_t,
            sideward: -(end.y - start.y) * cos_t + (end.x - start.x) * sin_t,
            rotation: angle_diff(start.theta, end.theta),
        }
    }

    /// Apply the move to a pose.
    pub fn apply(&self, start: &Pose) -> Pose {
        if *self == Move2D::ZERO {
            return *start;
        }
        let (sin_t, cos_t) = start.theta.sin_cos();
        Pose {
            x: start.x + cos_t * self.forward + sin_t * self.sideward,
            y: start.y + sin_t * self.forward - cos_t * self.sideward,
            theta: normalize_angle(start.theta + self.rotation),
        }
    }

    /// The pose reached by applying the move to the origin.
    pub fn origin_pose(&self) -> Pose {
        if *self == Move2D::ZERO {
            return Pose::default();
        }
        Pose {
            x: self.forward,
            y: -self.sideward,
            theta: normalize_angle(self.rotation),
        }
    }

    /// The pose from which applying the move ends at the origin.
    pub fn backwards_origin_pose(&self) -> Pose {
        if *self == Move2D::ZERO {
            return Pose::default();
        }
        let theta = normalize_angle(-self.rotation);
        let (sin_t, cos_t) = theta.sin_cos();
        Pose {
            x: -cos_t * self.forward - sin_t * self.sideward,
            y: -sin_t * self.forward + cos_t * self.sideward,
            theta,
        }
    }

    /// Translational length of the move.
    pub fn length(&self) -> f64 {
        self.forward.hypot(self.sideward)
    }
}

/// World-frame endpoint of a range reading taken from `pose` at beam
/// angle `angle` (sensor frame).
pub fn laser_endpoint(pose: &Pose, range: f64, angle: f64) -> (f64, f64) {
    (
        pose.x + (angle + pose.theta).cos() * range,
        pose.y + (angle + pose.theta).sin() * range,
    )
}

/// Normalize angle to (-PI, PI].
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// Shortest angular difference from `a` to `b`.
pub fn angle_diff(a: f64, b: f64) -> f64 {
    normalize_angle(b - a)
}
