//! Per-frame view derived from a camera or light.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

use crate::proxy::CameraProxy;

/// Six normalized clip planes, each `xyz` = inward normal, `w` = distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Extract planes from a view-projection matrix (Gribb–Hartmann) for a
    /// `[0, 1]` clip depth range.
    pub fn from_view_proj(m: Mat4) -> Self {
        let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));
        let planes = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r2,      // near
            r3 - r2, // far
        ]
        .map(|plane| {
            let length = plane.xyz().length();
            if length > 0.0 { plane / length } else { plane }
        });
        Self { planes }
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.xyz().dot(center) + plane.w >= -radius)
    }

    /// Conservative box test: rejects only boxes fully outside one plane.
    pub fn intersects_aabb(&self, min: Vec3, max: Vec3) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.xyz();
            let positive = Vec3::select(normal.cmpge(Vec3::ZERO), max, min);
            normal.dot(positive) + plane.w >= 0.0
        })
    }
}

/// Transform a local AABB by an affine matrix (Arvo's method).
pub fn transform_aabb(transform: &Mat4, min: Vec3, max: Vec3) -> (Vec3, Vec3) {
    let center = (min + max) * 0.5;
    let extent = (max - min) * 0.5;
    let world_center = transform.transform_point3(center);
    let abs_x = transform.x_axis.xyz().abs();
    let abs_y = transform.y_axis.xyz().abs();
    let abs_z = transform.z_axis.xyz().abs();
    let world_extent = abs_x * extent.x + abs_y * extent.y + abs_z * extent.z;
    (world_center - world_extent, world_center + world_extent)
}

/// View and projection of one frame, recomputed every `prepare`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
    pub frustum: Frustum,
}

impl Default for View {
    fn default() -> Self {
        Self::from_matrices(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

impl View {
    /// View of `camera` for a target with the given aspect ratio.
    pub fn from_camera(camera: &CameraProxy, aspect: f32) -> Self {
        let projection = if camera.orthographic {
            let half_h = camera.ortho_height * 0.5;
            let half_w = half_h * aspect;
            Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, camera.near, camera.far)
        } else {
            Mat4::perspective_rh(camera.fov_y, aspect, camera.near, camera.far)
        };
        let mut view = Self::from_matrices(camera.transform.inverse(), projection);
        view.near = camera.near;
        view.far = camera.far;
        view
    }

    /// View from explicit matrices, used for shadow views.
    pub fn from_matrices(view: Mat4, projection: Mat4) -> Self {
        let view_proj = projection * view;
        Self {
            view,
            projection,
            view_proj,
            inv_view_proj: view_proj.inverse(),
            position: view.inverse().w_axis.xyz(),
            near: 0.0,
            far: 1.0,
            frustum: Frustum::from_view_proj(view_proj),
        }
    }

    /// GPU layout of this view.
    pub fn constants(&self) -> ViewConstants {
        ViewConstants {
            view: self.view,
            projection: self.projection,
            view_proj: self.view_proj,
            inv_view_proj: self.inv_view_proj,
            position: self.position.extend(1.0),
            near_far: Vec4::new(self.near, self.far, 0.0, 0.0),
        }
    }
}

/// View data for shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ViewConstants {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    pub position: Vec4,
    pub near_far: Vec4,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_at(position: Vec3) -> CameraProxy {
        CameraProxy {
            transform: Mat4::from_translation(position),
            fov_y: std::f32::consts::FRAC_PI_2,
            near: 0.1,
            far: 100.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_frustum_culls_behind_camera() {
        let view = View::from_camera(&camera_at(Vec3::ZERO), 1.0);
        // Cameras look down -Z.
        assert!(view.frustum.intersects_sphere(Vec3::new(0.0, 0.0, -10.0), 1.0));
        assert!(!view.frustum.intersects_sphere(Vec3::new(0.0, 0.0, 10.0), 1.0));
        assert!(!view.frustum.intersects_sphere(Vec3::new(0.0, 0.0, -200.0), 1.0));
    }

    #[test]
    fn test_aabb_straddling_plane_is_visible() {
        let view = View::from_camera(&camera_at(Vec3::ZERO), 1.0);
        assert!(view
            .frustum
            .intersects_aabb(Vec3::new(-1.0, -1.0, -5.0), Vec3::new(1.0, 1.0, 5.0)));
        assert!(!view
            .frustum
            .intersects_aabb(Vec3::new(50.0, -1.0, -6.0), Vec3::new(52.0, 1.0, -5.0)));
    }

    #[test]
    fn test_camera_position_recovered() {
        let view = View::from_camera(&camera_at(Vec3::new(1.0, 2.0, 3.0)), 16.0 / 9.0);
        assert!(view.position.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-4));
    }

    #[test]
    fn test_transform_aabb_rotated() {
        let rotation = Mat4::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let (min, max) = transform_aabb(&rotation, Vec3::new(0.0, -1.0, 0.0), Vec3::new(2.0, 1.0, 0.0));
        assert!(min.abs_diff_eq(Vec3::new(-1.0, 0.0, 0.0), 1e-5));
        assert!(max.abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-5));
    }
}
