use glam::Mat4;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ProjectionUniform {
    pub view_proj: [[f32; 4]; 4],
}

impl From<Mat4> for ProjectionUniform {
    fn from(matrix: Mat4) -> Self {
        Self {
            view_proj: matrix.to_cols_array_2d(),
        }
    }
}

/// Orthographic projection for screen-pixel coordinates with the origin at the
/// bottom-left corner: `[0, width] x [0, height]` maps onto clip space.
pub fn screen_projection(width: u32, height: u32) -> Mat4 {
    Mat4::orthographic_rh(0.0, width as f32, 0.0, height as f32, -1.0, 1.0)
}
