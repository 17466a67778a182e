use glam::{Mat4, Vec3};

const NEAR: f32 = -100.0;
const FAR: f32 = 100.0;

/// Width over height, or `None` while the framebuffer has no area.
pub fn aspect_ratio(width: u32, height: u32) -> Option<f32> {
    if width == 0 || height == 0 {
        None
    } else {
        Some(width as f32 / height as f32)
    }
}

/// Orthographic projection whose horizontal extent follows the aspect ratio
/// while the vertical extent stays at [-1, 1].
pub fn projection(aspect: f32) -> Mat4 {
    Mat4::orthographic_rh_gl(-aspect, aspect, -1.0, 1.0, NEAR, FAR)
}

/// Identity model moved vertically by `cos(time)`.
pub fn model(time: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(0.0, time.cos(), 0.0))
}

pub fn mvp(aspect: f32, time: f32) -> Mat4 {
    projection(aspect) * model(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;
    use std::f32::consts::PI;

    const EPS: f32 = 1e-5;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn zero_sized_framebuffer_has_no_aspect() {
        assert_eq!(aspect_ratio(0, 480), None);
        assert_eq!(aspect_ratio(640, 0), None);
        assert_eq!(aspect_ratio(640, 480), Some(640.0 / 480.0));
    }

    #[test]
    fn horizontal_extent_scales_with_aspect() {
        for &aspect in &[0.25f32, 0.75, 1.0, 4.0 / 3.0, 16.0 / 9.0, 3.0] {
            let p = projection(aspect);
            let right_edge = p * Vec4::new(aspect, 0.0, 0.0, 1.0);
            let top_edge = p * Vec4::new(0.0, 1.0, 0.0, 1.0);
            assert!(close(right_edge.x, 1.0), "aspect {}", aspect);
            assert!(close(top_edge.y, 1.0), "aspect {}", aspect);
            assert!(close(p.x_axis.x * aspect, 1.0));
            assert!(close(p.y_axis.y, 1.0));
        }
    }

    #[test]
    fn translation_follows_cosine_with_period_two_pi() {
        for &t in &[0.0f32, 0.5, 1.0, 2.5, 10.0] {
            let m = model(t);
            assert!(close(m.w_axis.y, t.cos()));
            assert!(close(m.w_axis.x, 0.0));
            assert!(close(m.w_axis.z, 0.0));
            assert!((model(t + 2.0 * PI).w_axis.y - m.w_axis.y).abs() < 1e-4);
        }
    }

    #[test]
    fn combined_transform_is_projection_times_model() {
        let aspect = 640.0 / 480.0;
        let t = 0.7;
        let expected = projection(aspect) * model(t);
        assert_eq!(mvp(aspect, t), expected);
        let corner = mvp(aspect, t) * Vec4::new(aspect, -1.0, 0.0, 1.0);
        assert!(close(corner.x, 1.0));
        assert!(close(corner.y, -1.0 + t.cos()));
    }

    #[test]
    fn start_of_animation_shifts_triangle_up_one_unit() {
        let aspect = 640.0 / 480.0;
        assert_eq!(model(0.0), Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)));
        let m = mvp(aspect, 0.0);
        let scale_y = projection(aspect).y_axis.y;
        assert!(close(m.w_axis.y, 1.0 * scale_y));
        assert!(close(m.w_axis.x, 0.0));
    }

    #[test]
    fn half_period_shifts_triangle_down_one_unit() {
        let aspect = 640.0 / 480.0;
        let up = mvp(aspect, 0.0).w_axis.y;
        let down = mvp(aspect, PI).w_axis.y;
        assert!(close(down, -1.0));
        assert!(close(up - down, 2.0));
    }
}
