//! Normalized-to-scene coordinate mapping.

use phyvision_scene_model::geometry::{Frame, Point};

/// Project a normalized point into scene pixels through `frame`.
pub fn to_scene_space(point: &Point, frame: &Frame) -> Point {
    frame.to_scene_space(point)
}

/// Inverse of [`to_scene_space`].
pub fn to_normalized(point: &Point, frame: &Frame) -> Point {
    frame.to_normalized(point)
}

/// Map a whole feed batch. Points outside `[0, 1]` are mapped as-is and
/// land outside the frame.
pub fn map_points(points: &[Point], frame: &Frame) -> Vec<Point> {
    let outside = points.iter().filter(|p| !p.is_normalized()).count();
    if outside > 0 {
        tracing::trace!(outside, "Feed points outside the normalized range");
    }
    points.iter().map(|p| frame.to_scene_space(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corner_mapping() {
        let frame = Frame::new(10.0, 20.0, 100.0, 50.0).unwrap();
        let mapped = map_points(&[Point::new(0.0, 0.0), Point::new(1.0, 1.0)], &frame);
        assert_eq!(mapped, vec![Point::new(10.0, 20.0), Point::new(110.0, 70.0)]);
    }

    #[test]
    fn test_center_maps_to_frame_center() {
        let frame = Frame::new(-200.0, 0.0, 400.0, 300.0).unwrap();
        assert_eq!(
            to_scene_space(&Point::new(0.5, 0.5), &frame),
            frame.center()
        );
        assert_eq!(
            to_normalized(&frame.center(), &frame),
            Point::new(0.5, 0.5)
        );
    }

    #[test]
    fn test_out_of_range_points_are_kept() {
        let frame = Frame::new(0.0, 0.0, 100.0, 100.0).unwrap();
        let mapped = map_points(&[Point::new(1.5, -0.5)], &frame);
        assert_eq!(mapped, vec![Point::new(150.0, -50.0)]);
    }
}
