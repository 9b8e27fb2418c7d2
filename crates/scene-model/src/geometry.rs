//! Points, frames, and centroids.
//!
//! A [`Frame`] is the rectangle in scene pixels onto which normalized feed
//! coordinates are projected. Its width and height are always positive.

use serde::{Deserialize, Serialize};

use phyvision_common::config::AspectRatio;
use phyvision_common::error::{PhyvisionError, PhyvisionResult};

/// A 2D point, either normalized or in scene pixels depending on the stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Whether both coordinates lie in `[0, 1]`.
    pub fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

/// A rectangle in scene pixel space.
///
/// Construct through [`Frame::new`] or [`Frame::from_aspect`]; deserialization
/// applies the same validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFrame", into = "RawFrame")]
pub struct Frame {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

#[derive(Serialize, Deserialize)]
struct RawFrame {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

impl TryFrom<RawFrame> for Frame {
    type Error = PhyvisionError;

    fn try_from(raw: RawFrame) -> Result<Self, Self::Error> {
        Frame::new(raw.x, raw.y, raw.w, raw.h)
    }
}

impl From<Frame> for RawFrame {
    fn from(frame: Frame) -> Self {
        Self {
            x: frame.x,
            y: frame.y,
            w: frame.w,
            h: frame.h,
        }
    }
}

impl Frame {
    /// Create a frame, rejecting non-finite values and non-positive sizes.
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> PhyvisionResult<Self> {
        if !(x.is_finite() && y.is_finite()) {
            return Err(PhyvisionError::invalid_frame(format!(
                "origin must be finite, got ({x}, {y})"
            )));
        }
        if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
            return Err(PhyvisionError::invalid_frame(format!(
                "size must be positive, got {w}x{h}"
            )));
        }
        Ok(Self { x, y, w, h })
    }

    /// Frame at the origin with `width` and a height derived from `aspect`.
    pub fn from_aspect(width: f64, aspect: AspectRatio) -> PhyvisionResult<Self> {
        Self::new(0.0, 0.0, width, aspect.height_for(width))
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn w(&self) -> f64 {
        self.w
    }

    pub fn h(&self) -> f64 {
        self.h
    }

    /// The center point of this frame.
    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// Check if a scene point is within this frame (edges inclusive).
    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Project a normalized point into scene pixels.
    pub fn to_scene_space(&self, p: &Point) -> Point {
        Point::new(self.x + p.x * self.w, self.y + p.y * self.h)
    }

    /// Inverse of [`Frame::to_scene_space`].
    pub fn to_normalized(&self, p: &Point) -> Point {
        Point::new((p.x - self.x) / self.w, (p.y - self.y) / self.h)
    }

    /// Same size, new origin.
    pub fn moved_to(&self, x: f64, y: f64) -> PhyvisionResult<Self> {
        Self::new(x, y, self.w, self.h)
    }

    /// Same origin, new size.
    pub fn resized(&self, w: f64, h: f64) -> PhyvisionResult<Self> {
        Self::new(self.x, self.y, w, h)
    }
}

/// Mean position of one cluster plus its member count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
    /// Number of points in the cluster. Always at least 1.
    pub size: usize,
}

impl Centroid {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_maps_corners_into_frame() {
        let frame = Frame::new(10.0, 20.0, 100.0, 50.0).unwrap();
        assert_eq!(frame.to_scene_space(&Point::new(0.0, 0.0)), Point::new(10.0, 20.0));
        assert_eq!(frame.to_scene_space(&Point::new(1.0, 1.0)), Point::new(110.0, 70.0));
    }

    #[test]
    fn test_rejects_non_positive_size() {
        assert!(Frame::new(0.0, 0.0, 0.0, 10.0).is_err());
        assert!(Frame::new(0.0, 0.0, 10.0, -1.0).is_err());
        assert!(Frame::new(f64::NAN, 0.0, 10.0, 10.0).is_err());
        assert!(Frame::new(-50.0, -50.0, 10.0, 10.0).is_ok());
    }

    #[test]
    fn test_from_aspect() {
        let frame = Frame::from_aspect(1920.0, "16:9".parse().unwrap()).unwrap();
        assert_eq!((frame.x(), frame.y()), (0.0, 0.0));
        assert!((frame.h() - 1080.0).abs() < 1e-9);
    }

    #[test]
    fn test_center_and_contains() {
        let frame = Frame::new(100.0, 100.0, 200.0, 100.0).unwrap();
        assert_eq!(frame.center(), Point::new(200.0, 150.0));
        assert!(frame.contains(&Point::new(100.0, 100.0)));
        assert!(frame.contains(&Point::new(300.0, 200.0)));
        assert!(!frame.contains(&Point::new(99.0, 150.0)));
    }

    #[test]
    fn test_move_keeps_size_and_resize_keeps_origin() {
        let frame = Frame::new(0.0, 0.0, 640.0, 360.0).unwrap();
        let moved = frame.moved_to(-20.0, 35.0).unwrap();
        assert_eq!((moved.w(), moved.h()), (640.0, 360.0));

        let resized = moved.resized(800.0, 450.0).unwrap();
        assert_eq!((resized.x(), resized.y()), (-20.0, 35.0));
        assert!(moved.resized(0.0, 450.0).is_err());
    }

    #[test]
    fn test_frame_deserialization_validates() {
        let ok: Frame = serde_json::from_str(r#"{"x":1,"y":2,"w":3,"h":4}"#).unwrap();
        assert_eq!(ok.w(), 3.0);
        assert!(serde_json::from_str::<Frame>(r#"{"x":1,"y":2,"w":0,"h":4}"#).is_err());

        let json = serde_json::to_string(&ok).unwrap();
        assert_eq!(json, r#"{"x":1.0,"y":2.0,"w":3.0,"h":4.0}"#);
    }

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-9);
        assert!(Point::new(0.5, 1.0).is_normalized());
        assert!(!Point::new(1.5, 0.0).is_normalized());
    }

    proptest! {
        #[test]
        fn normalized_mapping_inverts(
            fx in -5000.0f64..5000.0,
            fy in -5000.0f64..5000.0,
            fw in 1.0f64..10000.0,
            fh in 1.0f64..10000.0,
            px in 0.0f64..=1.0,
            py in 0.0f64..=1.0,
        ) {
            let frame = Frame::new(fx, fy, fw, fh).unwrap();
            let scene = frame.to_scene_space(&Point::new(px, py));
            let back = frame.to_normalized(&scene);
            prop_assert!((back.x - px).abs() < 1e-9);
            prop_assert!((back.y - py).abs() < 1e-9);
            prop_assert!(frame.contains(&scene));
        }
    }
}
