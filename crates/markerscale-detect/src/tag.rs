//! Adapter for an external fiducial-tag decoder.
//!
//! Decoding tags is not done here. A decoder only has to report tag ids and
//! their four corners on a grayscale copy of the photo; the marker corners
//! are then taken from the tags printed at known corner positions.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use markerscale_core::{order_corners, GrayImageView, Quad};

/// One decoded tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TagDetection {
    pub id: u32,
    /// Tag corners in any order.
    pub corners: [Point2<f64>; 4],
}

pub trait TagDecoder {
    fn detect_tags(&self, img: &GrayImageView<'_>) -> Vec<TagDetection>;
}

impl<F> TagDecoder for F
where
    F: Fn(&GrayImageView<'_>) -> Vec<TagDetection>,
{
    fn detect_tags(&self, img: &GrayImageView<'_>) -> Vec<TagDetection> {
        self(img)
    }
}

/// Decoder for setups without tags; always reports nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTagDecoder;

impl TagDecoder for NoTagDecoder {
    fn detect_tags(&self, _img: &GrayImageView<'_>) -> Vec<TagDetection> {
        Vec::new()
    }
}

/// Tag id printed at each marker corner, `[TL, TR, BR, BL]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagLayout {
    pub ids: [u32; 4],
}

impl Default for TagLayout {
    fn default() -> Self {
        Self { ids: [0, 1, 2, 3] }
    }
}

impl TagLayout {
    pub fn slot_of(&self, id: u32) -> Option<usize> {
        self.ids.iter().position(|&i| i == id)
    }
}

/// Marker outline from corner tags, or `None` unless all four are present.
///
/// Each tag contributes its outermost corner: the one occupying the same
/// slot in the tag's own ordered corners as the tag does on the marker.
/// Repeated ids keep the first detection.
pub fn marker_quad_from_tags(tags: &[TagDetection], layout: &TagLayout) -> Option<Quad> {
    let mut slots: [Option<Point2<f64>>; 4] = [None; 4];
    for tag in tags {
        let Some(slot) = layout.slot_of(tag.id) else {
            continue;
        };
        if slots[slot].is_none() {
            slots[slot] = Some(order_corners(tag.corners)[slot]);
        }
    }
    Some(Quad::from_unordered([slots[0]?, slots[1]?, slots[2]?, slots[3]?]))
}
