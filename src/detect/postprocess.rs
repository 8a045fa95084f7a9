//! Post-processing of raw model output.
//!
//! Drops non-finite and low-confidence detections, clips boxes to the frame,
//! orders by confidence, suppresses overlapping boxes of the same label and
//! caps the count.

use crate::detect::result::Detection;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_MAX_DETECTIONS: usize = 100;

#[derive(Clone, Debug, PartialEq)]
pub struct Postprocess {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for Postprocess {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

impl Postprocess {
    pub fn apply(&self, raw: Vec<Detection>) -> Vec<Detection> {
        let mut candidates: Vec<Detection> = raw
            .into_iter()
            .filter(|d| d.confidence.is_finite() && d.bbox.is_finite())
            .filter(|d| d.confidence >= self.confidence_threshold)
            .map(|mut d| {
                d.confidence = d.confidence.clamp(0.0, 1.0);
                d.bbox = d.bbox.clamped();
                d
            })
            .filter(|d| d.bbox.area() > 0.0)
            .collect();

        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if kept.len() >= self.max_detections {
                break;
            }
            let overlaps = kept.iter().any(|k| {
                k.label == candidate.label && k.bbox.iou(&candidate.bbox) > self.iou_threshold
            });
            if !overlaps {
                kept.push(candidate);
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn det(label: &str, confidence: f32, x: f32) -> Detection {
        Detection::new(label, confidence, BoundingBox::new(x, 0.1, 0.3, 0.3))
    }

    #[test]
    fn drops_low_confidence_and_orders_by_score() {
        let post = Postprocess::default();
        let out = post.apply(vec![det("a", 0.6, 0.0), det("b", 0.2, 0.5), det("c", 0.9, 0.6)]);
        let labels: Vec<_> = out.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["c", "a"]);
    }

    #[test]
    fn suppresses_overlapping_boxes_with_same_label() {
        let post = Postprocess::default();
        let out = post.apply(vec![
            det("card", 0.7, 0.10),
            det("card", 0.9, 0.12),
            det("person", 0.8, 0.11),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].label, "card");
        assert_eq!(out[0].confidence, 0.9);
        assert_eq!(out[1].label, "person");
    }

    #[test]
    fn rejects_non_finite_values() {
        let post = Postprocess::default();
        let mut bad_box = det("a", 0.9, 0.0);
        bad_box.bbox.width = f32::NAN;
        let out = post.apply(vec![det("b", f32::NAN, 0.0), bad_box]);
        assert!(out.is_empty());
    }

    #[test]
    fn caps_detection_count() {
        let post = Postprocess {
            max_detections: 2,
            ..Postprocess::default()
        };
        let out = post.apply(vec![
            det("a", 0.9, 0.0),
            det("b", 0.8, 0.0),
            det("c", 0.7, 0.0),
        ]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn clips_boxes_to_frame() {
        let post = Postprocess::default();
        let out = post.apply(vec![Detection::new(
            "a",
            0.9,
            BoundingBox::new(0.8, -0.1, 0.5, 0.3),
        )]);
        assert_eq!(out.len(), 1);
        let b = out[0].bbox;
        assert!((b.x + b.width - 1.0).abs() < 1e-6);
        assert_eq!(b.y, 0.0);
    }
}
