use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use models::ShapeCodeModel;
use serde::Serialize;

pub const OCCUPANCY_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OccupancyMetrics {
    pub mse: f32,
    pub accuracy: f32,
    /// Intersection over union of predicted vs. reference inside points.
    pub iou: f32,
    pub points: usize,
}

pub fn occupancy_metrics(pred: &[f32], target: &[f32], threshold: f32) -> OccupancyMetrics {
    let n = pred.len().min(target.len());
    if n == 0 {
        return OccupancyMetrics {
            mse: 0.0,
            accuracy: 0.0,
            iou: 0.0,
            points: 0,
        };
    }
    let mut sq = 0.0f32;
    let mut correct = 0usize;
    let mut inter = 0usize;
    let mut union = 0usize;
    for (p, t) in pred.iter().zip(target.iter()).take(n) {
        sq += (p - t) * (p - t);
        let p_in = *p > threshold;
        let t_in = *t > threshold;
        if p_in == t_in {
            correct += 1;
        }
        if p_in && t_in {
            inter += 1;
        }
        if p_in || t_in {
            union += 1;
        }
    }
    // Both empty counts as a perfect match.
    let iou = if union == 0 {
        1.0
    } else {
        inter as f32 / union as f32
    };
    OccupancyMetrics {
        mse: sq / n as f32,
        accuracy: correct as f32 / n as f32,
        iou,
        points: n,
    }
}

/// Score a per-shape model against `[1, N, 4]` sample points.
pub fn evaluate_shape<B: Backend>(
    model: &ShapeCodeModel<B>,
    points: Tensor<B, 3>,
) -> anyhow::Result<OccupancyMetrics> {
    let [_, n, _] = points.dims();
    let xyz = points.clone().slice([0..1, 0..n, 0..3]);
    let target = points.slice([0..1, 0..n, 3..4]);
    let read = |t: Tensor<B, 3>| {
        t.into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("failed to read occupancy values: {e:?}"))
    };
    let pred = read(model.forward(xyz))?;
    let target = read(target)?;
    Ok(occupancy_metrics(&pred, &target, OCCUPANCY_THRESHOLD))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_prediction() {
        let m = occupancy_metrics(&[0.9, 0.1, 0.8], &[1.0, 0.0, 1.0], 0.5);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.iou, 1.0);
        assert_eq!(m.points, 3);
        assert!(m.mse < 0.03);
    }

    #[test]
    fn iou_counts_only_inside_points() {
        // pred inside: 0,1 ; target inside: 1,2
        let m = occupancy_metrics(&[0.9, 0.9, 0.1, 0.1], &[0.0, 1.0, 1.0, 0.0], 0.5);
        assert!((m.iou - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(m.accuracy, 0.5);
    }

    #[test]
    fn empty_shapes_match() {
        let m = occupancy_metrics(&[0.2, 0.1], &[0.0, 0.0], 0.5);
        assert_eq!(m.iou, 1.0);
        let none = occupancy_metrics(&[], &[], 0.5);
        assert_eq!(none.points, 0);
    }
}
