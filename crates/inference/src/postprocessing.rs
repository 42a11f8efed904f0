use crate::errors::ClassifierError;
use crate::labels::{NUM_CLASSES, label_for};
use ndarray::ArrayD;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub index: usize,
    pub label: &'static str,
    pub probability: f32,
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Turns the garment model's raw output for a single image into its most
/// likely class.
pub fn top_prediction(output: &ArrayD<f32>) -> Result<Prediction, ClassifierError> {
    let logits: Vec<f32> = output.iter().copied().collect();
    if logits.len() != NUM_CLASSES {
        return Err(ClassifierError::inference(format!(
            "expected {} outputs, got shape {:?}",
            NUM_CLASSES,
            output.shape()
        )));
    }
    if logits.iter().any(|v| !v.is_finite()) {
        return Err(ClassifierError::inference("model produced non-finite logits"));
    }

    let probabilities = softmax(&logits);
    let index = argmax(&probabilities)
        .ok_or_else(|| ClassifierError::inference("empty model output"))?;
    let label = label_for(index)
        .ok_or_else(|| ClassifierError::inference(format!("no label for class {index}")))?;

    Ok(Prediction {
        index,
        label,
        probability: probabilities[index].clamp(0.0, 1.0),
    })
}
