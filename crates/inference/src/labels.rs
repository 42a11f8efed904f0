/// Output classes of the garment model, indexed by logit position.
pub const GARMENT_CLASSES: [&str; 10] = [
    "T-shirt/top",
    "Trouser",
    "Pullover",
    "Dress",
    "Coat",
    "Sandal",
    "Shirt",
    "Sneaker",
    "Bag",
    "Ankle boot",
];

pub const NUM_CLASSES: usize = GARMENT_CLASSES.len();

/// Label of the output at `index`, if the model has one.
pub fn label_for(index: usize) -> Option<&'static str> {
    GARMENT_CLASSES.get(index).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_output_order() {
        assert_eq!(label_for(0), Some("T-shirt/top"));
        assert_eq!(label_for(7), Some("Sneaker"));
        assert_eq!(label_for(NUM_CLASSES - 1), Some("Ankle boot"));
        assert_eq!(label_for(NUM_CLASSES), None);
    }
}
