use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which network produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    Trained,
    /// Untrained stand-in used after a model load failure.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    raw_label: String,
    probability: f32,
    source: ModelSource,
}

impl ClassificationResult {
    pub fn new(
        raw_label: impl Into<String>,
        probability: f32,
        source: ModelSource,
    ) -> Result<Self, SchemaError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(SchemaError::Probability(probability));
        }
        Ok(Self {
            raw_label: raw_label.into(),
            probability,
            source,
        })
    }

    pub fn raw_label(&self) -> &str {
        &self.raw_label
    }

    pub fn probability(&self) -> f32 {
        self.probability
    }

    pub fn source(&self) -> ModelSource {
        self.source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    UpperBody,
    LowerBody,
    Shoes,
    Accessories,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::UpperBody => "UpperBody",
            Category::LowerBody => "LowerBody",
            Category::Shoes => "Shoes",
            Category::Accessories => "Accessories",
            Category::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    pub category: Category,
    pub subtype: String,
}

impl CategoryAssignment {
    pub const UNKNOWN_SUBTYPE: &'static str = "Unknown";

    pub fn new(category: Category, subtype: impl Into<String>) -> Self {
        Self {
            category,
            subtype: subtype.into(),
        }
    }

    /// Unknown/Unknown, used when nothing matched or classification failed.
    pub fn unknown() -> Self {
        Self::new(Category::Unknown, Self::UNKNOWN_SUBTYPE)
    }

    pub fn is_unknown(&self) -> bool {
        self.category == Category::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_must_be_in_unit_interval() {
        assert!(ClassificationResult::new("Bag", 0.0, ModelSource::Trained).is_ok());
        assert!(ClassificationResult::new("Bag", 1.0, ModelSource::Trained).is_ok());
        assert_eq!(
            ClassificationResult::new("Bag", 1.01, ModelSource::Trained).unwrap_err(),
            SchemaError::Probability(1.01)
        );
        assert!(ClassificationResult::new("Bag", f32::NAN, ModelSource::Trained).is_err());
    }

    #[test]
    fn unknown_assignment() {
        let unknown = CategoryAssignment::unknown();
        assert!(unknown.is_unknown());
        assert_eq!(unknown.subtype, "Unknown");
        assert_eq!(unknown.category.to_string(), "Unknown");
    }

    #[test]
    fn classification_serializes_camel_case() {
        let result = ClassificationResult::new("Ankle boot", 0.5, ModelSource::Fallback).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["rawLabel"], "Ankle boot");
        assert_eq!(json["source"], "fallback");
    }
}
