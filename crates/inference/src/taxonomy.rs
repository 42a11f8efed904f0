//! Buckets raw classifier labels into wardrobe categories by keyword.

use schema::{Category, CategoryAssignment, ClassificationResult};

/// A category and the lowercase substrings that select it.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRule<'a> {
    pub category: Category,
    pub keywords: &'a [&'a str],
}

/// Checked in order; the first category with a matching keyword wins.
pub const DEFAULT_RULES: &[CategoryRule<'static>] = &[
    CategoryRule {
        category: Category::UpperBody,
        keywords: &[
            "shirt", "jersey", "sweater", "jacket", "coat", "blazer", "hoodie", "t-shirt",
            "blouse", "top", "pullover",
        ],
    },
    CategoryRule {
        category: Category::LowerBody,
        keywords: &["pants", "jeans", "trouser", "shorts", "skirt", "leggings", "dress"],
    },
    CategoryRule {
        category: Category::Shoes,
        keywords: &["shoe", "sneaker", "boot", "sandal", "slipper", "footwear"],
    },
    CategoryRule {
        category: Category::Accessories,
        keywords: &["bag"],
    },
];

#[derive(Debug, Clone, Copy)]
pub struct CategoryMapper<'a> {
    rules: &'a [CategoryRule<'a>],
}

impl Default for CategoryMapper<'static> {
    fn default() -> Self {
        Self::new(DEFAULT_RULES)
    }
}

impl<'a> CategoryMapper<'a> {
    pub fn new(rules: &'a [CategoryRule<'a>]) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &'a [CategoryRule<'a>] {
        self.rules
    }

    pub fn map_label(&self, raw_label: &str) -> CategoryAssignment {
        let label = raw_label.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| label.contains(k)))
            .map(|rule| CategoryAssignment::new(rule.category, label.clone()))
            .unwrap_or_else(CategoryAssignment::unknown)
    }

    pub fn map_to_category(&self, result: &ClassificationResult) -> CategoryAssignment {
        self.map_label(result.raw_label())
    }
}

/// [`CategoryMapper::map_to_category`] with the default rules.
pub fn map_to_category(result: &ClassificationResult) -> CategoryAssignment {
    CategoryMapper::default().map_to_category(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::GARMENT_CLASSES;
    use schema::ModelSource;

    fn result(label: &str) -> ClassificationResult {
        ClassificationResult::new(label, 0.9, ModelSource::Trained).unwrap()
    }

    #[test]
    fn sneaker_is_shoes() {
        let assignment = map_to_category(&result("Sneaker"));
        assert_eq!(assignment.category, Category::Shoes);
        assert_eq!(assignment.subtype, "sneaker");
    }

    #[test]
    fn bag_is_accessory() {
        let assignment = map_to_category(&result("Bag"));
        assert_eq!(assignment.category, Category::Accessories);
        assert_eq!(assignment.subtype, "bag");
    }

    #[test]
    fn unmatched_label_is_unknown() {
        let assignment = map_to_category(&result("XYZ-unknown-123"));
        assert_eq!(assignment, CategoryAssignment::unknown());
        assert!(assignment.is_unknown());
    }

    #[test]
    fn first_declared_category_wins() {
        let assignment = map_to_category(&result("shirt-dress"));
        assert_eq!(assignment.category, Category::UpperBody);
        assert_eq!(assignment.subtype, "shirt-dress");
    }

    #[test]
    fn rule_order_decides_not_keyword_order() {
        let rules = [
            CategoryRule {
                category: Category::LowerBody,
                keywords: &["dress"],
            },
            CategoryRule {
                category: Category::UpperBody,
                keywords: &["shirt"],
            },
        ];
        let mapper = CategoryMapper::new(&rules);
        assert_eq!(mapper.map_label("shirt-dress").category, Category::LowerBody);
    }

    #[test]
    fn mapping_is_pure() {
        let r = result("Ankle boot");
        assert_eq!(map_to_category(&r), map_to_category(&r));
        assert_eq!(map_to_category(&r).category, Category::Shoes);
    }

    #[test]
    fn every_model_class_has_a_category() {
        let expected = [
            Category::UpperBody,
            Category::LowerBody,
            Category::UpperBody,
            Category::LowerBody,
            Category::UpperBody,
            Category::Shoes,
            Category::UpperBody,
            Category::Shoes,
            Category::Accessories,
            Category::Shoes,
        ];
        for (label, category) in GARMENT_CLASSES.iter().zip(expected) {
            assert_eq!(map_to_category(&result(label)).category, category, "{label}");
        }
    }
}
