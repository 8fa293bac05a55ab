//! Keyword matching of receipt lines against the cached categories.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::models::{Category, InvoiceItem};

/// Lowercase and strip diacritics so `AÇÚCAR` matches `acucar`.
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Categories with their keywords folded once.
pub struct Categorizer {
    rules: Vec<(String, Vec<String>)>,
}

impl Categorizer {
    /// Rules keep the order given; the first match wins.
    pub fn new(categories: &[Category]) -> Self {
        let rules = categories
            .iter()
            .map(|category| {
                let keywords = category
                    .keywords
                    .iter()
                    .map(|keyword| fold(keyword.trim()))
                    .filter(|keyword| !keyword.is_empty())
                    .collect();
                (category.id.clone(), keywords)
            })
            .collect();

        Self { rules }
    }

    pub fn classify(&self, description: &str) -> Option<&str> {
        let description = fold(description);

        self.rules
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| description.contains(k.as_str())))
            .map(|(id, _)| id.as_str())
    }

    /// Fill `category_id` on items whose product does not already carry one.
    pub fn apply(&self, items: &mut [InvoiceItem]) {
        for item in items {
            let has_category = item.category_id.is_some()
                || item
                    .product
                    .as_ref()
                    .is_some_and(|product| product.category_id.is_some());
            if has_category {
                continue;
            }

            item.category_id = self.classify(item.display_name()).map(str::to_string);
        }
    }
}
