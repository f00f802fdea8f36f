use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::domain::ReviewDocument;

/// Per-category slice of the exploratory statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryStats {
    pub count: usize,
    pub mean_rating: Option<f64>,
}

/// Exploratory statistics over a populated store. Read-only; computed from
/// the master table contents after population completes.
#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub total_reviews: usize,
    pub unique_reviewers: usize,
    pub unique_products: usize,
    pub mean_rating: Option<f64>,
    /// Review count per rating value 1..=5.
    pub rating_distribution: BTreeMap<u8, usize>,
    pub tier_distribution: BTreeMap<String, usize>,
    pub segment_distribution: BTreeMap<String, usize>,
    pub per_category: BTreeMap<String, CategoryStats>,
    pub best_category: Option<String>,
    pub worst_category: Option<String>,
}

impl StatsReport {
    pub fn compute(documents: &[ReviewDocument]) -> Self {
        let mut reviewers = HashSet::new();
        let mut products = HashSet::new();
        let mut rating_distribution = BTreeMap::new();
        let mut tier_distribution = BTreeMap::new();
        let mut segment_distribution = BTreeMap::new();
        let mut category_ratings: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        let mut rating_sum = 0u64;

        for document in documents {
            reviewers.insert(document.reviewer_id.as_str());
            products.insert(document.product_id.as_str());
            rating_sum += u64::from(document.rating);
            *rating_distribution.entry(document.rating).or_default() += 1;
            *tier_distribution
                .entry(document.rating_tier.as_str().to_string())
                .or_default() += 1;
            *segment_distribution
                .entry(document.commercial_segment.as_str().to_string())
                .or_default() += 1;
            category_ratings
                .entry(document.category.clone())
                .or_default()
                .push(document.rating);
        }

        let mean_rating = if documents.is_empty() {
            None
        } else {
            Some(rating_sum as f64 / documents.len() as f64)
        };

        let per_category: BTreeMap<String, CategoryStats> = category_ratings
            .into_iter()
            .map(|(category, ratings)| {
                let mean = if ratings.is_empty() {
                    None
                } else {
                    Some(
                        ratings.iter().map(|r| f64::from(*r)).sum::<f64>()
                            / ratings.len() as f64,
                    )
                };
                (
                    category,
                    CategoryStats {
                        count: ratings.len(),
                        mean_rating: mean,
                    },
                )
            })
            .collect();

        let mut ranked: Vec<(String, f64)> = per_category
            .iter()
            .filter_map(|(category, stats)| {
                stats.mean_rating.map(|mean| (category.clone(), mean))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let best_category = ranked.first().map(|(category, _)| category.clone());
        let worst_category = ranked.last().map(|(category, _)| category.clone());

        Self {
            total_reviews: documents.len(),
            unique_reviewers: reviewers.len(),
            unique_products: products.len(),
            mean_rating,
            rating_distribution,
            tier_distribution,
            segment_distribution,
            best_category,
            worst_category,
            per_category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CommercialSegment, RatingTier};
    use chrono::NaiveDate;

    fn document(reviewer: &str, product: &str, category: &str, rating: u8) -> ReviewDocument {
        ReviewDocument {
            reviewer_id: reviewer.to_string(),
            product_id: product.to_string(),
            rating,
            review_text: "text".to_string(),
            summary: None,
            reviewer_name: None,
            helpful_votes: None,
            review_date: NaiveDate::from_ymd_opt(2013, 6, 1).unwrap(),
            unix_review_time: 1370044800,
            category: category.to_string(),
            commercial_segment: if category == "Books" {
                CommercialSegment::Entertainment
            } else {
                CommercialSegment::Home
            },
            analysis_type: "General".to_string(),
            rating_tier: if rating >= 5 {
                RatingTier::Excellent
            } else {
                RatingTier::NeedsImprovement
            },
            extra: Default::default(),
        }
    }

    #[test]
    fn computes_distributions_and_uniques() {
        let documents = vec![
            document("A", "P1", "Books", 5),
            document("A", "P2", "Books", 3),
            document("B", "P1", "Home_and_Kitchen", 2),
        ];
        let report = StatsReport::compute(&documents);

        assert_eq!(report.total_reviews, 3);
        assert_eq!(report.unique_reviewers, 2);
        assert_eq!(report.unique_products, 2);
        assert_eq!(report.mean_rating, Some(10.0 / 3.0));
        assert_eq!(report.rating_distribution[&5], 1);
        assert_eq!(report.tier_distribution["excellent"], 1);
        assert_eq!(report.segment_distribution["Entertainment"], 2);
        assert_eq!(report.per_category["Books"].count, 2);
        assert_eq!(report.best_category.as_deref(), Some("Books"));
        assert_eq!(report.worst_category.as_deref(), Some("Home_and_Kitchen"));
    }

    #[test]
    fn empty_input_has_no_mean() {
        let report = StatsReport::compute(&[]);
        assert_eq!(report.total_reviews, 0);
        assert_eq!(report.mean_rating, None);
        assert!(report.best_category.is_none());
        assert!(report.rating_distribution.is_empty());
    }
}
