//! Rubric model: categories, criteria, point ceilings and judgment thresholds.
//!
//! A [`Rubric`] can only be obtained through [`load_rubric`] (or
//! [`Rubric::reference`]), which validates the configured ceilings and
//! thresholds. Totals are always derived from the configured categories.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::domain::score::FinalJudgment;

/// Keys of the flat judge payload that are not derived from rubric ids.
pub const RESERVED_WIRE_KEYS: [&str; 4] =
    ["total_score", "final_judgment", "confidence", "suggestions"];

/// Suffix of the per-category total key in the flat judge payload.
pub const TOTAL_SUFFIX: &str = "_total";

/// Suffix of the per-category rationale key in the flat judge payload.
pub const RATIONALE_SUFFIX: &str = "_rationale";

// ---------------------------------------------------------------------------
// Raw configuration form
// ---------------------------------------------------------------------------

/// Criterion as written in configuration. Ceilings are signed so that a
/// negative value is reported as a rubric error instead of a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionConfig {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub ceiling: i64,
}

/// Category as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: String,
    pub ceiling: i64,
    #[serde(default)]
    pub criteria: Vec<CriterionConfig>,
}

/// Rubric as written in configuration (`[rubric]` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricConfig {
    pub pass_threshold: i64,
    pub fail_threshold: i64,
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
}

// ---------------------------------------------------------------------------
// Validated model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Criterion {
    pub id: String,
    pub description: String,
    pub ceiling: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: String,
    pub label: String,
    pub description: String,
    pub ceiling: u32,
    pub criteria: Vec<Criterion>,
}

impl Category {
    /// Key carrying this category's total in the flat judge payload.
    pub fn total_key(&self) -> String {
        format!("{}{}", self.id, TOTAL_SUFFIX)
    }

    /// Key carrying this category's rationale in the flat judge payload.
    pub fn rationale_key(&self) -> String {
        format!("{}{}", self.id, RATIONALE_SUFFIX)
    }
}

/// Ordered judgment bands: `total >= pass` is Pass, `fail <= total < pass`
/// is NeedsRevision, `total < fail` is Fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgmentThresholds {
    pub pass: u32,
    pub fail: u32,
}

impl JudgmentThresholds {
    pub fn classify(&self, total: u32) -> FinalJudgment {
        if total >= self.pass {
            FinalJudgment::Pass
        } else if total >= self.fail {
            FinalJudgment::NeedsRevision
        } else {
            FinalJudgment::Fail
        }
    }
}

/// Immutable, validated scoring rubric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rubric {
    categories: Vec<Category>,
    thresholds: JudgmentThresholds,
    total_ceiling: u32,
}

impl Rubric {
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn thresholds(&self) -> JudgmentThresholds {
        self.thresholds
    }

    /// Sum of all category ceilings.
    pub fn total_ceiling(&self) -> u32 {
        self.total_ceiling
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Every criterion paired with its owning category, in rubric order.
    pub fn criteria(&self) -> impl Iterator<Item = (&Category, &Criterion)> {
        self.categories
            .iter()
            .flat_map(|cat| cat.criteria.iter().map(move |crit| (cat, crit)))
    }

    pub fn labels(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.label.as_str()).collect()
    }

    /// The 100-point reference rubric for assessment items.
    pub fn reference() -> Self {
        let categories = vec![
            category(
                "alignment",
                "Alignment",
                "Fit to the target learner and learning objective.",
                &[
                    ("objective_fit", "Targets the stated objective and domain tags.", 15),
                    ("difficulty_fit", "Matches the requested difficulty and proficiency band.", 15),
                ],
            ),
            category(
                "content_quality",
                "Content Quality",
                "Correctness and clarity of the item itself.",
                &[
                    ("accuracy", "Facts, computations and the keyed answer are correct.", 15),
                    ("clarity", "Wording is unambiguous and well formed.", 15),
                    ("answerability", "Exactly one defensible answer; distractors are plausible.", 10),
                ],
            ),
            category(
                "explanation_quality",
                "Explanation Quality",
                "Usefulness of the worked explanation.",
                &[
                    ("correctness", "Explanation reaches the keyed answer without errors.", 15),
                    ("pedagogy", "Explanation teaches the underlying reasoning step by step.", 15),
                ],
            ),
        ];
        let total_ceiling = categories.iter().map(|c| c.ceiling).sum();
        Self {
            categories,
            thresholds: JudgmentThresholds { pass: 80, fail: 60 },
            total_ceiling,
        }
    }
}

fn category(id: &str, label: &str, description: &str, criteria: &[(&str, &str, u32)]) -> Category {
    let criteria: Vec<Criterion> = criteria
        .iter()
        .map(|(id, description, ceiling)| Criterion {
            id: (*id).to_string(),
            description: (*description).to_string(),
            ceiling: *ceiling,
        })
        .collect();
    Category {
        id: id.to_string(),
        label: label.to_string(),
        description: description.to_string(),
        ceiling: criteria.iter().map(|c| c.ceiling).sum(),
        criteria,
    }
}

fn valid_id(id: &str) -> bool {
    let mut chars = id.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn ceiling(value: i64, what: &str) -> Result<u32, ConfigError> {
    if value <= 0 {
        return Err(ConfigError::InvalidRubric(format!(
            "{what} ceiling must be positive, got {value}"
        )));
    }
    u32::try_from(value)
        .map_err(|_| ConfigError::InvalidRubric(format!("{what} ceiling {value} is too large")))
}

/// Validate a rubric configuration.
///
/// Fails when ceilings are non-positive or inconsistent (criteria must sum to
/// their category ceiling), ids are malformed or collide on the judge wire
/// format, or thresholds violate `fail < pass <= total`.
pub fn load_rubric(config: &RubricConfig) -> Result<Rubric, ConfigError> {
    if config.categories.is_empty() {
        return Err(ConfigError::InvalidRubric(
            "rubric must define at least one category".to_string(),
        ));
    }

    let mut wire_keys: HashSet<String> = RESERVED_WIRE_KEYS.iter().map(|k| k.to_string()).collect();
    let mut category_ids = HashSet::new();
    let mut categories = Vec::with_capacity(config.categories.len());
    let mut total: u32 = 0;

    for cat in &config.categories {
        if !valid_id(&cat.id) {
            return Err(ConfigError::InvalidRubric(format!(
                "category id '{}' must be lowercase snake_case",
                cat.id
            )));
        }
        if !category_ids.insert(cat.id.clone()) {
            return Err(ConfigError::InvalidRubric(format!(
                "duplicate category id '{}'",
                cat.id
            )));
        }
        if cat.criteria.is_empty() {
            return Err(ConfigError::InvalidRubric(format!(
                "category '{}' has no criteria",
                cat.id
            )));
        }

        let cat_ceiling = ceiling(cat.ceiling, &format!("category '{}'", cat.id))?;
        let mut criteria = Vec::with_capacity(cat.criteria.len());
        let mut criteria_sum: u32 = 0;
        for crit in &cat.criteria {
            if !valid_id(&crit.id) {
                return Err(ConfigError::InvalidRubric(format!(
                    "criterion id '{}' must be lowercase snake_case",
                    crit.id
                )));
            }
            if !wire_keys.insert(crit.id.clone()) {
                return Err(ConfigError::InvalidRubric(format!(
                    "criterion id '{}' is duplicated or collides with a reserved key",
                    crit.id
                )));
            }
            let crit_ceiling = ceiling(crit.ceiling, &format!("criterion '{}'", crit.id))?;
            criteria_sum = criteria_sum.checked_add(crit_ceiling).ok_or_else(|| {
                ConfigError::InvalidRubric(format!(
                    "criteria ceilings of category '{}' overflow",
                    cat.id
                ))
            })?;
            criteria.push(Criterion {
                id: crit.id.clone(),
                description: crit.description.clone(),
                ceiling: crit_ceiling,
            });
        }

        if criteria_sum != cat_ceiling {
            return Err(ConfigError::InvalidRubric(format!(
                "criteria of category '{}' sum to {criteria_sum}, expected {cat_ceiling}",
                cat.id
            )));
        }

        let category = Category {
            id: cat.id.clone(),
            label: cat.label.clone().unwrap_or_else(|| cat.id.clone()),
            description: cat.description.clone(),
            ceiling: cat_ceiling,
            criteria,
        };
        for key in [category.total_key(), category.rationale_key()] {
            if !wire_keys.insert(key.clone()) {
                return Err(ConfigError::InvalidRubric(format!(
                    "wire key '{key}' of category '{}' collides with another key",
                    cat.id
                )));
            }
        }

        total = total.checked_add(cat_ceiling).ok_or_else(|| {
            ConfigError::InvalidRubric("category ceilings overflow the rubric total".to_string())
        })?;
        categories.push(category);
    }

    let to_u32 = |v: i64| u32::try_from(v).unwrap_or(u32::MAX);
    let invalid = || ConfigError::InvalidThresholds {
        fail: to_u32(config.fail_threshold.max(0)),
        pass: to_u32(config.pass_threshold.max(0)),
        total,
    };
    if config.fail_threshold < 0 || config.pass_threshold < 0 {
        return Err(invalid());
    }
    let fail = to_u32(config.fail_threshold);
    let pass = to_u32(config.pass_threshold);
    if !(fail < pass && pass <= total) {
        return Err(invalid());
    }

    Ok(Rubric {
        categories,
        thresholds: JudgmentThresholds { pass, fail },
        total_ceiling: total,
    })
}

impl TryFrom<&RubricConfig> for Rubric {
    type Error = ConfigError;

    fn try_from(config: &RubricConfig) -> Result<Self, Self::Error> {
        load_rubric(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> RubricConfig {
        RubricConfig {
            pass_threshold: 7,
            fail_threshold: 4,
            categories: vec![CategoryConfig {
                id: "core".into(),
                label: Some("Core".into()),
                description: String::new(),
                ceiling: 10,
                criteria: vec![
                    CriterionConfig { id: "a".into(), description: String::new(), ceiling: 6 },
                    CriterionConfig { id: "b".into(), description: String::new(), ceiling: 4 },
                ],
            }],
        }
    }

    #[test]
    fn test_reference_rubric_totals_one_hundred() {
        let rubric = Rubric::reference();
        assert_eq!(rubric.total_ceiling(), 100);
        assert_eq!(rubric.categories().len(), 3);
        assert_eq!(rubric.criteria().count(), 7);
        assert_eq!(
            rubric.labels(),
            vec!["Alignment", "Content Quality", "Explanation Quality"]
        );
    }

    #[test]
    fn test_reference_rubric_passes_its_own_validation() {
        let rubric = Rubric::reference();
        let config = RubricConfig {
            pass_threshold: 80,
            fail_threshold: 60,
            categories: rubric
                .categories()
                .iter()
                .map(|c| CategoryConfig {
                    id: c.id.clone(),
                    label: Some(c.label.clone()),
                    description: c.description.clone(),
                    ceiling: i64::from(c.ceiling),
                    criteria: c
                        .criteria
                        .iter()
                        .map(|k| CriterionConfig {
                            id: k.id.clone(),
                            description: k.description.clone(),
                            ceiling: i64::from(k.ceiling),
                        })
                        .collect(),
                })
                .collect(),
        };
        assert_eq!(load_rubric(&config).unwrap(), rubric);
    }

    #[test]
    fn test_total_is_derived_not_hard_coded() {
        let rubric = load_rubric(&small()).unwrap();
        assert_eq!(rubric.total_ceiling(), 10);
        assert_eq!(rubric.thresholds(), JudgmentThresholds { pass: 7, fail: 4 });
    }

    #[test]
    fn test_overflowing_ceilings_are_rejected() {
        let mut cfg = small();
        cfg.categories[0].ceiling = i64::from(u32::MAX);
        cfg.categories[0].criteria[0].ceiling = i64::from(u32::MAX);
        cfg.categories[0].criteria[1].ceiling = 1;
        let err = load_rubric(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRubric(_)));
        assert!(err.to_string().contains("overflow"));

        let mut cfg = small();
        let mut second = cfg.categories[0].clone();
        second.id = "extra".into();
        second.ceiling = i64::from(u32::MAX);
        second.criteria = vec![CriterionConfig {
            id: "c".into(),
            description: String::new(),
            ceiling: i64::from(u32::MAX),
        }];
        cfg.categories.push(second);
        let err = load_rubric(&cfg).unwrap_err();
        assert!(err.to_string().contains("overflow"));
    }

    #[test]
    fn test_criteria_must_sum_to_category_ceiling() {
        let mut cfg = small();
        cfg.categories[0].criteria[1].ceiling = 3;
        let err = load_rubric(&cfg).unwrap_err();
        assert!(err.to_string().contains("sum to 9"));
    }

    #[test]
    fn test_negative_ceiling_is_rejected() {
        let mut cfg = small();
        cfg.categories[0].criteria[0].ceiling = -6;
        assert!(matches!(load_rubric(&cfg), Err(ConfigError::InvalidRubric(_))));
    }

    #[test]
    fn test_thresholds_must_be_strictly_ordered() {
        let mut cfg = small();
        cfg.fail_threshold = 7;
        assert!(matches!(
            load_rubric(&cfg),
            Err(ConfigError::InvalidThresholds { fail: 7, pass: 7, total: 10 })
        ));

        let mut cfg = small();
        cfg.pass_threshold = 11;
        assert!(matches!(
            load_rubric(&cfg),
            Err(ConfigError::InvalidThresholds { .. })
        ));
    }

    #[test]
    fn test_pass_threshold_may_equal_total() {
        let mut cfg = small();
        cfg.pass_threshold = 10;
        assert!(load_rubric(&cfg).is_ok());
    }

    #[test]
    fn test_reserved_and_duplicate_ids_are_rejected() {
        let mut cfg = small();
        cfg.categories[0].criteria[0].id = "total_score".into();
        assert!(load_rubric(&cfg).is_err());

        let mut cfg = small();
        cfg.categories[0].criteria[1].id = "a".into();
        assert!(load_rubric(&cfg).is_err());

        let mut cfg = small();
        cfg.categories[0].criteria[0].id = "core_total".into();
        assert!(load_rubric(&cfg).is_err());
    }

    #[test]
    fn test_empty_rubric_and_empty_category_are_rejected() {
        let mut cfg = small();
        cfg.categories.clear();
        assert!(load_rubric(&cfg).is_err());

        let mut cfg = small();
        cfg.categories[0].criteria.clear();
        assert!(load_rubric(&cfg).is_err());
    }

    #[test]
    fn test_classify_boundaries() {
        let t = JudgmentThresholds { pass: 80, fail: 60 };
        assert_eq!(t.classify(80), FinalJudgment::Pass);
        assert_eq!(t.classify(79), FinalJudgment::NeedsRevision);
        assert_eq!(t.classify(60), FinalJudgment::NeedsRevision);
        assert_eq!(t.classify(59), FinalJudgment::Fail);
    }

    #[test]
    fn test_category_wire_keys() {
        let rubric = Rubric::reference();
        let cat = rubric.category("alignment").unwrap();
        assert_eq!(cat.total_key(), "alignment_total");
        assert_eq!(cat.rationale_key(), "alignment_rationale");
    }
}
