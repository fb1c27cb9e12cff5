//! Judge response parsing.
//!
//! The judge answers with one flat JSON object. Surrounding prose and code
//! fences are tolerated; the first JSON value starting at the first `{` is
//! taken. Totals are stored exactly as reported so the decision step can
//! check them against the criteria.

use serde_json::{Map, Value};

use crate::domain::{
    CategoryScore, CriterionScore, FinalJudgment, JudgeError, Rubric, RubricScore,
};

/// Parse a raw judge payload into a [`RubricScore`] for `rubric`.
///
/// Fails with [`JudgeError::MalformedResponse`] (carrying `raw`) when the
/// payload has no JSON object, contains nested objects, misses any
/// criterion score, category total, category rationale, `total_score` or
/// `final_judgment`, or omits suggestions for a non-passing judgment.
/// A missing `confidence` is read as `0.0`.
pub fn parse_judge_response(raw: &str, rubric: &Rubric) -> Result<RubricScore, JudgeError> {
    let malformed = |reason: String| JudgeError::malformed(reason, raw);

    let text = raw.trim();
    let start = text
        .find('{')
        .ok_or_else(|| malformed("no JSON object found in judge output".to_string()))?;
    let value: Value = serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| malformed("no JSON object found in judge output".to_string()))?
        .map_err(|e| malformed(format!("invalid JSON: {e}")))?;

    let Value::Object(map) = value else {
        return Err(malformed("judge output is not a JSON object".to_string()));
    };
    if let Some((key, _)) = map.iter().find(|(_, v)| v.is_object()) {
        return Err(malformed(format!(
            "key '{key}' holds a nested object; the response must be flat"
        )));
    }

    let mut criteria = Vec::new();
    let mut categories = Vec::new();
    for category in rubric.categories() {
        for criterion in &category.criteria {
            criteria.push(CriterionScore {
                category_id: category.id.clone(),
                criterion_id: criterion.id.clone(),
                score: points(&map, &criterion.id).map_err(&malformed)?,
                ceiling: criterion.ceiling,
            });
        }
        let rationale_key = category.rationale_key();
        let rationale = map
            .get(&rationale_key)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(format!("missing string '{rationale_key}'")))?;
        categories.push(CategoryScore {
            category_id: category.id.clone(),
            reported_total: points(&map, &category.total_key()).map_err(&malformed)?,
            rationale: rationale.trim().to_string(),
        });
    }

    let total_score = points(&map, "total_score").map_err(&malformed)?;
    let final_judgment = map
        .get("final_judgment")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing string 'final_judgment'".to_string()))?
        .parse::<FinalJudgment>()
        .map_err(&malformed)?;

    let confidence = match map.get("confidence") {
        None | Some(Value::Null) => 0.0,
        Some(v) => v
            .as_f64()
            .ok_or_else(|| malformed(format!("'confidence' is not a number: {v}")))?,
    };

    let suggestions = suggestions(&map).map_err(&malformed)?;
    if final_judgment != FinalJudgment::Pass && suggestions.is_empty() {
        return Err(malformed(format!(
            "judgment '{final_judgment}' requires at least one suggestion"
        )));
    }

    Ok(RubricScore {
        criteria,
        categories,
        total_score,
        final_judgment,
        confidence,
        suggestions,
    })
}

/// Non-negative integer points; integer-valued floats are accepted.
fn points(map: &Map<String, Value>, key: &str) -> Result<u32, String> {
    let value = map
        .get(key)
        .ok_or_else(|| format!("missing integer '{key}'"))?;
    let number = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        _ => None,
    };
    number
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| format!("'{key}' must be a non-negative integer, got {value}"))
}

fn suggestions(map: &Map<String, Value>) -> Result<Vec<String>, String> {
    match map.get("suggestions") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(non_empty(std::iter::once(s.as_str()))),
        Some(Value::Array(items)) => {
            let mut texts = Vec::with_capacity(items.len());
            for item in items {
                let text = item
                    .as_str()
                    .ok_or_else(|| format!("suggestion is not a string: {item}"))?;
                texts.push(text);
            }
            Ok(non_empty(texts.into_iter()))
        }
        Some(other) => Err(format!("'suggestions' must be an array of strings, got {other}")),
    }
}

fn non_empty<'a>(texts: impl Iterator<Item = &'a str>) -> Vec<String> {
    texts
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn passing_payload() -> Value {
        json!({
            "objective_fit": 14, "difficulty_fit": 13, "alignment_total": 27,
            "alignment_rationale": "On target.",
            "accuracy": 15, "clarity": 14, "answerability": 9, "content_quality_total": 38,
            "content_quality_rationale": "Correct and clear.",
            "correctness": 15, "pedagogy": 12, "explanation_quality_total": 27,
            "explanation_quality_rationale": "Good steps.",
            "total_score": 92,
            "final_judgment": "pass",
            "confidence": 0.9,
            "suggestions": []
        })
    }

    #[test]
    fn test_parses_flat_payload() {
        let rubric = Rubric::reference();
        let score = parse_judge_response(&passing_payload().to_string(), &rubric).unwrap();
        assert_eq!(score.criteria.len(), 7);
        assert_eq!(score.total_score, 92);
        assert_eq!(score.recomputed_total(), 92);
        assert_eq!(score.final_judgment, FinalJudgment::Pass);
        assert_eq!(score.category("alignment").map(|c| c.reported_total), Some(27));
        assert_eq!(score.criterion("clarity").map(|c| c.ceiling), Some(15));
    }

    #[test]
    fn test_tolerates_surrounding_prose() {
        let rubric = Rubric::reference();
        let raw = format!("Here is my verdict:\n```json\n{}\n```\nThanks.", passing_payload());
        assert!(parse_judge_response(&raw, &rubric).is_ok());
    }

    #[test]
    fn test_missing_confidence_defaults_to_zero() {
        let rubric = Rubric::reference();
        let mut payload = passing_payload();
        payload.as_object_mut().unwrap().remove("confidence");
        let score = parse_judge_response(&payload.to_string(), &rubric).unwrap();
        assert_eq!(score.confidence, 0.0);
    }

    #[test]
    fn test_rejects_nested_objects() {
        let rubric = Rubric::reference();
        let mut payload = passing_payload();
        payload["alignment"] = json!({"objective_fit": 14});
        let err = parse_judge_response(&payload.to_string(), &rubric).unwrap_err();
        assert!(matches!(err, JudgeError::MalformedResponse { ref reason, .. } if reason.contains("nested")));
    }

    #[test]
    fn test_rejects_missing_criterion_and_keeps_raw() {
        let rubric = Rubric::reference();
        let mut payload = passing_payload();
        payload.as_object_mut().unwrap().remove("pedagogy");
        let raw = payload.to_string();
        match parse_judge_response(&raw, &rubric) {
            Err(JudgeError::MalformedResponse { reason, raw: kept }) => {
                assert!(reason.contains("pedagogy"));
                assert_eq!(kept, raw);
            }
            other => panic!("expected malformed response, got {other:?}"),
        }
    }

    #[test]
    fn test_non_pass_requires_suggestions() {
        let rubric = Rubric::reference();
        let mut payload = passing_payload();
        payload["final_judgment"] = json!("needs_revision");
        assert!(parse_judge_response(&payload.to_string(), &rubric).is_err());

        payload["suggestions"] = json!(["Tighten the distractors."]);
        let score = parse_judge_response(&payload.to_string(), &rubric).unwrap();
        assert_eq!(score.suggestions, vec!["Tighten the distractors.".to_string()]);
    }

    #[test]
    fn test_rejects_negative_and_fractional_points() {
        let rubric = Rubric::reference();
        let mut payload = passing_payload();
        payload["clarity"] = json!(-1);
        assert!(parse_judge_response(&payload.to_string(), &rubric).is_err());
        payload["clarity"] = json!(12.5);
        assert!(parse_judge_response(&payload.to_string(), &rubric).is_err());
        payload["clarity"] = json!(14.0);
        assert!(parse_judge_response(&payload.to_string(), &rubric).is_ok());
    }

    #[test]
    fn test_rejects_non_json() {
        let rubric = Rubric::reference();
        assert!(parse_judge_response("I cannot score this.", &rubric).is_err());
    }
}
