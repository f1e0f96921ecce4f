//! Permissive normalization of loosely-typed classifier payloads.
//!
//! Every collaborator returns a different ad hoc shape. This module maps
//! those shapes into the canonical [`DiseaseCandidate`] model so that the
//! merge/rank core never sees a vendor payload; adding a new classifier
//! never touches merge logic.
//!
//! Extraction policy: accept any known field-name variant for the name and
//! score, drop any entry lacking a usable name, clamp scores into `[0, 1]`.

use serde_json::Value;

use super::types::DiseaseCandidate;

const NAME_FIELDS: [&str; 4] = ["name", "label", "disease", "title"];
const PROBABILITY_FIELDS: [&str; 3] = ["probability", "score", "confidence"];
const CONTAINER_FIELDS: [&str; 5] = ["diseases", "results", "candidates", "predictions", "suggestions"];
const HEALTH_FIELDS: [&str; 3] = ["is_healthy", "isHealthy", "healthy"];

/// Extracts zero or more candidates from an opaque payload.
///
/// Accepts a bare array of entries, an object carrying one of the known
/// container fields, or a single candidate-shaped object.
#[must_use]
pub fn extract_candidates(payload: &Value) -> Vec<DiseaseCandidate> {
    match payload {
        Value::Array(entries) => entries.iter().filter_map(candidate_from_value).collect(),
        Value::Object(object) => {
            for field in CONTAINER_FIELDS {
                if let Some(Value::Array(entries)) = object.get(field) {
                    return entries.iter().filter_map(candidate_from_value).collect();
                }
            }
            candidate_from_value(payload).into_iter().collect()
        }
        _ => Vec::new(),
    }
}

/// Returns `true` if the payload explicitly asserts the plant is unhealthy.
#[must_use]
pub fn asserts_unhealthy(payload: &Value) -> bool {
    let Value::Object(object) = payload else {
        return false;
    };
    HEALTH_FIELDS
        .iter()
        .any(|field| object.get(*field).and_then(Value::as_bool) == Some(false))
}

fn candidate_from_value(value: &Value) -> Option<DiseaseCandidate> {
    let object = value.as_object()?;

    let name = NAME_FIELDS
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .filter(|name| !name.is_empty())?;

    let probability = PROBABILITY_FIELDS
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_f64))
        .map(|p| p.clamp(0.0, 1.0));

    let description = object
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(String::from);

    let symptoms = object
        .get("symptoms")
        .and_then(Value::as_array)
        .map(|entries| {
            entries.iter().filter_map(Value::as_str).map(str::trim).map(String::from).collect()
        })
        .unwrap_or_default();

    let treatment = object.get("treatment").filter(|v| !v.is_null()).cloned();

    Some(DiseaseCandidate {
        name: name.to_string(),
        probability,
        description,
        symptoms,
        treatment,
    })
}
