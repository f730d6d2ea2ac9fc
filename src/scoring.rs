//! Credit-risk ensemble scoring.
//!
//! A request is validated into a [`CreditProfile`] (agency and score checked, score
//! standardized), vectorized in the trained feature order, scaled, and run through the six
//! ensemble members. Their labels are averaged into a risk category.

use crate::artifacts::ModelStore;
use crate::classifiers::{Classifier, StandardScaler};
use crate::errors::{AppError, ResultExt};
use crate::normalize::feature_value;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Feature injected into every vector alongside the raw attributes.
pub const STANDARDIZED_SCORE_FEATURE: &str = "standardized_score";
pub const LOW_RISK_UPPER: f64 = 0.33;
pub const MEDIUM_RISK_UPPER: f64 = 0.66;

/// Credit bureaus whose score scales are understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Agency {
    Experian,
    Equifax,
    TransUnion,
}

impl Agency {
    pub const ALL: [Agency; 3] = [Agency::Experian, Agency::Equifax, Agency::TransUnion];

    pub fn name(&self) -> &'static str {
        match self {
            Agency::Experian => "Experian",
            Agency::Equifax => "Equifax",
            Agency::TransUnion => "TransUnion",
        }
    }

    /// Inclusive score bounds.
    pub fn range(&self) -> (i64, i64) {
        match self {
            Agency::Experian => (0, 999),
            Agency::Equifax => (0, 1000),
            Agency::TransUnion => (0, 710),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    pub fn contains(&self, score: i64) -> bool {
        let (min, max) = self.range();
        (min..=max).contains(&score)
    }

    /// `(score - min) / (max - min)`; callers must check [`Agency::contains`] first.
    pub fn standardize(&self, score: i64) -> f64 {
        let (min, max) = self.range();
        (score - min) as f64 / (max - min) as f64
    }
}

impl fmt::Display for Agency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn agency_list() -> String {
    let names: Vec<&str> = Agency::ALL.iter().map(|a| a.name()).collect();
    format!("[{}]", names.join(", "))
}

/// A validated scoring request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreditProfile {
    pub agency: Agency,
    pub credit_score: i64,
    pub standardized_score: f64,
    pub features: HashMap<String, f64>,
}

impl CreditProfile {
    pub fn new(
        agency: Agency,
        credit_score: i64,
        mut features: HashMap<String, f64>,
    ) -> Result<Self, AppError> {
        if !agency.contains(credit_score) {
            let (min, max) = agency.range();
            return Err(AppError::BadRequest(format!(
                "Invalid credit score for {}. Must be between {} and {}.",
                agency, min, max
            )));
        }
        let standardized_score = agency.standardize(credit_score);
        features.insert("credit_score".to_string(), credit_score as f64);
        features.insert(STANDARDIZED_SCORE_FEATURE.to_string(), standardized_score);
        Ok(Self {
            agency,
            credit_score,
            standardized_score,
            features,
        })
    }

    /// Validates a raw `/predict` payload.
    ///
    /// `agency` and `credit_score` are required; every other field is a feature.
    pub fn from_payload(payload: &Value) -> Result<Self, AppError> {
        let object = match payload {
            Value::Object(map) if !map.is_empty() => map,
            _ => return Err(AppError::BadRequest("Input data is required.".to_string())),
        };

        let agency = object
            .get("agency")
            .and_then(Value::as_str)
            .and_then(Agency::from_name)
            .ok_or_else(|| {
                AppError::BadRequest(format!(
                    "Invalid agency. Choose one of {}",
                    agency_list()
                ))
            })?;

        let credit_score = parse_credit_score(object)?;
        let features = parse_features(object)?;
        Self::new(agency, credit_score, features)
    }

    /// Values in `feature_names` order; absent features are 0.
    pub fn vectorize(&self, feature_names: &[String]) -> Vec<f64> {
        feature_names
            .iter()
            .map(|name| self.features.get(name).copied().unwrap_or(0.0))
            .collect()
    }
}

fn parse_credit_score(object: &Map<String, Value>) -> Result<i64, AppError> {
    let raw = match object.get("credit_score") {
        None | Some(Value::Null) => {
            return Err(AppError::BadRequest("Credit score is required.".to_string()))
        }
        Some(raw) => raw,
    };
    let score = feature_value(raw)
        .map_err(|e| AppError::BadRequest(format!("Invalid credit score: {}", e)))?;
    if score.fract() != 0.0 {
        return Err(AppError::BadRequest(
            "Invalid credit score: must be a whole number.".to_string(),
        ));
    }
    Ok(score as i64)
}

fn parse_features(object: &Map<String, Value>) -> Result<HashMap<String, f64>, AppError> {
    let mut features = HashMap::new();
    for (name, raw) in object {
        if name == "agency" || name == "credit_score" {
            continue;
        }
        let value = feature_value(raw)
            .map_err(|e| AppError::BadRequest(format!("Invalid value for '{}': {}", name, e)))?;
        features.insert(name.clone(), value);
    }
    Ok(features)
}

/// The six ensemble members, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelSlot {
    LogisticRegression,
    DecisionTree,
    RandomForest,
    CatBoost,
    LightGbm,
    Knn,
}

impl ModelSlot {
    pub const ALL: [ModelSlot; 6] = [
        ModelSlot::LogisticRegression,
        ModelSlot::DecisionTree,
        ModelSlot::RandomForest,
        ModelSlot::CatBoost,
        ModelSlot::LightGbm,
        ModelSlot::Knn,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelSlot::LogisticRegression => "Logistic Regression",
            ModelSlot::DecisionTree => "Decision Tree",
            ModelSlot::RandomForest => "Random Forest",
            ModelSlot::CatBoost => "CatBoost",
            ModelSlot::LightGbm => "LightGBM",
            ModelSlot::Knn => "KNN",
        }
    }

    pub fn artifact_file(&self) -> &'static str {
        match self {
            ModelSlot::LogisticRegression => "logreg_model.json",
            ModelSlot::DecisionTree => "tree_model.json",
            ModelSlot::RandomForest => "regr_rfr_model.json",
            ModelSlot::CatBoost => "reg_catb_model.json",
            ModelSlot::LightGbm => "lgbm_model.json",
            ModelSlot::Knn => "knn_model.json",
        }
    }
}

impl fmt::Display for ModelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskCategory {
    #[serde(rename = "Low Risk")]
    Low,
    #[serde(rename = "Medium Risk")]
    Medium,
    #[serde(rename = "High Risk")]
    High,
}

impl RiskCategory {
    /// Boundaries are inclusive on the lower category: 0.33 is Low, 0.66 is Medium.
    pub fn from_average(average: f64) -> Self {
        if average <= LOW_RISK_UPPER {
            RiskCategory::Low
        } else if average <= MEDIUM_RISK_UPPER {
            RiskCategory::Medium
        } else {
            RiskCategory::High
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskCategory::Low => write!(f, "Low Risk"),
            RiskCategory::Medium => write!(f, "Medium Risk"),
            RiskCategory::High => write!(f, "High Risk"),
        }
    }
}

/// Per-model labels with their mean and category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsemblePrediction {
    #[serde(serialize_with = "serialize_labels")]
    pub predictions: Vec<(ModelSlot, u8)>,
    pub average_score: f64,
    pub risk_category: RiskCategory,
}

impl EnsemblePrediction {
    pub fn from_labels(predictions: Vec<(ModelSlot, u8)>) -> Self {
        let total: u32 = predictions.iter().map(|(_, label)| u32::from(*label)).sum();
        let average_score = if predictions.is_empty() {
            0.0
        } else {
            f64::from(total) / predictions.len() as f64
        };
        Self {
            predictions,
            average_score,
            risk_category: RiskCategory::from_average(average_score),
        }
    }

    pub fn label(&self, slot: ModelSlot) -> Option<u8> {
        self.predictions
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, label)| *label)
    }
}

fn serialize_labels<S>(labels: &[(ModelSlot, u8)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(labels.len()))?;
    for (slot, label) in labels {
        map.serialize_entry(slot.display_name(), label)?;
    }
    map.end()
}

/// Scaler, feature order and the six classifiers, shared read-only across requests.
pub struct Ensemble {
    feature_names: Vec<String>,
    scaler: StandardScaler,
    members: Vec<(ModelSlot, Arc<dyn Classifier>)>,
}

impl Ensemble {
    /// Requires exactly one classifier per [`ModelSlot`]; members are kept in slot order.
    pub fn new(
        feature_names: Vec<String>,
        scaler: StandardScaler,
        members: Vec<(ModelSlot, Arc<dyn Classifier>)>,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            scaler.width() == feature_names.len(),
            "scaler covers {} features but {} feature names were given",
            scaler.width(),
            feature_names.len()
        );
        anyhow::ensure!(
            members.len() == ModelSlot::ALL.len(),
            "ensemble needs {} models, got {}",
            ModelSlot::ALL.len(),
            members.len()
        );

        let mut ordered = Vec::with_capacity(ModelSlot::ALL.len());
        for slot in ModelSlot::ALL {
            let mut matching = members.iter().filter(|(s, _)| *s == slot);
            let (_, model) = matching
                .next()
                .ok_or_else(|| anyhow::anyhow!("no model supplied for {}", slot))?;
            anyhow::ensure!(matching.next().is_none(), "{} supplied more than once", slot);
            ordered.push((slot, Arc::clone(model)));
        }

        Ok(Self {
            feature_names,
            scaler,
            members: ordered,
        })
    }

    pub fn from_store(store: ModelStore) -> anyhow::Result<Self> {
        Self::new(store.feature_names, store.scaler, store.models)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn score(&self, profile: &CreditProfile) -> Result<EnsemblePrediction, AppError> {
        let vector = profile.vectorize(&self.feature_names);
        let scaled = self.scaler.transform(&vector).context("scaling features")?;

        let mut labels = Vec::with_capacity(self.members.len());
        for (slot, model) in &self.members {
            let label = model
                .predict(&scaled)
                .with_context(|| format!("{} prediction", slot))?;
            if label > 1 {
                return Err(AppError::InternalError(format!(
                    "{} returned label {}, expected 0 or 1",
                    slot, label
                )));
            }
            labels.push((*slot, label));
        }

        let prediction = EnsemblePrediction::from_labels(labels);
        tracing::debug!(
            "Ensemble average {:.3} -> {}",
            prediction.average_score,
            prediction.risk_category
        );
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(u8);

    impl Classifier for Fixed {
        fn predict(&self, _features: &[f64]) -> anyhow::Result<u8> {
            Ok(self.0)
        }

        fn kind(&self) -> &'static str {
            "fixed"
        }
    }

    fn ensemble(labels: [u8; 6]) -> Ensemble {
        let members = ModelSlot::ALL
            .iter()
            .zip(labels)
            .map(|(slot, label)| (*slot, Arc::new(Fixed(label)) as Arc<dyn Classifier>))
            .collect();
        Ensemble::new(
            vec!["age".to_string(), STANDARDIZED_SCORE_FEATURE.to_string()],
            StandardScaler {
                mean: vec![0.0, 0.0],
                scale: vec![1.0, 1.0],
            },
            members,
        )
        .unwrap()
    }

    #[test]
    fn test_agency_ranges_and_standardize() {
        assert_eq!(Agency::Experian.standardize(0), 0.0);
        assert_eq!(Agency::Experian.standardize(999), 1.0);
        assert_eq!(Agency::Equifax.standardize(500), 0.5);
        assert!(Agency::TransUnion.contains(710));
        assert!(!Agency::TransUnion.contains(711));
        assert_eq!(Agency::from_name("Equifax"), Some(Agency::Equifax));
        assert_eq!(Agency::from_name("equifax"), None);
    }

    #[test]
    fn test_payload_validation_messages() {
        let err = CreditProfile::from_payload(&json!({"agency": "Moody", "credit_score": 10}))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Bad request: Invalid agency. Choose one of [Experian, Equifax, TransUnion]"
        );

        let err = CreditProfile::from_payload(&json!({"agency": "TransUnion", "credit_score": 800}))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Bad request: Invalid credit score for TransUnion. Must be between 0 and 710."
        );

        let err = CreditProfile::from_payload(&json!({"agency": "Experian"})).unwrap_err();
        assert!(err.to_string().contains("Credit score is required."));

        let err = CreditProfile::from_payload(&json!({})).unwrap_err();
        assert!(err.to_string().contains("Input data is required."));

        let err = CreditProfile::from_payload(&json!({"agency": "Experian", "credit_score": 700.5}))
            .unwrap_err();
        assert!(err.to_string().contains("whole number"));

        let err = CreditProfile::from_payload(
            &json!({"agency": "Experian", "credit_score": 700, "age": "thirty"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("'age'"));
    }

    #[test]
    fn test_vectorize_fills_missing_with_zero() {
        let profile = CreditProfile::from_payload(&json!({
            "agency": "Equifax",
            "credit_score": "250",
            "age": 40,
            "owns_car": true,
            "unused": 9
        }))
        .unwrap();
        assert_eq!(profile.standardized_score, 0.25);

        let names: Vec<String> = ["age", "owns_car", "no_of_children", STANDARDIZED_SCORE_FEATURE]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(profile.vectorize(&names), vec![40.0, 1.0, 0.0, 0.25]);
    }

    #[test]
    fn test_risk_category_boundaries() {
        assert_eq!(RiskCategory::from_average(0.0), RiskCategory::Low);
        assert_eq!(RiskCategory::from_average(0.33), RiskCategory::Low);
        assert_eq!(RiskCategory::from_average(0.34), RiskCategory::Medium);
        assert_eq!(RiskCategory::from_average(0.66), RiskCategory::Medium);
        assert_eq!(RiskCategory::from_average(0.67), RiskCategory::High);
        assert_eq!(RiskCategory::from_average(1.0), RiskCategory::High);
        // two of six positive labels is just above the Low bound
        assert_eq!(RiskCategory::from_average(2.0 / 6.0), RiskCategory::Medium);
    }

    #[test]
    fn test_score_averages_six_labels() {
        let profile = CreditProfile::new(Agency::Experian, 500, HashMap::new()).unwrap();
        let prediction = ensemble([1, 0, 1, 0, 0, 0]).score(&profile).unwrap();
        assert_eq!(prediction.predictions.len(), 6);
        assert_eq!(prediction.average_score, 2.0 / 6.0);
        assert_eq!(prediction.risk_category, RiskCategory::Medium);
        assert_eq!(prediction.label(ModelSlot::RandomForest), Some(1));
    }

    #[test]
    fn test_prediction_json_shape() {
        let profile = CreditProfile::new(Agency::Experian, 500, HashMap::new()).unwrap();
        let prediction = ensemble([0; 6]).score(&profile).unwrap();
        let value = serde_json::to_value(&prediction).unwrap();
        assert_eq!(value["predictions"]["Logistic Regression"], 0);
        assert_eq!(value["predictions"]["KNN"], 0);
        assert_eq!(value["average_score"], 0.0);
        assert_eq!(value["risk_category"], "Low Risk");
    }

    #[test]
    fn test_ensemble_requires_every_slot_once() {
        let mut members: Vec<(ModelSlot, Arc<dyn Classifier>)> = ModelSlot::ALL
            .iter()
            .map(|slot| (*slot, Arc::new(Fixed(0)) as Arc<dyn Classifier>))
            .collect();
        members[5].0 = ModelSlot::LogisticRegression;
        let scaler = StandardScaler {
            mean: vec![0.0],
            scale: vec![1.0],
        };
        assert!(Ensemble::new(vec!["age".into()], scaler, members).is_err());
    }

    #[test]
    fn test_out_of_set_label_is_internal_error() {
        let profile = CreditProfile::new(Agency::Experian, 1, HashMap::new()).unwrap();
        let err = ensemble([0, 0, 0, 0, 0, 7]).score(&profile).unwrap_err();
        assert!(matches!(err, AppError::InternalError(_)));
    }
}
