//! Search space declarations and validation.

use hs_types::{Assignment, ParameterValue, SearchError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name as passed to the model constructor (e.g. "C").
    pub name: String,
    /// The domain values are drawn from.
    pub kind: ParameterKind,
}

/// Describes the domain of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Continuous uniform range [low, high].
    RealRange { low: f64, high: f64 },
    /// Fixed, ordered set of choices.
    Categorical { choices: Vec<Value> },
}

impl ParameterKind {
    fn validate(&self, name: &str) -> Result<(), SearchError> {
        match self {
            Self::IntRange { low, high } => {
                if low > high {
                    return Err(SearchError::invalid_space(
                        name,
                        format!("low ({low}) must be less than or equal to high ({high})"),
                    ));
                }
            }
            Self::RealRange { low, high } => {
                if !low.is_finite() || !high.is_finite() {
                    return Err(SearchError::invalid_space(name, "range bounds must be finite"));
                }
                if low > high {
                    return Err(SearchError::invalid_space(
                        name,
                        format!("low ({low}) must be less than or equal to high ({high})"),
                    ));
                }
                if !(high - low).is_finite() {
                    return Err(SearchError::invalid_space(name, "range width overflows f64"));
                }
            }
            Self::Categorical { choices } => {
                if choices.is_empty() {
                    return Err(SearchError::invalid_space(name, "choice list is empty"));
                }
            }
        }
        Ok(())
    }

    /// Whether `value` lies in this domain with the matching representation.
    pub fn contains(&self, value: &ParameterValue) -> bool {
        match (self, value) {
            (Self::IntRange { low, high }, ParameterValue::Int(v)) => low <= v && v <= high,
            (Self::RealRange { low, high }, ParameterValue::Float(v)) => {
                *low <= *v && *v <= *high
            }
            (Self::Categorical { choices }, v) => choices.contains(&v.to_json()),
            _ => false,
        }
    }

    /// Uniform draw from the domain.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterValue {
        match self {
            Self::IntRange { low, high } => ParameterValue::Int(rng.gen_range(*low..=*high)),
            Self::RealRange { low, high } => ParameterValue::Float(rng.gen_range(*low..=*high)),
            Self::Categorical { choices } => {
                let idx = rng.gen_range(0..choices.len());
                ParameterValue::Choice(choices[idx].clone())
            }
        }
    }

    /// Number of distinct grid points, `None` for continuous ranges.
    pub fn grid_len(&self) -> Option<usize> {
        match self {
            Self::IntRange { low, high } => usize::try_from(high.checked_sub(*low)?)
                .ok()?
                .checked_add(1),
            Self::Categorical { choices } => Some(choices.len()),
            Self::RealRange { .. } => None,
        }
    }

    /// Number of points on this dimension's grid axis. Real ranges are
    /// split into `float_steps` evenly spaced points (at least the two
    /// endpoints); integer spans too wide for `usize` saturate.
    pub fn axis_len(&self, float_steps: usize) -> usize {
        match self {
            Self::RealRange { low, high } if low == high => 1,
            Self::RealRange { .. } => float_steps.max(2),
            Self::IntRange { .. } | Self::Categorical { .. } => {
                self.grid_len().unwrap_or(usize::MAX)
            }
        }
    }

    /// The `index`-th point of the grid axis, computed on demand.
    /// `index` must be below [`ParameterKind::axis_len`].
    pub fn axis_value(&self, index: usize, float_steps: usize) -> ParameterValue {
        match self {
            Self::RealRange { low, high } => {
                let steps = self.axis_len(float_steps);
                if steps == 1 {
                    return ParameterValue::Float(*low);
                }
                let t = index as f64 / (steps - 1) as f64;
                ParameterValue::Float((low + t * (high - low)).min(*high))
            }
            Self::IntRange { low, high } => {
                let value = i128::from(*low) + index as i128;
                ParameterValue::Int(i64::try_from(value).map_or(*high, |v| v.min(*high)))
            }
            Self::Categorical { choices } => {
                ParameterValue::Choice(choices.get(index).cloned().unwrap_or(Value::Null))
            }
        }
    }
}

/// Raw, not yet validated description of one parameter's domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    /// Ordered pair of numeric bounds.
    Range(Value, Value),
    /// Verbatim list of choices.
    Choices(Vec<Value>),
    /// Untyped JSON, classified by its shape.
    Json(Value),
}

impl Declaration {
    pub fn int(low: i64, high: i64) -> Self {
        Self::Range(Value::from(low), Value::from(high))
    }

    /// Non-finite bounds become JSON `null` and are rejected on validation.
    pub fn real(low: f64, high: f64) -> Self {
        Self::Range(Value::from(low), Value::from(high))
    }

    pub fn choices<I, V>(choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Choices(choices.into_iter().map(Into::into).collect())
    }

    fn classify(self, name: &str) -> Result<ParameterKind, SearchError> {
        let kind = match self {
            Self::Range(low, high) => range_kind(name, &low, &high)?,
            Self::Choices(choices) => ParameterKind::Categorical { choices },
            Self::Json(value) => classify_json(name, value)?,
        };
        kind.validate(name)?;
        Ok(kind)
    }
}

impl From<Value> for Declaration {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

fn range_kind(name: &str, low: &Value, high: &Value) -> Result<ParameterKind, SearchError> {
    if let (Some(low), Some(high)) = (low.as_i64(), high.as_i64()) {
        return Ok(ParameterKind::IntRange { low, high });
    }
    match (low.as_f64(), high.as_f64()) {
        (Some(low), Some(high)) => Ok(ParameterKind::RealRange { low, high }),
        _ => Err(SearchError::invalid_space(
            name,
            format!("range bounds must be numbers, got ({low}, {high})"),
        )),
    }
}

fn classify_json(name: &str, value: Value) -> Result<ParameterKind, SearchError> {
    match value {
        Value::Array(items) => match items.as_slice() {
            [] => Err(SearchError::invalid_space(name, "choice list is empty")),
            [low, high] if low.is_number() && high.is_number() => range_kind(name, low, high),
            _ => Ok(ParameterKind::Categorical { choices: items }),
        },
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(choices) = map.get("choices") {
                    return match choices {
                        Value::Array(items) => Ok(ParameterKind::Categorical {
                            choices: items.clone(),
                        }),
                        other => Err(SearchError::invalid_space(
                            name,
                            format!("\"choices\" must be a list, got {other}"),
                        )),
                    };
                }
            }
            match (map.get("low"), map.get("high")) {
                (Some(low), Some(high)) if map.len() == 2 => range_kind(name, low, high),
                _ => Err(SearchError::invalid_space(
                    name,
                    "expected {\"low\", \"high\"} or {\"choices\"}",
                )),
            }
        }
        other => Err(SearchError::invalid_space(
            name,
            format!("expected a [low, high] pair or a list of choices, got {other}"),
        )),
    }
}

/// The full search space: an ordered list of uniquely named parameters.
///
/// Built either through the chained `add_*` methods (validated by
/// [`SearchSpace::validate`], which the runner always calls) or eagerly
/// through [`SearchSpace::from_declarations`] / [`SearchSpace::from_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    parameters: Vec<ParameterSpec>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.into(),
            kind: ParameterKind::IntRange { low, high },
        });
        self
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.into(),
            kind: ParameterKind::RealRange { low, high },
        });
        self
    }

    pub fn add_choice(mut self, name: impl Into<String>, choices: Vec<Value>) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.into(),
            kind: ParameterKind::Categorical { choices },
        });
        self
    }

    /// Classify and validate every declaration, failing on the first bad one.
    pub fn from_declarations<I, K>(declarations: I) -> Result<Self, SearchError>
    where
        I: IntoIterator<Item = (K, Declaration)>,
        K: Into<String>,
    {
        let mut parameters = Vec::new();
        let mut seen = HashSet::new();

        for (name, declaration) in declarations {
            let name = name.into();
            if !seen.insert(name.clone()) {
                return Err(SearchError::invalid_space(name, "declared more than once"));
            }
            let kind = declaration.classify(&name)?;
            parameters.push(ParameterSpec { name, kind });
        }

        Ok(Self { parameters })
    }

    /// Build from a JSON object mapping parameter names to declarations,
    /// e.g. `{"C": [0.1, 10.0], "solver": ["lbfgs", "liblinear"]}`.
    pub fn from_json(value: &Value) -> Result<Self, SearchError> {
        let map = value.as_object().ok_or_else(|| {
            SearchError::invalid_space("<root>", format!("expected a JSON object, got {value}"))
        })?;
        Self::from_declarations(
            map.iter()
                .map(|(name, decl)| (name.clone(), Declaration::Json(decl.clone()))),
        )
    }

    /// Check every parameter's domain and name uniqueness.
    pub fn validate(&self) -> Result<(), SearchError> {
        let mut seen = HashSet::new();
        for param in &self.parameters {
            if !seen.insert(param.name.as_str()) {
                return Err(SearchError::invalid_space(
                    param.name.as_str(),
                    "declared more than once",
                ));
            }
            param.kind.validate(&param.name)?;
        }
        Ok(())
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Explain why `assignment` is not a complete, in-domain point.
    pub fn check_assignment(&self, assignment: &Assignment) -> Result<(), String> {
        for key in assignment.keys() {
            if self.get(key).is_none() {
                return Err(format!("unknown parameter '{key}'"));
            }
        }
        for param in &self.parameters {
            match assignment.get(&param.name) {
                None => return Err(format!("missing parameter '{}'", param.name)),
                Some(value) if !param.kind.contains(value) => {
                    return Err(format!(
                        "value {value} is outside the domain of '{}'",
                        param.name
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn contains(&self, assignment: &Assignment) -> bool {
        self.check_assignment(assignment).is_ok()
    }

    /// Draw every parameter uniformly, in declaration order.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Assignment {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.kind.sample(rng)))
            .collect()
    }

    /// Total number of grid points (returns `None` if any parameter is
    /// continuous without a natural grid).
    pub fn grid_size(&self) -> Option<usize> {
        let mut total: usize = 1;
        for param in &self.parameters {
            total = total.checked_mul(param.kind.grid_len()?)?;
        }
        Some(total)
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    #[test]
    fn pair_of_integers_is_int_range() {
        let space = SearchSpace::from_json(&json!({"n_estimators": [10, 200]})).unwrap();
        assert_eq!(
            space.get("n_estimators").unwrap().kind,
            ParameterKind::IntRange { low: 10, high: 200 }
        );
    }

    #[test]
    fn mixed_pair_is_real_range() {
        let space = SearchSpace::from_json(&json!({"C": [0.1, 10], "alpha": [1, 2.0]})).unwrap();
        assert_eq!(
            space.get("C").unwrap().kind,
            ParameterKind::RealRange { low: 0.1, high: 10.0 }
        );
        assert_eq!(
            space.get("alpha").unwrap().kind,
            ParameterKind::RealRange { low: 1.0, high: 2.0 }
        );
    }

    #[test]
    fn sequences_are_categorical_in_order() {
        let space = SearchSpace::from_json(&json!({
            "solver": ["lbfgs", "liblinear"],
            "depth": [2, 4, 8],
            "single": [7],
        }))
        .unwrap();

        assert_eq!(
            space.get("solver").unwrap().kind,
            ParameterKind::Categorical {
                choices: vec![json!("lbfgs"), json!("liblinear")]
            }
        );
        assert_eq!(
            space.get("depth").unwrap().kind,
            ParameterKind::Categorical {
                choices: vec![json!(2), json!(4), json!(8)]
            }
        );
        assert!(matches!(
            space.get("single").unwrap().kind,
            ParameterKind::Categorical { .. }
        ));
    }

    #[test]
    fn object_forms() {
        let space = SearchSpace::from_json(&json!({
            "batch": {"choices": [16, 32]},
            "lr": {"low": 0.001, "high": 0.1},
        }))
        .unwrap();
        assert_eq!(
            space.get("batch").unwrap().kind,
            ParameterKind::Categorical {
                choices: vec![json!(16), json!(32)]
            }
        );
        assert_eq!(
            space.get("lr").unwrap().kind,
            ParameterKind::RealRange { low: 0.001, high: 0.1 }
        );
    }

    #[test]
    fn invalid_declaration_names_parameter() {
        let err = SearchSpace::from_json(&json!({"C": "not_a_valid_space"})).unwrap_err();
        match err {
            SearchError::InvalidSearchSpace { parameter, .. } => assert_eq!(parameter, "C"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_declarations() {
        for bad in [
            json!(3),
            json!(null),
            json!(true),
            json!([]),
            json!({"low": 1}),
            json!({"choices": "a"}),
            json!([5, 1]),
        ] {
            let result = SearchSpace::from_json(&json!({ "p": bad.clone() }));
            assert!(
                matches!(result, Err(SearchError::InvalidSearchSpace { .. })),
                "accepted {bad}"
            );
        }
        assert!(SearchSpace::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn rejects_non_finite_and_inverted_ranges() {
        let err = SearchSpace::from_declarations([("x", Declaration::real(f64::NAN, 1.0))]);
        assert!(err.is_err());

        let err = SearchSpace::from_declarations([("x", Declaration::real(2.0, 1.0))]);
        assert!(err.is_err());

        let err = SearchSpace::from_declarations([(
            "x",
            Declaration::Range(json!("a"), json!(1)),
        )]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = SearchSpace::from_declarations([
            ("x", Declaration::int(1, 2)),
            ("x", Declaration::choices(["a"])),
        ])
        .unwrap_err();
        assert!(matches!(err, SearchError::InvalidSearchSpace { ref parameter, .. } if parameter == "x"));

        let built = SearchSpace::new().add_int("x", 1, 2).add_float("x", 0.0, 1.0);
        assert!(built.validate().is_err());
    }

    #[test]
    fn builder_validation_catches_bad_bounds() {
        assert!(SearchSpace::new().add_int("a", 5, 1).validate().is_err());
        assert!(SearchSpace::new().add_choice("b", vec![]).validate().is_err());
        assert!(SearchSpace::new()
            .add_int("a", 1, 10)
            .add_float("b", 0.0, 1.0)
            .add_choice("d", vec![json!(true), json!(false)])
            .validate()
            .is_ok());
    }

    #[test]
    fn samples_respect_domains() {
        let space = SearchSpace::from_json(&json!({
            "C": [0.1, 10.0],
            "k": [1, 5],
            "solver": ["lbfgs", "liblinear"],
        }))
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..200 {
            let point = space.sample(&mut rng);
            assert!(space.contains(&point));
            match point.get("C") {
                Some(ParameterValue::Float(v)) => assert!((0.1..=10.0).contains(v)),
                other => panic!("unexpected C value: {other:?}"),
            }
            match point.get("k") {
                Some(ParameterValue::Int(v)) => assert!((1..=5).contains(v)),
                other => panic!("unexpected k value: {other:?}"),
            }
        }
    }

    #[test]
    fn degenerate_ranges_sample_their_only_value() {
        let space = SearchSpace::new().add_int("a", 3, 3).add_float("b", 0.5, 0.5);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let point = space.sample(&mut rng);
        assert_eq!(point["a"], ParameterValue::Int(3));
        assert_eq!(point["b"], ParameterValue::Float(0.5));
    }

    #[test]
    fn check_assignment_reports_problems() {
        let space = SearchSpace::new().add_int("a", 1, 3);

        let mut point = Assignment::new();
        assert!(space.check_assignment(&point).unwrap_err().contains("missing"));

        point.insert("a".into(), ParameterValue::Float(2.0));
        assert!(space.check_assignment(&point).unwrap_err().contains("outside"));

        point.insert("a".into(), ParameterValue::Int(2));
        point.insert("b".into(), ParameterValue::Int(2));
        assert!(space.check_assignment(&point).unwrap_err().contains("unknown"));

        point.remove("b");
        assert!(space.contains(&point));
    }

    #[test]
    fn deserialized_numeric_choices_stay_in_the_space() {
        let space = SearchSpace::new().add_choice("batch", vec![json!(16), json!(32)]);
        let mut point = Assignment::new();
        point.insert("batch".into(), ParameterValue::Choice(json!(32)));

        let back: Assignment = serde_json::from_value(serde_json::to_value(&point).unwrap()).unwrap();
        assert_eq!(back["batch"], ParameterValue::Int(32));
        assert!(space.contains(&back));

        point.insert("batch".into(), ParameterValue::Int(64));
        assert!(!space.contains(&point));
    }

    #[test]
    fn axis_values_are_computed_by_index() {
        let wide = ParameterKind::IntRange { low: 0, high: 1_000_000_000 };
        assert_eq!(wide.axis_len(5), 1_000_000_001);
        assert_eq!(wide.axis_value(0, 5), ParameterValue::Int(0));
        assert_eq!(wide.axis_value(1_000_000_000, 5), ParameterValue::Int(1_000_000_000));

        let full = ParameterKind::IntRange { low: i64::MIN, high: i64::MAX };
        assert_eq!(full.axis_len(5), usize::MAX);
        assert_eq!(full.axis_value(3, 5), ParameterValue::Int(i64::MIN + 3));

        let real = ParameterKind::RealRange { low: 1.0, high: 2.0 };
        assert_eq!(real.axis_len(1), 2);
        assert_eq!(real.axis_value(2, 5), ParameterValue::Float(1.5));
        let point = ParameterKind::RealRange { low: 3.0, high: 3.0 };
        assert_eq!(point.axis_len(5), 1);
        assert_eq!(point.axis_value(0, 5), ParameterValue::Float(3.0));
    }

    #[test]
    fn grid_size_counts_discrete_axes() {
        let space = SearchSpace::new().add_int("a", 1, 3).add_choice("b", vec![json!(1), json!(2)]);
        assert_eq!(space.grid_size(), Some(6));
        assert_eq!(SearchSpace::new().add_float("x", 0.0, 1.0).grid_size(), None);
    }
}
