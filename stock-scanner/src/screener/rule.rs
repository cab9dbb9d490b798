//! Declarative filter rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a rule.
///
/// Equality compares floats exactly; there is no tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Operator {
    /// Longest symbols first so `<=` is never read as `<`.
    const SYMBOLS: [(&'static str, Operator); 6] = [
        ("<=", Operator::Le),
        (">=", Operator::Ge),
        ("==", Operator::Eq),
        ("!=", Operator::Ne),
        ("<", Operator::Lt),
        (">", Operator::Gt),
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    #[allow(clippy::float_cmp)]
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Lt => value < threshold,
            Self::Gt => value > threshold,
            Self::Le => value <= threshold,
            Self::Ge => value >= threshold,
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::SYMBOLS
            .iter()
            .find(|(sym, _)| *sym == s)
            .map(|(_, op)| *op)
            .ok_or_else(|| RuleParseError::UnknownOperator(s.to_string()))
    }
}

/// How rule outcomes combine into a ticker verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CombineLogic {
    #[default]
    #[serde(rename = "AND", alias = "and", alias = "And")]
    And,
    #[serde(rename = "OR", alias = "or", alias = "Or")]
    Or,
}

impl CombineLogic {
    /// Combine outcomes. An empty set always passes.
    pub fn combine(&self, outcomes: &[bool]) -> bool {
        if outcomes.is_empty() {
            return true;
        }
        match self {
            Self::And => outcomes.iter().all(|&m| m),
            Self::Or => outcomes.iter().any(|&m| m),
        }
    }
}

impl FromStr for CombineLogic {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            other => Err(RuleParseError::UnknownLogic(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleParseError {
    #[error("Unknown operator '{0}', expected one of <, >, <=, >=, ==, !=")]
    UnknownOperator(String),

    #[error("Unknown combine logic '{0}', expected AND or OR")]
    UnknownLogic(String),

    #[error("Malformed rule '{0}', expected <field><op><number>")]
    Malformed(String),
}

/// One comparison of a named field against a threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub field: String,
    pub operator: Operator,
    #[serde(alias = "value")]
    pub threshold: f64,
}

impl FilterRule {
    pub fn new(field: impl Into<String>, operator: Operator, threshold: f64) -> Self {
        Self {
            field: field.into(),
            operator,
            threshold,
        }
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.threshold)
    }
}

/// Parses `rsi<30`, `trailing_pe <= 20.5`, `macd != 0`.
impl FromStr for FilterRule {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || RuleParseError::Malformed(s.to_string());

        let (pos, sym, operator) = Operator::SYMBOLS
            .iter()
            .filter_map(|(sym, op)| s.find(sym).map(|pos| (pos, *sym, *op)))
            // Earliest match; on a tie the two-character symbol wins
            .min_by_key(|(pos, sym, _)| (*pos, std::cmp::Reverse(sym.len())))
            .ok_or_else(malformed)?;

        let field = s[..pos].trim();
        let threshold = s[pos + sym.len()..].trim();
        if field.is_empty() || threshold.is_empty() {
            return Err(malformed());
        }

        let threshold: f64 = threshold.parse().map_err(|_| malformed())?;
        Ok(Self::new(field, operator, threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_semantics() {
        assert!(Operator::Lt.evaluate(29.9, 30.0));
        assert!(!Operator::Lt.evaluate(30.0, 30.0));
        assert!(Operator::Le.evaluate(30.0, 30.0));
        assert!(Operator::Gt.evaluate(0.1, 0.0));
        assert!(Operator::Ge.evaluate(0.0, 0.0));
        assert!(Operator::Eq.evaluate(1.5, 1.5));
        assert!(Operator::Ne.evaluate(1.5, 1.6));
        // Exact comparison, no epsilon
        assert!(!Operator::Eq.evaluate(0.1 + 0.2, 0.3));
    }

    #[test]
    fn test_operator_serde() {
        let op: Operator = serde_json::from_str("\"<=\"").unwrap();
        assert_eq!(op, Operator::Le);
        assert_eq!(serde_json::to_string(&Operator::Ne).unwrap(), "\"!=\"");
        assert!(serde_json::from_str::<Operator>("\"=<\"").is_err());
        assert!(serde_json::from_str::<Operator>("\"~\"").is_err());
    }

    #[test]
    fn test_combine_logic() {
        assert!(CombineLogic::And.combine(&[true, true]));
        assert!(!CombineLogic::And.combine(&[true, false]));
        assert!(CombineLogic::Or.combine(&[false, true]));
        assert!(!CombineLogic::Or.combine(&[false, false]));
        assert!(CombineLogic::And.combine(&[]));
        assert!(CombineLogic::Or.combine(&[]));
    }

    #[test]
    fn test_combine_logic_parse() {
        assert_eq!("or".parse::<CombineLogic>().unwrap(), CombineLogic::Or);
        assert_eq!(
            serde_json::from_str::<CombineLogic>("\"and\"").unwrap(),
            CombineLogic::And
        );
        assert!("xor".parse::<CombineLogic>().is_err());
    }

    #[test]
    fn test_rule_parse() {
        let rule: FilterRule = "rsi<30".parse().unwrap();
        assert_eq!(rule, FilterRule::new("rsi", Operator::Lt, 30.0));

        let rule: FilterRule = " trailing_pe <= 20.5 ".parse().unwrap();
        assert_eq!(rule, FilterRule::new("trailing_pe", Operator::Le, 20.5));

        let rule: FilterRule = "macd_histogram>-0.5".parse().unwrap();
        assert_eq!(rule, FilterRule::new("macd_histogram", Operator::Gt, -0.5));

        let rule: FilterRule = "beta!=1".parse().unwrap();
        assert_eq!(rule.operator, Operator::Ne);
    }

    #[test]
    fn test_rule_parse_rejects_malformed() {
        for bad in ["rsi", "<30", "rsi<", "rsi<abc", "rsi=30", ""] {
            assert!(bad.parse::<FilterRule>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_rule_json_accepts_value_alias() {
        let rule: FilterRule =
            serde_json::from_str(r#"{"field": "rsi", "operator": "<", "value": 30}"#).unwrap();
        assert_eq!(rule.threshold, 30.0);
        assert_eq!(rule.to_string(), "rsi < 30");
    }
}
