//! Rule-based ticker screening.
//!
//! A [`ScanRequest`] names a ticker universe, technical and fundamental
//! [`FilterRule`]s, and how their outcomes combine. The [`ScanEngine`]
//! resolves each rule's field once through the [`Field`] registry and
//! evaluates it per ticker; missing data makes a rule fail, never the scan.

mod engine;
mod fields;
mod rule;

pub use engine::{ScanEngine, ScanMatch, ScanRequest, ScanResult, StockAnalysis, TickerUniverse};
pub use fields::{Field, FieldSources, PriceColumn, RawColumn};
pub use rule::{CombineLogic, FilterRule, Operator, RuleParseError};
