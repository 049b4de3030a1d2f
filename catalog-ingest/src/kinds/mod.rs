//! Record kinds
//!
//! A record kind declares the attributes its records carry, how each one is
//! typed and constrained, and where its attachment goes. The validator and
//! the store are both driven by this declaration, so adding a kind needs no
//! change to either.

pub mod product;

pub use product::ProductKind;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value type of one attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    Text,
    /// Finite floating-point number
    Decimal,
    /// Signed whole number
    Integer,
}

/// Lower bound for numeric attributes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LowerBound {
    Inclusive(f64),
    Exclusive(f64),
}

impl LowerBound {
    pub fn admits(self, value: f64) -> bool {
        match self {
            LowerBound::Inclusive(min) => value >= min,
            LowerBound::Exclusive(min) => value > min,
        }
    }

    /// Human-readable constraint, e.g. "greater than 0"
    pub fn describe(self) -> String {
        match self {
            LowerBound::Inclusive(min) => format!("at least {}", min),
            LowerBound::Exclusive(min) => format!("greater than {}", min),
        }
    }
}

/// Typed attribute value after validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Decimal(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Declaration of one attribute
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSpec {
    /// Form attribute name (e.g. `countInStock`)
    pub name: &'static str,
    /// Store column name (e.g. `count_in_stock`)
    pub column: &'static str,
    pub ty: AttributeType,
    pub required: bool,
    pub min: Option<LowerBound>,
    /// Applied when an optional attribute is absent or blank
    pub default: Option<FieldValue>,
}

impl AttributeSpec {
    pub const fn text(name: &'static str, column: &'static str, required: bool) -> Self {
        Self {
            name,
            column,
            ty: AttributeType::Text,
            required,
            min: None,
            default: None,
        }
    }
}

/// Capability set of a record kind
pub trait RecordKind: Send + Sync + fmt::Debug {
    /// Singular kind name used in logs (e.g. `product`)
    fn name(&self) -> &'static str;

    /// Store table holding records of this kind
    fn table(&self) -> &'static str;

    /// Scalar attributes, in store column order
    fn attributes(&self) -> &[AttributeSpec];

    /// Form attribute carrying the binary attachment
    fn attachment_attribute(&self) -> &'static str;

    /// Store column holding the attachment reference
    fn attachment_column(&self) -> &'static str;

    /// Attachment reference used when a record has no attachment
    fn placeholder_attachment(&self) -> &str;

    fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes().iter().find(|spec| spec.name == name)
    }
}
