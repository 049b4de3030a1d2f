//! Record validator
//!
//! Applies a record kind's attribute declarations to each draft. Every draft
//! is judged independently and validation is a pure function of the draft:
//! re-validating the same draft yields the same errors.
//!
//! # Checks per attribute
//! - absent or blank and required → `MissingField`
//! - absent or blank and optional → declared default, or omitted
//! - numeric attribute that does not parse → `InvalidType`
//! - numeric value below its lower bound → `OutOfRange`

use std::collections::BTreeMap;
use std::sync::Arc;

use super::assembler::RecordDraft;
use super::types::{Attachment, ErrorReason, RecordError, RecordIndex};
use crate::kinds::{AttributeSpec, AttributeType, FieldValue, RecordKind};

/// Attachment slot of a validated record
#[derive(Debug, Clone)]
pub enum AttachmentSlot {
    /// Uploaded bytes waiting to be written to attachment storage
    Pending(Attachment),
    /// Reference used when no attachment was submitted
    Placeholder(String),
}

/// A draft that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedRecord {
    pub index: RecordIndex,
    /// Typed values keyed by attribute name
    pub values: BTreeMap<String, FieldValue>,
    pub attachment: AttachmentSlot,
}

impl ValidatedRecord {
    pub fn value(&self, attribute: &str) -> Option<&FieldValue> {
        self.values.get(attribute)
    }
}

/// Drafts split by verdict
#[derive(Debug, Default)]
pub struct Verdicts {
    pub valid: Vec<ValidatedRecord>,
    pub invalid: Vec<(RecordIndex, Vec<RecordError>)>,
}

/// Validator for one record kind
#[derive(Debug, Clone)]
pub struct RecordValidator {
    kind: Arc<dyn RecordKind>,
}

impl RecordValidator {
    pub fn new(kind: Arc<dyn RecordKind>) -> Self {
        Self { kind }
    }

    /// Validate one draft
    pub fn validate(&self, draft: &RecordDraft) -> Result<ValidatedRecord, Vec<RecordError>> {
        let index = draft.index();
        let mut values = BTreeMap::new();
        let mut errors = Vec::new();

        for spec in self.kind.attributes() {
            match check_attribute(index, spec, draft.field(spec.name)) {
                Ok(Some(value)) => {
                    values.insert(spec.name.to_string(), value);
                }
                Ok(None) => {}
                Err(err) => errors.push(err),
            }
        }

        for (attribute, _) in draft.fields() {
            if self.kind.attribute(attribute).is_none() {
                tracing::debug!(
                    index,
                    attribute,
                    kind = self.kind.name(),
                    "Ignoring undeclared attribute"
                );
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let attachment = match draft.attachment() {
            Some(attachment) => AttachmentSlot::Pending(attachment.clone()),
            None => AttachmentSlot::Placeholder(self.kind.placeholder_attachment().to_string()),
        };

        Ok(ValidatedRecord {
            index,
            values,
            attachment,
        })
    }

    /// Validate the attributes present in a partial update
    ///
    /// Absent or blank attributes keep their stored value, so only the type
    /// and range checks apply. Returns the typed values to overwrite.
    pub fn validate_changes(
        &self,
        draft: &RecordDraft,
    ) -> Result<BTreeMap<String, FieldValue>, Vec<RecordError>> {
        let index = draft.index();
        let mut values = BTreeMap::new();
        let mut errors = Vec::new();

        for spec in self.kind.attributes() {
            let Some(raw) = draft.field(spec.name).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            match check_attribute(index, spec, Some(raw)) {
                Ok(Some(value)) => {
                    values.insert(spec.name.to_string(), value);
                }
                Ok(None) => {}
                Err(err) => errors.push(err),
            }
        }

        if errors.is_empty() {
            Ok(values)
        } else {
            Err(errors)
        }
    }

    /// Validate every draft, keeping index order within each group
    pub fn partition(&self, drafts: &[RecordDraft]) -> Verdicts {
        let mut verdicts = Verdicts::default();

        for draft in drafts {
            match self.validate(draft) {
                Ok(record) => verdicts.valid.push(record),
                Err(errors) => {
                    tracing::debug!(
                        index = draft.index(),
                        errors = errors.len(),
                        "Draft failed validation"
                    );
                    verdicts.invalid.push((draft.index(), errors));
                }
            }
        }

        verdicts
    }
}

fn check_attribute(
    index: RecordIndex,
    spec: &AttributeSpec,
    raw: Option<&str>,
) -> Result<Option<FieldValue>, RecordError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        if spec.required {
            return Err(RecordError::for_attribute(
                index,
                ErrorReason::MissingField,
                spec.name,
                format!("{} is required", spec.name),
            ));
        }
        return Ok(spec.default.clone());
    };

    let (value, numeric) = match spec.ty {
        AttributeType::Text => return Ok(Some(FieldValue::Text(raw.to_string()))),
        AttributeType::Decimal => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => (FieldValue::Decimal(v), v),
            _ => return Err(invalid_type(index, spec, raw, "a number")),
        },
        AttributeType::Integer => match raw.parse::<i64>() {
            Ok(v) => (FieldValue::Integer(v), v as f64),
            Err(_) => return Err(invalid_type(index, spec, raw, "a whole number")),
        },
    };

    if let Some(bound) = spec.min {
        if !bound.admits(numeric) {
            return Err(RecordError::for_attribute(
                index,
                ErrorReason::OutOfRange,
                spec.name,
                format!("{} must be {} (got {})", spec.name, bound.describe(), raw),
            ));
        }
    }

    Ok(Some(value))
}

fn invalid_type(
    index: RecordIndex,
    spec: &AttributeSpec,
    raw: &str,
    expected: &str,
) -> RecordError {
    RecordError::for_attribute(
        index,
        ErrorReason::InvalidType,
        spec.name,
        format!("{} must be {} (got `{}`)", spec.name, expected, raw),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::ProductKind;
    use crate::pipeline::assembler::RecordAssembler;

    fn validator() -> RecordValidator {
        RecordValidator::new(Arc::new(ProductKind::default()))
    }

    fn draft(fields: &[(&str, &str)]) -> RecordDraft {
        let mut assembler = RecordAssembler::new();
        for (name, value) in fields {
            assembler.add_field(0, name.to_string(), value.to_string());
        }
        assembler.finish().remove(0)
    }

    fn reasons(errors: &[RecordError]) -> Vec<(ErrorReason, String)> {
        errors
            .iter()
            .map(|e| (e.reason, e.attributes.join(",")))
            .collect()
    }

    #[test]
    fn test_valid_product_with_defaults() {
        let record = validator()
            .validate(&draft(&[("name", "Widget"), ("price", "10")]))
            .unwrap();

        assert_eq!(record.value("name"), Some(&FieldValue::Text("Widget".into())));
        assert_eq!(record.value("price"), Some(&FieldValue::Decimal(10.0)));
        assert_eq!(record.value("countInStock"), Some(&FieldValue::Integer(0)));
        assert!(record.value("description").is_none());
        assert!(
            matches!(record.attachment, AttachmentSlot::Placeholder(ref p) if p == "default.png")
        );
    }

    #[test]
    fn test_blank_stock_uses_default() {
        let record = validator()
            .validate(&draft(&[
                ("name", "Widget"),
                ("price", "3.5"),
                ("countInStock", " "),
            ]))
            .unwrap();
        assert_eq!(record.value("countInStock"), Some(&FieldValue::Integer(0)));
    }

    #[test]
    fn test_negative_price_out_of_range() {
        let errors = validator()
            .validate(&draft(&[("name", "Gadget"), ("price", "-5")]))
            .unwrap_err();
        assert_eq!(reasons(&errors), vec![(ErrorReason::OutOfRange, "price".into())]);
    }

    #[test]
    fn test_zero_price_out_of_range() {
        let errors = validator()
            .validate(&draft(&[("name", "Gadget"), ("price", "0")]))
            .unwrap_err();
        assert_eq!(errors[0].reason, ErrorReason::OutOfRange);
    }

    #[test]
    fn test_missing_name_and_invalid_price_both_reported() {
        let errors = validator()
            .validate(&draft(&[("name", "   "), ("price", "ten")]))
            .unwrap_err();
        assert_eq!(
            reasons(&errors),
            vec![
                (ErrorReason::MissingField, "name".into()),
                (ErrorReason::InvalidType, "price".into()),
            ]
        );
    }

    #[test]
    fn test_stock_rules() {
        let errors = validator()
            .validate(&draft(&[("name", "A"), ("price", "1"), ("countInStock", "2.5")]))
            .unwrap_err();
        assert_eq!(errors[0].reason, ErrorReason::InvalidType);

        let errors = validator()
            .validate(&draft(&[("name", "A"), ("price", "1"), ("countInStock", "-1")]))
            .unwrap_err();
        assert_eq!(errors[0].reason, ErrorReason::OutOfRange);
    }

    #[test]
    fn test_non_finite_price_is_invalid_type() {
        for price in ["NaN", "inf"] {
            let errors = validator()
                .validate(&draft(&[("name", "A"), ("price", price)]))
                .unwrap_err();
            assert_eq!(errors[0].reason, ErrorReason::InvalidType, "{price}");
        }
    }

    #[test]
    fn test_validation_is_idempotent() {
        let v = validator();
        let d = draft(&[("price", "-1"), ("countInStock", "x")]);

        let first = v.validate(&d).unwrap_err();
        let second = v.validate(&d).unwrap_err();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_changes_check_only_present_attributes() {
        let values = validator()
            .validate_changes(&draft(&[("price", "12.5"), ("name", " ")]))
            .unwrap();

        // Blank name keeps the stored value; absent stock gets no default
        assert_eq!(values.len(), 1);
        assert_eq!(values["price"], FieldValue::Decimal(12.5));

        let errors = validator()
            .validate_changes(&draft(&[("price", "0"), ("countInStock", "many")]))
            .unwrap_err();
        assert_eq!(
            reasons(&errors),
            vec![
                (ErrorReason::OutOfRange, "price".into()),
                (ErrorReason::InvalidType, "countInStock".into()),
            ]
        );
    }

    #[test]
    fn test_partition_keeps_order() {
        let mut assembler = RecordAssembler::new();
        assembler.add_field(4, "name".into(), "B".into());
        assembler.add_field(4, "price".into(), "2".into());
        assembler.add_field(1, "name".into(), "A".into());
        assembler.add_field(1, "price".into(), "1".into());
        assembler.add_field(2, "price".into(), "1".into());
        let drafts = assembler.finish();

        let verdicts = validator().partition(&drafts);
        let valid: Vec<_> = verdicts.valid.iter().map(|r| r.index).collect();
        assert_eq!(valid, vec![1, 4]);
        assert_eq!(verdicts.invalid.len(), 1);
        assert_eq!(verdicts.invalid[0].0, 2);
    }
}
