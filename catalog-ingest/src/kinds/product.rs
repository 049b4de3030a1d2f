//! Catalog product kind

use super::{AttributeSpec, AttributeType, FieldValue, LowerBound, RecordKind};

/// Placeholder image reference for products submitted without an image
pub const DEFAULT_PRODUCT_IMAGE: &str = "default.png";

static PRODUCT_ATTRIBUTES: [AttributeSpec; 5] = [
    AttributeSpec::text("name", "name", true),
    AttributeSpec {
        name: "price",
        column: "price",
        ty: AttributeType::Decimal,
        required: true,
        min: Some(LowerBound::Exclusive(0.0)),
        default: None,
    },
    AttributeSpec::text("description", "description", false),
    AttributeSpec::text("category", "category", false),
    AttributeSpec {
        name: "countInStock",
        column: "count_in_stock",
        ty: AttributeType::Integer,
        required: false,
        min: Some(LowerBound::Inclusive(0.0)),
        default: Some(FieldValue::Integer(0)),
    },
];

/// Catalog product: name, price, description, category, stock count, image
#[derive(Debug, Clone)]
pub struct ProductKind {
    placeholder_image: String,
}

impl ProductKind {
    pub fn new(placeholder_image: impl Into<String>) -> Self {
        Self {
            placeholder_image: placeholder_image.into(),
        }
    }
}

impl Default for ProductKind {
    fn default() -> Self {
        Self::new(DEFAULT_PRODUCT_IMAGE)
    }
}

impl RecordKind for ProductKind {
    fn name(&self) -> &'static str {
        "product"
    }

    fn table(&self) -> &'static str {
        "products"
    }

    fn attributes(&self) -> &[AttributeSpec] {
        &PRODUCT_ATTRIBUTES
    }

    fn attachment_attribute(&self) -> &'static str {
        "image"
    }

    fn attachment_column(&self) -> &'static str {
        "image"
    }

    fn placeholder_attachment(&self) -> &str {
        &self.placeholder_image
    }
}
