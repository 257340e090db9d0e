use serde::{Deserialize, Deserializer, Serialize};

use crate::db::models::{encode_images, UpdateProduct};
use crate::error::AppError;

/// Browser forms post numbers as strings; accept both.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    Text(String),
}

impl NumberOrString {
    fn as_f64(&self) -> Option<f64> {
        match self {
            NumberOrString::Number(n) => n.as_f64(),
            NumberOrString::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn number(value: NumberOrString) -> Result<f64, &'static str> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or("expected a number")
}

/// Integers are read exactly; only `"3.0"`-style input goes through `f64`.
fn whole_number(value: NumberOrString) -> Result<i64, &'static str> {
    let exact = match &value {
        NumberOrString::Number(n) if n.is_i64() || n.is_u64() => n.as_i64(),
        NumberOrString::Text(s) => s.trim().parse::<i64>().ok(),
        NumberOrString::Number(_) => None,
    };
    if let Some(exact) = exact {
        return Ok(exact);
    }
    if matches!(&value, NumberOrString::Number(n) if n.is_u64()) {
        return Err("number out of range");
    }

    let value = number(value)?;
    if value.fract() != 0.0 {
        return Err("expected a whole number");
    }
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
    if value < i64::MIN as f64 || value >= i64::MAX as f64 {
        return Err("number out of range");
    }
    Ok(value as i64)
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    number(NumberOrString::deserialize(d)?).map_err(serde::de::Error::custom)
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    whole_number(NumberOrString::deserialize(d)?).map_err(serde::de::Error::custom)
}

fn lenient_opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Option::<NumberOrString>::deserialize(d)?
        .map(number)
        .transpose()
        .map_err(serde::de::Error::custom)
}

fn lenient_opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Option::<NumberOrString>::deserialize(d)?
        .map(whole_number)
        .transpose()
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    pub barcode: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub price: f64,
    #[serde(deserialize_with = "lenient_i64")]
    pub quantity: i64,
    #[serde(default)]
    pub images: Vec<String>,
}

impl CreateProductRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_name(&self.name)?;
        validate_price(self.price)?;
        validate_quantity(self.quantity)?;
        Ok(())
    }
}

/// Partial update. Absent fields are left alone; `images` replaces the whole set.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub barcode: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub quantity: Option<i64>,
    pub images: Option<Vec<String>>,
}

impl UpdateProductRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        if let Some(quantity) = self.quantity {
            validate_quantity(quantity)?;
        }
        Ok(())
    }

    /// Field changes for the store; `images` are the already-materialized paths.
    pub fn changeset(&self, images: Option<&[String]>) -> UpdateProduct {
        UpdateProduct {
            name: self.name.as_ref().map(|n| n.trim().to_string()),
            brand: self.brand.as_ref().map(|b| normalize_brand(Some(b))),
            barcode: self.barcode.as_ref().map(|b| b.trim().to_string()),
            price: self.price,
            quantity: self.quantity.map(|q| q as i32),
            images_json: images.map(encode_images),
        }
    }
}

pub fn normalize_brand(brand: Option<&String>) -> Option<String> {
    brand.map(|b| b.trim().to_string()).filter(|b| !b.is_empty())
}

fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("Product name cannot be empty".to_string()));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<(), AppError> {
    if price < 0.0 {
        return Err(AppError::Validation("Product price cannot be negative".to_string()));
    }
    Ok(())
}

fn validate_quantity(quantity: i64) -> Result<(), AppError> {
    if quantity < 0 || quantity > i32::MAX as i64 {
        return Err(AppError::Validation("Product quantity must be a non-negative integer".to_string()));
    }
    Ok(())
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProductQuery {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub search_term: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetBatchRequest {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_index", deserialize_with = "lenient_i64")]
    pub index: i64,
}

fn default_prefix() -> String {
    crate::batch::DEFAULT_PREFIX.to_string()
}

fn default_index() -> i64 {
    crate::batch::DEFAULT_INDEX as i64
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageRequest {
    pub image_data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_may_arrive_as_strings() {
        let req: CreateProductRequest = serde_json::from_str(
            r#"{"name": "Milk", "barcode": "123", "price": "1.25", "quantity": "4"}"#,
        )
        .unwrap();
        assert_eq!(req.price, 1.25);
        assert_eq!(req.quantity, 4);
        assert!(req.images.is_empty());
        assert!(req.brand.is_none());
    }

    #[test]
    fn fractional_quantity_is_rejected() {
        let parsed = serde_json::from_str::<CreateProductRequest>(
            r#"{"name": "Milk", "barcode": "123", "price": 1, "quantity": 1.5}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn validation_rejects_blank_name_and_negatives() {
        let mut req: CreateProductRequest =
            serde_json::from_str(r#"{"name": " ", "barcode": "", "price": 0, "quantity": 0}"#).unwrap();
        assert!(req.validate().is_err());
        req.name = "Milk".to_string();
        assert!(req.validate().is_ok());
        req.price = -0.01;
        assert!(req.validate().is_err());
    }

    #[test]
    fn update_changeset_only_carries_given_fields() {
        let req: UpdateProductRequest = serde_json::from_str(r#"{"quantity": "7", "brand": "  "}"#).unwrap();
        let changes = req.changeset(None);
        assert_eq!(changes.quantity, Some(7));
        assert_eq!(changes.brand, Some(None));
        assert!(changes.name.is_none());
        assert!(changes.images_json.is_none());
    }

    #[test]
    fn set_batch_defaults() {
        let req: SetBatchRequest = serde_json::from_str(r#"{"index": "12"}"#).unwrap();
        assert_eq!(req.prefix, "A");
        assert_eq!(req.index, 12);
    }

    #[test]
    fn large_indexes_are_read_exactly() {
        let req: SetBatchRequest = serde_json::from_str(r#"{"index": 9007199254740993}"#).unwrap();
        assert_eq!(req.index, 9_007_199_254_740_993);
        let req: SetBatchRequest = serde_json::from_str(r#"{"index": "9223372036854775807"}"#).unwrap();
        assert_eq!(req.index, i64::MAX);
        let req: SetBatchRequest = serde_json::from_str(r#"{"index": "4.0"}"#).unwrap();
        assert_eq!(req.index, 4);
    }

    #[test]
    fn indexes_beyond_i64_are_rejected() {
        assert!(serde_json::from_str::<SetBatchRequest>(r#"{"index": 18446744073709551615}"#).is_err());
        assert!(serde_json::from_str::<SetBatchRequest>(r#"{"index": "99999999999999999999"}"#).is_err());
        assert!(serde_json::from_str::<SetBatchRequest>(r#"{"index": 1e30}"#).is_err());
    }
}
