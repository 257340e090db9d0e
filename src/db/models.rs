use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::schema::{products, users};

/// One inventory item as the rest of the application sees it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub brand: Option<String>,
    pub barcode: String,
    pub price: f64,
    pub quantity: i32,
    pub images: Vec<String>,
    /// Serialized as RFC 3339 with a `Z` suffix.
    pub timestamp: DateTime<Utc>,
}

/// Row layout of the `products` table. Image paths live in a JSON text column;
/// `timestamp` holds UTC without an offset.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = products)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProductRow {
    pub id: String,
    pub name: String,
    pub brand: Option<String>,
    pub barcode: String,
    pub price: f64,
    pub quantity: i32,
    pub images_json: String,
    pub timestamp: NaiveDateTime,
}

impl From<&Product> for ProductRow {
    fn from(product: &Product) -> Self {
        ProductRow {
            id: product.id.clone(),
            name: product.name.clone(),
            brand: product.brand.clone(),
            barcode: product.barcode.clone(),
            price: product.price,
            quantity: product.quantity,
            images_json: encode_images(&product.images),
            timestamp: product.timestamp.naive_utc(),
        }
    }
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        // A hand-edited or truncated column reads as "no images" rather than failing the listing.
        let images = serde_json::from_str(&row.images_json).unwrap_or_default();
        Product {
            id: row.id,
            name: row.name,
            brand: row.brand,
            barcode: row.barcode,
            price: row.price,
            quantity: row.quantity,
            images,
            timestamp: row.timestamp.and_utc(),
        }
    }
}

pub fn encode_images(images: &[String]) -> String {
    serde_json::to_string(images).unwrap_or_else(|_| "[]".to_string())
}

/// Mutable product fields; `id` and `timestamp` never change after insert.
#[derive(AsChangeset, Default, Debug, Clone)]
#[diesel(table_name = products)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub brand: Option<Option<String>>,
    pub barcode: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<i32>,
    pub images_json: Option<String>,
}

impl UpdateProduct {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.brand.is_none()
            && self.barcode.is_none()
            && self.price.is_none()
            && self.quantity.is_none()
            && self.images_json.is_none()
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
}

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
}
