//! Vision-backed helpers for the intake form. None of these touch the store.

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::ImageRequest;
use crate::vision::{BARCODE_PROMPT, DESCRIBE_PROMPT, FULL_PROMPT, NAME_PROMPT, PRODUCT_PROMPT};
use crate::AppState;

pub async fn detect_barcode(
    _user: AuthUser,
    data: web::Data<AppState>,
    req: web::Json<ImageRequest>,
) -> Result<HttpResponse, AppError> {
    let extraction = data.vision.extract(&req.image_data, BARCODE_PROMPT, true).await?;
    let barcode: String = extraction
        .field("barcode")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    info!(found = !barcode.is_empty(), "barcode detection finished");
    Ok(HttpResponse::Ok().json(json!({ "barcode": barcode })))
}

pub async fn analyze_full(
    _user: AuthUser,
    data: web::Data<AppState>,
    req: web::Json<ImageRequest>,
) -> Result<HttpResponse, AppError> {
    let extraction = data.vision.extract(&req.image_data, FULL_PROMPT, true).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "name": extraction.field("name"),
        "brand": extraction.field("brand"),
        "barcode": extraction.field("barcode"),
    })))
}

pub async fn analyze_ai(
    _user: AuthUser,
    data: web::Data<AppState>,
    req: web::Json<ImageRequest>,
) -> Result<HttpResponse, AppError> {
    let extraction = data.vision.extract(&req.image_data, PRODUCT_PROMPT, true).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "name": extraction.field("name"),
        "brand": extraction.field("brand"),
    })))
}

pub async fn analyze_image(
    _user: AuthUser,
    data: web::Data<AppState>,
    req: web::Json<ImageRequest>,
) -> Result<HttpResponse, AppError> {
    let extraction = data.vision.extract(&req.image_data, DESCRIBE_PROMPT, false).await?;
    Ok(HttpResponse::Ok().json(json!({ "description": extraction.text() })))
}

pub async fn extract_product_name(
    _user: AuthUser,
    data: web::Data<AppState>,
    req: web::Json<ImageRequest>,
) -> Result<HttpResponse, AppError> {
    let extraction = data.vision.extract(&req.image_data, NAME_PROMPT, true).await?;
    Ok(HttpResponse::Ok().json(json!({ "product_name": extraction.field("name") })))
}
