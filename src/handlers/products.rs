use actix_files::NamedFile;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::db::{self, Product};
use crate::error::AppError;
use crate::models::{normalize_brand, CreateProductRequest, ProductQuery, UpdateProductRequest};
use crate::AppState;

pub async fn get_products(
    _user: AuthUser,
    data: web::Data<AppState>,
    query: web::Query<ProductQuery>,
) -> Result<HttpResponse, AppError> {
    let conn = &mut data.pool.get()?;
    let products = db::get_all_products(conn, &query)?;
    Ok(HttpResponse::Ok().json(products))
}

pub async fn get_product(
    _user: AuthUser,
    data: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let conn = &mut data.pool.get()?;
    let product = db::get_product(conn, &id)?;
    Ok(HttpResponse::Ok().json(product))
}

pub async fn add_product(
    user: AuthUser,
    data: web::Data<AppState>,
    req: web::Json<CreateProductRequest>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    req.validate()?;
    let conn = &mut data.pool.get()?;

    let product = data.batch.allocate(|product_id| -> Result<Product, AppError> {
        if db::product_exists(conn, product_id)? {
            return Err(AppError::Persistence(format!(
                "product id {} is already taken; adjust the batch counter",
                product_id
            )));
        }

        let images = data.images.store_images(product_id, &req.images);
        let product = Product {
            id: product_id.to_string(),
            name: req.name.trim().to_string(),
            brand: normalize_brand(req.brand.as_ref()),
            barcode: req.barcode.trim().to_string(),
            price: req.price,
            quantity: req.quantity as i32,
            images,
            timestamp: Utc::now(),
        };

        if let Err(e) = db::create_product(conn, &product) {
            data.images.remove_images(&product.images);
            return Err(e.into());
        }
        Ok(product)
    })?;

    info!(
        id = %product.id,
        images = product.images.len(),
        requested = req.images.len(),
        user = %user.username,
        "product created"
    );
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "product_id": product.id,
        "product": product,
    })))
}

pub async fn update_product(
    user: AuthUser,
    data: web::Data<AppState>,
    id: web::Path<String>,
    req: web::Json<UpdateProductRequest>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    req.validate()?;
    let conn = &mut data.pool.get()?;
    let existing = db::get_product(conn, &id)?;

    let updated = match &req.images {
        Some(payloads) => {
            // New files are staged first; the old set is only removed once the row points at the new one.
            let staged = data.images.stage_images(&existing.id, payloads);
            let paths = staged.paths();
            match db::update_product(conn, &existing.id, &req.changeset(Some(paths.as_slice()))) {
                Ok(updated) => {
                    let published = staged.commit(&existing.images);
                    if published.len() != paths.len() {
                        warn!(id = %existing.id, "some staged images could not be published");
                    }
                    updated
                }
                Err(e) => {
                    staged.discard();
                    return Err(e.into());
                }
            }
        }
        None => db::update_product(conn, &existing.id, &req.changeset(None))?,
    };

    info!(id = %updated.id, user = %user.username, "product updated");
    Ok(HttpResponse::Ok().json(json!({ "success": true, "product": updated })))
}

pub async fn delete_product(
    user: AuthUser,
    data: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let conn = &mut data.pool.get()?;
    let product = db::get_product(conn, &id)?;
    db::delete_product(conn, &product.id)?;

    let removed = data.images.remove_images(&product.images);
    if removed < product.images.len() {
        warn!(id = %product.id, removed, expected = product.images.len(), "image files missing or left behind");
    }
    info!(id = %product.id, user = %user.username, "product deleted");
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

pub async fn reset_data(user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let conn = &mut data.pool.get()?;
    let deleted = db::delete_all_products(conn)?;
    data.batch.reset()?;
    match data.images.clear() {
        Ok(files) => info!(files, "content folder cleared"),
        Err(e) => warn!(error = %e, "could not clear content folder"),
    }
    info!(deleted, user = %user.username, "inventory reset");
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

pub async fn serve_upload(
    _user: AuthUser,
    data: web::Data<AppState>,
    filename: web::Path<String>,
) -> Result<NamedFile, AppError> {
    let not_found = || AppError::NotFound("Image not found".to_string());
    let path = data.images.resolve(&filename).ok_or_else(not_found)?;
    NamedFile::open(path).map_err(|_| not_found())
}
