use actix_web::{error::JsonPayloadError, web, HttpRequest};

use crate::error::AppError;

pub mod account;
pub mod analyze;
pub mod batch;
pub mod export;
pub mod products;

/// Malformed or oversized JSON bodies come back in the same `{success, error}` shape as every other failure.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
            AppError::Validation(format!("Invalid request body: {}", err)).into()
        })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/get_products", web::get().to(products::get_products))
        .route("/get_product/{id}", web::get().to(products::get_product))
        .route("/add_product", web::post().to(products::add_product))
        .route("/update_product/{id}", web::post().to(products::update_product))
        .route("/delete_product/{id}", web::delete().to(products::delete_product))
        .route("/reset_data", web::post().to(products::reset_data))
        .route("/get_batch", web::get().to(batch::get_batch))
        .route("/set_batch", web::post().to(batch::set_batch))
        .route("/detect_barcode", web::post().to(analyze::detect_barcode))
        .route("/analyze_full", web::post().to(analyze::analyze_full))
        .route("/analyze_ai", web::post().to(analyze::analyze_ai))
        .route("/analyze_image", web::post().to(analyze::analyze_image))
        .route("/extract_product_name", web::post().to(analyze::extract_product_name))
        .route("/export_csv", web::get().to(export::export_csv))
        .route("/export_excel", web::get().to(export::export_excel))
        .service(
            web::resource("/login")
                .route(web::get().to(account::login_status))
                .route(web::post().to(account::login)),
        )
        .route("/logout", web::get().to(account::logout))
        .route("/register", web::post().to(account::register))
        .route("/uploads/{filename}", web::get().to(products::serve_upload));
}
