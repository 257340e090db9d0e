use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::SetBatchRequest;
use crate::AppState;

pub async fn get_batch(_user: AuthUser, data: web::Data<AppState>) -> HttpResponse {
    let batch = data.batch.current();
    HttpResponse::Ok().json(json!({
        "prefix": batch.prefix,
        "index": batch.index,
        "next_id": batch.product_id(),
    }))
}

pub async fn set_batch(
    user: AuthUser,
    data: web::Data<AppState>,
    req: web::Json<SetBatchRequest>,
) -> Result<HttpResponse, AppError> {
    let index = u64::try_from(req.index)
        .map_err(|_| AppError::Validation("batch index must be at least 1".to_string()))?;
    let batch = data.batch.set(&req.prefix, index)?;
    info!(prefix = %batch.prefix, index = batch.index, user = %user.username, "batch counter set");
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "prefix": batch.prefix,
        "index": batch.index,
    })))
}
