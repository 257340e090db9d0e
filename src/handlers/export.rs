use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::db::{self, Product};
use crate::error::AppError;
use crate::models::ProductQuery;
use crate::AppState;

#[derive(Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Brand")]
    brand: &'a str,
    #[serde(rename = "Barcode")]
    barcode: &'a str,
    #[serde(rename = "Price")]
    price: f64,
    #[serde(rename = "Quantity")]
    quantity: i32,
    #[serde(rename = "Images")]
    images: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
}

impl<'a> From<&'a Product> for ExportRow<'a> {
    fn from(p: &'a Product) -> Self {
        ExportRow {
            id: &p.id,
            name: &p.name,
            brand: p.brand.as_deref().unwrap_or(""),
            barcode: &p.barcode,
            price: p.price,
            quantity: p.quantity,
            images: p.images.join(";"),
            timestamp: p.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

pub fn products_to_csv(products: &[Product]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for product in products {
        writer.serialize(ExportRow::from(product))?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

const XLSX_HEADERS: [&str; 6] = ["ID", "Name", "Barcode", "Price", "Quantity", "Timestamp"];
const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub fn products_to_xlsx(products: &[Product]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Products")?;

    for (col, header) in XLSX_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }
    for (i, p) in products.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, p.id.as_str())?;
        sheet.write_string(row, 1, p.name.as_str())?;
        sheet.write_string(row, 2, p.barcode.as_str())?;
        sheet.write_number(row, 3, p.price)?;
        sheet.write_number(row, 4, f64::from(p.quantity))?;
        sheet.write_string(row, 5, p.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().as_str())?;
    }
    workbook.save_to_buffer()
}

fn load_for_export(data: &AppState) -> Result<Vec<Product>, AppError> {
    let conn = &mut data.pool.get()?;
    Ok(db::get_all_products(conn, &ProductQuery::default())?)
}

fn attachment(content_type: &str, filename: &str, body: Vec<u8>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(content_type)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename.to_string())],
        })
        .body(body)
}

pub async fn export_csv(_user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let products = load_for_export(&data)?;
    if products.is_empty() {
        return Ok(HttpResponse::NotFound().body("No data to export"));
    }

    let body = products_to_csv(&products).map_err(|e| AppError::Persistence(e.to_string()))?;
    Ok(attachment("text/csv; charset=utf-8", "products.csv", body))
}

pub async fn export_excel(_user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let products = load_for_export(&data)?;
    if products.is_empty() {
        return Ok(HttpResponse::NotFound().body("No data to export"));
    }

    let body = products_to_xlsx(&products).map_err(|e| AppError::Persistence(e.to_string()))?;
    Ok(attachment(XLSX_CONTENT_TYPE, "products.xlsx", body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn csv_has_header_and_one_row_per_product() {
        let timestamp = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
            .and_utc();
        let products = vec![Product {
            id: "A1".into(),
            name: "Milk, whole".into(),
            brand: None,
            barcode: "4001".into(),
            price: 1.5,
            quantity: 3,
            images: vec!["uploads/A1_0.png".into(), "uploads/A1_1.png".into()],
            timestamp,
        }];
        let csv = String::from_utf8(products_to_csv(&products).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("ID,Name,Brand,Barcode,Price,Quantity,Images,Timestamp"));
        assert_eq!(
            lines.next(),
            Some("A1,\"Milk, whole\",,4001,1.5,3,uploads/A1_0.png;uploads/A1_1.png,2024-06-01 09:30:00")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn xlsx_is_a_zip_workbook() {
        let timestamp = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
            .and_utc();
        let products = vec![Product {
            id: "A1".into(),
            name: "Milk".into(),
            brand: Some("Acme".into()),
            barcode: "4001".into(),
            price: 1.5,
            quantity: 3,
            images: vec![],
            timestamp,
        }];
        let body = products_to_xlsx(&products).unwrap();
        assert!(body.starts_with(b"PK"));
    }
}
