use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::db::models::*;
use crate::db::schema::*;
use crate::models::ProductQuery;

pub fn create_product(conn: &mut SqliteConnection, product: &Product) -> QueryResult<()> {
    diesel::insert_into(products::table)
        .values(ProductRow::from(product))
        .execute(conn)
        .map(|_| ())
}

pub fn get_product(conn: &mut SqliteConnection, id: &str) -> QueryResult<Product> {
    products::table
        .find(id)
        .select(ProductRow::as_select())
        .first(conn)
        .map(Product::from)
}

pub fn product_exists(conn: &mut SqliteConnection, id: &str) -> QueryResult<bool> {
    diesel::select(diesel::dsl::exists(products::table.find(id))).get_result(conn)
}

pub fn get_all_products(conn: &mut SqliteConnection, query: &ProductQuery) -> QueryResult<Vec<Product>> {
    let mut rows = products::table.select(ProductRow::as_select()).into_boxed();

    if let Some(min) = query.min_price {
        rows = rows.filter(products::price.ge(min));
    }

    if let Some(max) = query.max_price {
        rows = rows.filter(products::price.le(max));
    }

    if let Some(term) = query.search_term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        // SQLite LIKE is case-insensitive for ASCII.
        let pattern = format!("%{}%", escape_like(term));
        rows = rows.filter(
            products::name
                .like(pattern.clone())
                .escape('\\')
                .or(products::brand.like(pattern.clone()).escape('\\'))
                .or(products::barcode.like(pattern).escape('\\')),
        );
    }

    let descending = query.sort_order.as_deref() == Some("desc");
    rows = match (query.sort_by.as_deref(), descending) {
        (Some("name"), false) => rows.order(products::name.asc()),
        (Some("name"), true) => rows.order(products::name.desc()),
        (Some("price"), false) => rows.order(products::price.asc()),
        (Some("price"), true) => rows.order(products::price.desc()),
        (Some("quantity"), false) => rows.order(products::quantity.asc()),
        (Some("quantity"), true) => rows.order(products::quantity.desc()),
        (Some("timestamp"), true) => rows.order((products::timestamp.desc(), products::id.desc())),
        _ => rows.order((products::timestamp.asc(), products::id.asc())),
    };

    rows.load::<ProductRow>(conn)
        .map(|rows| rows.into_iter().map(Product::from).collect())
}

/// Search input is matched literally; `%` and `_` are not wildcards.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Applies `changes` and returns the stored record. An empty changeset is a read.
pub fn update_product(
    conn: &mut SqliteConnection,
    id: &str,
    changes: &UpdateProduct,
) -> QueryResult<Product> {
    if changes.is_empty() {
        return get_product(conn, id);
    }
    conn.transaction(|conn| {
        let updated = diesel::update(products::table.find(id))
            .set(changes)
            .execute(conn)?;
        if updated == 0 {
            return Err(diesel::result::Error::NotFound);
        }
        get_product(conn, id)
    })
}

pub fn delete_product(conn: &mut SqliteConnection, id: &str) -> QueryResult<usize> {
    let deleted = diesel::delete(products::table.find(id)).execute(conn)?;
    if deleted == 0 {
        return Err(diesel::result::Error::NotFound);
    }
    Ok(deleted)
}

pub fn delete_all_products(conn: &mut SqliteConnection) -> QueryResult<usize> {
    conn.transaction(|conn| diesel::delete(products::table).execute(conn))
}

pub fn create_user(conn: &mut SqliteConnection, new_user: &NewUser) -> QueryResult<()> {
    diesel::insert_into(users::table)
        .values(new_user)
        .execute(conn)
        .map(|_| ())
}

pub fn find_user_by_username(conn: &mut SqliteConnection, name: &str) -> QueryResult<Option<User>> {
    users::table
        .filter(users::username.eq(name))
        .select(User::as_select())
        .first(conn)
        .optional()
}

pub fn count_users(conn: &mut SqliteConnection) -> QueryResult<i64> {
    users::table.count().get_result(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use diesel::Connection;
    use diesel_migrations::MigrationHarness;

    use crate::db::connection::MIGRATIONS;

    fn conn() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        conn.run_pending_migrations(MIGRATIONS).unwrap();
        conn
    }

    fn product(id: &str, name: &str, price: f64, offset_secs: i64) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            brand: None,
            barcode: format!("400{}", id),
            price,
            quantity: 1,
            images: vec![format!("uploads/{}_0.png", id)],
            timestamp: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn create_then_get_round_trips_images() {
        let conn = &mut conn();
        let p = product("A1", "Milk", 1.5, 0);
        create_product(conn, &p).unwrap();
        let stored = get_product(conn, "A1").unwrap();
        assert_eq!(stored.images, p.images);
        assert_eq!(stored.name, "Milk");
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let conn = &mut conn();
        create_product(conn, &product("A1", "Milk", 1.5, 0)).unwrap();
        let err = create_product(conn, &product("A1", "Bread", 2.0, 1)).unwrap_err();
        assert!(matches!(
            err,
            diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _)
        ));
    }

    #[test]
    fn list_defaults_to_insertion_order() {
        let conn = &mut conn();
        create_product(conn, &product("A10", "Zucchini", 3.0, 0)).unwrap();
        create_product(conn, &product("A9", "Apple", 1.0, 5)).unwrap();
        let ids: Vec<_> = get_all_products(conn, &ProductQuery::default())
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["A10", "A9"]);
    }

    #[test]
    fn list_filters_and_sorts() {
        let conn = &mut conn();
        create_product(conn, &product("A1", "Oat Milk", 3.0, 0)).unwrap();
        create_product(conn, &product("A2", "Bread", 2.0, 1)).unwrap();
        create_product(conn, &product("A3", "Milk", 1.0, 2)).unwrap();

        let query = ProductQuery {
            search_term: Some("milk".to_string()),
            sort_by: Some("price".to_string()),
            ..Default::default()
        };
        let names: Vec<_> = get_all_products(conn, &query)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Milk", "Oat Milk"]);

        let query = ProductQuery {
            min_price: Some(1.5),
            max_price: Some(2.5),
            ..Default::default()
        };
        let found = get_all_products(conn, &query).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "A2");
    }

    #[test]
    fn update_keeps_id_and_timestamp() {
        let conn = &mut conn();
        let original = product("A1", "Milk", 1.5, 0);
        create_product(conn, &original).unwrap();

        let changes = UpdateProduct {
            name: Some("Whole Milk".to_string()),
            price: Some(1.75),
            ..Default::default()
        };
        let updated = update_product(conn, "A1", &changes).unwrap();
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.timestamp, original.timestamp);
        assert_eq!(updated.name, "Whole Milk");
        assert_eq!(updated.price, 1.75);
        assert_eq!(updated.barcode, original.barcode);
    }

    #[test]
    fn empty_update_is_a_read() {
        let conn = &mut conn();
        create_product(conn, &product("A1", "Milk", 1.5, 0)).unwrap();
        let same = update_product(conn, "A1", &UpdateProduct::default()).unwrap();
        assert_eq!(same.name, "Milk");
    }

    #[test]
    fn update_and_delete_missing_are_not_found() {
        let conn = &mut conn();
        let changes = UpdateProduct {
            quantity: Some(3),
            ..Default::default()
        };
        assert_eq!(
            update_product(conn, "nope", &changes).unwrap_err(),
            diesel::result::Error::NotFound
        );
        assert_eq!(delete_product(conn, "nope").unwrap_err(), diesel::result::Error::NotFound);
    }

    #[test]
    fn delete_then_get_is_not_found() {
        let conn = &mut conn();
        create_product(conn, &product("A1", "Milk", 1.5, 0)).unwrap();
        delete_product(conn, "A1").unwrap();
        assert_eq!(get_product(conn, "A1").unwrap_err(), diesel::result::Error::NotFound);
        assert!(!product_exists(conn, "A1").unwrap());
    }

    #[test]
    fn delete_all_empties_the_table() {
        let conn = &mut conn();
        create_product(conn, &product("A1", "Milk", 1.5, 0)).unwrap();
        create_product(conn, &product("A2", "Bread", 2.0, 1)).unwrap();
        assert_eq!(delete_all_products(conn).unwrap(), 2);
        assert!(get_all_products(conn, &ProductQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn users_are_found_by_name() {
        let conn = &mut conn();
        assert_eq!(count_users(conn).unwrap(), 0);
        create_user(
            conn,
            &NewUser {
                username: "clerk".to_string(),
                password_hash: "salt$digest".to_string(),
            },
        )
        .unwrap();
        let user = find_user_by_username(conn, "clerk").unwrap().unwrap();
        assert_eq!(user.password_hash, "salt$digest");
        assert!(find_user_by_username(conn, "ghost").unwrap().is_none());
        assert_eq!(count_users(conn).unwrap(), 1);
    }

    #[test]
    fn search_wildcards_match_literally() {
        let conn = &mut conn();
        create_product(conn, &product("A1", "100% Juice", 3.0, 0)).unwrap();
        create_product(conn, &product("A2", "1000 Sheets", 2.0, 1)).unwrap();
        create_product(conn, &product("A3", "Snack_Bar", 1.0, 2)).unwrap();
        create_product(conn, &product("A4", "SnackBar", 1.0, 3)).unwrap();

        let search = |conn: &mut SqliteConnection, term: &str| -> Vec<String> {
            let query = ProductQuery {
                search_term: Some(term.to_string()),
                ..Default::default()
            };
            get_all_products(conn, &query).unwrap().into_iter().map(|p| p.id).collect()
        };
        assert_eq!(search(conn, "100%"), vec!["A1"]);
        assert_eq!(search(conn, "k_B"), vec!["A3"]);
        assert_eq!(search(conn, "%"), vec!["A1"]);
    }
}
