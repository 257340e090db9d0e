diesel::table! {
    products (id) {
        id -> Text,
        name -> Text,
        brand -> Nullable<Text>,
        barcode -> Text,
        price -> Double,
        quantity -> Integer,
        images_json -> Text,
        timestamp -> Timestamp,
    }
}

diesel::table! {
    users (id) {
        id -> Integer,
        username -> Text,
        password_hash -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    products,
    users,
);
