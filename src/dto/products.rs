use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::Product;

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[validate(schema(function = "sale_below_price", skip_on_field_errors = false))]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200, message = "Product name is required"))]
    pub name: String,
    /// Derived from `name` when omitted.
    #[validate(custom(function = "crate::dto::slug"))]
    pub slug: Option<String>,
    /// Defaults to `PROD-<epoch_ms>`.
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub brand: Option<String>,
    #[validate(range(min = 0, message = "Price must be a positive amount"))]
    pub price: i64,
    #[validate(range(min = 0))]
    pub sale_price: Option<i64>,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock_quantity: i32,
    #[serde(default)]
    #[validate(length(max = 5, message = "A product can have at most 5 images"))]
    pub images: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub is_new_arrival: bool,
    #[serde(default)]
    pub black_friday_deal: bool,
    #[serde(default)]
    #[validate(range(min = 0, max = 100))]
    pub black_friday_discount: i32,
}

fn sale_below_price(req: &CreateProductRequest) -> Result<(), ValidationError> {
    check_sale_price(req.price, req.sale_price)
}

pub(crate) fn check_sale_price(price: i64, sale_price: Option<i64>) -> Result<(), ValidationError> {
    match sale_price {
        Some(sale) if sale >= price => Err(ValidationError::new("sale_price")
            .with_message("Sale price must be lower than the regular price".into())),
        _ => Ok(()),
    }
}

/// Partial update. `sale_price` and `category_id` accept an explicit `null`
/// to clear the value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(custom(function = "crate::dto::slug"))]
    pub slug: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub brand: Option<String>,
    #[validate(range(min = 0))]
    pub price: Option<i64>,
    #[serde(default, deserialize_with = "crate::dto::nullable")]
    #[schema(value_type = Option<i64>)]
    pub sale_price: Option<Option<i64>>,
    #[serde(default, deserialize_with = "crate::dto::nullable")]
    #[schema(value_type = Option<Uuid>)]
    pub category_id: Option<Option<Uuid>>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock_quantity: Option<i32>,
    #[validate(length(max = 5, message = "A product can have at most 5 images"))]
    pub images: Option<Vec<String>>,
    pub sizes: Option<Vec<String>>,
    pub colors: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    pub is_new_arrival: Option<bool>,
    pub black_friday_deal: Option<bool>,
    #[validate(range(min = 0, max = 100))]
    pub black_friday_discount: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct RateProductRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(price: i64, sale_price: Option<i64>) -> CreateProductRequest {
        serde_json::from_value(serde_json::json!({
            "name": "Runner",
            "price": price,
            "sale_price": sale_price,
        }))
        .unwrap()
    }

    #[test]
    fn sale_price_must_undercut_price() {
        assert!(create(1000, Some(800)).validate().is_ok());
        assert!(create(1000, None).validate().is_ok());
        assert!(create(1000, Some(1000)).validate().is_err());
        assert!(create(1000, Some(1500)).validate().is_err());
    }

    #[test]
    fn image_count_is_capped() {
        let mut req = create(1000, None);
        req.images = (0..6).map(|i| format!("https://cdn.test/{i}.jpg")).collect();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("images"));
    }

    #[test]
    fn update_distinguishes_null_from_absent() {
        let absent: UpdateProductRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.sale_price, None);

        let cleared: UpdateProductRequest =
            serde_json::from_str(r#"{"sale_price": null}"#).unwrap();
        assert_eq!(cleared.sale_price, Some(None));

        let set: UpdateProductRequest = serde_json::from_str(r#"{"sale_price": 700}"#).unwrap();
        assert_eq!(set.sale_price, Some(Some(700)));
    }
}
