use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus};

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"), nested)]
    pub items: Vec<OrderLineRequest>,
    #[schema(value_type = Object)]
    #[validate(custom(function = "address_present"))]
    pub shipping_address: serde_json::Value,
    #[schema(value_type = Option<Object>)]
    #[serde(default)]
    pub billing_address: Option<serde_json::Value>,
    pub payment_method: PaymentMethod,
    /// Client-side total. When present it must match the server-computed total.
    #[serde(default)]
    pub total_amount: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct OrderLineRequest {
    #[serde(alias = "productId")]
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    #[serde(default)]
    #[validate(custom(function = "crate::dto::not_blank", message = "Size is required"))]
    pub size: String,
    #[serde(default)]
    #[validate(custom(function = "crate::dto::not_blank", message = "Color is required"))]
    pub color: String,
    /// Client-side unit price. When present it must match the live price.
    #[serde(default)]
    pub price: Option<i64>,
}

fn address_present(value: &serde_json::Value) -> Result<(), ValidationError> {
    let present = match value {
        serde_json::Value::Null => false,
        serde_json::Value::String(s) => !s.trim().is_empty(),
        serde_json::Value::Object(map) => !map.is_empty(),
        _ => true,
    };
    if !present {
        return Err(ValidationError::new("required")
            .with_message("Shipping address is required".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct OrderList {
    #[schema(value_type = Vec<Order>)]
    pub items: Vec<Order>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(items: serde_json::Value) -> CreateOrderRequest {
        serde_json::from_value(serde_json::json!({
            "items": items,
            "shipping_address": { "line1": "1 Main St" },
            "payment_method": "credit_card",
        }))
        .unwrap()
    }

    fn line(quantity: i32) -> serde_json::Value {
        serde_json::json!({
            "productId": Uuid::new_v4(),
            "quantity": quantity,
            "size": "M",
            "color": "Black",
        })
    }

    #[test]
    fn order_needs_at_least_one_valid_line() {
        assert!(order(serde_json::json!([line(2)])).validate().is_ok());

        let empty = order(serde_json::json!([])).validate().unwrap_err();
        assert!(empty.errors().contains_key("items"));

        let zero = order(serde_json::json!([line(2), line(0)])).validate().unwrap_err();
        assert!(zero.errors().contains_key("items"));
    }

    #[test]
    fn blank_shipping_address_is_rejected() {
        let mut req = order(serde_json::json!([line(1)]));
        req.shipping_address = serde_json::json!({});
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("shipping_address"));
    }
}
