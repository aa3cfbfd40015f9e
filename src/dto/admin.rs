use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{models::OrderStatus, routes::params::Pagination};

pub const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

#[derive(Debug, Default, Clone, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LowStockQuery {
    /// Products at or below this stock level are listed. Default 5.
    pub threshold: Option<i32>,
    pub page: Option<i64>,
    #[serde(alias = "per_page")]
    pub limit: Option<i64>,
}

impl LowStockQuery {
    pub fn threshold(&self) -> i32 {
        self.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD).max(0)
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct InventoryAdjustRequest {
    /// Signed change applied to the current stock.
    pub delta: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardStats {
    pub total_users: i64,
    pub active_products: i64,
    pub total_orders: i64,
    /// Sum of order totals excluding cancelled and refunded orders.
    pub revenue: i64,
    pub orders_by_status: Vec<StatusCount>,
}
