use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::models::{OrderStatus, Role};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;
/// Largest page whose offset still fits in an `i64` at the maximum limit.
pub const MAX_PAGE: i64 = i64::MAX / MAX_LIMIT;

#[derive(Debug, Default, Clone, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    pub page: Option<i64>,
    #[serde(alias = "per_page")]
    pub limit: Option<i64>,
}

impl Pagination {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self { page, limit }
    }

    /// Returns `(page, limit, offset)` with page ≥ 1 and limit clamped to 1..=100.
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).clamp(1, MAX_PAGE);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = (page - 1) * limit;
        (page, limit, offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// `asc` in any case selects ascending; anything else is descending.
    pub fn from_param(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.eq_ignore_ascii_case("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }
}

/// Sortable product columns. Anything outside this list sorts by creation time,
/// so a client can never smuggle a column name into the ORDER BY clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductSortBy {
    CreatedAt,
    Price,
    Name,
    Rating,
    Views,
}

impl ProductSortBy {
    pub fn from_param(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("price") => ProductSortBy::Price,
            Some("name") => ProductSortBy::Name,
            Some("rating") => ProductSortBy::Rating,
            Some("views") => ProductSortBy::Views,
            _ => ProductSortBy::CreatedAt,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductSortBy::CreatedAt => "created_at",
            ProductSortBy::Price => "price",
            ProductSortBy::Name => "name",
            ProductSortBy::Rating => "rating",
            ProductSortBy::Views => "views",
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Category slug or id.
    pub category: Option<String>,
    pub featured: Option<bool>,
    pub new_arrival: Option<bool>,
    pub black_friday: Option<bool>,
    pub deals: Option<bool>,
    pub search: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    /// One of created_at, price, name, rating, views. Unknown values sort by created_at.
    pub sort_by: Option<String>,
    /// `ASC` or `DESC`, default `DESC`.
    pub order: Option<String>,
}

impl ProductQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }

    pub fn sort(&self) -> (ProductSortBy, SortOrder) {
        (
            ProductSortBy::from_param(self.sort_by.as_deref()),
            SortOrder::from_param(self.order.as_deref()),
        )
    }
}

#[derive(Debug, Default, Clone, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LimitQuery {
    pub limit: Option<u64>,
}

impl LimitQuery {
    pub fn limit_or(&self, default: u64) -> u64 {
        self.limit.unwrap_or(default).clamp(1, MAX_LIMIT as u64)
    }
}

#[derive(Debug, Default, Clone, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    pub page: Option<i64>,
    #[serde(alias = "per_page")]
    pub limit: Option<i64>,
    pub status: Option<OrderStatus>,
    /// `asc` or `desc` on created_at, default `desc`.
    pub sort_order: Option<String>,
}

impl OrderListQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }
}

#[derive(Debug, Default, Clone, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub role: Option<Role>,
    pub search: Option<String>,
}

impl UserListQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }
}

/// A category filter arrives as a slug or as an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryRef {
    Id(Uuid),
    Slug(String),
}

impl CategoryRef {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        Some(match Uuid::parse_str(raw) {
            Ok(id) => CategoryRef::Id(id),
            Err(_) => CategoryRef::Slug(raw.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_page_and_limit() {
        assert_eq!(Pagination::default().normalize(), (1, 20, 0));
        assert_eq!(Pagination::new(Some(0), Some(0)).normalize(), (1, 1, 0));
        assert_eq!(Pagination::new(Some(3), Some(500)).normalize(), (3, 100, 200));
        assert_eq!(Pagination::new(Some(-4), Some(10)).normalize(), (1, 10, 0));
    }

    #[test]
    fn normalize_bounds_huge_pages() {
        let (page, limit, offset) = Pagination::new(Some(i64::MAX), Some(i64::MAX)).normalize();
        assert_eq!(page, MAX_PAGE);
        assert_eq!(limit, MAX_LIMIT);
        assert_eq!(offset, (MAX_PAGE - 1) * MAX_LIMIT);
        assert!(offset >= 0);
    }

    #[test]
    fn unknown_sort_field_falls_back_to_created_at() {
        assert_eq!(ProductSortBy::from_param(None), ProductSortBy::CreatedAt);
        assert_eq!(
            ProductSortBy::from_param(Some("unknown_field")),
            ProductSortBy::CreatedAt
        );
        assert_eq!(
            ProductSortBy::from_param(Some("price; DROP TABLE products")),
            ProductSortBy::CreatedAt
        );
        assert_eq!(ProductSortBy::from_param(Some("views")), ProductSortBy::Views);
        assert_eq!(ProductSortBy::from_param(Some("rating")).as_str(), "rating");
    }

    #[test]
    fn sort_order_defaults_to_desc() {
        assert_eq!(SortOrder::from_param(Some("ASC")), SortOrder::Asc);
        assert_eq!(SortOrder::from_param(Some("asc")), SortOrder::Asc);
        assert_eq!(SortOrder::from_param(Some("sideways")), SortOrder::Desc);
        assert_eq!(SortOrder::from_param(None), SortOrder::Desc);
    }

    #[test]
    fn category_ref_distinguishes_ids_from_slugs() {
        let id = Uuid::new_v4();
        assert_eq!(CategoryRef::parse(&id.to_string()), Some(CategoryRef::Id(id)));
        assert_eq!(
            CategoryRef::parse(" shoes "),
            Some(CategoryRef::Slug("shoes".into()))
        );
        assert_eq!(CategoryRef::parse("  "), None);
    }
}
