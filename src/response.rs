use serde::Serialize;
use utoipa::ToSchema;

/// Pagination block attached to list responses.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq)]
pub struct Meta {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub total: Option<i64>,
    pub total_pages: Option<i64>,
    pub has_more: Option<bool>,
}

impl Meta {
    /// `returned` is the number of rows in the current page.
    pub fn new(page: i64, limit: i64, total: i64, returned: usize) -> Self {
        let offset = page.saturating_sub(1).saturating_mul(limit);
        let total_pages = if limit > 0 { total.saturating_add(limit - 1) / limit } else { 0 };
        Self {
            page: Some(page),
            limit: Some(limit),
            total: Some(total),
            total_pages: Some(total_pages),
            has_more: Some(offset.saturating_add(returned as i64) < total),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            meta,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                message: message.into(),
                details,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Meta;

    #[test]
    fn has_more_uses_offset_plus_returned() {
        let first = Meta::new(1, 20, 45, 20);
        assert_eq!(first.has_more, Some(true));
        assert_eq!(first.total_pages, Some(3));

        let last = Meta::new(3, 20, 45, 5);
        assert_eq!(last.has_more, Some(false));

        let empty = Meta::new(1, 20, 0, 0);
        assert_eq!(empty.has_more, Some(false));
        assert_eq!(empty.total_pages, Some(0));
    }

    #[test]
    fn extreme_values_saturate() {
        let meta = Meta::new(i64::MAX, 100, i64::MAX, 0);
        assert_eq!(meta.has_more, Some(false));
        assert!(meta.total_pages.is_some_and(|pages| pages > 0));
    }
}
