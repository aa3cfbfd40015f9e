use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        admin::{DashboardStats, InventoryAdjustRequest, LowStockQuery, StatusCount},
        auth::{AuthResponse, LoginRequest, RegisterRequest},
        cart::{AddToCartRequest, CartView, UpdateCartItemRequest},
        categories::{CreateCategoryRequest, UpdateCategoryRequest},
        orders::{
            CreateOrderRequest, OrderLineRequest, OrderList, OrderWithItems,
            UpdateOrderStatusRequest, UpdatePaymentStatusRequest,
        },
        products::{CreateProductRequest, ProductList, RateProductRequest, UpdateProductRequest},
        users::{ChangePasswordRequest, UpdateProfileRequest, UpdateRoleRequest},
    },
    models::{
        Cart, CartItem, Category, CategoryNode, Order, OrderItem, OrderStatus, PaymentMethod,
        PaymentStatus, Product, Role, User,
    },
    response::{ApiResponse, ErrorBody, ErrorResponse, Meta},
    routes::{
        admin, auth, cart, categories, health, orders, params, products as product_routes, users,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::me,
        product_routes::list_products,
        product_routes::featured_products,
        product_routes::new_arrivals,
        product_routes::black_friday_deals,
        product_routes::get_product_by_slug,
        product_routes::get_product,
        product_routes::related_products,
        product_routes::rate_product,
        product_routes::create_product,
        product_routes::update_product,
        product_routes::delete_product,
        categories::list_categories,
        categories::category_tree,
        categories::get_category_by_slug,
        categories::get_category,
        categories::category_children,
        categories::category_products,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        cart::get_cart,
        cart::clear_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_cart_item,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::update_order_status,
        orders::update_payment_status,
        users::get_profile,
        users::update_profile,
        users::change_password,
        users::list_users,
        users::get_user,
        users::update_user_role,
        users::delete_user,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::list_low_stock,
        admin::adjust_inventory,
        admin::dashboard_stats
    ),
    components(
        schemas(
            User,
            Role,
            Product,
            Category,
            CategoryNode,
            Cart,
            CartItem,
            Order,
            OrderItem,
            OrderStatus,
            PaymentStatus,
            PaymentMethod,
            RegisterRequest,
            LoginRequest,
            AuthResponse,
            CreateProductRequest,
            UpdateProductRequest,
            RateProductRequest,
            ProductList,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartView,
            CreateOrderRequest,
            OrderLineRequest,
            UpdateOrderStatusRequest,
            UpdatePaymentStatusRequest,
            OrderWithItems,
            OrderList,
            UpdateProfileRequest,
            ChangePasswordRequest,
            UpdateRoleRequest,
            InventoryAdjustRequest,
            LowStockQuery,
            StatusCount,
            DashboardStats,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::UserListQuery,
            health::HealthData,
            Meta,
            ErrorResponse,
            ErrorBody,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartView>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<DashboardStats>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration, login and identity"),
        (name = "Products", description = "Catalog browsing and product management"),
        (name = "Categories", description = "Category hierarchy"),
        (name = "Cart", description = "The caller's shopping cart"),
        (name = "Orders", description = "Checkout and order history"),
        (name = "Users", description = "Profiles and user administration"),
        (name = "Admin", description = "Back-office endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_router_prefix_is_documented() {
        let spec = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/auth/register",
            "/api/products/{id}",
            "/api/categories/tree",
            "/api/cart/items/{item_id}",
            "/api/orders/{id}/payment-status",
            "/api/users/{id}/role",
            "/api/admin/stats",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
