//! Tripund storefront backend
//!
//! JSON API for the Tripund handicrafts storefront and admin console.
//!
//! ## Features
//! - Customer and admin authentication with role/permission checks
//! - Account lockout and an audit trail for admin actions
//! - GST invoices generated from orders, numbered per month
//! - Promo code validation and redemption

pub mod api;
pub mod audit;
pub mod auth;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod rbac;
pub mod services;
pub mod settings;
pub mod store;

use serde::{Deserialize, Serialize};

pub use error::{ApiError, Result};

// =============================================================================
// Pagination
// =============================================================================

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageParams {
    /// `(page, per_page)` clamped to `1..` and `1..=100`.
    pub fn resolve(self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        (page, per_page)
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PaginatedResponse<T> {
    /// Slices one page out of an already ordered result set.
    pub fn from_all(all: Vec<T>, params: PageParams) -> Self {
        let (page, per_page) = params.resolve();
        let total = all.len() as i64;
        let data = all.into_iter().skip(((page - 1) * per_page) as usize).take(per_page as usize).collect();
        Self { data, total, page, per_page }
    }
}
