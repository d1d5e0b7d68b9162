//! Application services behind the HTTP handlers
pub mod catalog;
pub mod invoice;
pub mod promotion;

pub use catalog::CatalogService;
pub use invoice::{BulkGenerateResult, GenerateInvoiceRequest, InvoiceService, InvoiceStats, ListInvoicesParams, UpdateStatusRequest};
pub use promotion::{
    CreatePromotionRequest, ListPromotionsParams, PromoValidation, PromotionService, RedeemRequest, UpdatePromotionRequest,
    ValidatePromoRequest,
};
