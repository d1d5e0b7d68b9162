//! Aggregates module
pub mod admin_user;
pub mod category;
pub mod customer;
pub mod invoice;
pub mod order;
pub mod promotion;

pub use admin_user::{AdminRecord, AdminStatus, AdminUser, PasswordPolicy};
pub use category::{Category, SubCategory};
pub use customer::{Customer, CustomerProfile, CustomerRecord};
pub use invoice::{BankDetails, Invoice, InvoiceDraft, InvoiceError, InvoiceStatus, InvoiceTerms, InvoiceType, SellerDetails};
pub use order::{Order, OrderStatus};
pub use promotion::{Promotion, PromotionBanner, PromotionStatus, PromotionType, PromotionUsage, RedemptionContext, RuleViolation};
