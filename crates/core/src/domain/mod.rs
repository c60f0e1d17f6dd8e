pub mod quotation;
pub mod summary;
pub mod usage;

pub use quotation::{
    CatalogItem, DocumentLine, LineField, LineRules, Quotation, QuotationHeader, MIN_EDIT_PRICE,
};
pub use summary::{DocStatus, QuotationSummary, SummaryLine};
pub use usage::{compute_usage, DEFAULT_USAGE};
