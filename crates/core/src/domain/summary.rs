use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
    Open,
    Closed,
    Cancelled,
    Unknown,
}

impl DocStatus {
    fn from_backend(status: Option<&str>, cancelled: Option<&str>) -> Self {
        if matches!(cancelled, Some(flag) if flag.eq_ignore_ascii_case("tYES")) {
            return Self::Cancelled;
        }

        match status.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("bost_open" | "o" | "open") => Self::Open,
            Some("bost_close" | "bost_closed" | "c" | "closed") => Self::Closed,
            Some("bost_cancelled" | "cancelled" | "canceled") => Self::Cancelled,
            _ => Self::Unknown,
        }
    }
}

/// Saved quotation as returned by the backend. Totals come from the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSummary")]
pub struct QuotationSummary {
    pub doc_entry: i64,
    pub doc_num: Option<i64>,
    pub card_code: String,
    pub card_name: Option<String>,
    pub doc_date: Option<NaiveDate>,
    pub tax_date: Option<NaiveDate>,
    pub doc_due_date: Option<NaiveDate>,
    pub doc_status: DocStatus,
    pub doc_total: Decimal,
    pub currency: Option<String>,
    pub payment_group_code: Option<i32>,
    pub bpl_id: Option<i32>,
    pub comments: Option<String>,
    pub delivery_address: Option<String>,
    pub lines: Vec<SummaryLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawLine")]
pub struct SummaryLine {
    pub line_num: usize,
    pub item_code: String,
    pub description: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub discount_percent: Decimal,
    pub unit_of_measure: Option<String>,
    pub usage: Option<i32>,
}

#[derive(Deserialize)]
struct RawSummary {
    #[serde(rename = "DocEntry", alias = "docEntry")]
    doc_entry: i64,
    #[serde(default, rename = "DocNum", alias = "docNum")]
    doc_num: Option<i64>,
    #[serde(default, rename = "CardCode", alias = "cardCode")]
    card_code: String,
    #[serde(default, rename = "CardName", alias = "cardName")]
    card_name: Option<String>,
    #[serde(default, rename = "DocDate", alias = "docDate", deserialize_with = "backend_date")]
    doc_date: Option<NaiveDate>,
    #[serde(default, rename = "TaxDate", alias = "taxDate", deserialize_with = "backend_date")]
    tax_date: Option<NaiveDate>,
    #[serde(
        default,
        rename = "DocDueDate",
        alias = "docDueDate",
        deserialize_with = "backend_date"
    )]
    doc_due_date: Option<NaiveDate>,
    #[serde(default, rename = "DocumentStatus", alias = "docStatus")]
    doc_status: Option<String>,
    #[serde(default, rename = "Cancelled", alias = "cancelled")]
    cancelled: Option<String>,
    #[serde(default, rename = "DocTotal", alias = "docTotal")]
    doc_total: Option<Decimal>,
    #[serde(default, rename = "DocCurrency", alias = "docCurrency")]
    currency: Option<String>,
    #[serde(default, rename = "PaymentGroupCode", alias = "paymentGroupCode")]
    payment_group_code: Option<i32>,
    #[serde(default, rename = "BPL_IDAssignedToInvoice", alias = "bplId")]
    bpl_id: Option<i32>,
    #[serde(default, rename = "Comments", alias = "comments")]
    comments: Option<String>,
    #[serde(default, rename = "Address2", alias = "address2")]
    delivery_address: Option<String>,
    #[serde(default, rename = "DocumentLines", alias = "documentLines")]
    lines: Option<Vec<SummaryLine>>,
}

impl From<RawSummary> for QuotationSummary {
    fn from(raw: RawSummary) -> Self {
        Self {
            doc_entry: raw.doc_entry,
            doc_num: raw.doc_num,
            card_code: raw.card_code,
            card_name: raw.card_name,
            doc_date: raw.doc_date,
            tax_date: raw.tax_date,
            doc_due_date: raw.doc_due_date,
            doc_status: DocStatus::from_backend(
                raw.doc_status.as_deref(),
                raw.cancelled.as_deref(),
            ),
            doc_total: raw.doc_total.unwrap_or_default(),
            currency: raw.currency,
            payment_group_code: raw.payment_group_code,
            bpl_id: raw.bpl_id,
            comments: raw.comments,
            delivery_address: raw.delivery_address,
            lines: raw.lines.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct RawLine {
    #[serde(default, rename = "LineNum", alias = "lineNum")]
    line_num: usize,
    #[serde(default, rename = "ItemCode", alias = "itemCode")]
    item_code: String,
    #[serde(default, rename = "ItemDescription", alias = "itemDescription")]
    description: Option<String>,
    #[serde(default, rename = "Quantity", alias = "quantity")]
    quantity: Option<Decimal>,
    #[serde(default, rename = "UnitPrice", alias = "Price", alias = "preco")]
    price: Option<Decimal>,
    #[serde(default, rename = "DiscountPercent", alias = "discountPercent")]
    discount_percent: Option<Decimal>,
    #[serde(default, rename = "MeasureUnit", alias = "measureUnit")]
    unit_of_measure: Option<String>,
    #[serde(default, rename = "Usage", alias = "usage")]
    usage: Option<i32>,
}

impl From<RawLine> for SummaryLine {
    fn from(raw: RawLine) -> Self {
        Self {
            line_num: raw.line_num,
            item_code: raw.item_code,
            description: raw.description.unwrap_or_default(),
            quantity: raw.quantity.unwrap_or_default(),
            price: raw.price.unwrap_or_default(),
            discount_percent: raw.discount_percent.unwrap_or_default(),
            unit_of_measure: raw.unit_of_measure,
            usage: raw.usage,
        }
    }
}

/// Accepts `YYYY-MM-DD` as well as date-time strings, keeping the date part.
fn backend_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
    else {
        return Ok(None);
    };

    let date_part = raw.get(..10).unwrap_or(raw.as_str());
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map(Some).map_err(serde::de::Error::custom)
}
