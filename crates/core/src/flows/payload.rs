use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::quotation::Quotation;

pub const QUOTATION_OBJECT_CODE: &str = "oQuotations";
pub const ITEM_DOCUMENT_TYPE: &str = "dDocument_Items";
pub const DEFAULT_PAYMENT_GROUP_CODE: i32 = -1;
pub const DEFAULT_DUE_DATE_OFFSET_DAYS: i64 = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayloadDefaults {
    pub payment_group_code: i32,
    pub due_date_offset_days: i64,
}

impl Default for PayloadDefaults {
    fn default() -> Self {
        Self {
            payment_group_code: DEFAULT_PAYMENT_GROUP_CODE,
            due_date_offset_days: DEFAULT_DUE_DATE_OFFSET_DAYS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxExtension {
    #[serde(rename = "MainUsage")]
    pub main_usage: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadLine {
    #[serde(rename = "LineNum")]
    pub line_num: usize,
    #[serde(rename = "ItemCode")]
    pub item_code: String,
    #[serde(rename = "ItemDescription", skip_serializing_if = "String::is_empty", default)]
    pub description: String,
    #[serde(rename = "Quantity", with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(rename = "UnitPrice", with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(rename = "DiscountPercent", with = "rust_decimal::serde::float")]
    pub discount_percent: Decimal,
    #[serde(rename = "MeasureUnit", skip_serializing_if = "Option::is_none", default)]
    pub unit_of_measure: Option<String>,
    #[serde(rename = "Usage")]
    pub usage: i32,
}

/// Document body sent to the backend when a quotation is created or updated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationPayload {
    #[serde(rename = "DocObjectCode")]
    pub doc_object_code: String,
    #[serde(rename = "DocType")]
    pub doc_type: String,
    #[serde(rename = "BPL_IDAssignedToInvoice", skip_serializing_if = "Option::is_none")]
    pub bpl_id: Option<i32>,
    #[serde(rename = "CardCode")]
    pub card_code: String,
    #[serde(rename = "DocDate")]
    pub doc_date: NaiveDate,
    #[serde(rename = "TaxDate")]
    pub tax_date: NaiveDate,
    #[serde(rename = "DocDueDate")]
    pub doc_due_date: NaiveDate,
    #[serde(rename = "DocCurrency", skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(rename = "PaymentGroupCode")]
    pub payment_group_code: i32,
    #[serde(rename = "Comments", skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(rename = "Address2", skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
    #[serde(rename = "Address", skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<String>,
    #[serde(rename = "DocumentLines")]
    pub lines: Vec<PayloadLine>,
    #[serde(rename = "TaxExtension")]
    pub tax_extension: TaxExtension,
}

/// Pure function of the draft and the current date. Every line carries the
/// usage derived from the header branch, whatever was stamped when it was added.
pub fn build_payload(
    draft: &Quotation,
    today: NaiveDate,
    defaults: &PayloadDefaults,
) -> QuotationPayload {
    let header = &draft.header;
    let usage = draft.usage();

    let lines = draft
        .lines()
        .iter()
        .map(|line| PayloadLine {
            line_num: line.line_num,
            item_code: line.item_code.clone(),
            description: line.description.clone(),
            quantity: line.quantity,
            unit_price: line.price,
            discount_percent: line.discount_percent,
            unit_of_measure: line.unit_of_measure.clone(),
            usage,
        })
        .collect();

    QuotationPayload {
        doc_object_code: QUOTATION_OBJECT_CODE.to_string(),
        doc_type: ITEM_DOCUMENT_TYPE.to_string(),
        bpl_id: header.bpl_id,
        card_code: header.card_code.clone().unwrap_or_default(),
        doc_date: header.doc_date.unwrap_or(today),
        tax_date: header.tax_date.unwrap_or(today),
        doc_due_date: header
            .doc_due_date
            .unwrap_or_else(|| offset_date(today, defaults.due_date_offset_days)),
        currency: non_blank(header.currency.as_deref()),
        payment_group_code: header.payment_group_code.unwrap_or(defaults.payment_group_code),
        comments: non_blank(header.comments.as_deref()),
        delivery_address: non_blank(header.delivery_address.as_deref()),
        billing_address: non_blank(header.billing_address.as_deref()),
        lines,
        tax_extension: TaxExtension { main_usage: usage },
    }
}

/// `today` shifted by `days`, pinned to the calendar bounds instead of overflowing.
fn offset_date(today: NaiveDate, days: i64) -> NaiveDate {
    Duration::try_days(days)
        .and_then(|offset| today.checked_add_signed(offset))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}
