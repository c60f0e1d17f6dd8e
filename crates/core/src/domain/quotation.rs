use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::summary::QuotationSummary;
use crate::domain::usage::compute_usage;
use crate::errors::DomainError;

/// Lowest unit price accepted on a line of an already saved quotation.
pub const MIN_EDIT_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Numeric coercion applied to every line on every mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRules {
    /// Decimal places kept on quantity, unit price and computed totals.
    pub scale: u32,
}

impl Default for LineRules {
    fn default() -> Self {
        Self { scale: 2 }
    }
}

/// Item picked from the catalog when adding a line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub item_code: String,
    #[serde(default)]
    pub description: String,
    pub unit_price: Decimal,
    #[serde(default)]
    pub unit_of_measure: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub line_num: usize,
    pub item_code: String,
    pub description: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub discount_percent: Decimal,
    pub unit_of_measure: Option<String>,
    pub usage: i32,
}

impl DocumentLine {
    pub fn gross_total(&self, rules: &LineRules) -> Decimal {
        round(self.quantity * self.price, rules.scale)
    }

    pub fn discount_amount(&self, rules: &LineRules) -> Decimal {
        round(self.quantity * self.price * self.discount_percent / HUNDRED, rules.scale)
    }

    pub fn line_total(&self, rules: &LineRules) -> Decimal {
        self.gross_total(rules) - self.discount_amount(rules)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineField {
    ItemCode(String),
    Description(String),
    Quantity(Decimal),
    Price(Decimal),
    DiscountPercent(Decimal),
    UnitOfMeasure(Option<String>),
    Usage(i32),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationHeader {
    pub card_code: Option<String>,
    pub card_name: Option<String>,
    pub doc_date: Option<NaiveDate>,
    pub tax_date: Option<NaiveDate>,
    pub doc_due_date: Option<NaiveDate>,
    pub currency: Option<String>,
    pub payment_group_code: Option<i32>,
    pub bpl_id: Option<i32>,
    pub comments: Option<String>,
    pub delivery_address: Option<String>,
    pub billing_address: Option<String>,
}

/// Client-side quotation being composed. Lines are only reachable through the
/// methods below so `lines[i].line_num == i` holds after every mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Quotation {
    pub header: QuotationHeader,
    lines: Vec<DocumentLine>,
    editing: Option<i64>,
    rules: LineRules,
}

impl Quotation {
    pub fn new(rules: LineRules) -> Self {
        Self { header: QuotationHeader::default(), lines: Vec::new(), editing: None, rules }
    }

    /// Draft seeded from a saved quotation; submitting it updates that document.
    pub fn from_summary(summary: &QuotationSummary, rules: LineRules) -> Self {
        let mut draft = Self {
            header: QuotationHeader {
                card_code: Some(summary.card_code.clone()),
                card_name: summary.card_name.clone(),
                doc_date: summary.doc_date,
                tax_date: summary.tax_date,
                doc_due_date: summary.doc_due_date,
                currency: summary.currency.clone(),
                payment_group_code: summary.payment_group_code,
                bpl_id: summary.bpl_id,
                comments: summary.comments.clone(),
                delivery_address: summary.delivery_address.clone(),
                billing_address: None,
            },
            lines: Vec::with_capacity(summary.lines.len()),
            editing: Some(summary.doc_entry),
            rules,
        };

        let usage = draft.usage();
        for line in &summary.lines {
            let mut line = DocumentLine {
                line_num: draft.lines.len(),
                item_code: line.item_code.clone(),
                description: line.description.clone(),
                quantity: line.quantity,
                price: line.price,
                discount_percent: line.discount_percent,
                unit_of_measure: line.unit_of_measure.clone(),
                usage: line.usage.unwrap_or(usage),
            };
            draft.normalize_line(&mut line);
            draft.lines.push(line);
        }

        draft
    }

    pub fn lines(&self) -> &[DocumentLine] {
        &self.lines
    }

    pub fn rules(&self) -> &LineRules {
        &self.rules
    }

    pub fn editing_doc_entry(&self) -> Option<i64> {
        self.editing
    }

    pub fn is_empty(&self) -> bool {
        self.header == QuotationHeader::default() && self.lines.is_empty()
    }

    /// Usage derived from the branch currently set on the header.
    pub fn usage(&self) -> i32 {
        compute_usage(self.header.bpl_id)
    }

    pub fn add_line(&mut self, item: &CatalogItem, quantity: Decimal) -> &DocumentLine {
        let mut line = DocumentLine {
            line_num: self.lines.len(),
            item_code: item.item_code.trim().to_string(),
            description: item.description.clone(),
            quantity,
            price: item.unit_price,
            discount_percent: Decimal::ZERO,
            unit_of_measure: item.unit_of_measure.clone(),
            usage: self.usage(),
        };
        self.normalize_line(&mut line);
        self.lines.push(line);
        &self.lines[self.lines.len() - 1]
    }

    pub fn update_line(&mut self, index: usize, field: LineField) -> Result<(), DomainError> {
        let len = self.lines.len();
        let rules = self.rules;
        let editing = self.editing.is_some();
        let line =
            self.lines.get_mut(index).ok_or(DomainError::LineIndexOutOfRange { index, len })?;

        match field {
            LineField::ItemCode(code) => line.item_code = code.trim().to_string(),
            LineField::Description(description) => line.description = description,
            LineField::Quantity(quantity) => line.quantity = quantity,
            LineField::Price(price) => line.price = price,
            LineField::DiscountPercent(discount) => line.discount_percent = discount,
            LineField::UnitOfMeasure(unit) => line.unit_of_measure = unit,
            LineField::Usage(usage) => line.usage = usage,
        }
        normalize_line(line, &rules, editing);
        Ok(())
    }

    pub fn remove_line(&mut self, index: usize) -> Result<DocumentLine, DomainError> {
        let len = self.lines.len();
        if index >= len {
            return Err(DomainError::LineIndexOutOfRange { index, len });
        }

        let removed = self.lines.remove(index);
        for (position, line) in self.lines.iter_mut().enumerate() {
            line.line_num = position;
        }
        Ok(removed)
    }

    /// Drops every line and keeps the header.
    pub fn clear_lines(&mut self) {
        self.lines.clear();
    }

    pub fn gross_total(&self) -> Decimal {
        self.lines.iter().map(|line| line.gross_total(&self.rules)).sum()
    }

    pub fn discount_total(&self) -> Decimal {
        self.lines.iter().map(|line| line.discount_amount(&self.rules)).sum()
    }

    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(|line| line.line_total(&self.rules)).sum()
    }

    fn normalize_line(&self, line: &mut DocumentLine) {
        normalize_line(line, &self.rules, self.editing.is_some());
    }
}

/// Rounds quantity and price to the configured scale, floors them at zero
/// (price at `MIN_EDIT_PRICE` when editing a saved quotation) and clamps the
/// discount to `[0, 100]`.
pub fn normalize_line(line: &mut DocumentLine, rules: &LineRules, editing: bool) {
    line.quantity = round(line.quantity.max(Decimal::ZERO), rules.scale);

    let floor = if editing { MIN_EDIT_PRICE } else { Decimal::ZERO };
    line.price = round(line.price, rules.scale).max(floor);

    line.discount_percent = round(line.discount_percent.clamp(Decimal::ZERO, HUNDRED), 2);
}

fn round(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero).normalize()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use crate::domain::summary::{DocStatus, QuotationSummary, SummaryLine};
    use crate::errors::DomainError;

    use super::{normalize_line, CatalogItem, LineField, LineRules, Quotation, MIN_EDIT_PRICE};

    fn dec(value: &str) -> Decimal {
        value.parse().expect("decimal literal")
    }

    fn item(code: &str, price: &str) -> CatalogItem {
        CatalogItem {
            item_code: code.to_string(),
            description: format!("{code} description"),
            unit_price: dec(price),
            unit_of_measure: Some("CX".to_string()),
        }
    }

    fn assert_line_numbers(draft: &Quotation) {
        for (index, line) in draft.lines().iter().enumerate() {
            assert_eq!(line.line_num, index);
        }
    }

    #[test]
    fn add_line_assigns_position_and_branch_usage() {
        let mut draft = Quotation::new(LineRules::default());
        draft.header.bpl_id = Some(2);

        let first = draft.add_line(&item("SRG-10", "12.5"), Decimal::ONE).clone();
        let second = draft.add_line(&item("GLV-M", "0.8"), dec("100")).clone();

        assert_eq!(first.line_num, 0);
        assert_eq!(second.line_num, 1);
        assert_eq!(first.usage, 90);
        assert_eq!(second.unit_of_measure.as_deref(), Some("CX"));
    }

    #[test]
    fn removing_first_of_two_lines_renumbers_the_rest() {
        let mut draft = Quotation::new(LineRules::default());
        draft.add_line(&item("SRG-10", "12.5"), Decimal::ONE);
        draft.add_line(&item("GLV-M", "0.8"), Decimal::TWO);

        let removed = draft.remove_line(0).expect("remove");

        assert_eq!(removed.item_code, "SRG-10");
        assert_eq!(draft.lines().len(), 1);
        assert_eq!(draft.lines()[0].line_num, 0);
        assert_eq!(draft.lines()[0].item_code, "GLV-M");
    }

    #[test]
    fn line_numbers_track_positions_across_mixed_operations() {
        let mut draft = Quotation::new(LineRules::default());
        let codes = ["A", "B", "C", "D", "E", "F"];
        for code in codes {
            draft.add_line(&item(code, "1"), Decimal::ONE);
            assert_line_numbers(&draft);
        }

        for index in [2, 0, 3, 1] {
            draft.remove_line(index).expect("remove");
            assert_line_numbers(&draft);
        }
        draft.add_line(&item("G", "1"), Decimal::ONE);
        assert_line_numbers(&draft);

        let remaining: Vec<&str> =
            draft.lines().iter().map(|line| line.item_code.as_str()).collect();
        assert_eq!(remaining, vec!["B", "E", "G"]);
    }

    #[test]
    fn update_line_changes_one_field_and_keeps_line_number() {
        let mut draft = Quotation::new(LineRules::default());
        draft.add_line(&item("A", "10"), Decimal::ONE);
        draft.add_line(&item("B", "20"), Decimal::ONE);

        draft.update_line(1, LineField::DiscountPercent(dec("12.5"))).expect("update");

        assert_eq!(draft.lines()[1].discount_percent, dec("12.5"));
        assert_eq!(draft.lines()[1].line_num, 1);
        assert_eq!(draft.lines()[0].discount_percent, Decimal::ZERO);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut draft = Quotation::new(LineRules::default());
        draft.add_line(&item("A", "10"), Decimal::ONE);

        assert_eq!(
            draft.update_line(4, LineField::Quantity(Decimal::TWO)),
            Err(DomainError::LineIndexOutOfRange { index: 4, len: 1 })
        );
        assert_eq!(
            draft.remove_line(1).map(|line| line.line_num),
            Err(DomainError::LineIndexOutOfRange { index: 1, len: 1 })
        );
    }

    #[test]
    fn normalization_rounds_and_clamps() {
        let mut draft = Quotation::new(LineRules { scale: 2 });
        draft.add_line(&item("A", "10.005"), dec("1.234"));
        draft.update_line(0, LineField::DiscountPercent(dec("140"))).expect("update");
        let line = &draft.lines()[0];
        assert_eq!(line.price, dec("10.01"));
        assert_eq!(line.quantity, dec("1.23"));
        assert_eq!(line.discount_percent, dec("100"));

        draft.update_line(0, LineField::DiscountPercent(dec("-3"))).expect("update");
        draft.update_line(0, LineField::Price(dec("-4"))).expect("update");
        let line = &draft.lines()[0];
        assert_eq!(line.discount_percent, Decimal::ZERO);
        assert_eq!(line.price, Decimal::ZERO);
    }

    #[test]
    fn wider_scale_keeps_four_places() {
        let mut draft = Quotation::new(LineRules { scale: 4 });
        draft.add_line(&item("A", "0.12345"), Decimal::ONE);

        assert_eq!(draft.lines()[0].price, dec("0.1235"));
    }

    #[test]
    fn editing_floors_price_at_minimum_positive_value() {
        let mut draft = Quotation::new(LineRules::default());
        let mut line = draft.add_line(&item("A", "0"), Decimal::ONE).clone();

        normalize_line(&mut line, &LineRules::default(), false);
        assert_eq!(line.price, Decimal::ZERO);

        normalize_line(&mut line, &LineRules::default(), true);
        assert_eq!(line.price, MIN_EDIT_PRICE);
        assert_eq!(MIN_EDIT_PRICE, dec("0.01"));
    }

    #[test]
    fn totals_are_derived_from_lines() {
        let mut draft = Quotation::new(LineRules::default());
        draft.add_line(&item("A", "10"), dec("3"));
        draft.add_line(&item("B", "2.5"), dec("4"));
        draft.update_line(0, LineField::DiscountPercent(dec("10"))).expect("update");

        assert_eq!(draft.gross_total(), dec("40"));
        assert_eq!(draft.discount_total(), dec("3"));
        assert_eq!(draft.subtotal(), dec("37"));
        assert_eq!(draft.lines()[0].line_total(draft.rules()), dec("27"));
    }

    #[test]
    fn summary_seeds_an_editing_draft() {
        let summary = QuotationSummary {
            doc_entry: 812,
            doc_num: Some(4410),
            card_code: "C000231".to_string(),
            card_name: Some("Hospital Santa Luzia".to_string()),
            doc_date: NaiveDate::from_ymd_opt(2026, 4, 1),
            tax_date: NaiveDate::from_ymd_opt(2026, 4, 1),
            doc_due_date: NaiveDate::from_ymd_opt(2026, 4, 8),
            doc_status: DocStatus::Open,
            doc_total: dec("50"),
            currency: Some("R$".to_string()),
            payment_group_code: Some(3),
            bpl_id: Some(2),
            comments: None,
            delivery_address: None,
            lines: vec![
                SummaryLine {
                    line_num: 7,
                    item_code: "A".to_string(),
                    description: String::new(),
                    quantity: dec("5"),
                    price: Decimal::ZERO,
                    discount_percent: Decimal::ZERO,
                    unit_of_measure: None,
                    usage: None,
                },
                SummaryLine {
                    line_num: 9,
                    item_code: "B".to_string(),
                    description: String::new(),
                    quantity: dec("1"),
                    price: dec("50"),
                    discount_percent: Decimal::ZERO,
                    unit_of_measure: None,
                    usage: Some(40),
                },
            ],
        };

        let draft = Quotation::from_summary(&summary, LineRules::default());

        assert_eq!(draft.editing_doc_entry(), Some(812));
        assert_eq!(draft.header.card_code.as_deref(), Some("C000231"));
        assert_line_numbers(&draft);
        assert_eq!(draft.lines()[0].price, MIN_EDIT_PRICE);
        assert_eq!(draft.lines()[0].usage, 90);
        assert_eq!(draft.lines()[1].usage, 40);
    }
}
