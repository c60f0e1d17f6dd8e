use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveKind {
    Created,
    Updated,
}

/// Sent to every subscriber once the backend has accepted a quotation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationSaved {
    pub kind: SaveKind,
    pub doc_entry: Option<i64>,
    pub doc_num: Option<i64>,
    pub card_code: String,
    pub line_count: usize,
    pub subtotal: Decimal,
    pub saved_on: NaiveDate,
}

pub trait QuotationSavedListener: Send + Sync {
    fn quotation_saved(&self, event: &QuotationSaved);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct SavedSubscribers {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Arc<dyn QuotationSavedListener>)>,
}

impl SavedSubscribers {
    pub fn subscribe(&mut self, listener: Arc<dyn QuotationSavedListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Delivers in subscription order.
    pub fn notify(&self, event: &QuotationSaved) {
        for (_, listener) in &self.listeners {
            listener.quotation_saved(event);
        }
    }
}

impl std::fmt::Debug for SavedSubscribers {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SavedSubscribers")
            .field("next_id", &self.next_id)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct InMemorySavedListener {
    events: Arc<Mutex<Vec<QuotationSaved>>>,
}

impl InMemorySavedListener {
    pub fn events(&self) -> Vec<QuotationSaved> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl QuotationSavedListener for InMemorySavedListener {
    fn quotation_saved(&self, event: &QuotationSaved) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}
