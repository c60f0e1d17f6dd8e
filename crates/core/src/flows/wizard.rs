use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::quotation::{LineRules, Quotation};
use crate::domain::summary::QuotationSummary;
use crate::errors::{ApplicationError, DomainError};
use crate::flows::events::{
    QuotationSaved, QuotationSavedListener, SaveKind, SavedSubscribers, SubscriptionId,
};
use crate::flows::payload::{build_payload, PayloadDefaults, QuotationPayload};
use crate::gateway::QuotationGateway;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Client = 1,
    GeneralInfo = 2,
    Addresses = 3,
    Items = 4,
    Review = 5,
}

impl WizardStep {
    pub const ALL: [WizardStep; 5] =
        [Self::Client, Self::GeneralInfo, Self::Addresses, Self::Items, Self::Review];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.number() == number)
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub fn previous(self) -> Option<Self> {
        self.number().checked_sub(1).and_then(Self::from_number)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::GeneralInfo => "general_info",
            Self::Addresses => "addresses",
            Self::Items => "items",
            Self::Review => "review",
        }
    }
}

/// Fields the step still needs before forward navigation is allowed.
pub fn missing_fields(step: WizardStep, draft: &Quotation) -> Vec<String> {
    let header = &draft.header;
    let mut missing = Vec::new();
    match step {
        WizardStep::Client => {
            if header.card_code.as_deref().map(str::trim).unwrap_or_default().is_empty() {
                missing.push("card_code".to_string());
            }
        }
        WizardStep::GeneralInfo => {
            if header.tax_date.is_none() {
                missing.push("tax_date".to_string());
            }
            if header.doc_due_date.is_none() {
                missing.push("doc_due_date".to_string());
            }
        }
        WizardStep::Items => {
            if draft.lines().is_empty() {
                missing.push("document_lines".to_string());
            }
        }
        WizardStep::Addresses | WizardStep::Review => {}
    }
    missing
}

pub fn validate_step(step: WizardStep, draft: &Quotation) -> bool {
    missing_fields(step, draft).is_empty()
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WizardTransitionError {
    #[error("missing required fields on step {step:?}: {missing_fields:?}")]
    MissingRequiredFields { step: WizardStep, missing_fields: Vec<String> },
    #[error("step {0:?} has no previous step")]
    NoPreviousStep(WizardStep),
    #[error("step {0:?} has no next step")]
    NoNextStep(WizardStep),
    #[error("quotations are submitted from the review step, not {0:?}")]
    NotAtReview(WizardStep),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardTransition {
    pub from: WizardStep,
    pub to: WizardStep,
}

/// Five-step quotation editor. Forward moves are gated by the current step's
/// validator; `previous` and `jump_to` are not.
#[derive(Debug)]
pub struct QuotationWizard {
    step: WizardStep,
    draft: Quotation,
    rules: LineRules,
    defaults: PayloadDefaults,
    subscribers: SavedSubscribers,
}

impl QuotationWizard {
    pub fn new(rules: LineRules, defaults: PayloadDefaults) -> Self {
        Self {
            step: WizardStep::Client,
            draft: Quotation::new(rules),
            rules,
            defaults,
            subscribers: SavedSubscribers::default(),
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> &Quotation {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut Quotation {
        &mut self.draft
    }

    pub fn subscribe(&mut self, listener: Arc<dyn QuotationSavedListener>) -> SubscriptionId {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn next(&mut self) -> Result<WizardTransition, WizardTransitionError> {
        let from = self.step;
        let missing_fields = missing_fields(from, &self.draft);
        if !missing_fields.is_empty() {
            return Err(WizardTransitionError::MissingRequiredFields { step: from, missing_fields });
        }
        let to = from.next().ok_or(WizardTransitionError::NoNextStep(from))?;
        self.step = to;
        Ok(WizardTransition { from, to })
    }

    pub fn previous(&mut self) -> Result<WizardTransition, WizardTransitionError> {
        let from = self.step;
        let to = from.previous().ok_or(WizardTransitionError::NoPreviousStep(from))?;
        self.step = to;
        Ok(WizardTransition { from, to })
    }

    pub fn jump_to(&mut self, to: WizardStep) -> WizardTransition {
        let from = self.step;
        self.step = to;
        WizardTransition { from, to }
    }

    /// Replaces the draft with one seeded from a saved quotation and returns to step 1.
    pub fn load_for_edit(&mut self, summary: &QuotationSummary) {
        self.draft = Quotation::from_summary(summary, self.rules);
        self.step = WizardStep::Client;
    }

    pub fn reset(&mut self) {
        self.draft = Quotation::new(self.rules);
        self.step = WizardStep::Client;
    }

    pub fn payload(&self, today: NaiveDate) -> QuotationPayload {
        build_payload(&self.draft, today, &self.defaults)
    }

    /// Checks that every gated step would pass without moving the wizard.
    pub fn ready_to_submit(&self) -> Result<(), WizardTransitionError> {
        if self.step != WizardStep::Review {
            return Err(WizardTransitionError::NotAtReview(self.step));
        }
        for step in WizardStep::ALL {
            let missing_fields = missing_fields(step, &self.draft);
            if !missing_fields.is_empty() {
                return Err(WizardTransitionError::MissingRequiredFields { step, missing_fields });
            }
        }
        Ok(())
    }

    /// Creates or updates the quotation. On success the wizard is reset and
    /// subscribers are notified; on failure the draft is kept as is.
    pub async fn submit<G>(
        &mut self,
        gateway: &G,
        today: NaiveDate,
    ) -> Result<QuotationSaved, ApplicationError>
    where
        G: QuotationGateway + ?Sized,
    {
        self.ready_to_submit().map_err(DomainError::from)?;

        let payload = self.payload(today);
        let editing = self.draft.editing_doc_entry();
        let (kind, result) = match editing {
            Some(doc_entry) => (SaveKind::Updated, gateway.update(doc_entry, &payload).await),
            None => (SaveKind::Created, gateway.create(&payload).await),
        };

        let saved = match result {
            Ok(saved) => saved,
            Err(error) => {
                warn!(
                    event_name = "quotation.submit.failed",
                    card_code = %payload.card_code,
                    doc_entry = ?editing,
                    error = %error,
                    "quotation submission failed"
                );
                return Err(error.into());
            }
        };

        let event = QuotationSaved {
            kind,
            doc_entry: saved.doc_entry.or(editing),
            doc_num: saved.doc_num,
            card_code: payload.card_code.clone(),
            line_count: payload.lines.len(),
            subtotal: self.draft.subtotal(),
            saved_on: today,
        };
        info!(
            event_name = "quotation.saved",
            kind = ?event.kind,
            doc_entry = ?event.doc_entry,
            line_count = event.line_count,
            "quotation saved"
        );

        self.reset();
        self.subscribers.notify(&event);
        Ok(event)
    }
}
