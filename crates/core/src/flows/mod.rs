pub mod events;
pub mod payload;
pub mod wizard;

pub use events::{
    InMemorySavedListener, QuotationSaved, QuotationSavedListener, SaveKind, SavedSubscribers,
    SubscriptionId,
};
pub use payload::{build_payload, PayloadDefaults, PayloadLine, QuotationPayload, TaxExtension};
pub use wizard::{
    missing_fields, validate_step, QuotationWizard, WizardStep, WizardTransition,
    WizardTransitionError,
};
