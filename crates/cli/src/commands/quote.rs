use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, Utc};
use medportal_client::AuthenticatedClient;
use medportal_core::domain::quotation::{CatalogItem, LineField, Quotation, QuotationHeader};
use medportal_core::errors::{ApplicationError, DomainError};
use medportal_core::flows::events::{QuotationSaved, QuotationSavedListener};
use medportal_core::flows::wizard::{QuotationWizard, WizardStep};
use medportal_core::gateway::{GatewayError, QuotationGateway};
use medportal_core::session::token::TokenError;
use medportal_core::session::LogoutReason;
use medportal_core::storage::{Storage, TOKEN_KEY};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{block_on, runtime_failure, CommandResult, EXIT_REJECTED};
use crate::context::{CliMonitor, CommandContext};

/// Quotation draft as written by hand or exported from another tool. When
/// editing, an omitted `header` or `lines` keeps what the backend returned.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DraftFile {
    #[serde(default)]
    pub header: Option<QuotationHeader>,
    #[serde(default)]
    pub lines: Option<Vec<DraftLine>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DraftLine {
    pub item_code: String,
    #[serde(default)]
    pub description: String,
    pub quantity: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub discount_percent: Option<Decimal>,
    #[serde(default)]
    pub unit_of_measure: Option<String>,
}

pub fn load_draft(path: &Path) -> anyhow::Result<DraftFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read draft `{}`", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("draft `{}` is not a valid quotation draft", path.display()))
}

/// Copies the draft into the wizard's quotation through the same line
/// operations the interactive steps use.
pub fn apply_draft(draft: DraftFile, quotation: &mut Quotation) -> Result<(), DomainError> {
    if let Some(header) = draft.header {
        quotation.header = header;
    }

    let Some(lines) = draft.lines else {
        return Ok(());
    };
    quotation.clear_lines();
    for line in lines {
        let item = CatalogItem {
            item_code: line.item_code,
            description: line.description,
            unit_price: line.price,
            unit_of_measure: line.unit_of_measure,
        };
        let index = quotation.add_line(&item, line.quantity).line_num;
        if let Some(discount) = line.discount_percent {
            quotation.update_line(index, LineField::DiscountPercent(discount))?;
        }
    }
    Ok(())
}

/// Steps forward until the review step, stopping at the first step whose
/// required fields are missing.
pub fn walk_to_review(wizard: &mut QuotationWizard) -> Result<(), DomainError> {
    while wizard.step() != WizardStep::Review {
        wizard.next()?;
    }
    Ok(())
}

struct SavedReporter;

impl QuotationSavedListener for SavedReporter {
    fn quotation_saved(&self, event: &QuotationSaved) {
        info!(
            event_name = "cli.quotation.saved",
            kind = ?event.kind,
            doc_entry = ?event.doc_entry,
            doc_num = ?event.doc_num,
            card_code = event.card_code.as_str(),
            "quotation list is stale; refresh with `medportal quote list`"
        );
    }
}

pub fn list(context: &CommandContext) -> CommandResult {
    const COMMAND: &str = "quote.list";

    let (mut monitor, gateway) = match signed_in(context) {
        Ok(signed_in) => signed_in,
        Err(error) => return CommandResult::from_error(COMMAND, error, &context.correlation_id),
    };
    let quotations = match block_on(gateway.list()) {
        Ok(Ok(quotations)) => quotations,
        Ok(Err(error)) => return backend_failure(COMMAND, context, &mut monitor, error),
        Err(error) => return runtime_failure(COMMAND, error),
    };

    CommandResult::success_with(
        COMMAND,
        format!("{} quotation(s)", quotations.len()),
        serde_json::to_value(&quotations).ok(),
    )
}

pub fn show(context: &CommandContext, doc_entry: i64) -> CommandResult {
    const COMMAND: &str = "quote.show";

    let (mut monitor, gateway) = match signed_in(context) {
        Ok(signed_in) => signed_in,
        Err(error) => return CommandResult::from_error(COMMAND, error, &context.correlation_id),
    };
    let summary = match block_on(gateway.fetch(doc_entry)) {
        Ok(Ok(summary)) => summary,
        Ok(Err(error)) => return backend_failure(COMMAND, context, &mut monitor, error),
        Err(error) => return runtime_failure(COMMAND, error),
    };

    let editable = Quotation::from_summary(&summary, context.config.line_rules());
    CommandResult::success_with(
        COMMAND,
        format!("quotation {doc_entry} for {}", summary.card_code),
        Some(json!({
            "quotation": summary,
            "usage": editable.usage(),
            "recomputed_subtotal": editable.subtotal(),
        })),
    )
}

pub fn preview(context: &CommandContext, draft_path: &Path) -> CommandResult {
    const COMMAND: &str = "quote.preview";

    let draft = match load_draft(draft_path) {
        Ok(draft) => draft,
        Err(error) => return draft_failure(COMMAND, &error),
    };

    let mut wizard =
        QuotationWizard::new(context.config.line_rules(), context.config.payload_defaults());
    let prepared =
        apply_draft(draft, wizard.draft_mut()).and_then(|()| walk_to_review(&mut wizard));
    if let Err(error) = prepared {
        return CommandResult::from_error(COMMAND, error, &context.correlation_id);
    }

    let draft = wizard.draft();
    CommandResult::success_with(
        COMMAND,
        format!("{} line(s), subtotal {}", draft.lines().len(), draft.subtotal()),
        serde_json::to_value(wizard.payload(Local::now().date_naive())).ok(),
    )
}

pub fn submit(
    context: &CommandContext,
    draft_path: &Path,
    doc_entry: Option<i64>,
) -> CommandResult {
    const COMMAND: &str = "quote.submit";

    let draft = match load_draft(draft_path) {
        Ok(draft) => draft,
        Err(error) => return draft_failure(COMMAND, &error),
    };
    let (mut monitor, gateway) = match signed_in(context) {
        Ok(signed_in) => signed_in,
        Err(error) => return CommandResult::from_error(COMMAND, error, &context.correlation_id),
    };

    let mut wizard =
        QuotationWizard::new(context.config.line_rules(), context.config.payload_defaults());
    wizard.subscribe(Arc::new(SavedReporter));

    let today = Local::now().date_naive();
    let submitted = block_on(async {
        if let Some(doc_entry) = doc_entry {
            let summary = gateway.fetch(doc_entry).await?;
            wizard.load_for_edit(&summary);
        }
        apply_draft(draft, wizard.draft_mut())?;
        walk_to_review(&mut wizard)?;
        wizard.submit(&gateway, today).await
    });

    let saved = match submitted {
        Ok(Ok(saved)) => saved,
        Ok(Err(ApplicationError::Gateway(error))) => {
            return backend_failure(COMMAND, context, &mut monitor, error)
        }
        Ok(Err(error)) => return CommandResult::from_error(COMMAND, error, &context.correlation_id),
        Err(error) => return runtime_failure(COMMAND, error),
    };

    let message = match saved.doc_num {
        Some(doc_num) => format!("quotation {doc_num} saved for {}", saved.card_code),
        None => format!("quotation saved for {}", saved.card_code),
    };
    CommandResult::success_with(COMMAND, message, serde_json::to_value(&saved).ok())
}

/// Monitor plus a gateway carrying the stored token. Fails when the stored
/// session is missing or already over.
fn signed_in(
    context: &CommandContext,
) -> Result<(CliMonitor, AuthenticatedClient), ApplicationError> {
    let mut monitor = context.monitor();
    let outcome = monitor.startup(Utc::now())?;
    if !outcome.to.is_authenticated() {
        return Err(TokenError::Missing.into());
    }

    let token = context.storage.get(TOKEN_KEY)?.ok_or(TokenError::Missing)?;
    let gateway = context.portal()?.authenticated(token);
    Ok((monitor, gateway))
}

fn draft_failure(command: &str, error: &anyhow::Error) -> CommandResult {
    CommandResult::failure(command, "bad_request", format!("{error:#}"), EXIT_REJECTED)
}

/// A rejected token ends the local session as well.
fn backend_failure(
    command: &str,
    context: &CommandContext,
    monitor: &mut CliMonitor,
    error: GatewayError,
) -> CommandResult {
    if error.ends_session() {
        monitor.logout(LogoutReason::Unauthorized);
    }
    CommandResult::from_error(command, error, &context.correlation_id)
}
