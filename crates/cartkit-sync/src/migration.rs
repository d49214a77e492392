//! Cart migration to a new ownership context.
//!
//! The clone is built and verified before anything touches the source:
//!
//! ```text
//! Cloning -> Verifying -> RetiringSource -> Done
//!                               |
//!                               +--> PartialMigration
//! ```
//!
//! A failure while cloning or verifying leaves the source as it was. A failure
//! while retiring the source keeps the verified clone and reports a partial
//! migration.

use crate::error::MutationError;
use crate::orchestrator::{CartOrchestrator, EnrichedCart};
use crate::store::AuxiliaryStore;
use crate::transport::CartTransport;
use cartkit_commerce::cart::{
    CartDraft, CartSnapshot, CustomFields, DiscountCodeState, LineItemIdentity, LineItemRequest,
    OwnershipContext,
};
use cartkit_commerce::ids::CartId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationState {
    Cloning,
    Verifying,
    RetiringSource,
    Done,
    PartialMigration,
}

/// A source code that did not apply to the clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedCode {
    pub code: String,
    pub state: DiscountCodeState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReport {
    pub source_id: CartId,
    /// The clone as verified.
    pub clone: EnrichedCart,
    pub dropped_codes: Vec<DroppedCode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOutcome {
    /// Clone verified and source deleted.
    Completed(MigrationReport),
    /// Clone verified, source still present.
    PartialMigration {
        report: MigrationReport,
        cause: MutationError,
    },
}

impl MigrationOutcome {
    pub fn report(&self) -> &MigrationReport {
        match self {
            MigrationOutcome::Completed(report) => report,
            MigrationOutcome::PartialMigration { report, .. } => report,
        }
    }

    pub fn clone_id(&self) -> &CartId {
        self.report().clone.id()
    }

    pub fn source_id(&self) -> &CartId {
        &self.report().source_id
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, MigrationOutcome::PartialMigration { .. })
    }

    pub fn state(&self) -> MigrationState {
        match self {
            MigrationOutcome::Completed(_) => MigrationState::Done,
            MigrationOutcome::PartialMigration { .. } => MigrationState::PartialMigration,
        }
    }
}

/// Difference found between source and clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineMismatch {
    LineCount {
        source: usize,
        clone: usize,
    },
    /// Quantity summed over all lines with the identity; zero when absent.
    Quantity {
        identity: LineItemIdentity,
        source: u64,
        clone: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MigrationCause {
    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error("clone does not match source ({} differences)", .0.len())]
    VerificationMismatch(Vec<LineMismatch>),
}

/// Migration stopped before the source was touched.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Migration of cart {source_id} failed while {state:?}: {cause}")]
pub struct MigrationFailure {
    pub state: MigrationState,
    pub source_id: CartId,
    /// Set once the clone was created.
    pub clone_id: Option<CartId>,
    pub cause: MigrationCause,
}

/// Compare the lines of source and clone.
pub fn verify_clone(source: &CartSnapshot, clone: &CartSnapshot) -> Vec<LineMismatch> {
    let mut mismatches = Vec::new();

    if source.line_items.len() != clone.line_items.len() {
        mismatches.push(LineMismatch::LineCount {
            source: source.line_items.len(),
            clone: clone.line_items.len(),
        });
    }

    let source_quantities = quantities_by_identity(source);
    let clone_quantities = quantities_by_identity(clone);

    let mut identities: Vec<&LineItemIdentity> = source_quantities.keys().collect();
    identities.extend(clone_quantities.keys().filter(|k| !source_quantities.contains_key(*k)));

    for identity in identities {
        let source_qty = source_quantities.get(identity).copied().unwrap_or(0);
        let clone_qty = clone_quantities.get(identity).copied().unwrap_or(0);
        if source_qty != clone_qty {
            mismatches.push(LineMismatch::Quantity {
                identity: identity.clone(),
                source: source_qty,
                clone: clone_qty,
            });
        }
    }

    mismatches
}

fn quantities_by_identity(snapshot: &CartSnapshot) -> BTreeMap<LineItemIdentity, u64> {
    let mut quantities = BTreeMap::new();
    for line in &snapshot.line_items {
        *quantities.entry(LineItemIdentity::of(line)).or_insert(0) += u64::from(line.quantity);
    }
    quantities
}

/// One run of the migration workflow.
struct Migration<'a, T, S> {
    orchestrator: &'a CartOrchestrator<T, S>,
    source: &'a CartSnapshot,
    state: MigrationState,
    clone_id: Option<CartId>,
}

impl<'a, T: CartTransport, S: AuxiliaryStore> Migration<'a, T, S> {
    fn transition(&mut self, state: MigrationState) {
        info!(
            source_id = %self.source.id,
            clone_id = ?self.clone_id,
            from = ?self.state,
            to = ?state,
            "Migration state change"
        );
        self.state = state;
    }

    fn fail(&self, cause: impl Into<MigrationCause>) -> MigrationFailure {
        MigrationFailure {
            state: self.state,
            source_id: self.source.id.clone(),
            clone_id: self.clone_id.clone(),
            cause: cause.into(),
        }
    }

    async fn run(
        mut self,
        target: OwnershipContext,
    ) -> Result<MigrationOutcome, MigrationFailure> {
        let (clone, dropped_codes) = self.clone_into(target).await?;

        self.transition(MigrationState::Verifying);
        let clone = self
            .orchestrator
            .fetch(clone.id())
            .await
            .map_err(|e| self.fail(e))?;
        let mismatches = verify_clone(self.source, &clone.snapshot);
        if !mismatches.is_empty() {
            warn!(
                source_id = %self.source.id,
                clone_id = %clone.id(),
                differences = mismatches.len(),
                "Clone does not match source, source left untouched"
            );
            return Err(self.fail(MigrationCause::VerificationMismatch(mismatches)));
        }

        self.transition(MigrationState::RetiringSource);
        let report = MigrationReport {
            source_id: self.source.id.clone(),
            clone,
            dropped_codes,
        };

        match self.orchestrator.delete_cart(self.source).await {
            Ok(()) => {
                self.transition(MigrationState::Done);
                Ok(MigrationOutcome::Completed(report))
            }
            Err(cause) => {
                self.transition(MigrationState::PartialMigration);
                warn!(
                    source_id = %report.source_id,
                    clone_id = %report.clone.id(),
                    error = %cause,
                    "Source cart not retired, both carts exist"
                );
                Ok(MigrationOutcome::PartialMigration { report, cause })
            }
        }
    }

    async fn clone_into(
        &mut self,
        target: OwnershipContext,
    ) -> Result<(EnrichedCart, Vec<DroppedCode>), MigrationFailure> {
        let source = self.source;
        let orchestrator = self.orchestrator;
        let config = &orchestrator.config().migration;

        let draft = CartDraft {
            currency: source.currency,
            ownership: target,
            shipping_address: source.shipping_address.clone(),
            billing_address: source.billing_address.clone(),
            tax_mode: source.tax_mode,
            custom_fields: if config.carry_custom_fields {
                source.custom_fields.clone()
            } else {
                CustomFields::new()
            },
        };
        let mut clone = orchestrator
            .create_cart(draft)
            .await
            .map_err(|e| self.fail(e))?;
        self.clone_id = Some(clone.id().clone());
        info!(source_id = %source.id, clone_id = %clone.id(), "Clone created");

        for line in &source.line_items {
            clone = orchestrator
                .add_line_item(&clone.snapshot, LineItemRequest::from_line(line), line.quantity)
                .await
                .map_err(|e| self.fail(e))?;
        }

        let mut dropped = Vec::new();
        if config.carry_discount_codes {
            let matching = source.discount_codes.iter().filter(|c| c.state.is_matching());
            for applied in matching {
                match orchestrator
                    .apply_discount_code(&clone.snapshot, &applied.code)
                    .await
                {
                    Ok(updated) => clone = updated,
                    Err(MutationError::DiscountRejected {
                        code,
                        state,
                        snapshot,
                    }) => {
                        warn!(
                            source_id = %source.id,
                            clone_id = %snapshot.id,
                            code = %code,
                            state = %state,
                            "Discount code does not apply to the clone, dropped"
                        );
                        clone = orchestrator
                            .remove_discount_code(&snapshot, &code)
                            .await
                            .map_err(|e| self.fail(e))?;
                        dropped.push(DroppedCode { code, state });
                    }
                    Err(e) => return Err(self.fail(e)),
                }
            }
        }

        Ok((clone, dropped))
    }
}

impl<T: CartTransport, S: AuxiliaryStore> CartOrchestrator<T, S> {
    /// Move `source` to `target` ownership.
    ///
    /// Lines are cloned one at a time through the add path, so kind-specific
    /// identity and line custom fields carry over. The source is deleted only
    /// after the clone's lines and quantities were verified against it.
    pub async fn migrate_ownership(
        &self,
        source: &CartSnapshot,
        target: OwnershipContext,
    ) -> Result<MigrationOutcome, MigrationFailure> {
        info!(source_id = %source.id, lines = source.line_items.len(), "Starting cart migration");
        let migration = Migration {
            orchestrator: self,
            source,
            state: MigrationState::Cloning,
            clone_id: None,
        };
        migration.run(target).await
    }
}
