//! Item/claim state machine.
//!
//! All rules that tie claimants and owners to an item live here as pure
//! functions over an in-memory [`Item`]. The engine loads a record, applies
//! one of these transitions and commits the result with a version
//! precondition, so every check below is re-run against the latest state
//! whenever a concurrent write wins the race.
//!
//! ```text
//! open --(first claim)--> claimed --(resolve)--> resolved
//! open --(resolve, policy permitting)--> resolved
//! ```

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Claim, ClaimStatus, Item, ItemStatus, Resolution, UserSummary};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("you cannot claim your own item")]
    SelfClaim,
    #[error("this item has already been resolved")]
    AlreadyResolved,
    #[error("you have already claimed this item")]
    DuplicateClaim,
    #[error("only the owner may resolve this item")]
    NotOwner,
    #[error("no claim from {0} exists on this item")]
    ClaimNotFound(String),
    #[error("an item can only be resolved by approving an existing claim")]
    ClaimRequired,
}

/// Claimant-supplied part of a new claim.
#[derive(Debug, Clone)]
pub struct ClaimDraft {
    pub claimant: UserSummary,
    pub claimant_email: String,
    pub message: String,
    pub proof_description: String,
}

/// Owner's resolution decision.
#[derive(Debug, Clone)]
pub struct ResolveDraft {
    pub claimant_id: Option<String>,
    pub note: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvePolicy {
    /// Whether the owner may close an item without approving a claim.
    pub allow_without_claim: bool,
}

impl Item {
    /// Append a pending claim, flipping `open` to `claimed` on the first one.
    pub fn file_claim(&mut self, draft: ClaimDraft, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        if draft.claimant.id == self.owner.id {
            return Err(LifecycleError::SelfClaim);
        }
        if self.status == ItemStatus::Resolved {
            return Err(LifecycleError::AlreadyResolved);
        }
        if self.claim_by(&draft.claimant.id).is_some() {
            return Err(LifecycleError::DuplicateClaim);
        }
        self.claims.push(Claim {
            claimant_id: draft.claimant.id,
            claimant_name: draft.claimant.name,
            claimant_email: draft.claimant_email,
            message: draft.message,
            proof_description: draft.proof_description,
            status: ClaimStatus::Pending,
            created_at: now,
        });
        if self.status == ItemStatus::Open {
            self.status = ItemStatus::Claimed;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Approve one claim, reject the other pending ones and close the item.
    ///
    /// Claims keep their position in the sequence.
    pub fn resolve(
        &mut self,
        caller: &str,
        draft: ResolveDraft,
        policy: ResolvePolicy,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if caller != self.owner.id {
            return Err(LifecycleError::NotOwner);
        }
        if self.status == ItemStatus::Resolved {
            return Err(LifecycleError::AlreadyResolved);
        }
        match draft.claimant_id.as_deref() {
            Some(chosen) => {
                if self.claim_by(chosen).is_none() {
                    return Err(LifecycleError::ClaimNotFound(chosen.to_string()));
                }
                for claim in &mut self.claims {
                    if claim.claimant_id == chosen {
                        claim.status = ClaimStatus::Approved;
                    } else if claim.status == ClaimStatus::Pending {
                        claim.status = ClaimStatus::Rejected;
                    }
                }
            }
            None => {
                if !policy.allow_without_claim {
                    return Err(LifecycleError::ClaimRequired);
                }
                for claim in &mut self.claims {
                    if claim.status == ClaimStatus::Pending {
                        claim.status = ClaimStatus::Rejected;
                    }
                }
            }
        }
        self.status = ItemStatus::Resolved;
        self.resolved_with = Some(Resolution {
            user_id: draft.claimant_id,
            timestamp: now,
            note: draft.note,
        });
        self.updated_at = now;
        Ok(())
    }
}
