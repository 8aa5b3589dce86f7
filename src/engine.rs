//! Lost & found claim engine.
//!
//! Every write is a read-validate-write cycle against one item record,
//! committed with [`ItemRepo::replace_item`] keyed on the version that was
//! read. A lost race re-reads the item and re-runs the lifecycle rules, so
//! duplicate claims and the open -> claimed flip stay correct under
//! concurrency. Store and blob calls are bounded by the configured timeout;
//! a timeout surfaces as a storage error and is never retried here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Claims;
use crate::config::Settings;
use crate::error::ApiError;
use crate::lifecycle::{ClaimDraft, LifecycleError, ResolveDraft, ResolvePolicy};
use crate::models::*;
use crate::repo::{Repo, RepoError};
use crate::search::{ItemFilter, PageRequest, MAX_PAGE_SIZE};
use crate::storage::ImageStore;
use crate::validate::{validate_images, validate_report, ImageLimits, ValidationErrors};

/// Public route under which stored images are served.
pub const IMAGE_ROUTE: &str = "/uploads/lostfound";

#[derive(Debug, Clone, Copy)]
pub struct EnginePolicy {
    pub claim_retries: u32,
    pub storage_timeout: Duration,
    pub resolve: ResolvePolicy,
    pub images: ImageLimits,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl EnginePolicy {
    pub fn from_settings(s: &Settings) -> Self {
        Self {
            claim_retries: s.claim_retries,
            storage_timeout: s.storage_timeout,
            resolve: ResolvePolicy { allow_without_claim: s.allow_resolve_without_claim },
            images: ImageLimits { max_images: s.max_images, max_bytes: s.max_image_bytes },
        }
    }
}

#[derive(Clone)]
pub struct ClaimEngine {
    repo: Arc<dyn Repo>,
    images: Arc<dyn ImageStore>,
    policy: EnginePolicy,
}

impl ClaimEngine {
    pub fn new(repo: Arc<dyn Repo>, images: Arc<dyn ImageStore>, policy: EnginePolicy) -> Self {
        Self { repo, images, policy }
    }

    pub fn repo(&self) -> &Arc<dyn Repo> {
        &self.repo
    }

    pub fn image_store(&self) -> &Arc<dyn ImageStore> {
        &self.images
    }

    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    async fn timed<F, T>(&self, what: &'static str, fut: F) -> Result<T, ApiError>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.policy.storage_timeout, fut)
            .await
            .map_err(|_| ApiError::Storage(format!("{what} timed out after {:?}", self.policy.storage_timeout)))
    }

    /// Validate, store attachments, then create the item in status `open`.
    /// Attachments already written are deleted again if any later step fails.
    pub async fn report_item(&self, owner: &Claims, form: ReportForm, uploads: Vec<Upload>) -> Result<Item, ApiError> {
        let (report, mut errs) = match validate_report(&form) {
            Ok(r) => (Some(r), ValidationErrors::default()),
            Err(e) => (None, e),
        };
        let images = validate_images(uploads, self.policy.images, &mut errs);
        let Some(report) = report.filter(|_| errs.is_empty()) else {
            return Err(ApiError::Validation(errs));
        };

        let mut stored: Vec<ImageRef> = Vec::with_capacity(images.len());
        for img in images {
            let name = format!("{}.{}", Uuid::new_v4(), img.extension);
            let saved = match self.timed("image upload", self.images.save(&name, &img.mime, &img.bytes)).await {
                Ok(inner) => inner.map_err(ApiError::from),
                Err(timeout) => Err(timeout),
            };
            if let Err(e) = saved {
                self.discard_images(&stored).await;
                return Err(e);
            }
            stored.push(ImageRef {
                url: format!("{IMAGE_ROUTE}/{name}"),
                filename: name,
                mime: img.mime,
                uploaded_at: Utc::now(),
            });
        }

        let new = NewItem {
            owner: owner.summary(),
            kind: report.kind,
            title: report.title,
            description: report.description,
            category: report.category,
            location: report.location,
            date: report.date,
            contact_name: report.contact_name,
            contact_email: report.contact_email,
            phone: report.phone,
            images: stored.clone(),
        };
        let first_blob = stored.first().map(|img| img.filename.clone());
        let created = match self.timed("create item", self.repo.create_item(new)).await {
            Ok(inner) => inner.map_err(ApiError::from),
            // The write may have landed before the deadline fired. Deleting the
            // blobs is only safe once no committed item references them.
            Err(timeout) => match first_blob {
                None => Err(timeout),
                Some(blob) => match self.find_committed(&owner.sub, &blob).await {
                    Ok(Some(item)) => {
                        info!(item_id = item.id, "create item timed out after committing");
                        Ok(item)
                    }
                    Ok(None) => Err(timeout),
                    Err(e) => {
                        warn!(images = stored.len(), "create item outcome unknown, keeping uploaded image(s): {e}");
                        return Err(timeout);
                    }
                },
            },
        };
        match created {
            Ok(item) => {
                info!(item_id = item.id, owner = %item.owner.id, images = item.images.len(), "item reported");
                metrics::increment_counter!("lostfound_items_reported_total", "type" => item.kind.as_str());
                Ok(item)
            }
            Err(e) => {
                warn!("create item failed, discarding {} uploaded image(s): {e}", stored.len());
                self.discard_images(&stored).await;
                Err(e)
            }
        }
    }

    /// Look for an item of `owner` that references `blob` among their newest reports.
    async fn find_committed(&self, owner: &str, blob: &str) -> Result<Option<Item>, ApiError> {
        let newest = PageRequest::new(Some(1), Some(MAX_PAGE_SIZE));
        let (items, _) = self.timed("confirm create", self.repo.find_items(&ItemFilter::owned_by(owner), newest)).await??;
        Ok(items.into_iter().find(|item| item.images.iter().any(|img| img.filename == blob)))
    }

    async fn discard_images(&self, images: &[ImageRef]) {
        for img in images {
            match self.timed("image cleanup", self.images.delete(&img.filename)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(file = %img.filename, "image cleanup failed: {e}"),
                Err(e) => warn!(file = %img.filename, "image cleanup failed: {e}"),
            }
        }
    }

    /// File a pending claim on someone else's item.
    pub async fn file_claim(&self, claimant: &Claims, item_id: Id, req: ClaimRequest) -> Result<Item, ApiError> {
        let draft = ClaimDraft {
            claimant: claimant.summary(),
            claimant_email: claimant.email.trim().to_lowercase(),
            message: req.message.unwrap_or_default().trim().to_string(),
            proof_description: req.proof_description.unwrap_or_default().trim().to_string(),
        };
        let item = self
            .commit_transition(item_id, "claim", |item, now| item.file_claim(draft.clone(), now))
            .await?;
        info!(item_id, claimant = %claimant.sub, status = item.status.as_str(), "claim filed");
        metrics::increment_counter!("lostfound_claims_filed_total");
        Ok(item)
    }

    /// Owner closes the item, approving the chosen claim.
    pub async fn resolve(&self, caller: &Claims, item_id: Id, req: ResolveRequest) -> Result<Item, ApiError> {
        let draft = ResolveDraft {
            claimant_id: req.claimant_id.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            note: req.note.unwrap_or_default().trim().to_string(),
        };
        let policy = self.policy.resolve;
        let item = self
            .commit_transition(item_id, "resolve", |item, now| item.resolve(&caller.sub, draft.clone(), policy, now))
            .await?;
        info!(item_id, owner = %caller.sub, approved = ?item.resolved_with.as_ref().and_then(|r| r.user_id.as_deref()), "item resolved");
        metrics::increment_counter!("lostfound_items_resolved_total");
        Ok(item)
    }

    /// Compare-and-retry loop: load, apply, commit on the read version.
    async fn commit_transition<F>(&self, item_id: Id, op: &'static str, mut apply: F) -> Result<Item, ApiError>
    where
        F: FnMut(&mut Item, DateTime<Utc>) -> Result<(), LifecycleError>,
    {
        for attempt in 1..=self.policy.claim_retries {
            let mut item = self.timed("load item", self.repo.get_item(item_id)).await??;
            let expected = item.version;
            apply(&mut item, Utc::now())?;
            match self.timed("commit item", self.repo.replace_item(expected, item)).await? {
                Ok(saved) => return Ok(saved),
                Err(RepoError::Conflict) => {
                    warn!(item_id, op, attempt, "concurrent write on item; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        metrics::increment_counter!("lostfound_claim_conflicts_total", "op" => op);
        Err(ApiError::Conflict(format!(
            "item {item_id} is being modified concurrently; gave up after {} attempts",
            self.policy.claim_retries
        )))
    }

    pub async fn get_item(&self, item_id: Id) -> Result<Item, ApiError> {
        Ok(self.timed("load item", self.repo.get_item(item_id)).await??)
    }

    pub async fn list(&self, filter: &ItemFilter, page: PageRequest) -> Result<Page<Item>, ApiError> {
        let (items, total) = self.timed("list items", self.repo.find_items(filter, page)).await??;
        Ok(page.into_page(items, total))
    }

    pub async fn my_items(&self, user: &Claims, page: PageRequest) -> Result<Page<Item>, ApiError> {
        self.list(&ItemFilter::owned_by(&user.sub), page).await
    }

    /// Items the caller has claimed, each paired with the caller's own claim.
    pub async fn my_claims(&self, user: &Claims, page: PageRequest) -> Result<Page<MyClaim>, ApiError> {
        let found = self.list(&ItemFilter::claimed_by(&user.sub), page).await?;
        let items = found
            .items
            .into_iter()
            .filter_map(|item| {
                let my_claim = item.claim_by(&user.sub)?.clone();
                Some(MyClaim { item, my_claim })
            })
            .collect();
        Ok(Page { items, page: found.page, total_pages: found.total_pages, total: found.total })
    }
}
