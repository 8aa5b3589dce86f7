//! Listing filters and pagination shared by every item store backend.

use crate::models::{Category, Item, ItemKind, ItemStatus, ListQuery, Page, UserId};
use crate::validate::ValidationErrors;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Conjunction of optional predicates; `query` is itself an OR over
/// title, description and location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemFilter {
    pub kind: Option<ItemKind>,
    pub category: Option<Category>,
    pub status: Option<ItemStatus>,
    pub query: Option<String>,
    pub owner: Option<UserId>,
    pub claimant: Option<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: DEFAULT_PAGE_SIZE }
    }
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    pub fn into_page<T>(self, items: Vec<T>, total: u64) -> Page<T> {
        let total_pages = total.div_ceil(u64::from(self.limit));
        Page {
            items,
            page: self.page,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
            total,
        }
    }
}

fn is_all(raw: &str) -> bool {
    raw.trim().is_empty() || raw.trim().eq_ignore_ascii_case("all")
}

impl ItemFilter {
    /// Public listing filter. `status` defaults to `open`; `all` (or empty)
    /// switches a filter off.
    pub fn from_query(q: &ListQuery) -> Result<(Self, PageRequest), ValidationErrors> {
        let mut errs = ValidationErrors::default();
        let mut filter = ItemFilter::default();

        if let Some(raw) = q.kind.as_deref().filter(|r| !is_all(r)) {
            filter.kind = ItemKind::parse(raw);
            if filter.kind.is_none() {
                errs.push("type", format!("unknown type '{raw}'"));
            }
        }
        if let Some(raw) = q.category.as_deref().filter(|r| !is_all(r)) {
            filter.category = Category::parse(raw);
            if filter.category.is_none() {
                errs.push("category", format!("unknown category '{raw}'"));
            }
        }
        match q.status.as_deref() {
            None => filter.status = Some(ItemStatus::Open),
            Some(raw) if is_all(raw) => {}
            Some(raw) => {
                filter.status = ItemStatus::parse(raw);
                if filter.status.is_none() {
                    errs.push("status", format!("unknown status '{raw}'"));
                }
            }
        }
        filter.query = q.q.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

        if !errs.is_empty() {
            return Err(errs);
        }
        Ok((filter, PageRequest::new(q.page, q.limit)))
    }

    pub fn owned_by(owner: &str) -> Self {
        Self { owner: Some(owner.to_string()), ..Self::default() }
    }

    pub fn claimed_by(claimant: &str) -> Self {
        Self { claimant: Some(claimant.to_string()), ..Self::default() }
    }

    pub fn matches(&self, item: &Item) -> bool {
        if self.kind.is_some_and(|k| k != item.kind) {
            return false;
        }
        if self.category.is_some_and(|c| c != item.category) {
            return false;
        }
        if self.status.is_some_and(|s| s != item.status) {
            return false;
        }
        if self.owner.as_deref().is_some_and(|o| o != item.owner.id) {
            return false;
        }
        if let Some(claimant) = self.claimant.as_deref() {
            if item.claim_by(claimant).is_none() {
                return false;
            }
        }
        if let Some(q) = self.query.as_deref() {
            let needle = q.to_lowercase();
            let hit = [&item.title, &item.description, &item.location]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Newest first; ties broken by id so pages are stable.
pub fn sort_newest_first(items: &mut [Item]) {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}
