use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub type Id = i64;
/// Stable subject identifier handed out by the identity layer (JWT `sub`).
pub type UserId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Lost,
    Found,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Category {
    #[serde(rename = "ID Card")]
    IdCard,
    Electronics,
    Books,
    Clothing,
    Accessories,
    Keys,
    Wallet,
    Documents,
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::IdCard,
        Category::Electronics,
        Category::Books,
        Category::Clothing,
        Category::Accessories,
        Category::Keys,
        Category::Wallet,
        Category::Documents,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::IdCard => "ID Card",
            Category::Electronics => "Electronics",
            Category::Books => "Books",
            Category::Clothing => "Clothing",
            Category::Accessories => "Accessories",
            Category::Keys => "Keys",
            Category::Wallet => "Wallet",
            Category::Documents => "Documents",
            Category::Other => "Other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|c| c.as_str().eq_ignore_ascii_case(raw))
    }
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Lost => "lost",
            ItemKind::Found => "found",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lost" => Some(ItemKind::Lost),
            "found" => Some(ItemKind::Found),
            _ => None,
        }
    }
}

/// Item lifecycle. Only moves forward: open -> claimed -> resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Open,
    Claimed,
    Resolved,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Open => "open",
            ItemStatus::Claimed => "claimed",
            ItemStatus::Resolved => "resolved",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Some(ItemStatus::Open),
            "claimed" => Some(ItemStatus::Claimed),
            "resolved" => Some(ItemStatus::Resolved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
}

/// Minimal display form of a user; never carries contact details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub filename: String,
    pub url: String,
    pub mime: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub claimant_id: UserId,
    // denormalized at claim time
    pub claimant_name: String,
    pub claimant_email: String,
    pub message: String,
    pub proof_description: String,
    pub status: ClaimStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// `None` when the owner closed the report without approving a claim.
    pub user_id: Option<UserId>,
    pub timestamp: DateTime<Utc>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: Id,
    pub owner: UserSummary,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub location: String,
    pub date: DateTime<Utc>,
    pub contact_name: String,
    pub contact_email: String,
    pub phone: Option<String>,
    pub images: Vec<ImageRef>,
    pub status: ItemStatus,
    pub claims: Vec<Claim>,
    pub resolved_with: Option<Resolution>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every committed write; used as the CAS precondition.
    pub version: u64,
}

impl Item {
    pub fn claim_by(&self, claimant: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claimant_id == claimant)
    }
}

/// A validated report, ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub owner: UserSummary,
    pub kind: ItemKind,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub location: String,
    pub date: DateTime<Utc>,
    pub contact_name: String,
    pub contact_email: String,
    pub phone: Option<String>,
    pub images: Vec<ImageRef>,
}

impl NewItem {
    /// Materialize the stored record. Status always starts `open` with no claims.
    pub fn into_item(self, id: Id, now: DateTime<Utc>) -> Item {
        Item {
            id,
            owner: self.owner,
            kind: self.kind,
            title: self.title,
            description: self.description,
            category: self.category,
            location: self.location,
            date: self.date,
            contact_name: self.contact_name,
            contact_email: self.contact_email,
            phone: self.phone,
            images: self.images,
            status: ItemStatus::Open,
            claims: Vec::new(),
            resolved_with: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

/// Raw report fields as submitted in the multipart form, before validation.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportForm {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
}

/// One attached file from a report submission.
#[derive(Debug, Clone)]
pub struct Upload {
    pub original_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub proof_description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    /// Claimant whose claim gets approved. Omit to close without a claim (policy permitting).
    #[serde(default)]
    pub claimant_id: Option<UserId>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClaimResponse {
    pub message: String,
    pub item: Item,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MyClaim {
    #[serde(flatten)]
    pub item: Item,
    pub my_claim: Claim,
}

/// Query string of the public listing.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// `lost`, `found` or `all`
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub category: Option<String>,
    /// Defaults to `open`; `all` disables the filter.
    pub status: Option<String>,
    /// Case-insensitive substring over title, description and location.
    pub q: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[aliases(ItemPage = Page<Item>)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub total_pages: u32,
    pub total: u64,
}
