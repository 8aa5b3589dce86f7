use crate::error::ApiErrorBody;
use crate::models::{
    Category, Claim, ClaimRequest, ClaimResponse, ClaimStatus, ImageRef, Item, ItemKind, ItemPage, ItemStatus,
    MyClaim, ReportForm, Resolution, ResolveRequest, UserSummary,
};
use crate::validate::FieldError;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health,
        crate::routes::list_items,
        crate::routes::create_item,
        crate::routes::get_item,
        crate::routes::file_claim,
        crate::routes::resolve_item,
        crate::routes::my_items,
        crate::routes::my_claims,
        crate::routes::auth_me,
    ),
    components(schemas(
        Item, ItemPage, ItemKind, ItemStatus, Category, Claim, ClaimStatus, Resolution, ImageRef, UserSummary,
        ReportForm, ClaimRequest, ClaimResponse, ResolveRequest, MyClaim,
        ApiErrorBody, FieldError, crate::routes::MeResponse
    )),
    modifiers(&BearerAddon),
    tags(
        (name = "items", description = "Lost and found reports"),
        (name = "claims", description = "Claim and resolve workflow"),
    )
)]
pub struct ApiDoc;

struct BearerAddon;

impl Modify for BearerAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_item_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/items/{id}/claim"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/my/claims"));
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"bearer\""));
    }
}
