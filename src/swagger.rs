use anyhow::Result;
use utoipa::{
    Modify,
    openapi::{
        OpenApi,
        security::{ApiKey, ApiKeyValue, SecurityScheme},
    },
};
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{USER_ID_HEADER, USER_ROLE_HEADER};

struct GatewayHeaders;

impl Modify for GatewayHeaders {
    fn modify(&self, openapi: &mut OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "userId",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(USER_ID_HEADER))),
        );
        components.add_security_scheme(
            "userRole",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(USER_ROLE_HEADER))),
        );
    }
}

/// Serves the generated document at `/api-docs/openapi.json` with the UI at `/swagger-ui`.
pub fn create_swagger_ui(mut openapi: OpenApi) -> Result<SwaggerUi> {
    GatewayHeaders.modify(&mut openapi);
    Ok(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
}
