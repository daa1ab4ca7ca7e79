pub mod deliveries;
pub mod orders;
pub mod patients;
pub mod payments;
pub mod pharmacies;
pub mod prescriptions;

use utoipa_axum::router::OpenApiRouter;

use crate::app_state::AppState;

/// Every route of the service, with its OpenAPI description.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    payments::routes_with_openapi()
        .merge(patients::carts::routes_with_openapi())
        .merge(patients::checkout::routes_with_openapi())
        .merge(patients::orders::routes_with_openapi())
        .merge(patients::prescriptions::routes_with_openapi())
        .merge(orders::routes_with_openapi())
        .merge(prescriptions::routes_with_openapi())
        .merge(deliveries::routes_with_openapi())
        .merge(pharmacies::routes_with_openapi())
}
