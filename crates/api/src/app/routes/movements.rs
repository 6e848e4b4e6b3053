use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use stockroom_core::AggregateId;
use stockroom_inventory::ProductId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/", post(record_movement))
}

pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RecordMovementRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match body.product_id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id");
        }
    };
    let product_id = ProductId::new(agg);

    match services.record_movement(product_id, body.movement_type, body.qty, body.note) {
        Ok(rm) => (StatusCode::CREATED, Json(dto::movement_to_json(rm))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
