use serde::Deserialize;

use stockroom_infra::projections::{MovementReadModel, ProductReadModel, Summary};
use stockroom_inventory::MovementType;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub cost_price: i64,
    pub selling_price: i64,
    pub reorder_level: i64,
}

/// Partial update: absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub cost_price: Option<i64>,
    #[serde(default)]
    pub selling_price: Option<i64>,
    #[serde(default)]
    pub reorder_level: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RecordMovementRequest {
    pub product_id: String,
    pub movement_type: MovementType,
    pub qty: i64,
    #[serde(default)]
    pub note: Option<String>,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn product_to_json(rm: ProductReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.product_id.to_string(),
        "sku": rm.sku,
        "name": rm.name,
        "category": rm.category,
        "cost_price": rm.cost_price,
        "selling_price": rm.selling_price,
        "reorder_level": rm.reorder_level,
        "current_stock": rm.current_stock,
    })
}

pub fn movement_to_json(rm: MovementReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.movement_id.to_string(),
        "product_id": rm.product_id.to_string(),
        "movement_type": rm.movement_type.to_string(),
        "qty": rm.qty,
        "note": rm.note,
        "timestamp": rm.occurred_at.to_rfc3339(),
    })
}

pub fn summary_to_json(summary: Summary) -> serde_json::Value {
    serde_json::json!({
        "total_items": summary.total_items,
        "low_stock_count": summary.low_stock_count,
        "total_inventory_value": summary.total_inventory_value,
    })
}
