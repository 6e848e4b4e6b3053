use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use stockroom_events::Event;

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Stock movement identifier (service-assigned, immutable).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(pub AggregateId);

impl MovementId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MovementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Direction of a stock movement. The sign is implied by the type; `qty`
/// itself is always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    In,
    Out,
}

impl MovementType {
    /// Signed delta contributed by a movement of this type.
    pub fn signed(self, qty: i64) -> i64 {
        match self {
            MovementType::In => qty,
            MovementType::Out => -qty,
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MovementType::In => f.write_str("IN"),
            MovementType::Out => f.write_str("OUT"),
        }
    }
}

/// Aggregate root: Product.
///
/// `current_stock` is never set directly: it is the running sum of the
/// signed movements applied to the stream, and must never go negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    sku: String,
    name: String,
    category: Option<String>,
    cost_price: i64,
    selling_price: i64,
    reorder_level: i64,
    current_stock: i64,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            sku: String::new(),
            name: String::new(),
            category: None,
            cost_price: 0,
            selling_price: 0,
            reorder_level: 0,
            current_stock: 0,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn cost_price(&self) -> i64 {
        self.cost_price
    }

    pub fn selling_price(&self) -> i64 {
        self.selling_price
    }

    pub fn reorder_level(&self) -> i64 {
        self.reorder_level
    }

    pub fn current_stock(&self) -> i64 {
        self.current_stock
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Low-stock predicate: at or below the reorder level (inclusive).
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.reorder_level
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub cost_price: i64,
    pub selling_price: i64,
    pub reorder_level: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProduct (partial; `None` fields are left unchanged).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub product_id: ProductId,
    pub sku: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub cost_price: Option<i64>,
    pub selling_price: Option<i64>,
    pub reorder_level: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

impl UpdateProduct {
    pub fn is_empty(&self) -> bool {
        self.sku.is_none()
            && self.name.is_none()
            && self.category.is_none()
            && self.cost_price.is_none()
            && self.selling_price.is_none()
            && self.reorder_level.is_none()
    }
}

/// Command: DeleteProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordStockMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStockMovement {
    pub product_id: ProductId,
    pub movement_id: MovementId,
    pub movement_type: MovementType,
    pub qty: i64,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProduct(UpdateProduct),
    DeleteProduct(DeleteProduct),
    RecordStockMovement(RecordStockMovement),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub cost_price: i64,
    pub selling_price: i64,
    pub reorder_level: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUpdated. Carries only the fields that changed; an empty
/// category string clears the field. When the SKU changes, `previous_sku`
/// records the one given up, so uniqueness bookkeeping can follow the
/// committed event rather than a racy snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub sku: Option<String>,
    pub previous_sku: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
    pub cost_price: Option<i64>,
    pub selling_price: Option<i64>,
    pub reorder_level: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDeleted. Carries the SKU the product held, which the
/// deletion releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeleted {
    pub product_id: ProductId,
    pub sku: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockMovementRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovementRecorded {
    pub product_id: ProductId,
    pub movement_id: MovementId,
    pub movement_type: MovementType,
    pub qty: i64,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductUpdated(ProductUpdated),
    ProductDeleted(ProductDeleted),
    StockMovementRecorded(StockMovementRecorded),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "inventory.product.created",
            ProductEvent::ProductUpdated(_) => "inventory.product.updated",
            ProductEvent::ProductDeleted(_) => "inventory.product.deleted",
            ProductEvent::StockMovementRecorded(_) => "inventory.product.movement_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::ProductDeleted(e) => e.occurred_at,
            ProductEvent::StockMovementRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.cost_price = e.cost_price;
                self.selling_price = e.selling_price;
                self.reorder_level = e.reorder_level;
                self.current_stock = 0;
                self.created = true;
                self.deleted = false;
            }
            ProductEvent::ProductUpdated(e) => {
                if let Some(sku) = &e.sku {
                    self.sku = sku.clone();
                }
                if let Some(name) = &e.name {
                    self.name = name.clone();
                }
                if let Some(category) = &e.category {
                    // Empty category clears the field.
                    self.category = if category.is_empty() {
                        None
                    } else {
                        Some(category.clone())
                    };
                }
                if let Some(cost_price) = e.cost_price {
                    self.cost_price = cost_price;
                }
                if let Some(selling_price) = e.selling_price {
                    self.selling_price = selling_price;
                }
                if let Some(reorder_level) = e.reorder_level {
                    self.reorder_level = reorder_level;
                }
            }
            ProductEvent::ProductDeleted(_) => {
                self.deleted = true;
            }
            ProductEvent::StockMovementRecorded(e) => {
                self.current_stock += e.movement_type.signed(e.qty);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProduct(cmd) => self.handle_update(cmd),
            ProductCommand::DeleteProduct(cmd) => self.handle_delete(cmd),
            ProductCommand::RecordStockMovement(cmd) => self.handle_record_movement(cmd),
        }
    }
}

fn validate_sku(sku: &str) -> Result<String, DomainError> {
    let sku = sku.trim();
    if sku.is_empty() {
        return Err(DomainError::validation("SKU cannot be empty"));
    }
    Ok(sku.to_string())
}

fn validate_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(name.to_string())
}

fn validate_price(field: &str, value: i64) -> Result<i64, DomainError> {
    if value <= 0 {
        return Err(DomainError::validation(format!("{field} must be positive")));
    }
    Ok(value)
}

fn validate_reorder_level(value: i64) -> Result<i64, DomainError> {
    if value < 0 {
        return Err(DomainError::validation("reorder_level cannot be negative"));
    }
    Ok(value)
}

fn normalize_category(category: Option<&str>) -> Option<String> {
    category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

impl Product {
    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    /// Unknown and deleted products are indistinguishable to callers.
    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }

        let sku = validate_sku(&cmd.sku)?;
        let name = validate_name(&cmd.name)?;
        let cost_price = validate_price("cost_price", cmd.cost_price)?;
        let selling_price = validate_price("selling_price", cmd.selling_price)?;
        let reorder_level = validate_reorder_level(cmd.reorder_level)?;

        // SKU uniqueness across products is enforced by the infrastructure
        // layer (SKU index) before this command is dispatched; the aggregate
        // can only see its own stream.

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            sku,
            name,
            category: normalize_category(cmd.category.as_deref()),
            cost_price,
            selling_price,
            reorder_level,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_product_id(cmd.product_id)?;

        if cmd.is_empty() {
            return Err(DomainError::validation("no fields to update"));
        }

        let sku = cmd.sku.as_deref().map(validate_sku).transpose()?;
        let previous_sku = match &sku {
            Some(new) if *new != self.sku => Some(self.sku.clone()),
            _ => None,
        };
        let name = cmd.name.as_deref().map(validate_name).transpose()?;
        let cost_price = cmd
            .cost_price
            .map(|p| validate_price("cost_price", p))
            .transpose()?;
        let selling_price = cmd
            .selling_price
            .map(|p| validate_price("selling_price", p))
            .transpose()?;
        let reorder_level = cmd.reorder_level.map(validate_reorder_level).transpose()?;

        Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
            product_id: cmd.product_id,
            sku,
            previous_sku,
            name,
            category: cmd.category.as_ref().map(|c| c.trim().to_string()),
            cost_price,
            selling_price,
            reorder_level,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteProduct) -> Result<Vec<ProductEvent>, DomainError> {
        // Deleting twice yields NotFound the second time.
        self.ensure_live()?;
        self.ensure_product_id(cmd.product_id)?;

        Ok(vec![ProductEvent::ProductDeleted(ProductDeleted {
            product_id: cmd.product_id,
            sku: self.sku.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_movement(
        &self,
        cmd: &RecordStockMovement,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_product_id(cmd.product_id)?;

        if cmd.qty <= 0 {
            return Err(DomainError::validation("qty must be positive"));
        }

        let new_stock = self.current_stock + cmd.movement_type.signed(cmd.qty);
        if new_stock < 0 {
            return Err(DomainError::insufficient_stock(cmd.qty, self.current_stock));
        }

        Ok(vec![ProductEvent::StockMovementRecorded(
            StockMovementRecorded {
                product_id: cmd.product_id,
                movement_id: cmd.movement_id,
                movement_type: cmd.movement_type,
                qty: cmd.qty,
                note: cmd.note.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::AggregateId;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_movement_id() -> MovementId {
        MovementId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn create_cmd(product_id: ProductId) -> CreateProduct {
        CreateProduct {
            product_id,
            sku: "SKU001".to_string(),
            name: "Laptop".to_string(),
            category: Some("Electronics".to_string()),
            cost_price: 500,
            selling_price: 800,
            reorder_level: 5,
            occurred_at: test_time(),
        }
    }

    fn empty_update(product_id: ProductId) -> UpdateProduct {
        UpdateProduct {
            product_id,
            sku: None,
            name: None,
            category: None,
            cost_price: None,
            selling_price: None,
            reorder_level: None,
            occurred_at: test_time(),
        }
    }

    fn movement_cmd(product_id: ProductId, movement_type: MovementType, qty: i64) -> RecordStockMovement {
        RecordStockMovement {
            product_id,
            movement_id: test_movement_id(),
            movement_type,
            qty,
            note: None,
            occurred_at: test_time(),
        }
    }

    /// Create a product and apply the resulting event.
    fn created_product() -> Product {
        let product_id = test_product_id();
        let mut product = Product::empty(product_id);
        let events = product
            .handle(&ProductCommand::CreateProduct(create_cmd(product_id)))
            .unwrap();
        product.apply(&events[0]);
        product
    }

    fn record(product: &mut Product, movement_type: MovementType, qty: i64) {
        let cmd = movement_cmd(product.id_typed(), movement_type, qty);
        let events = product
            .handle(&ProductCommand::RecordStockMovement(cmd))
            .unwrap();
        product.apply(&events[0]);
    }

    #[test]
    fn create_product_emits_product_created_event() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);

        let events = product
            .handle(&ProductCommand::CreateProduct(create_cmd(product_id)))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            ProductEvent::ProductCreated(e) => {
                assert_eq!(e.product_id, product_id);
                assert_eq!(e.sku, "SKU001");
                assert_eq!(e.name, "Laptop");
                assert_eq!(e.category.as_deref(), Some("Electronics"));
                assert_eq!(e.cost_price, 500);
                assert_eq!(e.selling_price, 800);
                assert_eq!(e.reorder_level, 5);
            }
            _ => panic!("Expected ProductCreated event"),
        }
    }

    #[test]
    fn created_product_starts_with_zero_stock() {
        let product = created_product();
        assert_eq!(product.current_stock(), 0);
        assert!(!product.is_deleted());
    }

    #[test]
    fn create_product_trims_sku_and_name() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let mut cmd = create_cmd(product_id);
        cmd.sku = "  SKU001  ".to_string();
        cmd.name = " Laptop ".to_string();

        let events = product.handle(&ProductCommand::CreateProduct(cmd)).unwrap();
        match &events[0] {
            ProductEvent::ProductCreated(e) => {
                assert_eq!(e.sku, "SKU001");
                assert_eq!(e.name, "Laptop");
            }
            _ => panic!("Expected ProductCreated event"),
        }
    }

    #[test]
    fn create_product_normalizes_empty_category_to_none() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let mut cmd = create_cmd(product_id);
        cmd.category = Some("   ".to_string());

        let events = product.handle(&ProductCommand::CreateProduct(cmd)).unwrap();
        match &events[0] {
            ProductEvent::ProductCreated(e) => assert_eq!(e.category, None),
            _ => panic!("Expected ProductCreated event"),
        }
    }

    #[test]
    fn create_product_rejects_empty_sku() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let mut cmd = create_cmd(product_id);
        cmd.sku = "   ".to_string();

        let err = product
            .handle(&ProductCommand::CreateProduct(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_product_rejects_empty_name() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let mut cmd = create_cmd(product_id);
        cmd.name = "".to_string();

        let err = product
            .handle(&ProductCommand::CreateProduct(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_product_rejects_non_positive_prices() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);

        for price in [0, -5] {
            let mut cmd = create_cmd(product_id);
            cmd.cost_price = price;
            let err = product
                .handle(&ProductCommand::CreateProduct(cmd))
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));

            let mut cmd = create_cmd(product_id);
            cmd.selling_price = price;
            let err = product
                .handle(&ProductCommand::CreateProduct(cmd))
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn create_product_rejects_negative_reorder_level() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let mut cmd = create_cmd(product_id);
        cmd.reorder_level = -1;

        let err = product
            .handle(&ProductCommand::CreateProduct(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_product_rejects_duplicate_creation() {
        let mut product = created_product();
        let cmd = create_cmd(product.id_typed());

        let err = product
            .handle(&ProductCommand::CreateProduct(cmd.clone()))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        // State unchanged by the failed handle.
        let before = product.clone();
        let _ = product.handle(&ProductCommand::CreateProduct(cmd));
        assert_eq!(product, before);
    }

    #[test]
    fn update_product_changes_only_provided_fields() {
        let mut product = created_product();
        let mut cmd = empty_update(product.id_typed());
        cmd.name = Some("Gaming Laptop".to_string());
        cmd.selling_price = Some(900);

        let events = product.handle(&ProductCommand::UpdateProduct(cmd)).unwrap();
        product.apply(&events[0]);

        assert_eq!(product.name(), "Gaming Laptop");
        assert_eq!(product.selling_price(), 900);
        // Untouched fields keep their values.
        assert_eq!(product.sku(), "SKU001");
        assert_eq!(product.cost_price(), 500);
        assert_eq!(product.reorder_level(), 5);
    }

    #[test]
    fn update_product_requires_at_least_one_field() {
        let product = created_product();
        let cmd = empty_update(product.id_typed());

        let err = product
            .handle(&ProductCommand::UpdateProduct(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_product_rejects_unknown_product() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let mut cmd = empty_update(product_id);
        cmd.name = Some("Anything".to_string());

        let err = product
            .handle(&ProductCommand::UpdateProduct(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn update_product_rejects_blank_sku_and_name() {
        let product = created_product();

        let mut cmd = empty_update(product.id_typed());
        cmd.sku = Some("  ".to_string());
        let err = product
            .handle(&ProductCommand::UpdateProduct(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let mut cmd = empty_update(product.id_typed());
        cmd.name = Some("".to_string());
        let err = product
            .handle(&ProductCommand::UpdateProduct(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_product_clears_category_with_empty_string() {
        let mut product = created_product();
        assert_eq!(product.category(), Some("Electronics"));

        let mut cmd = empty_update(product.id_typed());
        cmd.category = Some("".to_string());
        let events = product.handle(&ProductCommand::UpdateProduct(cmd)).unwrap();
        product.apply(&events[0]);

        assert_eq!(product.category(), None);
    }

    #[test]
    fn update_product_does_not_touch_stock() {
        let mut product = created_product();
        record(&mut product, MovementType::In, 10);

        let mut cmd = empty_update(product.id_typed());
        cmd.name = Some("Renamed".to_string());
        let events = product.handle(&ProductCommand::UpdateProduct(cmd)).unwrap();
        product.apply(&events[0]);

        assert_eq!(product.current_stock(), 10);
    }

    #[test]
    fn delete_product_marks_deleted_and_names_released_sku() {
        let mut product = created_product();
        let cmd = DeleteProduct {
            product_id: product.id_typed(),
            occurred_at: test_time(),
        };

        let events = product.handle(&ProductCommand::DeleteProduct(cmd)).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ProductEvent::ProductDeleted(e) => assert_eq!(e.sku, "SKU001"),
            _ => panic!("Expected ProductDeleted event"),
        }
        product.apply(&events[0]);
        assert!(product.is_deleted());
    }

    #[test]
    fn sku_change_records_the_sku_given_up() {
        let product = created_product();

        let mut cmd = empty_update(product.id_typed());
        cmd.sku = Some("SKU002".to_string());
        let events = product.handle(&ProductCommand::UpdateProduct(cmd)).unwrap();
        match &events[0] {
            ProductEvent::ProductUpdated(e) => {
                assert_eq!(e.sku.as_deref(), Some("SKU002"));
                assert_eq!(e.previous_sku.as_deref(), Some("SKU001"));
            }
            _ => panic!("Expected ProductUpdated event"),
        }

        // Re-submitting the current SKU gives nothing up.
        let mut cmd = empty_update(product.id_typed());
        cmd.sku = Some("SKU001".to_string());
        let events = product.handle(&ProductCommand::UpdateProduct(cmd)).unwrap();
        match &events[0] {
            ProductEvent::ProductUpdated(e) => {
                assert_eq!(e.sku.as_deref(), Some("SKU001"));
                assert_eq!(e.previous_sku, None);
            }
            _ => panic!("Expected ProductUpdated event"),
        }
    }

    #[test]
    fn delete_product_rejects_unknown_product() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let cmd = DeleteProduct {
            product_id,
            occurred_at: test_time(),
        };

        let err = product
            .handle(&ProductCommand::DeleteProduct(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn delete_product_twice_yields_not_found() {
        let mut product = created_product();
        let cmd = DeleteProduct {
            product_id: product.id_typed(),
            occurred_at: test_time(),
        };

        let events = product
            .handle(&ProductCommand::DeleteProduct(cmd.clone()))
            .unwrap();
        product.apply(&events[0]);

        let err = product
            .handle(&ProductCommand::DeleteProduct(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn inbound_movement_increases_stock() {
        let mut product = created_product();
        record(&mut product, MovementType::In, 10);
        assert_eq!(product.current_stock(), 10);
    }

    #[test]
    fn outbound_movement_decreases_stock() {
        let mut product = created_product();
        record(&mut product, MovementType::In, 10);
        record(&mut product, MovementType::Out, 7);
        assert_eq!(product.current_stock(), 3);
    }

    #[test]
    fn movement_rejects_non_positive_qty() {
        let product = created_product();

        for qty in [0, -1, -100] {
            let cmd = movement_cmd(product.id_typed(), MovementType::In, qty);
            let err = product
                .handle(&ProductCommand::RecordStockMovement(cmd))
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn movement_rejects_unknown_product() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let cmd = movement_cmd(product_id, MovementType::In, 5);

        let err = product
            .handle(&ProductCommand::RecordStockMovement(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn movement_rejects_deleted_product() {
        let mut product = created_product();
        let delete = DeleteProduct {
            product_id: product.id_typed(),
            occurred_at: test_time(),
        };
        let events = product
            .handle(&ProductCommand::DeleteProduct(delete))
            .unwrap();
        product.apply(&events[0]);

        let cmd = movement_cmd(product.id_typed(), MovementType::In, 5);
        let err = product
            .handle(&ProductCommand::RecordStockMovement(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn outbound_movement_exceeding_stock_is_rejected() {
        let mut product = created_product();
        record(&mut product, MovementType::In, 3);

        let cmd = movement_cmd(product.id_typed(), MovementType::Out, 4);
        let err = product
            .handle(&ProductCommand::RecordStockMovement(cmd))
            .unwrap_err();
        match err {
            DomainError::InsufficientStock {
                requested,
                available,
            } => {
                assert_eq!(requested, 4);
                assert_eq!(available, 3);
            }
            _ => panic!("Expected InsufficientStock error"),
        }

        // Nothing committed, stock unchanged.
        assert_eq!(product.current_stock(), 3);
    }

    #[test]
    fn low_stock_predicate_is_inclusive() {
        let mut product = created_product(); // reorder_level = 5
        record(&mut product, MovementType::In, 10);
        assert!(!product.is_low_stock());

        record(&mut product, MovementType::Out, 5);
        // Exactly at the reorder level counts as low stock.
        assert_eq!(product.current_stock(), 5);
        assert!(product.is_low_stock());
    }

    #[test]
    fn version_increments_on_apply() {
        let mut product = created_product();
        assert_eq!(product.version(), 1);

        record(&mut product, MovementType::In, 10);
        assert_eq!(product.version(), 2);

        record(&mut product, MovementType::Out, 1);
        assert_eq!(product.version(), 3);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let product = created_product();
        let before = product.clone();

        let cmd = movement_cmd(product.id_typed(), MovementType::In, 5);
        let _ = product.handle(&ProductCommand::RecordStockMovement(cmd));

        assert_eq!(product, before);
    }

    #[test]
    fn movement_type_wire_format_is_upper_case() {
        let json = serde_json::to_value(MovementType::In).unwrap();
        assert_eq!(json, serde_json::json!("IN"));
        let parsed: MovementType = serde_json::from_value(serde_json::json!("OUT")).unwrap();
        assert_eq!(parsed, MovementType::Out);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn movement_type_strategy() -> impl Strategy<Value = MovementType> {
            prop_oneof![Just(MovementType::In), Just(MovementType::Out)]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: after any sequence of accepted movements, stock equals
            /// the signed sum of those movements and is never negative.
            #[test]
            fn stock_matches_signed_sum_and_never_goes_negative(
                movements in prop::collection::vec((movement_type_strategy(), 1i64..1000), 0..50)
            ) {
                let mut product = created_product();
                let mut expected: i64 = 0;

                for (movement_type, qty) in movements {
                    let cmd = movement_cmd(product.id_typed(), movement_type, qty);
                    match product.handle(&ProductCommand::RecordStockMovement(cmd)) {
                        Ok(events) => {
                            product.apply(&events[0]);
                            expected += movement_type.signed(qty);
                        }
                        Err(DomainError::InsufficientStock { .. }) => {
                            // Rejected movements must not change state.
                            prop_assert_eq!(product.current_stock(), expected);
                        }
                        Err(e) => return Err(TestCaseError::fail(format!("unexpected error: {e}"))),
                    }

                    prop_assert_eq!(product.current_stock(), expected);
                    prop_assert!(product.current_stock() >= 0);
                }
            }

            /// Property: applying the same events to two fresh aggregates
            /// produces identical state.
            #[test]
            fn apply_is_deterministic(
                movements in prop::collection::vec((movement_type_strategy(), 1i64..1000), 0..30)
            ) {
                let product_id = test_product_id();
                let mut reference = Product::empty(product_id);
                let create = create_cmd(product_id);
                let mut events = reference
                    .handle(&ProductCommand::CreateProduct(create))
                    .unwrap();
                reference.apply(&events[0]);

                for (movement_type, qty) in movements {
                    let cmd = movement_cmd(product_id, movement_type, qty);
                    if let Ok(more) = reference.handle(&ProductCommand::RecordStockMovement(cmd)) {
                        reference.apply(&more[0]);
                        events.extend(more);
                    }
                }

                let mut replayed = Product::empty(product_id);
                for event in &events {
                    replayed.apply(event);
                }

                prop_assert_eq!(&replayed, &reference);
                prop_assert_eq!(replayed.version(), events.len() as u64);
            }

            /// Property: handle is pure (same state + command = same outcome,
            /// no mutation).
            #[test]
            fn handle_is_deterministic(qty in 1i64..1000) {
                let product = created_product();
                let cmd = movement_cmd(product.id_typed(), MovementType::In, qty);

                let state_before = product.clone();
                let events1 = product.handle(&ProductCommand::RecordStockMovement(cmd.clone()));
                let events2 = product.handle(&ProductCommand::RecordStockMovement(cmd));

                prop_assert_eq!(&product, &state_before);
                prop_assert_eq!(events1, events2);
            }
        }
    }
}
