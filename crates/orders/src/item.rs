use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult, Entity, ItemId, Money, OrderId};

/// Product/service classification keys, indexed by item kind.
const CLASSIFICATION_KEYS: [&str; 29] = [
    "00000000", "81112106", "81111800", "81161501", "81111509", "81111510", "81111707",
    "81111705", "81111704", "81112103", "81111500", "81111508", "81111504", "81111820",
    "81112220", "81112200", "81112202", "81111811", "81111808", "81111806", "81111502",
    "81111503", "81111810", "81111700", "80111621", "81141901", "81141902", "81112209",
    "80121604",
];

/// Kind of work an item represents (1..=28).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ItemKind(u8);

impl ItemKind {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 28;

    pub fn new(code: u8) -> DomainResult<Self> {
        if !(Self::MIN..=Self::MAX).contains(&code) {
            return Err(DomainError::validation(format!(
                "item kind must be between {} and {} (got {code})",
                Self::MIN,
                Self::MAX
            )));
        }
        Ok(Self(code))
    }

    pub fn code(self) -> u8 {
        self.0
    }

    /// External product-classification key used on invoices.
    pub fn classification_key(self) -> &'static str {
        CLASSIFICATION_KEYS[self.0 as usize]
    }
}

impl TryFrom<u8> for ItemKind {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ItemKind::new(value)
    }
}

impl From<ItemKind> for u8 {
    fn from(value: ItemKind) -> Self {
        value.0
    }
}

/// Input for adding an item to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub kind: ItemKind,
    pub cost: Money,
}

/// Replacement values for an existing item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub name: String,
    pub description: String,
    pub kind: ItemKind,
    pub cost: Money,
}

/// A priced line of work belonging to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: ItemId,
    pub order_id: OrderId,
    pub name: String,
    pub description: String,
    pub kind: ItemKind,
    /// Cost in cents.
    pub cost: Money,
}

impl Entity for OrderItem {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl OrderItem {
    pub const MIN_COST: Money = Money::from_units(50);
    pub const MAX_COST: Money = Money::from_units(99_999);

    pub fn create(id: ItemId, order_id: OrderId, input: NewItem) -> DomainResult<Self> {
        validate_item(&input.name, input.cost)?;
        Ok(Self {
            id,
            order_id,
            name: input.name,
            description: input.description,
            kind: input.kind,
            cost: input.cost,
        })
    }

    pub fn apply(&mut self, update: ItemUpdate) -> DomainResult<()> {
        validate_item(&update.name, update.cost)?;
        self.name = update.name;
        self.description = update.description;
        self.kind = update.kind;
        self.cost = update.cost;
        Ok(())
    }
}

fn validate_item(name: &str, cost: Money) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("item name must not be empty"));
    }
    if cost < OrderItem::MIN_COST || cost > OrderItem::MAX_COST {
        return Err(DomainError::validation(format!(
            "item cost must be between {} and {} (got {cost})",
            OrderItem::MIN_COST,
            OrderItem::MAX_COST
        )));
    }
    Ok(())
}
