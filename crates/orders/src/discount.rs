//! Order discounts and the proportional discount allocator.

use serde::{Deserialize, Serialize};

use atelier_core::{DomainError, DomainResult, Money, OrderId, Percentage};

use crate::item::{ItemKind, OrderItem};

/// Input for attaching a discount to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDiscount {
    pub percentage: Percentage,
    pub description: String,
    pub disposable: bool,
}

/// The (single) live discount of an order.
///
/// A disposable discount is consumed by its first successful use when a
/// payment intent or recurring charge is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub order_id: OrderId,
    pub percentage: Percentage,
    pub description: String,
    pub disposable: bool,
}

impl Discount {
    pub const MAX_DESCRIPTION: usize = 80;

    pub fn create(order_id: OrderId, input: NewDiscount) -> DomainResult<Self> {
        if input.percentage == Percentage::ZERO {
            return Err(DomainError::validation("discount percentage must be greater than 0"));
        }
        let description = input.description.trim();
        if description.is_empty() || description.chars().count() > Self::MAX_DESCRIPTION {
            return Err(DomainError::validation(format!(
                "discount description must be 1 to {} characters",
                Self::MAX_DESCRIPTION
            )));
        }
        Ok(Self {
            order_id,
            percentage: input.percentage,
            description: description.to_string(),
            disposable: input.disposable,
        })
    }
}

/// A line priced for allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub name: String,
    pub kind: ItemKind,
    pub cost: Money,
}

impl PricedLine {
    pub fn from_item(item: &OrderItem) -> Self {
        Self {
            name: item.name.clone(),
            kind: item.kind,
            cost: item.cost,
        }
    }

    /// The item's share of a single installment (`cost / installments`, to the cent).
    pub fn per_installment(item: &OrderItem, installments: u32) -> Self {
        Self {
            cost: item.cost.div_round(installments),
            ..Self::from_item(item)
        }
    }
}

/// One line after the discount has been distributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocatedLine {
    pub name: String,
    /// Product-classification key derived from the item kind.
    pub key: &'static str,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
}

/// Result of distributing a discount across lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Distribution {
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
    pub lines: Vec<AllocatedLine>,
}

impl Distribution {
    /// Amount charged per installment.
    pub fn per_installment(&self, installments: u32) -> Money {
        self.total.div_round(installments)
    }
}

/// Distribute `percentage` of the subtotal across `lines` at cent precision.
///
/// Each line receives `round(line / subtotal * discount_total)`; the last line
/// absorbs whatever rounding left over so the distributed discounts sum to
/// `round(subtotal * percentage / 100)` exactly.
pub fn allocate_discount(lines: &[PricedLine], percentage: Percentage) -> DomainResult<Distribution> {
    if lines.is_empty() {
        return Err(DomainError::validation("items list is empty"));
    }

    let subtotal: Money = lines.iter().map(|l| l.cost).sum();
    let discount_total = percentage.of(subtotal);

    let mut shares: Vec<Money> = lines
        .iter()
        .map(|line| {
            if subtotal.is_zero() {
                Money::ZERO
            } else {
                line.cost.mul_ratio(discount_total.cents(), subtotal.cents())
            }
        })
        .collect();

    let distributed: Money = shares.iter().sum();
    if let Some(last) = shares.last_mut() {
        *last += discount_total - distributed;
    }

    let allocated = lines
        .iter()
        .zip(shares)
        .map(|(line, share)| AllocatedLine {
            name: line.name.clone(),
            key: line.kind.classification_key(),
            subtotal: line.cost,
            discount: share,
            total: line.cost - share,
        })
        .collect();

    Ok(Distribution {
        subtotal,
        discount: discount_total,
        total: subtotal - discount_total,
        lines: allocated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(cents: i64) -> PricedLine {
        PricedLine {
            name: format!("item-{cents}"),
            kind: ItemKind::new(1).unwrap(),
            cost: Money::from_cents(cents),
        }
    }

    fn pct(value: u8) -> Percentage {
        Percentage::new(value).unwrap()
    }

    #[test]
    fn even_items_share_the_discount_evenly() {
        let lines = vec![line(10_000), line(10_000), line(10_000)];
        let d = allocate_discount(&lines, pct(10)).unwrap();

        assert_eq!(d.subtotal, Money::from_units(300));
        assert_eq!(d.discount, Money::from_units(30));
        assert_eq!(d.total, Money::from_units(270));
        for l in &d.lines {
            assert_eq!(l.discount, Money::from_units(10));
            assert_eq!(l.total, Money::from_units(90));
        }
    }

    #[test]
    fn uneven_items_sum_to_the_exact_discount() {
        let lines = vec![line(3_333), line(3_333), line(3_334)];
        let d = allocate_discount(&lines, pct(33)).unwrap();

        assert_eq!(d.discount, Money::from_units(33));
        let sum: Money = d.lines.iter().map(|l| l.discount).sum();
        assert_eq!(sum, Money::from_units(33));
    }

    #[test]
    fn rounding_difference_lands_on_last_item() {
        // 3 x 0.01 at 50%: discount_total = round(1.5) = 2, each share rounds to 1
        // (round(0.666)), so the last line gives back one cent.
        let lines = vec![line(1), line(1), line(1)];
        let d = allocate_discount(&lines, pct(50)).unwrap();

        assert_eq!(d.discount, Money::from_cents(2));
        assert_eq!(d.lines[0].discount, Money::from_cents(1));
        assert_eq!(d.lines[1].discount, Money::from_cents(1));
        assert_eq!(d.lines[2].discount, Money::ZERO);
    }

    #[test]
    fn full_discount_zeroes_the_total() {
        let lines = vec![line(12_345), line(678)];
        let d = allocate_discount(&lines, Percentage::FULL).unwrap();
        assert_eq!(d.total, Money::ZERO);
        assert!(d.lines.iter().all(|l| l.total == Money::ZERO));
    }

    #[test]
    fn empty_items_are_rejected() {
        let err = allocate_discount(&[], pct(10)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn lines_carry_classification_key() {
        let mut l = line(5_000);
        l.kind = ItemKind::new(3).unwrap();
        let d = allocate_discount(&[l], Percentage::ZERO).unwrap();
        assert_eq!(d.lines[0].key, "81161501");
    }

    #[test]
    fn distribution_serializes_for_read_views() {
        let mut l = line(5_000);
        l.kind = ItemKind::new(3).unwrap();
        let d = allocate_discount(&[l], pct(10)).unwrap();

        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["lines"][0]["key"], "81161501");
        assert_eq!(json["discount"], 500);
        assert_eq!(json["total"], 4_500);
    }

    #[test]
    fn zero_percent_discount_is_rejected_on_attach() {
        let input = NewDiscount {
            percentage: Percentage::ZERO,
            description: "none".to_string(),
            disposable: false,
        };
        assert!(Discount::create(OrderId::new(), input).is_err());
    }

    #[test]
    fn per_installment_line_divides_cost() {
        let item = OrderItem {
            id: atelier_core::ItemId::new(),
            order_id: OrderId::new(),
            name: "Design".to_string(),
            description: String::new(),
            kind: ItemKind::new(1).unwrap(),
            cost: Money::from_units(100),
        };
        assert_eq!(PricedLine::per_installment(&item, 3).cost, Money::from_cents(3_333));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: distributed discounts always add up to the rounded total,
        /// and line totals add up to subtotal - discount.
        #[test]
        fn distribution_has_no_cent_drift(
            costs in prop::collection::vec(1i64..10_000_000i64, 1..20),
            percentage in 0u8..=100u8,
        ) {
            let lines: Vec<PricedLine> = costs.iter().copied().map(line).collect();
            let d = allocate_discount(&lines, pct(percentage)).unwrap();

            let subtotal: i64 = costs.iter().sum();
            let expected = atelier_core::money::round_div(subtotal as i128 * percentage as i128, 100) as i64;

            let discounts: Money = d.lines.iter().map(|l| l.discount).sum();
            let totals: Money = d.lines.iter().map(|l| l.total).sum();

            prop_assert_eq!(d.discount.cents(), expected);
            prop_assert_eq!(discounts, d.discount);
            prop_assert_eq!(totals, d.subtotal - d.discount);
            prop_assert_eq!(d.lines.len(), lines.len());
        }
    }
}
