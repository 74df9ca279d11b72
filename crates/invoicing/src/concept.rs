//! Invoice line items ("concepts") derived from allocated order lines.
//!
//! Line amounts are VAT-inclusive; the provider expects the net unit value
//! and discount plus the transferred VAT on the discounted base.

use serde::{Deserialize, Serialize};

use atelier_core::Money;
use atelier_orders::{AllocatedLine, Distribution};

pub const VAT_RATE_PERCENT: i64 = 16;

/// Unit key and name for a service unit.
const SERVICE_UNIT_KEY: &str = "E48";
const SERVICE_UNIT_NAME: &str = "Unidad de servicio";

/// Net amount of a VAT-inclusive gross amount: `round(gross / 1.16)`.
pub fn net_of_vat(gross: Money) -> Money {
    gross.mul_ratio(100, 100 + VAT_RATE_PERCENT)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatTransfer {
    pub base: Money,
    pub rate_percent: i64,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceConcept {
    pub product_key: String,
    pub quantity: u32,
    pub unit_key: String,
    pub unit_name: String,
    pub description: String,
    pub unit_value: Money,
    pub discount: Money,
    /// Present only when the discounted base is positive.
    pub vat: Option<VatTransfer>,
}

impl InvoiceConcept {
    pub fn from_line(line: &AllocatedLine) -> Self {
        let unit_value = net_of_vat(line.subtotal);
        let discount = net_of_vat(line.discount);
        let base = unit_value - discount;

        let vat = (base > Money::ZERO).then(|| VatTransfer {
            base,
            rate_percent: VAT_RATE_PERCENT,
            amount: base.mul_ratio(VAT_RATE_PERCENT, 100),
        });

        Self {
            product_key: line.key.to_string(),
            quantity: 1,
            unit_key: SERVICE_UNIT_KEY.to_string(),
            unit_name: SERVICE_UNIT_NAME.to_string(),
            description: format!("Servicio. {}", line.name),
            unit_value,
            discount,
            vat,
        }
    }

    pub fn is_taxable(&self) -> bool {
        self.vat.is_some()
    }
}

pub fn concepts_for(distribution: &Distribution) -> Vec<InvoiceConcept> {
    distribution.lines.iter().map(InvoiceConcept::from_line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::Percentage;
    use atelier_orders::{ItemKind, PricedLine, allocate_discount};
    use proptest::prelude::*;

    fn line(subtotal: i64, discount: i64) -> AllocatedLine {
        AllocatedLine {
            name: "Landing page".to_string(),
            key: "81112106",
            subtotal: Money::from_cents(subtotal),
            discount: Money::from_cents(discount),
            total: Money::from_cents(subtotal - discount),
        }
    }

    #[test]
    fn extracts_vat_from_gross_amount() {
        let concept = InvoiceConcept::from_line(&line(11_600, 0));
        assert_eq!(concept.unit_value, Money::from_units(100));
        assert_eq!(concept.discount, Money::ZERO);
        let vat = concept.vat.unwrap();
        assert_eq!(vat.base, Money::from_units(100));
        assert_eq!(vat.amount, Money::from_units(16));
    }

    #[test]
    fn discount_is_netted_before_tax() {
        let concept = InvoiceConcept::from_line(&line(11_600, 1_160));
        assert_eq!(concept.discount, Money::from_units(10));
        assert_eq!(concept.vat.unwrap().base, Money::from_units(90));
        assert_eq!(concept.description, "Servicio. Landing page");
        assert_eq!(concept.product_key, "81112106");
    }

    #[test]
    fn fully_discounted_line_carries_no_vat() {
        let concept = InvoiceConcept::from_line(&line(5_000, 5_000));
        assert!(!concept.is_taxable());
    }

    #[test]
    fn one_concept_per_allocated_line() {
        let lines = vec![
            PricedLine {
                name: "Design".to_string(),
                kind: ItemKind::new(1).unwrap(),
                cost: Money::from_units(500),
            },
            PricedLine {
                name: "Hosting".to_string(),
                kind: ItemKind::new(2).unwrap(),
                cost: Money::from_units(250),
            },
        ];
        let distribution = allocate_discount(&lines, Percentage::new(20).unwrap()).unwrap();
        let concepts = concepts_for(&distribution);
        assert_eq!(concepts.len(), 2);
        assert_eq!(concepts[1].product_key, "81111800");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: net + VAT reconstructs the gross amount within a couple
        /// of cents of rounding.
        #[test]
        fn net_plus_vat_reconstructs_gross(gross in 1i64..100_000_000) {
            let concept = InvoiceConcept::from_line(&line(gross, 0));
            let vat = concept.vat.map(|v| v.amount).unwrap_or(Money::ZERO);
            let rebuilt = (concept.unit_value + vat).cents();
            prop_assert!((rebuilt - gross).abs() <= 1);
        }
    }
}
