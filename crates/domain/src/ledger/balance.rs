//! Stock balances derived from the ledger.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Deserialize;

use super::movement::{LocationAllocation, MovementType};

/// The fields of a movement that matter for balances, shared by product
/// and supply records.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRecord {
    pub tipo_movimento: MovementType,
    pub quantidade: Decimal,

    #[serde(default)]
    pub locais: Vec<LocationAllocation>,
}

/// Signed sum of movements for one item, partitioned by location.
///
/// Movements without allocations land in the unassigned partition (`None`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StockBalance {
    pub item_id: String,
    by_location: BTreeMap<Option<String>, Decimal>,
}

impl StockBalance {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            by_location: BTreeMap::new(),
        }
    }

    /// Adds one movement. With a location filter, only allocations at that
    /// location count and unallocated movements are ignored.
    pub fn apply(
        &mut self,
        tipo: MovementType,
        quantidade: Decimal,
        locais: &[LocationAllocation],
        location_filter: Option<&str>,
    ) {
        let sign = tipo.sign();

        if locais.is_empty() {
            if location_filter.is_none() {
                *self.by_location.entry(None).or_default() += sign * quantidade;
            }
            return;
        }

        for local in locais {
            if location_filter.is_some_and(|filter| filter != local.local_id) {
                continue;
            }
            *self
                .by_location
                .entry(Some(local.local_id.clone()))
                .or_default() += sign * local.quantidade;
        }
    }

    pub fn apply_record(&mut self, record: &MovementRecord, location_filter: Option<&str>) {
        self.apply(
            record.tipo_movimento,
            record.quantidade,
            &record.locais,
            location_filter,
        );
    }

    pub fn total(&self) -> Decimal {
        self.by_location.values().copied().sum()
    }

    /// Balance of one partition; `None` is the unassigned one.
    pub fn at(&self, location: Option<&str>) -> Decimal {
        self.by_location
            .get(&location.map(str::to_string))
            .copied()
            .unwrap_or_default()
    }

    pub fn locations(&self) -> impl Iterator<Item = (Option<&str>, Decimal)> {
        self.by_location
            .iter()
            .map(|(location, quantity)| (location.as_deref(), *quantity))
    }

    /// Returns true if the item is over-debited overall.
    pub fn is_negative(&self) -> bool {
        self.total() < Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[test]
    fn partitions_by_location() {
        let mut balance = StockBalance::new("P1");
        balance.apply(
            MovementType::Entrada,
            dec(5),
            &[
                LocationAllocation::new("A1", dec(3)),
                LocationAllocation::new("A2", dec(2)),
            ],
            None,
        );
        balance.apply(
            MovementType::Saida,
            dec(1),
            &[LocationAllocation::new("A1", dec(1))],
            None,
        );
        balance.apply(MovementType::Entrada, dec(4), &[], None);

        assert_eq!(balance.at(Some("A1")), dec(2));
        assert_eq!(balance.at(Some("A2")), dec(2));
        assert_eq!(balance.at(None), dec(4));
        assert_eq!(balance.total(), dec(8));
        assert_eq!(balance.locations().count(), 3);
    }

    #[test]
    fn location_filter_ignores_other_partitions() {
        let mut balance = StockBalance::new("P1");
        let locais = [
            LocationAllocation::new("A1", dec(3)),
            LocationAllocation::new("A2", dec(2)),
        ];
        balance.apply(MovementType::Entrada, dec(5), &locais, Some("A2"));
        balance.apply(MovementType::Entrada, dec(7), &[], Some("A2"));

        assert_eq!(balance.total(), dec(2));
    }

    #[test]
    fn over_debit_goes_negative() {
        let mut balance = StockBalance::new("M1");
        balance.apply(MovementType::Saida, dec(2), &[], None);
        assert!(balance.is_negative());
        assert_eq!(balance.total(), dec(-2));
    }
}
