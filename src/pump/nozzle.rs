//! Nozzle Records
//!
//! Per-nozzle price and lifetime totals for one pump. The bank is sized once
//! from the configured nozzle limit and never grows or shrinks; nozzle ids on
//! the wire are 1-indexed, slot 0 in the vector backs nozzle 1.

use serde::Serialize;
use tracing::debug;

use crate::error::{ErrorSink, ValidatedField, ValidationError};

/// One fueling point on a pump
#[derive(Debug, Clone, Serialize)]
pub struct Nozzle {
    /// Wire nozzle id, 1-indexed
    pub id: u8,
    /// Price per liter in minor currency units
    pub price_per_liter: u32,
    /// Lifetime dispensed amount, minor currency units
    pub total_dispensed_amount: u64,
    /// Lifetime dispensed volume, 10 ml units
    pub total_dispensed_volume: u64,
    /// Last ID tag read from the nozzle, if any
    pub tag_code: Option<String>,
}

impl Nozzle {
    fn new(id: u8) -> Self {
        Self {
            id,
            price_per_liter: 0,
            total_dispensed_amount: 0,
            total_dispensed_volume: 0,
            tag_code: None,
        }
    }
}

/// Fixed-size set of nozzle records owned by one pump
#[derive(Debug, Clone)]
pub struct NozzleBank {
    pump_id: u16,
    nozzles: Vec<Nozzle>,
    errors: ErrorSink,
}

impl NozzleBank {
    /// Build a bank of `count` nozzles numbered 1..=count
    pub fn new(pump_id: u16, count: u8, errors: ErrorSink) -> Self {
        let nozzles = (1..=count).map(Nozzle::new).collect();
        Self {
            pump_id,
            nozzles,
            errors,
        }
    }

    pub fn len(&self) -> usize {
        self.nozzles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nozzles.is_empty()
    }

    /// Look up a nozzle by its 1-indexed wire id
    pub fn get(&self, nozzle_id: u8) -> Option<&Nozzle> {
        self.index_of(nozzle_id).map(|i| &self.nozzles[i])
    }

    /// Iterate nozzles in wire-id order
    pub fn iter(&self) -> impl Iterator<Item = &Nozzle> {
        self.nozzles.iter()
    }

    /// Prices for all nozzles, ordered by wire id
    pub fn price_list(&self) -> Vec<u32> {
        self.nozzles.iter().map(|n| n.price_per_liter).collect()
    }

    /// Price for one nozzle; 0 when the id is out of range
    pub fn price_of(&self, nozzle_id: u8) -> u32 {
        self.get(nozzle_id).map(|n| n.price_per_liter).unwrap_or(0)
    }

    /// Set the price for one nozzle, discarding negative values
    ///
    /// A rejected write keeps the prior price and reports to the sink.
    pub fn set_price_per_liter(&mut self, nozzle_id: u8, value: i64) {
        let Some(index) = self.index_of(nozzle_id) else {
            return;
        };
        if value < 0 {
            self.errors.report(ValidationError {
                pump_id: self.pump_id,
                nozzle_id: Some(nozzle_id),
                field: ValidatedField::PricePerLiter,
                rejected: value,
            });
            return;
        }
        self.nozzles[index].price_per_liter = value as u32;
        debug!(
            pump_id = self.pump_id,
            nozzle_id,
            price = value,
            "price updated"
        );
    }

    /// Apply all prices from an inbound price list, one per nozzle in order
    pub fn apply_prices(&mut self, prices: &[u32]) {
        for (nozzle, price) in self.nozzles.iter_mut().zip(prices) {
            nozzle.price_per_liter = *price;
        }
    }

    /// Record lifetime totals for one nozzle; out-of-range ids are ignored
    pub fn apply_totals(&mut self, nozzle_id: u8, amount: u64, volume: u64) {
        if let Some(index) = self.index_of(nozzle_id) {
            self.nozzles[index].total_dispensed_amount = amount;
            self.nozzles[index].total_dispensed_volume = volume;
        }
    }

    /// Record an ID tag read for one nozzle; out-of-range ids are ignored
    pub fn apply_tag(&mut self, nozzle_id: u8, code: String) {
        if let Some(index) = self.index_of(nozzle_id) {
            self.nozzles[index].tag_code = Some(code);
        }
    }

    fn index_of(&self, nozzle_id: u8) -> Option<usize> {
        if nozzle_id == 0 || nozzle_id as usize > self.nozzles.len() {
            None
        } else {
            Some(nozzle_id as usize - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> (NozzleBank, tokio::sync::mpsc::UnboundedReceiver<ValidationError>) {
        let (sink, rx) = ErrorSink::channel();
        (NozzleBank::new(1, 6, sink), rx)
    }

    #[test]
    fn test_bank_is_one_indexed() {
        let (bank, _rx) = bank();
        assert_eq!(bank.len(), 6);
        assert!(bank.get(0).is_none());
        assert_eq!(bank.get(1).unwrap().id, 1);
        assert_eq!(bank.get(6).unwrap().id, 6);
        assert!(bank.get(7).is_none());
    }

    #[test]
    fn test_set_price() {
        let (mut bank, mut rx) = bank();
        bank.set_price_per_liter(2, 1500);
        assert_eq!(bank.price_of(2), 1500);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_negative_price_rejected_and_reported() {
        let (mut bank, mut rx) = bank();
        bank.set_price_per_liter(3, 1200);
        bank.set_price_per_liter(3, -5);

        assert_eq!(bank.price_of(3), 1200);
        let err = rx.try_recv().unwrap();
        assert_eq!(err.field, ValidatedField::PricePerLiter);
        assert_eq!(err.nozzle_id, Some(3));
        assert_eq!(err.rejected, -5);
    }

    #[test]
    fn test_price_list_order() {
        let (mut bank, _rx) = bank();
        bank.set_price_per_liter(1, 100);
        bank.set_price_per_liter(2, 200);
        assert_eq!(bank.price_list(), vec![100, 200, 0, 0, 0, 0]);
    }

    #[test]
    fn test_apply_prices_ignores_extra_entries() {
        let (sink, _rx) = ErrorSink::channel();
        let mut bank = NozzleBank::new(1, 2, sink);
        bank.apply_prices(&[111, 222, 333]);
        assert_eq!(bank.price_list(), vec![111, 222]);
    }

    #[test]
    fn test_totals_and_tag() {
        let (mut bank, _rx) = bank();
        bank.apply_totals(1, 5_000_000, 320_000);
        bank.apply_tag(1, "C4F1".to_string());
        // out of range, silently ignored
        bank.apply_totals(9, 1, 1);

        let nozzle = bank.get(1).unwrap();
        assert_eq!(nozzle.total_dispensed_amount, 5_000_000);
        assert_eq!(nozzle.total_dispensed_volume, 320_000);
        assert_eq!(nozzle.tag_code.as_deref(), Some("C4F1"));
    }
}
