//! Shared fixtures for unit tests

use crate::{
    reference::InMemoryReferenceData,
    storage::Storage,
    types::{QuotaCategory, QuotaTreatment},
    Config,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;
use tempfile::TempDir;

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub(crate) fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub(crate) fn test_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        data_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    (config, temp_dir)
}

/// The `TempDir` must outlive the storage
pub(crate) fn test_storage() -> (Storage, TempDir) {
    let (config, temp_dir) = test_config();
    let storage = Storage::open(&config).unwrap();
    (storage, temp_dir)
}

/// Vessels B01/B02 (longline), products P1/P2 priced for longline, P3 without
/// price, P4 without factor, species E1, zones Z1/Z2, movements for every
/// treatment, bait CAL.
pub(crate) fn reference() -> InMemoryReferenceData {
    InMemoryReferenceData::new()
        .with_vessel("B01", "LL")
        .with_vessel("B02", "LL")
        .with_conversion_factor("P1", dec("1.5"))
        .with_conversion_factor("P2", dec("2"))
        .with_conversion_factor("P3", dec("1"))
        .with_product("P4")
        .with_price("P1", "LL", dec("4"))
        .with_price("P2", "LL", dec("10"))
        .with_price("P4", "LL", dec("3"))
        .with_species("E1")
        .with_zone("Z1")
        .with_zone("Z2")
        .with_movement("AUM1", QuotaTreatment::Increase, QuotaCategory::Unique)
        .with_movement("COMP", QuotaTreatment::Increase, QuotaCategory::Repeatable)
        .with_movement("CES", QuotaTreatment::Decrease, QuotaCategory::Repeatable)
        .with_movement("CZ", QuotaTreatment::ZoneChange, QuotaCategory::Repeatable)
        .with_bait("CAL", dec("6"))
}
