//! Deterministic composite identifiers
//!
//! Every stored entity is addressed by a string id derived from its typed
//! components. The formats are fixed: downstream systems parse them.

use chrono::{Datelike, NaiveDate};

/// Version and haul written on discharge and final-certification records
pub const SENTINEL: u32 = 99;

fn compact_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// `M-{vessel}-{year}{number:00}`
pub fn trip_id(vessel_id: &str, start_date: NaiveDate, trip_number: u32) -> String {
    format!("M-{}-{}{:02}", vessel_id, start_date.year(), trip_number)
}

/// `{movement}-{species}-{zone}-{year}-{sequence:000}`
pub fn quota_control_id(
    movement_id: &str,
    species_id: &str,
    zone_id: &str,
    year: i32,
    sequence: u32,
) -> String {
    format!(
        "{}-{}-{}-{}-{:03}",
        movement_id, species_id, zone_id, year, sequence
    )
}

/// `PR-{operation}-{product}-{haul:00}-V{version:00}`
pub fn production_id(operation_id: &str, product_id: &str, haul: u32, version: u32) -> String {
    format!(
        "PR-{}-{}-{:02}-V{:02}",
        operation_id, product_id, haul, version
    )
}

/// `OP-{vessel}-{yyyyMMdd}-V{version:00}`
pub fn operation_id(vessel_id: &str, date: NaiveDate, version: u32) -> String {
    format!("OP-{}-{}-V{:02}", vessel_id, compact_date(date), version)
}

/// Operation id used by records not tied to a reported day
pub fn sentinel_operation_id(vessel_id: &str, date: NaiveDate) -> String {
    operation_id(vessel_id, date, SENTINEL)
}

/// `DC-OP-{vessel}-{yyyyMMdd}-V99-{product}-99-V99`
pub fn discharge_id(vessel_id: &str, date: NaiveDate, product_id: &str) -> String {
    format!(
        "DC-{}-{}-{:02}-V{:02}",
        sentinel_operation_id(vessel_id, date),
        product_id,
        SENTINEL,
        SENTINEL
    )
}

/// `CF-{vessel}-{yyyyMMdd}-V99-{product}-99-V99`
pub fn final_certification_id(vessel_id: &str, date: NaiveDate, product_id: &str) -> String {
    format!(
        "CF-{}-{}-V{:02}-{}-{:02}-V{:02}",
        vessel_id,
        compact_date(date),
        SENTINEL,
        product_id,
        SENTINEL,
        SENTINEL
    )
}
