//! Daily operation reports
//!
//! One report per vessel and day, versioned like production records: the
//! `operation_head` index points at the active version of (vessel, date).

use crate::{
    amount,
    error::{ensure_present, Error, Result},
    ids, marea,
    reference::ReferenceData,
    storage::{keys, Txn},
    types::{DailyOperation, HourBreakdown, RecordStatus, VersionHead},
};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Operativity of a fishing day
pub const FISHING_DAY: &str = "OP";

const HOURS_PER_DAY: i64 = 24;

/// Daily report as submitted by the vessel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationReport {
    /// Vessel id
    pub vessel_id: String,
    /// Report date
    pub date: NaiveDate,
    /// Trip id
    pub trip_id: String,
    /// Operativity classification
    pub operativity_id: String,
    /// Nautical miles sailed
    pub nautical_miles: Decimal,
    /// Wind force (Beaufort)
    pub wind_force: u32,
    /// Noon latitude
    pub latitude: Decimal,
    /// Noon longitude
    pub longitude: Decimal,
    /// Hauls performed
    pub hauls: u32,
    /// Fuel consumption
    pub fuel_consumption: Decimal,
    /// Bait id
    pub bait_id: Option<String>,
    /// Bait consumption (kg)
    pub bait_consumption: Decimal,
    /// Hooks set
    pub hooks: u32,
    /// Hours per category
    pub hours: HourBreakdown,
}

/// Insert version 0 of a day's report
pub fn register(
    txn: &mut Txn<'_>,
    reference: &dyn ReferenceData,
    report: &OperationReport,
) -> Result<DailyOperation> {
    let derived = validate(txn, reference, report)?;

    let operation = build(report, 0, derived);
    let detail = format!(
        "Registered operation {} for trip {}",
        operation.operation_id, operation.trip_id
    );
    txn.insert(&operation, detail)?;
    txn.index_put(
        keys::operation_head(&report.vessel_id, report.date),
        &VersionHead {
            latest_version: 0,
            active_id: Some(operation.operation_id.clone()),
        },
    )?;

    Ok(operation)
}

/// Supersede the active report of the day and insert its successor
pub fn modify(
    txn: &mut Txn<'_>,
    reference: &dyn ReferenceData,
    report: &OperationReport,
) -> Result<DailyOperation> {
    let derived = validate(txn, reference, report)?;

    let head_key = keys::operation_head(&report.vessel_id, report.date);
    let head: VersionHead = txn.index_get(&head_key)?.ok_or_else(|| {
        Error::not_found(format!(
            "operation of vessel {} on {}",
            report.vessel_id, report.date
        ))
    })?;
    let active_id = head.active_id.ok_or_else(|| {
        Error::not_found(format!(
            "active operation of vessel {} on {}",
            report.vessel_id, report.date
        ))
    })?;

    let mut current: DailyOperation = txn.require(&active_id)?;
    current.status = RecordStatus::Superseded;
    let detail = format!("Superseded operation {}", current.operation_id);
    txn.update(&current, detail)?;

    let version = head.latest_version + 1;
    let operation = build(report, version, derived);
    let detail = format!(
        "Modified operation {} -> {}",
        current.operation_id, operation.operation_id
    );
    txn.insert(&operation, detail)?;
    txn.index_put(
        head_key,
        &VersionHead {
            latest_version: version,
            active_id: Some(operation.operation_id.clone()),
        },
    )?;

    Ok(operation)
}

/// Active report of a vessel for a day
pub fn active(txn: &Txn<'_>, vessel_id: &str, date: NaiveDate) -> Result<Option<DailyOperation>> {
    let head: Option<VersionHead> = txn.index_get(&keys::operation_head(vessel_id, date))?;
    match head.and_then(|head| head.active_id) {
        Some(id) => txn.get(&id),
        None => Ok(None),
    }
}

/// Fields computed from a validated report
#[derive(Debug, Clone, Copy)]
struct Derived {
    bait_pieces: u64,
    total_hours: Decimal,
}

/// Validate a report and derive its bait pieces and hour total
fn validate(
    txn: &Txn<'_>,
    reference: &dyn ReferenceData,
    report: &OperationReport,
) -> Result<Derived> {
    ensure_present("vessel_id", &report.vessel_id)?;
    ensure_present("trip_id", &report.trip_id)?;
    ensure_present("operativity_id", &report.operativity_id)?;

    let trip = marea::require_in_progress(txn, &report.trip_id, &report.vessel_id)?;
    if report.date < trip.start_date {
        return Err(Error::validation(format!(
            "Operation date {} is before trip start {}",
            report.date, trip.start_date
        )));
    }

    if report.operativity_id == FISHING_DAY {
        if report.hauls == 0 {
            return Err(Error::validation("a fishing day must report at least one haul"));
        }
    } else if report.hauls > 0 {
        return Err(Error::validation(format!(
            "operativity {} does not allow hauls",
            report.operativity_id
        )));
    }

    let total_hours = validate_hours(&report.hours)?;
    Ok(Derived {
        bait_pieces: bait_pieces(reference, report)?,
        total_hours,
    })
}

fn validate_hours(hours: &HourBreakdown) -> Result<Decimal> {
    let categories = [
        hours.fishing,
        hours.transit,
        hours.hove_to,
        hours.breakdown,
        hours.accident,
        hours.crew,
    ];
    if categories.iter().any(|h| *h < Decimal::ZERO) {
        return Err(Error::validation("hours must not be negative"));
    }

    let total = hours.total()?;
    if total != Decimal::from(HOURS_PER_DAY) {
        return Err(Error::validation(format!(
            "hours must total {}, got {}",
            HOURS_PER_DAY, total
        )));
    }
    Ok(total)
}

fn bait_pieces(reference: &dyn ReferenceData, report: &OperationReport) -> Result<u64> {
    if report.bait_consumption < Decimal::ZERO {
        return Err(Error::validation("bait consumption must not be negative"));
    }

    let bait_id = match report.bait_id.as_deref() {
        Some(bait_id) => bait_id,
        None if report.bait_consumption.is_zero() => return Ok(0),
        None => return Err(Error::validation("bait consumption requires a bait")),
    };

    let pieces_per_kg = reference
        .bait_pieces_per_kg(bait_id)
        .ok_or_else(|| Error::not_found(format!("bait {}", bait_id)))?;

    amount::mul(report.bait_consumption, pieces_per_kg, "bait pieces")?
        .trunc()
        .to_u64()
        .ok_or_else(|| Error::validation("bait pieces out of range"))
}

fn build(report: &OperationReport, version: u32, derived: Derived) -> DailyOperation {
    DailyOperation {
        operation_id: ids::operation_id(&report.vessel_id, report.date, version),
        version,
        vessel_id: report.vessel_id.clone(),
        date: report.date,
        trip_id: report.trip_id.clone(),
        operativity_id: report.operativity_id.clone(),
        nautical_miles: report.nautical_miles,
        wind_force: report.wind_force,
        latitude: report.latitude,
        longitude: report.longitude,
        hauls: report.hauls,
        fuel_consumption: report.fuel_consumption,
        bait_id: report.bait_id.clone(),
        bait_consumption: report.bait_consumption,
        bait_pieces: derived.bait_pieces,
        hooks: report.hooks,
        total_hours: derived.total_hours,
        hours: report.hours.clone(),
        synchronized: false,
        status: RecordStatus::Active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marea::NewTrip;
    use crate::testing::{date, dec, reference, test_storage};
    use crate::ErrorKind;

    const TRIP: &str = "M-B01-202401";

    fn open_trip(txn: &mut Txn<'_>, reference: &dyn ReferenceData) {
        let request = NewTrip {
            vessel_id: "B01".to_string(),
            objective_id: "OBJ1".to_string(),
            zone_id: "Z1".to_string(),
            trip_number: 1,
            start_date: date(2024, 3, 1),
        };
        marea::create(txn, reference, &request).unwrap();
        marea::activate(txn, TRIP).unwrap();
    }

    fn report() -> OperationReport {
        OperationReport {
            vessel_id: "B01".to_string(),
            date: date(2024, 3, 5),
            trip_id: TRIP.to_string(),
            operativity_id: FISHING_DAY.to_string(),
            nautical_miles: dec("42.5"),
            wind_force: 4,
            latitude: dec("-38.25"),
            longitude: dec("-74.10"),
            hauls: 2,
            fuel_consumption: dec("850"),
            bait_id: Some("CAL".to_string()),
            bait_consumption: dec("120.4"),
            hooks: 3000,
            hours: HourBreakdown {
                fishing: dec("16"),
                transit: dec("6"),
                hove_to: dec("2"),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_register_operation() {
        let (storage, _temp) = test_storage();
        let reference = reference();

        let mut txn = storage.begin();
        open_trip(&mut txn, &reference);
        let operation = register(&mut txn, &reference, &report()).unwrap();
        txn.commit().unwrap();

        assert_eq!(operation.operation_id, "OP-B01-20240305-V00");
        assert_eq!(operation.total_hours, dec("24"));
        // 120.4 kg x 6 pieces/kg = 722.4
        assert_eq!(operation.bait_pieces, 722);

        let txn = storage.begin();
        let stored = active(&txn, "B01", date(2024, 3, 5)).unwrap().unwrap();
        assert_eq!(stored, operation);
    }

    #[test]
    fn test_register_twice_conflicts() {
        let (storage, _temp) = test_storage();
        let reference = reference();

        let mut txn = storage.begin();
        open_trip(&mut txn, &reference);
        register(&mut txn, &reference, &report()).unwrap();
        let err = register(&mut txn, &reference, &report()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_operativity_and_hauls() {
        let (storage, _temp) = test_storage();
        let reference = reference();
        let mut txn = storage.begin();
        open_trip(&mut txn, &reference);

        let mut no_hauls = report();
        no_hauls.hauls = 0;
        assert_eq!(
            register(&mut txn, &reference, &no_hauls).unwrap_err().kind(),
            ErrorKind::Validation
        );

        let mut port_day = report();
        port_day.operativity_id = "PU".to_string();
        assert_eq!(
            register(&mut txn, &reference, &port_day).unwrap_err().kind(),
            ErrorKind::Validation
        );

        port_day.hauls = 0;
        register(&mut txn, &reference, &port_day).unwrap();
    }

    #[test]
    fn test_hours_must_total_day() {
        let (storage, _temp) = test_storage();
        let reference = reference();
        let mut txn = storage.begin();
        open_trip(&mut txn, &reference);

        let mut short_day = report();
        short_day.hours.hove_to = dec("1");
        let err = register(&mut txn, &reference, &short_day).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut overflowing = report();
        overflowing.hours.transit = Decimal::MAX;
        overflowing.hours.crew = Decimal::MAX;
        let err = register(&mut txn, &reference, &overflowing).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        register(&mut txn, &reference, &report()).unwrap();
    }

    #[test]
    fn test_bait_rules() {
        let (storage, _temp) = test_storage();
        let reference = reference();
        let mut txn = storage.begin();
        open_trip(&mut txn, &reference);

        let mut unknown = report();
        unknown.bait_id = Some("XX".to_string());
        assert_eq!(
            register(&mut txn, &reference, &unknown).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let mut no_bait = report();
        no_bait.bait_id = None;
        assert_eq!(
            register(&mut txn, &reference, &no_bait).unwrap_err().kind(),
            ErrorKind::Validation
        );

        let mut oversized = report();
        oversized.bait_consumption = Decimal::MAX;
        assert_eq!(
            register(&mut txn, &reference, &oversized).unwrap_err().kind(),
            ErrorKind::Validation
        );

        no_bait.bait_consumption = Decimal::ZERO;
        let operation = register(&mut txn, &reference, &no_bait).unwrap();
        assert_eq!(operation.bait_pieces, 0);
    }

    #[test]
    fn test_modify_operation() {
        let (storage, _temp) = test_storage();
        let reference = reference();

        let mut txn = storage.begin();
        open_trip(&mut txn, &reference);
        register(&mut txn, &reference, &report()).unwrap();
        txn.commit().unwrap();

        let mut changed = report();
        changed.hauls = 3;
        let mut txn = storage.begin();
        let operation = modify(&mut txn, &reference, &changed).unwrap();
        txn.commit().unwrap();
        assert_eq!(operation.operation_id, "OP-B01-20240305-V01");
        assert_eq!(operation.version, 1);

        let txn = storage.begin();
        let first: DailyOperation = txn.require("OP-B01-20240305-V00").unwrap();
        assert_eq!(first.status, RecordStatus::Superseded);
        let current = active(&txn, "B01", date(2024, 3, 5)).unwrap().unwrap();
        assert_eq!(current.hauls, 3);
    }

    #[test]
    fn test_modify_missing_day() {
        let (storage, _temp) = test_storage();
        let reference = reference();
        let mut txn = storage.begin();
        open_trip(&mut txn, &reference);

        let err = modify(&mut txn, &reference, &report()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
