//! Port certification of a trip's production
//!
//! Outstanding lines are the `Reported`, `Active`, not yet certified records
//! of a trip. A preview spreads a certified total across them by share of
//! kilos; a discharge writes one record per product netting its
//! outstanding kilos to zero; a final
//! certification records the certified weight of a product; closing the
//! trip marks everything certified.

use crate::{
    amount,
    error::{ensure_present, Error, Result},
    ids, marea,
    production,
    reference::ReferenceData,
    storage::{keys, Txn},
    types::{Certification, ProductionRecord, RecordKind, RecordStatus, Trip, TripState},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Share of one outstanding line in a certification preview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewLine {
    /// Production record id
    pub production_id: String,
    /// Product id
    pub product_id: String,
    /// Haul number
    pub haul: u32,
    /// Reported kilos
    pub kilos: Decimal,
    /// kilos / total reported kilos
    pub percentage: Decimal,
    /// percentage x certified total
    pub certified_kilos: Decimal,
}

/// Read-only projection of a certified total over a trip's outstanding lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationPreview {
    /// Trip id
    pub trip_id: String,
    /// Sum of outstanding reported kilos
    pub total_kilos: Decimal,
    /// Port-certified total
    pub total_certified_kilos: Decimal,
    /// certified total - reported total
    pub adjustment: Decimal,
    /// One entry per outstanding line
    pub lines: Vec<PreviewLine>,
}

/// Discharge of a trip at port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discharge {
    /// Trip id
    pub trip_id: String,
    /// Certification date
    pub certification_date: NaiveDate,
    /// Certification number
    pub certification_number: String,
}

/// Port-certified weight of one product of a trip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalCertification {
    /// Trip id
    pub trip_id: String,
    /// Product id
    pub product_id: String,
    /// Certification date
    pub certification_date: NaiveDate,
    /// Certification number
    pub certification_number: String,
    /// Certified kilos
    pub kilos: Decimal,
    /// Certified boxes
    pub boxes: i64,
}

/// Spread `total_certified_kilos` over the outstanding lines
pub fn preview(
    txn: &Txn<'_>,
    trip_id: &str,
    total_certified_kilos: Decimal,
) -> Result<CertificationPreview> {
    if total_certified_kilos < Decimal::ZERO {
        return Err(Error::validation("certified kilos must not be negative"));
    }
    let trip = require_discharging(txn, trip_id, "previewed")?;
    let lines = outstanding_lines(txn, &trip)?;

    let total_kilos = amount::sum(lines.iter().map(|record| record.kilos), "total kilos")?;
    let lines = lines
        .into_iter()
        .map(|record| {
            let percentage = amount::ratio(record.kilos, total_kilos, "percentage")?;
            let certified_kilos =
                amount::mul(percentage, total_certified_kilos, "certified kilos")?;
            Ok(PreviewLine {
                production_id: record.production_id,
                product_id: record.product_id,
                haul: record.haul,
                kilos: record.kilos,
                percentage,
                certified_kilos,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CertificationPreview {
        trip_id: trip.trip_id,
        total_kilos,
        total_certified_kilos,
        adjustment: amount::sub(total_certified_kilos, total_kilos, "adjustment")?,
        lines,
    })
}

/// Write one record per product negating its outstanding net
///
/// The net of a product counts its outstanding reported lines and any
/// earlier discharge. A product already discharged to zero is skipped, and
/// a discharge with nothing left to negate is rejected.
pub fn discharge(txn: &mut Txn<'_>, request: &Discharge) -> Result<Vec<String>> {
    ensure_present("certification_number", &request.certification_number)?;
    let trip = require_discharging(txn, &request.trip_id, "discharged")?;
    let lines = outstanding_lines(txn, &trip)?;

    let mut groups: BTreeMap<String, Totals> = BTreeMap::new();
    for record in &lines {
        groups
            .entry(record.product_id.clone())
            .or_default()
            .add(record)?;
    }
    for record in production::trip_records(txn, &trip.trip_id)? {
        if record.kind == RecordKind::Discharge && record.is_outstanding() {
            let totals = groups.entry(record.product_id.clone()).or_default();
            totals.add(&record)?;
            totals.discharged = true;
        }
    }
    groups.retain(|_, totals| !(totals.discharged && totals.kilos.is_zero()));

    if groups.is_empty() {
        return Err(Error::validation(format!(
            "Trip {} has no production left to discharge",
            trip.trip_id
        )));
    }

    let operation_id = ids::sentinel_operation_id(&trip.vessel_id, request.certification_date);
    let mut written = Vec::with_capacity(groups.len());

    for (product_id, totals) in groups {
        let production_id =
            ids::discharge_id(&trip.vessel_id, request.certification_date, &product_id);

        let record = ProductionRecord {
            production_id: production_id.clone(),
            kind: RecordKind::Discharge,
            version: ids::SENTINEL,
            operation_id: operation_id.clone(),
            date: request.certification_date,
            vessel_id: trip.vessel_id.clone(),
            trip_id: trip.trip_id.clone(),
            product_id,
            haul: ids::SENTINEL,
            kilos: -totals.kilos,
            boxes: -totals.boxes,
            average_weight: amount::ratio(
                totals.kilos,
                Decimal::from(totals.boxes),
                "average weight",
            )?,
            biomass: -totals.biomass,
            unit_price: amount::ratio(totals.value, totals.kilos, "unit price")?,
            total_value: -totals.value,
            unit_bio_value: amount::ratio(totals.value, totals.biomass, "unit biomass value")?,
            synchronized: false,
            certification: Certification::Pending,
            status: RecordStatus::Active,
            certification_date: Some(request.certification_date),
            certification_number: Some(request.certification_number.clone()),
            production_share: Some(Decimal::ONE),
            certified_kilos: Some(-totals.kilos),
        };

        let detail = format!(
            "Discharge {} for trip {} ({} kg)",
            production_id, trip.trip_id, record.kilos
        );
        txn.insert(&record, detail)?;
        txn.index_put(keys::trip_production(&trip.trip_id, &production_id), &production_id)?;

        written.push(production_id);
    }

    tracing::debug!(
        trip_id = %trip.trip_id,
        products = written.len(),
        lines = lines.len(),
        "Discharge staged"
    );

    Ok(written)
}

/// Record the certified weight of one product
pub fn certify_final(
    txn: &mut Txn<'_>,
    reference: &dyn ReferenceData,
    request: &FinalCertification,
) -> Result<String> {
    ensure_present("certification_number", &request.certification_number)?;
    if request.kilos < Decimal::ZERO || request.boxes < 0 {
        return Err(Error::validation("kilos and boxes must not be negative"));
    }
    let trip = require_discharging(txn, &request.trip_id, "certified")?;

    let valuation = production::valuate(
        reference,
        &trip.vessel_id,
        &request.product_id,
        request.kilos,
        request.boxes,
    )?;

    let production_id = ids::final_certification_id(
        &trip.vessel_id,
        request.certification_date,
        &request.product_id,
    );

    let record = ProductionRecord {
        production_id: production_id.clone(),
        kind: RecordKind::FinalCertification,
        version: ids::SENTINEL,
        operation_id: ids::sentinel_operation_id(&trip.vessel_id, request.certification_date),
        date: request.certification_date,
        vessel_id: trip.vessel_id.clone(),
        trip_id: trip.trip_id.clone(),
        product_id: request.product_id.clone(),
        haul: ids::SENTINEL,
        kilos: request.kilos,
        boxes: request.boxes,
        average_weight: valuation.average_weight,
        biomass: valuation.biomass,
        unit_price: valuation.unit_price,
        total_value: valuation.total_value,
        unit_bio_value: valuation.unit_bio_value,
        synchronized: false,
        certification: Certification::Pending,
        status: RecordStatus::Active,
        certification_date: Some(request.certification_date),
        certification_number: Some(request.certification_number.clone()),
        production_share: Some(Decimal::ONE),
        certified_kilos: Some(request.kilos),
    };

    let detail = format!(
        "Final certification {} for trip {} ({} kg)",
        production_id, trip.trip_id, request.kilos
    );
    txn.insert(&record, detail)?;
    txn.index_put(keys::trip_production(&trip.trip_id, &production_id), &production_id)?;

    Ok(production_id)
}

/// Mark every record of the trip certified and move the trip to `Certified`
pub fn close_trip(txn: &mut Txn<'_>, trip_id: &str) -> Result<Trip> {
    let trip = require_discharging(txn, trip_id, "closed")?;

    let records = production::trip_records(txn, &trip.trip_id)?;
    if !records.iter().any(ProductionRecord::is_outstanding) {
        return Err(Error::validation(format!(
            "Trip {} has no outstanding production to certify",
            trip.trip_id
        )));
    }

    let mut certified = 0usize;
    for mut record in records {
        if record.certification == Certification::Certified {
            continue;
        }
        record.certification = Certification::Certified;
        let detail = format!("Certified production {}", record.production_id);
        txn.update(&record, detail)?;
        certified += 1;
    }

    tracing::debug!(trip_id = %trip.trip_id, certified, "Trip close-out staged");

    marea::certify(txn, trip)
}

fn require_discharging(txn: &Txn<'_>, trip_id: &str, action: &str) -> Result<Trip> {
    ensure_present("trip_id", trip_id)?;
    let trip: Trip = txn.require(trip_id)?;
    marea::require_state(&trip, TripState::InDischarge, action)?;
    Ok(trip)
}

fn outstanding_lines(txn: &Txn<'_>, trip: &Trip) -> Result<Vec<ProductionRecord>> {
    let lines: Vec<ProductionRecord> = production::trip_records(txn, &trip.trip_id)?
        .into_iter()
        .filter(|record| record.kind == RecordKind::Reported && record.is_outstanding())
        .collect();

    if lines.is_empty() {
        return Err(Error::validation(format!(
            "Trip {} has no outstanding production",
            trip.trip_id
        )));
    }
    Ok(lines)
}

#[derive(Debug, Default)]
struct Totals {
    kilos: Decimal,
    boxes: i64,
    biomass: Decimal,
    value: Decimal,
    discharged: bool,
}

impl Totals {
    fn add(&mut self, record: &ProductionRecord) -> Result<()> {
        self.kilos = amount::add(self.kilos, record.kilos, "discharged kilos")?;
        self.boxes = amount::add_boxes(self.boxes, record.boxes, "discharged boxes")?;
        self.biomass = amount::add(self.biomass, record.biomass, "discharged biomass")?;
        self.value = amount::add(self.value, record.total_value, "discharged value")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marea::NewTrip;
    use crate::production::{ProductionBatch, ProductionLine};
    use crate::reference::InMemoryReferenceData;
    use crate::storage::Storage;
    use crate::testing::{date, dec, reference, test_storage};
    use crate::ErrorKind;

    const TRIP: &str = "M-B01-202401";

    fn line(product: &str, haul: u32, kilos: &str, boxes: i64) -> ProductionLine {
        ProductionLine {
            product_id: product.to_string(),
            haul,
            kilos: dec(kilos),
            boxes,
        }
    }

    /// Trip in discharge with the given lines reported on one operation
    fn discharging_trip(
        storage: &Storage,
        reference: &InMemoryReferenceData,
        lines: Vec<ProductionLine>,
    ) {
        let mut txn = storage.begin();
        let request = NewTrip {
            vessel_id: "B01".to_string(),
            objective_id: "OBJ1".to_string(),
            zone_id: "Z1".to_string(),
            trip_number: 1,
            start_date: date(2024, 3, 1),
        };
        marea::create(&mut txn, reference, &request).unwrap();
        marea::activate(&mut txn, TRIP).unwrap();
        production::register(
            &mut txn,
            reference,
            &ProductionBatch {
                operation_id: "OP-B01-20240305-V00".to_string(),
                vessel_id: "B01".to_string(),
                trip_id: TRIP.to_string(),
                date: date(2024, 3, 5),
                lines,
            },
        )
        .unwrap();
        marea::finalize(&mut txn, TRIP, date(2024, 3, 20), date(2024, 4, 1)).unwrap();
        txn.commit().unwrap();
    }

    fn discharge_request() -> Discharge {
        Discharge {
            trip_id: TRIP.to_string(),
            certification_date: date(2024, 3, 22),
            certification_number: "CERT-77".to_string(),
        }
    }

    #[test]
    fn test_preview_single_line() {
        let (storage, _temp) = test_storage();
        let reference = reference();
        discharging_trip(&storage, &reference, vec![line("P1", 1, "1000", 10)]);

        let txn = storage.begin();
        let preview = preview(&txn, TRIP, dec("950")).unwrap();

        assert_eq!(preview.total_kilos, dec("1000"));
        assert_eq!(preview.adjustment, dec("-50"));
        assert_eq!(preview.lines.len(), 1);
        assert_eq!(preview.lines[0].percentage, Decimal::ONE);
        assert_eq!(preview.lines[0].certified_kilos, dec("950"));
    }

    #[test]
    fn test_preview_spreads_by_share() {
        let (storage, _temp) = test_storage();
        let reference = reference();
        discharging_trip(
            &storage,
            &reference,
            vec![line("P1", 1, "300", 3), line("P1", 2, "100", 1), line("P2", 1, "600", 6)],
        );

        let txn = storage.begin();
        let preview = preview(&txn, TRIP, dec("1100")).unwrap();

        let shares: Vec<Decimal> = preview.lines.iter().map(|l| l.percentage).collect();
        assert!(shares.contains(&dec("0.3")));
        assert!(shares.contains(&dec("0.1")));
        assert!(shares.contains(&dec("0.6")));
        let certified: Decimal = preview.lines.iter().map(|l| l.certified_kilos).sum();
        assert_eq!(certified, dec("1100"));
        assert_eq!(preview.adjustment, dec("100"));
    }

    #[test]
    fn test_preview_zero_total_kilos() {
        let (storage, _temp) = test_storage();
        let reference = reference();
        discharging_trip(&storage, &reference, vec![line("P1", 1, "0", 0)]);

        let txn = storage.begin();
        let preview = preview(&txn, TRIP, dec("10")).unwrap();
        assert_eq!(preview.lines[0].percentage, Decimal::ZERO);
        assert_eq!(preview.lines[0].certified_kilos, Decimal::ZERO);
        assert_eq!(preview.adjustment, dec("10"));
    }

    #[test]
    fn test_preview_requires_discharge_state() {
        let (storage, _temp) = test_storage();
        let reference = reference();

        let mut txn = storage.begin();
        let request = NewTrip {
            vessel_id: "B01".to_string(),
            objective_id: "OBJ1".to_string(),
            zone_id: "Z1".to_string(),
            trip_number: 1,
            start_date: date(2024, 3, 1),
        };
        marea::create(&mut txn, &reference, &request).unwrap();
        marea::activate(&mut txn, TRIP).unwrap();

        let err = preview(&txn, TRIP, dec("10")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        // In discharge but nothing reported
        marea::finalize(&mut txn, TRIP, date(2024, 3, 20), date(2024, 4, 1)).unwrap();
        let err = preview(&txn, TRIP, dec("10")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_discharge_zeroes_outstanding() {
        let (storage, _temp) = test_storage();
        let reference = reference();
        discharging_trip(
            &storage,
            &reference,
            vec![line("P1", 1, "300", 3), line("P1", 2, "100", 1), line("P2", 1, "50", 2)],
        );

        let mut txn = storage.begin();
        let ids = discharge(&mut txn, &discharge_request()).unwrap();
        txn.commit().unwrap();

        assert_eq!(
            ids,
            vec![
                "DC-OP-B01-20240322-V99-P1-99-V99".to_string(),
                "DC-OP-B01-20240322-V99-P2-99-V99".to_string(),
            ]
        );

        let txn = storage.begin();
        let p1: ProductionRecord = txn.require(&ids[0]).unwrap();
        assert_eq!(p1.kind, RecordKind::Discharge);
        assert_eq!(p1.kilos, dec("-400"));
        assert_eq!(p1.boxes, -4);
        assert_eq!(p1.biomass, dec("-600"));
        assert_eq!(p1.total_value, dec("-1600"));
        assert_eq!(p1.unit_price, dec("4"));
        assert_eq!(p1.version, 99);
        assert_eq!(p1.haul, 99);
        assert_eq!(p1.operation_id, "OP-B01-20240322-V99");
        assert_eq!(p1.certification_number.as_deref(), Some("CERT-77"));
        assert_eq!(p1.production_share, Some(Decimal::ONE));
        assert_eq!(p1.certified_kilos, Some(dec("-400")));

        let p2: ProductionRecord = txn.require(&ids[1]).unwrap();
        assert_eq!(p2.certified_kilos, Some(dec("-50")));

        let outstanding = production::outstanding_by_product(&txn, TRIP).unwrap();
        assert!(outstanding.values().all(|kilos| kilos.is_zero()));
    }

    #[test]
    fn test_discharge_twice_rejected() {
        let (storage, _temp) = test_storage();
        let reference = reference();
        discharging_trip(&storage, &reference, vec![line("P1", 1, "300", 3)]);

        let mut txn = storage.begin();
        discharge(&mut txn, &discharge_request()).unwrap();
        txn.commit().unwrap();

        let mut txn = storage.begin();
        let err = discharge(&mut txn, &discharge_request()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_discharge_on_later_date_does_not_repeat() {
        let (storage, _temp) = test_storage();
        let reference = reference();
        discharging_trip(
            &storage,
            &reference,
            vec![line("P1", 1, "300", 3), line("P1", 2, "100", 1)],
        );

        let mut txn = storage.begin();
        discharge(&mut txn, &discharge_request()).unwrap();
        txn.commit().unwrap();

        let later = Discharge {
            certification_date: date(2024, 3, 23),
            certification_number: "CERT-78".to_string(),
            ..discharge_request()
        };
        let mut txn = storage.begin();
        let err = discharge(&mut txn, &later).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        drop(txn);

        let txn = storage.begin();
        let outstanding = production::outstanding_by_product(&txn, TRIP).unwrap();
        assert_eq!(outstanding["P1"], Decimal::ZERO);
        assert_eq!(production::trip_records(&txn, TRIP).unwrap().len(), 3);
    }

    #[test]
    fn test_discharge_skips_products_already_netted() {
        let (storage, _temp) = test_storage();
        let reference = reference();
        discharging_trip(&storage, &reference, vec![line("P1", 1, "0", 0)]);

        // Zero kilos still get a discharge the first time
        let mut txn = storage.begin();
        let ids = discharge(&mut txn, &discharge_request()).unwrap();
        assert_eq!(ids.len(), 1);
        txn.commit().unwrap();

        let mut txn = storage.begin();
        let err = discharge(&mut txn, &discharge_request()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_oversized_totals_rejected() {
        let (storage, _temp) = test_storage();
        let reference = reference();
        // factor 1 and price 1 keep each line in range on its own
        reference.set_price("P3", "LL", Decimal::ONE);
        let huge = |haul| ProductionLine {
            product_id: "P3".to_string(),
            haul,
            kilos: Decimal::MAX,
            boxes: 1,
        };
        discharging_trip(&storage, &reference, vec![huge(1), huge(2)]);

        let txn = storage.begin();
        let err = preview(&txn, TRIP, dec("10")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        drop(txn);

        let mut txn = storage.begin();
        let err = discharge(&mut txn, &discharge_request()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        drop(txn);

        let txn = storage.begin();
        assert_eq!(production::trip_records(&txn, TRIP).unwrap().len(), 2);
    }

    #[test]
    fn test_certify_final() {
        let (storage, _temp) = test_storage();
        let reference = reference();
        discharging_trip(&storage, &reference, vec![line("P2", 1, "50", 2)]);

        let request = FinalCertification {
            trip_id: TRIP.to_string(),
            product_id: "P2".to_string(),
            certification_date: date(2024, 3, 22),
            certification_number: "CERT-78".to_string(),
            kilos: dec("48"),
            boxes: 2,
        };

        let mut txn = storage.begin();
        let id = certify_final(&mut txn, &reference, &request).unwrap();
        assert_eq!(id, "CF-B01-20240322-V99-P2-99-V99");

        let record: ProductionRecord = txn.require(&id).unwrap();
        assert_eq!(record.kind, RecordKind::FinalCertification);
        assert_eq!(record.production_share, Some(Decimal::ONE));
        assert_eq!(record.certified_kilos, Some(dec("48")));
        assert_eq!(record.biomass, dec("96"));
        assert_eq!(record.total_value, dec("480"));

        let err = certify_final(&mut txn, &reference, &request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let mut unpriced = request.clone();
        unpriced.product_id = "P3".to_string();
        let err = certify_final(&mut txn, &reference, &unpriced).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_close_trip_certifies_everything() {
        let (storage, _temp) = test_storage();
        let reference = reference();
        discharging_trip(
            &storage,
            &reference,
            vec![line("P1", 1, "300", 3), line("P2", 1, "50", 2)],
        );

        let mut txn = storage.begin();
        discharge(&mut txn, &discharge_request()).unwrap();
        let trip = close_trip(&mut txn, TRIP).unwrap();
        txn.commit().unwrap();

        assert_eq!(trip.state, TripState::Certified);
        assert!(!trip.active);

        let txn = storage.begin();
        let records = production::trip_records(&txn, TRIP).unwrap();
        assert_eq!(records.len(), 4);
        assert!(records
            .iter()
            .all(|r| r.certification == Certification::Certified));

        let stored: Trip = txn.require(TRIP).unwrap();
        assert_eq!(stored.state, TripState::Certified);
    }

    #[test]
    fn test_close_trip_without_production_fails() {
        let (storage, _temp) = test_storage();
        let reference = reference();

        let mut txn = storage.begin();
        let request = NewTrip {
            vessel_id: "B01".to_string(),
            objective_id: "OBJ1".to_string(),
            zone_id: "Z1".to_string(),
            trip_number: 1,
            start_date: date(2024, 3, 1),
        };
        marea::create(&mut txn, &reference, &request).unwrap();
        marea::activate(&mut txn, TRIP).unwrap();
        marea::finalize(&mut txn, TRIP, date(2024, 3, 20), date(2024, 4, 1)).unwrap();
        txn.commit().unwrap();

        let mut txn = storage.begin();
        let err = close_trip(&mut txn, TRIP).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        drop(txn);

        let stored: Trip = storage.begin().require(TRIP).unwrap();
        assert_eq!(stored.state, TripState::InDischarge);
    }
}
