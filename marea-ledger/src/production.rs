//! Versioned production records
//!
//! A reported line is addressed by its base key (operation, product, haul).
//! Modifying a line never rewrites it: the `Active` version is flipped to
//! `Superseded` and a new version is inserted. The `production_head` index
//! holds the highest version and the id of the active one.

use crate::{
    amount,
    error::{ensure_present, Error, Result},
    ids, marea,
    reference::ReferenceData,
    storage::{keys, Txn},
    types::{
        Certification, ProductionKey, ProductionRecord, RecordKind, RecordStatus, VersionHead,
    },
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One reported catch line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionLine {
    /// Product id
    pub product_id: String,
    /// Haul number, from 1
    pub haul: u32,
    /// Kilos
    pub kilos: Decimal,
    /// Boxes
    pub boxes: i64,
}

/// Lines reported for one operation of a trip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionBatch {
    /// Operation id
    pub operation_id: String,
    /// Vessel id
    pub vessel_id: String,
    /// Trip id
    pub trip_id: String,
    /// Production date
    pub date: NaiveDate,
    /// Catch lines
    pub lines: Vec<ProductionLine>,
}

/// Derived monetary and weight fields of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Valuation {
    pub(crate) biomass: Decimal,
    pub(crate) unit_price: Decimal,
    pub(crate) total_value: Decimal,
    pub(crate) unit_bio_value: Decimal,
    pub(crate) average_weight: Decimal,
}

/// Price a line with the vessel's gear, the active price and the conversion factor
pub(crate) fn valuate(
    reference: &dyn ReferenceData,
    vessel_id: &str,
    product_id: &str,
    kilos: Decimal,
    boxes: i64,
) -> Result<Valuation> {
    ensure_present("product_id", product_id)?;
    if !reference.product_exists(product_id) {
        return Err(Error::not_found(format!("product {}", product_id)));
    }

    let gear = reference
        .vessel_gear(vessel_id)
        .ok_or_else(|| Error::not_found(format!("gear type for vessel {}", vessel_id)))?;
    let unit_price = reference.active_price(product_id, &gear).ok_or_else(|| {
        Error::not_found(format!(
            "active price for product {} with gear {}",
            product_id, gear
        ))
    })?;
    let factor = reference
        .conversion_factor(product_id)
        .ok_or_else(|| Error::not_found(format!("conversion factor for product {}", product_id)))?;

    let biomass = amount::mul(kilos, factor, "biomass")?;
    let total_value = amount::mul(kilos, unit_price, "total value")?;

    Ok(Valuation {
        biomass,
        unit_price,
        total_value,
        unit_bio_value: amount::ratio(total_value, biomass, "unit biomass value")?,
        average_weight: amount::ratio(kilos, Decimal::from(boxes), "average weight")?,
    })
}

/// Insert version 0 of every line, all or nothing
pub fn register(
    txn: &mut Txn<'_>,
    reference: &dyn ReferenceData,
    batch: &ProductionBatch,
) -> Result<Vec<String>> {
    validate_batch(txn, batch)?;

    let mut ids = Vec::with_capacity(batch.lines.len());
    for line in &batch.lines {
        validate_line(line)?;
        let valuation = valuate(reference, &batch.vessel_id, &line.product_id, line.kilos, line.boxes)?;

        let record = reported_record(batch, line, valuation, 0);
        let detail = format!(
            "Registered production {} ({} kg)",
            record.production_id, record.kilos
        );
        txn.insert(&record, detail)?;

        txn.index_put(
            keys::production_head(&record.key()),
            &VersionHead {
                latest_version: 0,
                active_id: Some(record.production_id.clone()),
            },
        )?;
        txn.index_put(
            keys::trip_production(&record.trip_id, &record.production_id),
            &record.production_id,
        )?;

        ids.push(record.production_id);
    }

    Ok(ids)
}

/// Supersede the active version of every line and insert its successor
pub fn modify(
    txn: &mut Txn<'_>,
    reference: &dyn ReferenceData,
    batch: &ProductionBatch,
) -> Result<Vec<String>> {
    validate_batch(txn, batch)?;

    let mut ids = Vec::with_capacity(batch.lines.len());
    for line in &batch.lines {
        validate_line(line)?;
        let base = ProductionKey::new(batch.operation_id.clone(), line.product_id.clone(), line.haul);
        let head_key = keys::production_head(&base);

        let head: VersionHead = txn
            .index_get(&head_key)?
            .ok_or_else(|| Error::not_found(format!("production record {}", base)))?;
        let active_id = head
            .active_id
            .ok_or_else(|| Error::not_found(format!("active production record {}", base)))?;

        let mut current: ProductionRecord = txn.require(&active_id)?;
        if current.trip_id != batch.trip_id {
            return Err(Error::validation(format!(
                "Production record {} belongs to trip {}, not {}",
                current.production_id, current.trip_id, batch.trip_id
            )));
        }

        let valuation = valuate(reference, &batch.vessel_id, &line.product_id, line.kilos, line.boxes)?;

        current.status = RecordStatus::Superseded;
        let detail = format!("Superseded production {}", current.production_id);
        txn.update(&current, detail)?;

        let version = head.latest_version + 1;
        let record = reported_record(batch, line, valuation, version);
        let detail = format!(
            "Modified production {} -> {} ({} kg)",
            current.production_id, record.production_id, record.kilos
        );
        txn.insert(&record, detail)?;

        txn.index_put(
            head_key,
            &VersionHead {
                latest_version: version,
                active_id: Some(record.production_id.clone()),
            },
        )?;
        txn.index_put(
            keys::trip_production(&record.trip_id, &record.production_id),
            &record.production_id,
        )?;

        ids.push(record.production_id);
    }

    Ok(ids)
}

/// Every version of a base key, oldest first
pub fn history(txn: &Txn<'_>, base: &ProductionKey) -> Result<Vec<ProductionRecord>> {
    let head: VersionHead = match txn.index_get(&keys::production_head(base))? {
        Some(head) => head,
        None => return Ok(Vec::new()),
    };

    let mut records = Vec::with_capacity(head.latest_version as usize + 1);
    for version in 0..=head.latest_version {
        let id = ids::production_id(&base.operation_id, &base.product_id, base.haul, version);
        if let Some(record) = txn.get::<ProductionRecord>(&id)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Every record of a trip, all kinds and statuses, in id order
pub fn trip_records(txn: &Txn<'_>, trip_id: &str) -> Result<Vec<ProductionRecord>> {
    let production_ids: Vec<String> = txn.index_scan(&keys::trip_production_prefix(trip_id))?;
    production_ids
        .iter()
        .map(|id| txn.require::<ProductionRecord>(id))
        .collect()
}

/// Net uncertified kilos per product: active reported lines plus discharge entries
pub fn outstanding_by_product(txn: &Txn<'_>, trip_id: &str) -> Result<BTreeMap<String, Decimal>> {
    let mut totals = BTreeMap::new();
    for record in trip_records(txn, trip_id)? {
        if record.kind != RecordKind::FinalCertification && record.is_outstanding() {
            let total = totals.entry(record.product_id).or_insert(Decimal::ZERO);
            *total = amount::add(*total, record.kilos, "outstanding kilos")?;
        }
    }
    Ok(totals)
}

fn validate_batch(txn: &Txn<'_>, batch: &ProductionBatch) -> Result<()> {
    ensure_present("operation_id", &batch.operation_id)?;
    ensure_present("vessel_id", &batch.vessel_id)?;
    ensure_present("trip_id", &batch.trip_id)?;
    if batch.lines.is_empty() {
        return Err(Error::validation("at least one production line is required"));
    }
    marea::require_in_progress(txn, &batch.trip_id, &batch.vessel_id)?;
    Ok(())
}

fn validate_line(line: &ProductionLine) -> Result<()> {
    if line.haul < 1 {
        return Err(Error::validation(format!(
            "haul must be >= 1 for product {}",
            line.product_id
        )));
    }
    if line.kilos < Decimal::ZERO || line.boxes < 0 {
        return Err(Error::validation(format!(
            "kilos and boxes must not be negative for product {}",
            line.product_id
        )));
    }
    Ok(())
}

fn reported_record(
    batch: &ProductionBatch,
    line: &ProductionLine,
    valuation: Valuation,
    version: u32,
) -> ProductionRecord {
    ProductionRecord {
        production_id: ids::production_id(&batch.operation_id, &line.product_id, line.haul, version),
        kind: RecordKind::Reported,
        version,
        operation_id: batch.operation_id.clone(),
        date: batch.date,
        vessel_id: batch.vessel_id.clone(),
        trip_id: batch.trip_id.clone(),
        product_id: line.product_id.clone(),
        haul: line.haul,
        kilos: line.kilos,
        boxes: line.boxes,
        average_weight: valuation.average_weight,
        biomass: valuation.biomass,
        unit_price: valuation.unit_price,
        total_value: valuation.total_value,
        unit_bio_value: valuation.unit_bio_value,
        synchronized: false,
        certification: Certification::Pending,
        status: RecordStatus::Active,
        certification_date: None,
        certification_number: None,
        production_share: None,
        certified_kilos: None,
    }
}
