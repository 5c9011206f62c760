//! Append-only quota ledger
//!
//! Entries are never updated. Each partition (movement, species, zone, year)
//! carries its own sequence, allocated as `1 + max` from the `quota_sequence`
//! index. The single-writer actor makes read-then-increment race free.

use crate::{
    amount,
    error::{ensure_present, Error, Result},
    ids,
    reference::ReferenceData,
    storage::{keys, Txn},
    types::{QuotaCategory, QuotaEntry, QuotaMovement, QuotaPartition, QuotaTreatment},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Increase or decrease of one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaAdjustment {
    /// Movement id
    pub movement_id: String,
    /// Species id
    pub species_id: String,
    /// Zone id
    pub zone_id: String,
    /// Quota year
    pub year: i32,
    /// Month (1-12)
    pub month: u32,
    /// Tonnage, always positive; the treatment decides the sign
    pub tons: Decimal,
    /// Free text
    pub comment: String,
}

/// Transfer between two zones of the same movement, species and year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneTransfer {
    /// Movement id
    pub movement_id: String,
    /// Species id
    pub species_id: String,
    /// Quota year
    pub year: i32,
    /// Month (1-12)
    pub month: u32,
    /// Tonnage moved, always positive
    pub tons: Decimal,
    /// Zone giving the tonnage
    pub zone_from: String,
    /// Zone receiving the tonnage
    pub zone_to: String,
    /// Free text
    pub comment: String,
}

/// Append `+tons` for an `Increase` movement
pub fn increase(
    txn: &mut Txn<'_>,
    reference: &dyn ReferenceData,
    request: &QuotaAdjustment,
) -> Result<QuotaEntry> {
    let movement = resolve_movement(reference, &request.movement_id, QuotaTreatment::Increase)?;
    validate_adjustment(reference, request)?;

    if movement.category == QuotaCategory::Unique {
        let prefix =
            keys::quota_annual_prefix(&request.movement_id, &request.species_id, request.year);
        let existing: Vec<String> = txn.index_scan(&prefix)?;
        if let Some(control_id) = existing.first() {
            return Err(Error::validation(format!(
                "Movement {} is already allocated for species {} in {} ({})",
                request.movement_id, request.species_id, request.year, control_id
            )));
        }
    }

    let partition = QuotaPartition::new(
        request.movement_id.clone(),
        request.species_id.clone(),
        request.zone_id.clone(),
        request.year,
    );
    append(txn, partition, request.month, request.tons, &request.comment)
}

/// Append `-tons` for a `Decrease` movement
pub fn decrease(
    txn: &mut Txn<'_>,
    reference: &dyn ReferenceData,
    request: &QuotaAdjustment,
) -> Result<QuotaEntry> {
    resolve_movement(reference, &request.movement_id, QuotaTreatment::Decrease)?;
    validate_adjustment(reference, request)?;

    let partition = QuotaPartition::new(
        request.movement_id.clone(),
        request.species_id.clone(),
        request.zone_id.clone(),
        request.year,
    );
    append(txn, partition, request.month, -request.tons, &request.comment)
}

/// Append `-tons` at `zone_from` and `+tons` at `zone_to`
pub fn change_zone(
    txn: &mut Txn<'_>,
    reference: &dyn ReferenceData,
    request: &ZoneTransfer,
) -> Result<(QuotaEntry, QuotaEntry)> {
    resolve_movement(reference, &request.movement_id, QuotaTreatment::ZoneChange)?;
    validate_common(
        reference,
        &request.species_id,
        request.month,
        request.tons,
    )?;
    ensure_zone(reference, &request.zone_from)?;
    ensure_zone(reference, &request.zone_to)?;
    if request.zone_from == request.zone_to {
        return Err(Error::validation(format!(
            "Zone change needs two different zones, got {} twice",
            request.zone_from
        )));
    }

    let from = QuotaPartition::new(
        request.movement_id.clone(),
        request.species_id.clone(),
        request.zone_from.clone(),
        request.year,
    );
    let to = QuotaPartition::new(
        request.movement_id.clone(),
        request.species_id.clone(),
        request.zone_to.clone(),
        request.year,
    );

    let debit = append(txn, from, request.month, -request.tons, &request.comment)?;
    let credit = append(txn, to, request.month, request.tons, &request.comment)?;

    Ok((debit, credit))
}

/// Entries of a partition in sequence order
pub fn entries(txn: &Txn<'_>, partition: &QuotaPartition) -> Result<Vec<QuotaEntry>> {
    let control_ids: Vec<String> = txn.index_scan(&keys::quota_partition_prefix(partition))?;
    control_ids
        .iter()
        .map(|control_id| txn.require::<QuotaEntry>(control_id))
        .collect()
}

/// Sum of signed tonnage of a partition
pub fn balance(txn: &Txn<'_>, partition: &QuotaPartition) -> Result<Decimal> {
    amount::sum(
        entries(txn, partition)?.iter().map(|entry| entry.tons),
        "quota balance",
    )
}

fn append(
    txn: &mut Txn<'_>,
    partition: QuotaPartition,
    month: u32,
    tons: Decimal,
    comment: &str,
) -> Result<QuotaEntry> {
    let sequence_key = keys::quota_sequence(&partition);
    let sequence = txn.index_get::<u32>(&sequence_key)?.unwrap_or(0) + 1;

    let control_id = ids::quota_control_id(
        &partition.movement_id,
        &partition.species_id,
        &partition.zone_id,
        partition.year,
        sequence,
    );

    let entry = QuotaEntry {
        control_id: control_id.clone(),
        movement_id: partition.movement_id.clone(),
        species_id: partition.species_id.clone(),
        year: partition.year,
        month,
        tons,
        zone_id: partition.zone_id.clone(),
        sequence,
        comment: comment.to_string(),
    };

    let detail = format!("Quota entry {} for {}: {} t", control_id, partition, tons);
    txn.insert(&entry, detail)?;

    txn.index_put(sequence_key, &sequence)?;
    txn.index_put(keys::quota_partition_entry(&partition, sequence), &control_id)?;
    txn.index_put(
        keys::quota_annual_entry(
            &partition.movement_id,
            &partition.species_id,
            partition.year,
            &control_id,
        ),
        &control_id,
    )?;

    tracing::debug!(
        control_id = %control_id,
        partition = %partition,
        sequence,
        tons = %tons,
        "Quota entry staged"
    );

    Ok(entry)
}

fn resolve_movement(
    reference: &dyn ReferenceData,
    movement_id: &str,
    expected: QuotaTreatment,
) -> Result<QuotaMovement> {
    ensure_present("movement_id", movement_id)?;
    let movement = reference
        .quota_movement(movement_id)
        .ok_or_else(|| Error::not_found(format!("quota movement {}", movement_id)))?;

    if movement.treatment != expected {
        return Err(Error::validation(format!(
            "Movement {} has treatment {:?}, expected {:?}",
            movement_id, movement.treatment, expected
        )));
    }
    Ok(movement)
}

fn validate_adjustment(reference: &dyn ReferenceData, request: &QuotaAdjustment) -> Result<()> {
    validate_common(reference, &request.species_id, request.month, request.tons)?;
    ensure_zone(reference, &request.zone_id)
}

fn validate_common(
    reference: &dyn ReferenceData,
    species_id: &str,
    month: u32,
    tons: Decimal,
) -> Result<()> {
    ensure_present("species_id", species_id)?;
    if !(1..=12).contains(&month) {
        return Err(Error::validation(format!("month {} is out of range", month)));
    }
    if tons <= Decimal::ZERO {
        return Err(Error::validation("tons must be greater than zero"));
    }
    if !reference.species_exists(species_id) {
        return Err(Error::not_found(format!("species {}", species_id)));
    }
    Ok(())
}

fn ensure_zone(reference: &dyn ReferenceData, zone_id: &str) -> Result<()> {
    ensure_present("zone_id", zone_id)?;
    if !reference.zone_exists(zone_id) {
        return Err(Error::not_found(format!("zone {}", zone_id)));
    }
    Ok(())
}
