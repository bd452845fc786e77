// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Derived scheduling metrics built on bucketed code counts
//!
//! Acknowledgement codes are three-valued: 0 ack, 1 nack, 2 DTX (nothing
//! detected). A ratio over a bucket whose denominator is zero is undefined,
//! never zero.

use arrow::array::Array;

use crate::aggregate::{BucketPlan, BucketedAggregate, Reduction};
use crate::error::Result;
use crate::filter::{ValueFilter, as_int64};
use crate::schema::TIME_COLUMN;
use crate::view::LogView;

/// Acknowledgement codes counted in every ratio denominator
pub const ACK_CODES: [i64; 3] = [0, 1, 2];
/// Code reported when no transmission was detected
pub const DTX_CODE: i64 = 2;
/// Slot numbers at or above this select every slot
pub const ALL_SLOTS: u32 = 20;

/// Demodulation times count slots modulo this
const SLOTS_PER_FRAME_CYCLE: i64 = 256;

fn effective_slot(slot: Option<u32>) -> Option<i64> {
    slot.filter(|s| *s < ALL_SLOTS).map(i64::from)
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

/// Per-bucket share of `numerator` codes among all acknowledgement codes of
/// the view, optionally restricted to one slot.
///
/// The result has one series named `name`.
pub async fn ack_ratio(
    view: &LogView,
    name: &str,
    numerator: &[i64],
    bucket_secs: f64,
    slot: Option<u32>,
) -> Result<BucketedAggregate> {
    let plan = BucketPlan::for_view(view, bucket_secs)?;
    let roles = &view.schema().roles;
    let slot = effective_slot(slot);

    let mut columns = vec![TIME_COLUMN, roles.ack];
    if slot.is_some() {
        columns.push(roles.dem_time);
    }
    let codes = ValueFilter::new().allow(roles.ack, ACK_CODES);
    let outcome = view.load(&columns, Some(&codes)).await?;

    let mut hits = vec![0u64; plan.len()];
    let mut totals = vec![0u64; plan.len()];
    for batch in outcome.record_batches() {
        let indices = plan.indices(batch)?;
        let acks = as_int64(batch.column(1), roles.ack)?;
        let dem_times = match slot {
            Some(_) => Some(as_int64(batch.column(2), roles.dem_time)?),
            None => None,
        };
        for (row, idx) in indices.into_iter().enumerate() {
            let Some(idx) = idx else { continue };
            if let (Some(slot), Some(dem)) = (slot, &dem_times) {
                if !dem.is_valid(row) || dem.value(row) % SLOTS_PER_FRAME_CYCLE != slot {
                    continue;
                }
            }
            totals[idx] += 1;
            if numerator.contains(&acks.value(row)) {
                hits[idx] += 1;
            }
        }
    }

    let values = hits
        .iter()
        .zip(&totals)
        .map(|(h, t)| ratio(*h, *t))
        .collect();
    let overall = ratio(hits.iter().sum(), totals.iter().sum());
    Ok(BucketedAggregate::from_series(
        &plan,
        Reduction::ValueHistogram { ratio: true },
        vec![(name.to_string(), values, overall)],
    ))
}

/// Block error rate per bucket: (ack + DTX) / (ack + nack + DTX)
pub async fn bler(view: &LogView, bucket_secs: f64, slot: Option<u32>) -> Result<BucketedAggregate> {
    ack_ratio(view, "bler", &[0, DTX_CODE], bucket_secs, slot).await
}

/// Uplink grants lost before the UE saw them: DTX / all codes
pub async fn dci0_lost_ratio(view: &LogView, bucket_secs: f64) -> Result<BucketedAggregate> {
    ack_ratio(view, "dci0_lost_ratio", &[DTX_CODE], bucket_secs, None).await
}

/// Rows per bucket where `column` holds one of `codes`
pub async fn code_count(
    view: &LogView,
    name: &str,
    column: &str,
    codes: &[i64],
    bucket_secs: f64,
) -> Result<BucketedAggregate> {
    let plan = BucketPlan::for_view(view, bucket_secs)?;
    let filter = ValueFilter::new().allow(column, codes.iter().copied());
    let outcome = view.load(&[TIME_COLUMN], Some(&filter)).await?;

    let mut counts = vec![0u64; plan.len()];
    for batch in outcome.record_batches() {
        for idx in plan.indices(batch)?.into_iter().flatten() {
            counts[idx] += 1;
        }
    }
    let total: u64 = counts.iter().sum();
    Ok(BucketedAggregate::from_series(
        &plan,
        Reduction::Count,
        vec![(
            name.to_string(),
            counts.iter().map(|c| Some(*c as f64)).collect(),
            Some(total as f64),
        )],
    ))
}
