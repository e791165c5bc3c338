//! Dashboard totals over the record store

use serde::{Deserialize, Serialize};
use surya_common::record::round2;
use surya_common::{QcStatus, SiteRecord};

use crate::services::report::KW_PER_SQM;

/// Tonnes of CO2 offset per year for each kW of certified capacity
pub const CARBON_TONS_PER_KW: f64 = 1.2;

/// Aggregate figures across every readable record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total_sites: usize,
    /// VERIFIABLE with solar
    pub solar_verified_sites: usize,
    pub verified_empty_sites: usize,
    pub pending_sites: usize,
    pub not_verifiable_sites: usize,
    /// Records that failed to load and are counted nowhere else
    pub unreadable_sites: usize,
    /// Panel area over certified sites only
    pub verified_area_sqm: f64,
    pub capacity_kw: f64,
    pub carbon_offset_tons: f64,
}

impl AuditSummary {
    pub fn from_records<'a, I>(records: I, unreadable_sites: usize) -> Self
    where
        I: IntoIterator<Item = &'a SiteRecord>,
    {
        let mut summary = Self {
            unreadable_sites,
            ..Self::default()
        };
        let mut area = 0.0;

        for record in records {
            summary.total_sites += 1;
            match record.qc_status {
                QcStatus::Verifiable if record.has_solar => {
                    summary.solar_verified_sites += 1;
                    area += record.total_area_sqm;
                }
                QcStatus::Verifiable => summary.verified_empty_sites += 1,
                QcStatus::NotVerifiable => summary.not_verifiable_sites += 1,
                QcStatus::PendingAuditorFlag | QcStatus::PendingCitizenAppeal => {
                    summary.pending_sites += 1
                }
            }
        }

        let capacity = area * KW_PER_SQM;
        summary.verified_area_sqm = round2(area);
        summary.capacity_kw = round2(capacity);
        summary.carbon_offset_tons = round2(capacity * CARBON_TONS_PER_KW);
        summary
    }
}
