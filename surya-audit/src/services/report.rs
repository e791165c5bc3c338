//! Audit report sink
//!
//! Reports are derived from a verified record alone, so they can be
//! regenerated at any time and always come out byte-identical.

use std::fs;
use std::path::{Path, PathBuf};

use surya_common::{QcStatus, Result, SiteRecord};
use tracing::info;

/// Rated output per square meter of panel, in kW
pub const KW_PER_SQM: f64 = 0.15;

/// Renders a finalized record into a document
pub trait ReportSink: Send + Sync {
    /// File extension of the rendered document
    fn extension(&self) -> &str;

    fn render(&self, record: &SiteRecord) -> Result<Vec<u8>>;
}

/// Plain-text audit report
#[derive(Debug, Clone, Default)]
pub struct TextReport;

impl ReportSink for TextReport {
    fn extension(&self) -> &str {
        "txt"
    }

    fn render(&self, record: &SiteRecord) -> Result<Vec<u8>> {
        record.verify_integrity()?;

        let mut out = String::new();
        out.push_str("SURYANETRA ROOFTOP SOLAR AUDIT REPORT\n");
        out.push_str("=====================================\n\n");
        out.push_str(&format!("Sample ID:        {}\n", record.sample_id));
        out.push_str(&format!(
            "Location:         {:.6}, {:.6}{}\n",
            record.lat,
            record.lon,
            if record.coordinates_fallback {
                " (fallback location)"
            } else {
                ""
            }
        ));
        if let Some(meta) = &record.image_metadata {
            out.push_str(&format!("Imagery:          {} ({})\n", meta.source, meta.capture_date));
        }
        out.push_str(&format!("Record revision:  {}\n\n", record.revision));

        out.push_str(&format!("Determination:    {}\n", determination(record)));
        out.push_str(&format!("QC status:        {}\n", record.qc_status));
        out.push_str(&format!(
            "Buffer zone:      {}{}\n",
            record.buffer_zone,
            match record.buffer_zone.band_sqft() {
                0 => String::new(),
                sqft => format!(" ({} sq.ft band)", sqft),
            }
        ));
        out.push_str(&format!("Panel area:       {:.2} m2\n", record.total_area_sqm));
        out.push_str(&format!(
            "Est. capacity:    {:.2} kW\n",
            record.total_area_sqm * KW_PER_SQM
        ));
        out.push_str(&format!(
            "Confidence:       {:.0}%\n",
            record.max_confidence * 100.0
        ));
        out.push_str(&format!("Detections:       {}\n", record.detections.len()));
        if let Some(proof) = &record.appeal_proof {
            out.push_str(&format!("Appeal proof:     {}\n", proof));
        }
        out.push('\n');

        out.push_str("QC notes:\n");
        if record.qc_notes.is_empty() {
            out.push_str("  (none)\n");
        }
        for (i, note) in record.qc_notes.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, note));
        }

        out.push_str(&format!("\nIntegrity hash (SHA-256): {}\n", record.integrity_hash));
        Ok(out.into_bytes())
    }
}

fn determination(record: &SiteRecord) -> &'static str {
    match record.qc_status {
        QcStatus::Verifiable if record.has_solar => "SOLAR INSTALLATION VERIFIED",
        QcStatus::Verifiable => "NO SOLAR INSTALLATION",
        QcStatus::NotVerifiable => "NOT VERIFIABLE",
        QcStatus::PendingAuditorFlag | QcStatus::PendingCitizenAppeal => "UNDER REVIEW",
    }
}

/// Render and write `<dir>/<sample_id>_audit.<ext>`, replacing any previous copy
pub fn write_report(sink: &dyn ReportSink, record: &SiteRecord, dir: &Path) -> Result<PathBuf> {
    let bytes = sink.render(record)?;
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}_audit.{}", record.sample_id, sink.extension()));
    fs::write(&path, bytes)?;
    info!(sample_id = %record.sample_id, path = %path.display(), "Report written");
    Ok(path)
}
