//! Site audit workflow
//!
//! - [`pipeline`]: evaluation of one image into a verdict, and folding that
//!   verdict into a record
//! - [`batch`]: concurrent, cancellable runs over many sites

pub mod batch;
pub mod pipeline;

pub use batch::{plan_jobs, BatchRunner, SiteJob, SiteOutcome, DEFAULT_CONCURRENCY};
pub use pipeline::{apply_evaluation, image_metadata_now, SiteEvaluation, SitePipeline};
