#![no_main]

use libfuzzer_sys::fuzz_target;
use smartshield_core::{decode_parquet, CategoryCatalog, FeaturePipeline};
use std::sync::Arc;

// Uploaded batches are untrusted: decoding must fail with an error, never panic,
// and whatever decodes must survive preprocessing without a schema.

fuzz_target!(|data: &[u8]| {
    let Ok(batch) = decode_parquet(data.to_vec()) else {
        return;
    };

    let pipeline = FeaturePipeline::new(Arc::new(CategoryCatalog::default()), None);
    let _ = pipeline.process(&batch);
});
