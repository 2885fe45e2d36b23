#![no_main]

use libfuzzer_sys::fuzz_target;
use smartshield_core::gbdt::{FeatureKind, FeatureValue, TreeEnsemble};

// A validated artifact must evaluate any row of the declared shape without panicking

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(ensemble) = TreeEnsemble::from_json_str(json) else {
        return;
    };

    let row: Vec<FeatureValue> = ensemble
        .features
        .iter()
        .map(|f| match f.kind {
            FeatureKind::Numeric => FeatureValue::Numeric(f32::NAN),
            FeatureKind::Categorical => FeatureValue::Category(None),
        })
        .collect();

    if let Ok(probs) = ensemble.probabilities(&row) {
        assert_eq!(probs.len(), ensemble.classes.len());
    }
});
