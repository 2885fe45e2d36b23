//! End-to-end tests: Parquet bytes in, predictions out
//!
//! These use the sample artifacts shipped in the workspace `models/` directory.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, NullArray, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use smartshield_core::{
    decode_parquet, encode_parquet, Batch, CategoryCatalog, Column, ColumnValues, FeaturePipeline,
    Mode, PredictionError, PredictionService, Predictions, ScoringModel,
};

fn model(name: &str, file: &str) -> Arc<ScoringModel> {
    let path = format!("{}/../models/{}", env!("CARGO_MANIFEST_DIR"), file);
    Arc::new(ScoringModel::load(name, path, Arc::new(CategoryCatalog::default())).unwrap())
}

fn service() -> PredictionService {
    PredictionService::new(
        Some(model("detection", "detection_model.json")),
        Some(model("classification", "classification_model.json")),
    )
}

fn flows() -> Batch {
    Batch::new(vec![
        Column::utf8("proto", vec![Some("tcp"), Some("udp"), Some("tcp")]),
        Column::utf8("service", vec![Some("http"), Some("dns"), Some("zzz-unknown")]),
        Column::utf8("state", vec![Some("FIN"), Some("INT"), Some("CON")]),
        Column::int64("sbytes", vec![Some(1000), Some(200), Some(500)]),
        Column::int64("dbytes", vec![Some(20000), Some(0), Some(0)]),
        Column::int64("spkts", vec![Some(10), Some(2), Some(4)]),
        Column::int64("dpkts", vec![Some(18), Some(0), Some(2)]),
        Column::int64("sloss", vec![Some(0), Some(0), Some(3)]),
        Column::int64("dloss", vec![Some(1), Some(0), Some(0)]),
        Column::float64("sload", vec![Some(5000.0), Some(2.0e8), None]),
        Column::float32("dload", vec![Some(80000.0), Some(0.0), Some(10.0)]),
        Column::int64("smean", vec![Some(100), Some(100), Some(125)]),
    ])
    .unwrap()
}

/// Batch as it arrives over the wire
fn uploaded(batch: &Batch) -> Batch {
    decode_parquet(encode_parquet(batch).unwrap()).unwrap()
}

#[test]
fn test_artifacts_load_with_embedded_schema() {
    let detection = model("detection", "detection_model.json");
    let schema = detection.schema().unwrap();
    assert_eq!(schema.len(), 12);
    assert!(schema.columns().contains(&"Network Bytes".to_string()));

    let classification = model("classification", "classification_model.json");
    assert_eq!(classification.classes().len(), 9);
}

#[test]
fn test_every_mode_returns_one_prediction_per_row() {
    let service = service();
    let batch = uploaded(&flows());

    for mode in [
        Mode::Detection,
        Mode::DetectionProba,
        Mode::Classification,
        Mode::ClassificationProba,
        Mode::Combined,
    ] {
        let predictions = service.predict(mode, &batch).unwrap();
        assert_eq!(predictions.len(), 3, "mode {}", mode.as_str());
    }
}

#[test]
fn test_detection_and_classification_labels() {
    let service = service();
    let batch = uploaded(&flows());

    match service.predict_detection(&batch).unwrap() {
        Predictions::ClassIds(ids) => {
            assert_eq!(ids[0], 0);
            assert_eq!(ids[1], 1);
        }
        other => panic!("unexpected output {:?}", other),
    }

    match service.predict_classification(&batch).unwrap() {
        Predictions::Labels(labels) => {
            assert_eq!(labels[0], "Exploits");
            assert_eq!(labels[1], "Generic");
        }
        other => panic!("unexpected output {:?}", other),
    }
}

#[test]
fn test_unknown_service_is_scored_as_catch_all() {
    let service = service();
    let batch = uploaded(&flows());

    let mut renamed = flows();
    renamed
        .set_column(
            "service",
            ColumnValues::Utf8(vec![Some("http".into()), Some("dns".into()), Some("-".into())]),
        )
        .unwrap();

    assert_eq!(
        service.predict_detection_proba(&batch).unwrap(),
        service.predict_detection_proba(&uploaded(&renamed)).unwrap()
    );
}

#[test]
fn test_pipeline_scenario_over_the_wire() {
    let pipeline = FeaturePipeline::new(Arc::new(CategoryCatalog::default()), None);
    let processed = pipeline.process(&uploaded(&flows())).unwrap();

    let service = processed.column("service").unwrap();
    assert_eq!(
        service.values,
        ColumnValues::Categorical(vec![
            Some("http".to_string()),
            Some("dns".to_string()),
            Some("-".to_string()),
        ])
    );

    // dbytes = 0 in the last row
    match &processed.column("Ratio of Data Flow").unwrap().values {
        ColumnValues::Float32(values) => assert!(values[2].unwrap().abs() < 1e-6),
        other => panic!("unexpected column {:?}", other),
    }

    // nulls survive preprocessing
    match &processed.column("sload").unwrap().values {
        ColumnValues::Float32(values) => assert_eq!(values[2], None),
        other => panic!("unexpected column {:?}", other),
    }
}

#[test]
fn test_extra_columns_are_ignored() {
    let service = service();
    let mut batch = flows();
    batch
        .set_column(
            "attack_cat",
            ColumnValues::Utf8(vec![Some("x".into()), None, Some("y".into())]),
        )
        .unwrap();

    assert_eq!(
        service.predict_detection(&uploaded(&batch)).unwrap(),
        service.predict_detection(&uploaded(&flows())).unwrap()
    );
}

#[test]
fn test_all_null_extra_column_does_not_block_scoring() {
    let text = |values: [&str; 2]| -> ArrayRef { Arc::new(StringArray::from(values.to_vec())) };
    let ints = |values: [i64; 2]| -> ArrayRef { Arc::new(Int64Array::from(values.to_vec())) };
    let floats = |values: [f64; 2]| -> ArrayRef { Arc::new(Float64Array::from(values.to_vec())) };

    let mut fields = Vec::new();
    let mut arrays = Vec::new();
    let mut push = |name: &str, data_type: DataType, array: ArrayRef| {
        fields.push(Field::new(name, data_type, true));
        arrays.push(array);
    };
    push("proto", DataType::Utf8, text(["tcp", "udp"]));
    push("service", DataType::Utf8, text(["http", "dns"]));
    push("state", DataType::Utf8, text(["FIN", "INT"]));
    push("comment", DataType::Null, Arc::new(NullArray::new(2)));
    push("sbytes", DataType::Int64, ints([1000, 200]));
    push("dbytes", DataType::Int64, ints([20000, 0]));
    push("spkts", DataType::Int64, ints([10, 2]));
    push("dpkts", DataType::Int64, ints([18, 0]));
    push("sloss", DataType::Int64, ints([0, 0]));
    push("dloss", DataType::Int64, ints([1, 0]));
    push("sload", DataType::Float64, floats([5000.0, 2.0e8]));
    push("dload", DataType::Float64, floats([80000.0, 0.0]));
    push("smean", DataType::Int64, ints([100, 100]));

    let record_batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap();
    let mut parquet = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut parquet, record_batch.schema(), None).unwrap();
    writer.write(&record_batch).unwrap();
    writer.close().unwrap();

    let batch = decode_parquet(parquet).unwrap();
    assert!(!batch.contains("comment"));
    assert_eq!(
        service().predict_detection(&batch).unwrap(),
        Predictions::ClassIds(vec![0, 1])
    );
}

#[test]
fn test_missing_feature_is_schema_error() {
    let batch = Batch::new(vec![
        Column::utf8("proto", vec![Some("tcp")]),
        Column::utf8("service", vec![Some("http")]),
    ])
    .unwrap();

    let err = service().predict_detection(&uploaded(&batch)).unwrap_err();
    assert!(matches!(err, PredictionError::Schema { .. }));
    assert!(!err.is_client_error());
}

#[test]
fn test_garbage_bytes_are_a_decode_error() {
    let err = decode_parquet(b"PAR1 but not really".to_vec()).unwrap_err();
    assert!(err.is_client_error());
}
