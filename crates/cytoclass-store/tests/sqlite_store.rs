//! SQLite store behavior through the `PredictionStore` interface:
//! seeding idempotence, counts, history order, concurrent writers and
//! restart survival.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use cytoclass_core::validator::validate;
use cytoclass_core::{
    default_feature_importance, NewPrediction, PredictionCounts, PredictionOutcome,
    PredictionStore, TumorType,
};
use cytoclass_store::SqliteStore;
use cytoclass_test_utils::sample_features;
use pretty_assertions::assert_eq;

fn outcome(tumor_type: TumorType) -> PredictionOutcome {
    PredictionOutcome {
        prediction: match tumor_type {
            TumorType::Benign => 0,
            TumorType::Malignant => 1,
        },
        tumor_type,
        probability: 0.9,
        probabilities: None,
    }
}

fn prediction(tumor_type: TumorType) -> NewPrediction {
    NewPrediction::now(validate(&sample_features()).unwrap(), outcome(tumor_type))
}

#[tokio::test]
async fn seeding_twice_keeps_nine_rows() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert!(store.feature_importances().await.unwrap().is_empty());

    let first = store
        .seed_feature_importances(&default_feature_importance())
        .await
        .unwrap();
    let second = store
        .seed_feature_importances(&default_feature_importance())
        .await
        .unwrap();

    assert_eq!(first.len(), 9);
    assert_eq!(first, second);
    assert_eq!(first[0].feature, "Uniformity_of_Cell_Size");
    assert_eq!(first[8].feature, "Mitoses");
}

#[tokio::test]
async fn concurrent_seeding_never_duplicates() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .seed_feature_importances(&default_feature_importance())
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().len(), 9);
    }
}

#[tokio::test]
async fn counts_follow_inserts() {
    let store = SqliteStore::open_in_memory().unwrap();
    for tumor_type in [
        TumorType::Benign,
        TumorType::Malignant,
        TumorType::Benign,
        TumorType::Benign,
    ] {
        store.insert_prediction(prediction(tumor_type)).await.unwrap();
    }

    assert_eq!(
        store.prediction_counts().await.unwrap(),
        PredictionCounts {
            total: 4,
            benign: 3,
            malign: 1
        }
    );
    assert_eq!(store.model_metrics().await.unwrap(), None);

    let metrics = store.refresh_model_metrics().await.unwrap();
    assert_eq!(metrics.total_predictions, 4);
    assert_eq!(store.model_metrics().await.unwrap().unwrap().total_predictions, 4);
}

#[tokio::test]
async fn history_is_newest_first_and_limited() {
    let store = SqliteStore::open_in_memory().unwrap();
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let features = validate(&sample_features()).unwrap();

    for minutes in [5, 1, 9, 3] {
        store
            .insert_prediction(NewPrediction {
                features,
                outcome: outcome(TumorType::Benign),
                created_at: base + Duration::minutes(minutes),
            })
            .await
            .unwrap();
    }

    let all = store.recent_predictions(100).await.unwrap();
    let order: Vec<_> = all.iter().map(|r| (r.created_at - base).num_minutes()).collect();
    assert_eq!(order, vec![9, 5, 3, 1]);

    let page = store.recent_predictions(2).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0], all[0]);
    assert_eq!(page[1], all[1]);
}

#[tokio::test]
async fn same_timestamp_breaks_ties_by_id() {
    let store = SqliteStore::open_in_memory().unwrap();
    let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let features = validate(&sample_features()).unwrap();
    for _ in 0..3 {
        store
            .insert_prediction(NewPrediction {
                features,
                outcome: outcome(TumorType::Malignant),
                created_at: at,
            })
            .await
            .unwrap();
    }

    let ids: Vec<_> = store
        .recent_predictions(10)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![3, 2, 1]);
}

#[tokio::test]
async fn concurrent_writers_leave_correct_totals() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let handles: Vec<_> = (0..20)
        .map(|i| {
            let store = Arc::clone(&store);
            let tumor_type = if i % 4 == 0 {
                TumorType::Malignant
            } else {
                TumorType::Benign
            };
            tokio::spawn(async move {
                store.insert_prediction(prediction(tumor_type)).await?;
                store.refresh_model_metrics().await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let metrics = store.model_metrics().await.unwrap().unwrap();
    assert_eq!(metrics.total_predictions, 20);
    assert_eq!(
        store.prediction_counts().await.unwrap(),
        PredictionCounts {
            total: 20,
            benign: 15,
            malign: 5
        }
    );
}

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cytoclass.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        store
            .insert_prediction(prediction(TumorType::Malignant))
            .await
            .unwrap();
        store.refresh_model_metrics().await.unwrap();
        store
            .seed_feature_importances(&default_feature_importance())
            .await
            .unwrap();
    }

    let reopened = SqliteStore::open(&path).unwrap();
    let history = reopened.recent_predictions(100).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].tumor_type, TumorType::Malignant);
    assert_eq!(history[0].features.to_arg(), "5,1,1,1,2,1,3,1,1");
    assert_eq!(
        reopened.model_metrics().await.unwrap().unwrap().total_predictions,
        1
    );
    assert_eq!(reopened.feature_importances().await.unwrap().len(), 9);
}
