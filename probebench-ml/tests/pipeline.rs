//! End-to-end behaviour of the gate, extraction, and orchestrator.

mod common;

use common::{
    FaultyDataset, ScriptedFactory, StubProvider, coded_dataset, config, recipe, NUM_CLASSES,
};
use pretty_assertions::assert_eq;
use probebench_ml::data::{
    Augmentation, DataLoader, Dataset, DatasetProvider, LoaderOptions, Pipeline, Split,
};
use probebench_ml::experiment::{ExperimentOrchestrator, RunFailure, Stage};
use probebench_ml::features::FeatureExtractor;
use probebench_ml::nn::{Network, Sgd, SgdConfig};
use probebench_ml::training::{
    CallbackAction, CheckpointGate, CheckpointRecord, CheckpointStore, EpochSummary,
    GateDecision, MultiStepSchedule, TrainingCallback, TrainingController, TrainingOutcome,
};
use std::sync::Arc;
use tempfile::TempDir;

fn seed_checkpoint(store: &CheckpointStore, factory: &ScriptedFactory, accuracy: f64) {
    let state = factory.network().state().unwrap();
    store
        .save(&CheckpointRecord::new(state, accuracy, 3))
        .unwrap();
}

/// Requests a stop at the end of `epoch`.
struct StopAt {
    epoch: usize,
}

impl TrainingCallback for StopAt {
    fn on_epoch_end(&mut self, summary: &EpochSummary) -> CallbackAction {
        if summary.epoch == self.epoch {
            CallbackAction::Stop
        } else {
            CallbackAction::Continue
        }
    }
}

fn run_controller(
    dir: &TempDir,
    epochs: usize,
    stop_at: usize,
    script: Vec<f64>,
) -> (TrainingOutcome, CheckpointStore) {
    let mut recipe = recipe(epochs);
    recipe.milestones = vec![1, 2, 3];
    let store = CheckpointStore::new(dir.path().join("best.json"));
    let factory = ScriptedFactory::new(script);
    let mut network = factory.network();
    let mut optimizer = Sgd::new(SgdConfig::from(&recipe));
    let mut train = DataLoader::new(
        coded_dataset(40, 0),
        Pipeline::identity("train"),
        LoaderOptions::sequential(recipe.batch_size),
    )
    .unwrap();
    let mut validation = DataLoader::new(
        coded_dataset(100, 0),
        Pipeline::identity("eval"),
        LoaderOptions::sequential(recipe.batch_size),
    )
    .unwrap();

    let mut controller = TrainingController::new(recipe, store.clone())
        .with_callback(Box::new(StopAt { epoch: stop_at }));
    let outcome = controller
        .run(&mut network, &mut optimizer, &mut train, &mut validation)
        .unwrap();
    (outcome, store)
}

#[test]
fn test_callback_stop_ends_run_and_keeps_best_record() {
    let dir = TempDir::new().unwrap();
    let (outcome, store) = run_controller(&dir, 6, 2, vec![40.0, 55.0, 52.0, 70.0, 80.0, 90.0]);

    assert_eq!(outcome.epochs_run, 3);
    assert!(outcome.stopped_early);
    assert_eq!(outcome.metrics.val_accuracy_history, vec![40.0, 55.0, 52.0]);

    // one schedule step per completed epoch
    let schedule = MultiStepSchedule::new(vec![1, 2, 3], recipe(6).gamma);
    let expected: Vec<f64> = (0..3)
        .map(|e| recipe(6).learning_rate * schedule.multiplier(e))
        .collect();
    assert_eq!(outcome.metrics.learning_rate_history.len(), expected.len());
    for (got, want) in outcome.metrics.learning_rate_history.iter().zip(&expected) {
        assert!((got - want).abs() < 1e-12, "lr {got} != {want}");
    }

    assert_eq!(outcome.best_accuracy, 55.0);
    assert_eq!(outcome.best_epoch, Some(1));
    let record = store.load().unwrap().unwrap();
    assert_eq!(record.accuracy, 55.0);
    assert_eq!(record.epoch, 1);
}

#[test]
fn test_stop_on_final_epoch_is_not_early() {
    let dir = TempDir::new().unwrap();
    let (outcome, store) = run_controller(&dir, 3, 2, vec![40.0, 55.0, 60.0]);

    assert_eq!(outcome.epochs_run, 3);
    assert!(!outcome.stopped_early);
    assert_eq!(store.load().unwrap().unwrap().accuracy, 60.0);
}

#[test]
fn test_finite_loss_jump_runs_every_configured_epoch() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), 8);
    let factory = ScriptedFactory::new(vec![60.0]).with_wrong_train_pass(3);

    let decision = CheckpointGate::new(&config)
        .ensure_trained(&StubProvider::standard(), &factory)
        .unwrap();

    let GateDecision::Trained { outcome, passed } = decision else {
        panic!("expected training to run");
    };
    assert!(passed);
    assert_eq!(outcome.epochs_run, 8);
    assert!(!outcome.stopped_early);
    let losses = &outcome.metrics.loss_history;
    assert!(losses[3].is_finite());
    assert!(losses[3] > 10.0 * losses[0], "{losses:?}");
}

#[test]
fn test_best_record_follows_validation_peak() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), 3);
    let factory = ScriptedFactory::new(vec![40.0, 55.0, 52.0]);
    let provider = StubProvider::standard();

    let decision = CheckpointGate::new(&config)
        .ensure_trained(&provider, &factory)
        .unwrap();

    let GateDecision::Trained { outcome, passed } = decision else {
        panic!("expected training to run");
    };
    assert!(passed);
    assert_eq!(outcome.best_accuracy, 55.0);
    assert_eq!(outcome.best_epoch, Some(1));
    assert_eq!(outcome.metrics.val_accuracy_history, vec![40.0, 55.0, 52.0]);

    let record = CheckpointStore::new(&config.checkpoint.path)
        .load()
        .unwrap()
        .unwrap();
    assert_eq!(record.accuracy, 55.0);
    assert_eq!(record.epoch, 1);
}

#[test]
fn test_existing_checkpoint_skips_training_every_time() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), 3);
    let factory = ScriptedFactory::new(vec![60.0]);
    let provider = StubProvider::standard();
    seed_checkpoint(&CheckpointStore::new(&config.checkpoint.path), &factory, 61.0);

    let gate = CheckpointGate::new(&config);
    for _ in 0..2 {
        let decision = gate.ensure_trained(&provider, &factory).unwrap();
        assert!(decision.passed());
        assert!(!decision.trained());
    }
    assert_eq!(factory.builds.get(), 0);
    assert_eq!(factory.forwards.get(), 0);
    assert_eq!(provider.dataset_calls.get(), 0);
}

#[test]
fn test_stale_checkpoint_reused_unless_revalidation_requested() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), 1);
    let factory = ScriptedFactory::new(vec![70.0]);
    let provider = StubProvider::standard();
    let store = CheckpointStore::new(&config.checkpoint.path);
    seed_checkpoint(&store, &factory, 12.0);

    let decision = CheckpointGate::new(&config)
        .ensure_trained(&provider, &factory)
        .unwrap();
    assert!(!decision.trained());

    config.checkpoint.revalidate_accuracy = true;
    let decision = CheckpointGate::new(&config)
        .ensure_trained(&provider, &factory)
        .unwrap();
    assert!(decision.trained());
    assert!(decision.passed());
    assert_eq!(store.load().unwrap().unwrap().accuracy, 70.0);
}

#[test]
fn test_corrupt_checkpoint_triggers_retraining() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), 1);
    let path = &config.checkpoint.path;
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"not json at all").unwrap();

    let factory = ScriptedFactory::new(vec![65.0]);
    let decision = CheckpointGate::new(&config)
        .ensure_trained(&StubProvider::standard(), &factory)
        .unwrap();
    assert!(decision.trained());
    assert_eq!(factory.builds.get(), 1);
    assert_eq!(
        CheckpointStore::new(path).load().unwrap().unwrap().accuracy,
        65.0
    );
}

#[test]
fn test_extraction_preserves_count_and_label_order() {
    let factory = ScriptedFactory::new(vec![]);
    let mut network = factory.network();
    let dataset = coded_dataset(37, 3);
    let expected = dataset.labels().unwrap();

    let features = FeatureExtractor::new(8)
        .extract(
            &mut network,
            dataset,
            StubProvider::standard().pipeline(Augmentation::Eval),
        )
        .unwrap();

    assert_eq!(features.len(), 37);
    assert_eq!(features.labels(), expected.as_slice());
    assert_eq!(features.dim(), NUM_CLASSES);
}

#[test]
fn test_full_run_succeeds() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), 2);
    config.evaluation.report_path = Some(dir.path().join("report.json"));
    let factory = ScriptedFactory::new(vec![60.0, 70.0]);
    let provider = StubProvider::standard();

    let outcome = ExperimentOrchestrator::new(&config, &provider, &factory).run();

    assert!(outcome.success(), "{:?}", outcome.failure);
    assert_eq!(outcome.exit_code(), 0);
    let report = &outcome.report;
    assert!(report.trained);
    assert!(report.passed);
    assert_eq!(report.subset.unwrap().train, 40);
    assert_eq!(report.subset.unwrap().test, 8);
    let names: Vec<_> = report.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["logistic_regression", "knn", "naive_bayes", "nearest_centroid"]
    );
    assert!(report.results.iter().all(|r| r.accuracy == 100.0));
    assert_eq!(report.checkpoint.as_ref().unwrap().accuracy, 70.0);
    assert!(dir.path().join("report.json").exists());
    // one network for training, one restored for extraction
    assert_eq!(factory.builds.get(), 2);
}

#[test]
fn test_training_below_floor_skips_evaluation() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), 2);
    let factory = ScriptedFactory::new(vec![30.0, 45.0]);

    let outcome =
        ExperimentOrchestrator::new(&config, &StubProvider::standard(), &factory).run();

    assert!(matches!(
        outcome.failure,
        Some(RunFailure::TrainingQuality { .. })
    ));
    assert_eq!(outcome.exit_code(), 2);
    assert!(outcome.report.results.is_empty());
    assert_eq!(factory.builds.get(), 1);
}

#[test]
fn test_extraction_fault_on_test_split_fails_closed() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), 1);
    let factory = ScriptedFactory::new(vec![60.0]);
    seed_checkpoint(&CheckpointStore::new(&config.checkpoint.path), &factory, 60.0);
    let provider = StubProvider::new(
        coded_dataset(40, 0),
        Arc::new(FaultyDataset {
            inner: coded_dataset(100, 0),
            fail_from: 3,
        }),
    );

    let outcome = ExperimentOrchestrator::new(&config, &provider, &factory).run();

    match &outcome.failure {
        Some(RunFailure::Stage { stage, .. }) => assert_eq!(*stage, Stage::FeatureExtraction),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_ne!(outcome.exit_code(), 0);
    assert!(!outcome.report.passed);
}

#[test]
fn test_all_classifiers_below_floor_fails() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), 1);
    let factory = ScriptedFactory::new(vec![60.0]);
    seed_checkpoint(&CheckpointStore::new(&config.checkpoint.path), &factory, 60.0);
    // test labels never match the codes the features encode
    let provider = StubProvider::new(coded_dataset(40, 0), coded_dataset(100, 1));

    let outcome = ExperimentOrchestrator::new(&config, &provider, &factory).run();

    assert!(matches!(
        outcome.failure,
        Some(RunFailure::ClassifierQuality { .. })
    ));
    assert_eq!(outcome.exit_code(), 3);
    assert_eq!(outcome.report.results.len(), 4);
}

#[test]
fn test_unreadable_checkpoint_location_is_persistence_fault() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), 1);
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "x").unwrap();
    config.checkpoint.path = blocker.join("best.json");

    let outcome = ExperimentOrchestrator::new(
        &config,
        &StubProvider::standard(),
        &ScriptedFactory::new(vec![60.0]),
    )
    .run();

    assert!(matches!(outcome.failure, Some(RunFailure::Persistence(_))));
    assert_eq!(outcome.exit_code(), 5);
}

#[test]
fn test_provider_split_lookup() {
    let provider = StubProvider::standard();
    assert_eq!(provider.dataset(Split::Train).unwrap().len(), 40);
    assert_eq!(provider.dataset(Split::Test).unwrap().len(), 100);
}
