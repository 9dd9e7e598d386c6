use approx::assert_abs_diff_eq;
use ewc_classifier::eval::metrics::threshold;
use ewc_classifier::neural::ewc;
use ewc_classifier::{
    column_f1, evaluate, get_loss, Activation, ContinualLearner, F1Score, Loss, Mlp, Model, NullProgress,
    OutputMode, PenaltyReduction, SyntheticConfig, SyntheticTaskGenerator, TrainingConfig,
};

fn config() -> TrainingConfig {
    TrainingConfig {
        epochs: 40,
        batch_size: 16,
        learning_rate: 0.01,
        ..Default::default()
    }
}

#[test]
fn test_learns_first_binary_task() {
    let cfg = config();
    let mut generator = SyntheticTaskGenerator::new(SyntheticConfig::default(), cfg.seed).unwrap();
    let task = generator.task(0);

    let net = Mlp::new(&[4, 16, 1], Activation::Relu, Activation::Sigmoid, cfg.seed).unwrap();
    let mut learner = ContinualLearner::new(Model::new(net, Loss::BinaryCrossEntropy, &cfg), cfg).unwrap();
    let report = learner.learn_task(&task, 1.0, &mut NullProgress).unwrap();
    assert_eq!(report.training.steps, 40 * 16);

    let result = evaluate(learner.model(), &task.inputs, &task.targets, Default::default()).unwrap();
    assert_eq!(result.mode, OutputMode::Binary);
    assert!(result.accuracy > 90.0, "accuracy {}", result.accuracy);
    let labels = threshold(&learner.model().predict(&task.inputs).unwrap(), 0.5);
    let columns = column_f1(&labels, &task.targets);
    assert_eq!(columns.len(), 1);
    match result.f1 {
        F1Score::Binary(f1) => assert_abs_diff_eq!(columns[0] * 100.0, f1, epsilon = 1e-3),
        other => panic!("expected binary F1, got {:?}", other),
    }
}

#[test]
fn test_multiclass_sequence_reports_per_class_f1() {
    let cfg = TrainingConfig { epochs: 5, ..config() };
    let data = SyntheticConfig { classes: 3, samples_per_task: 60, ..Default::default() };
    let mut generator = SyntheticTaskGenerator::new(data, cfg.seed).unwrap();
    let tasks = generator.sequence(2);

    let net = Mlp::new(&[4, 8, 3], Activation::Relu, Activation::Softmax, cfg.seed).unwrap();
    let mut learner = ContinualLearner::new(Model::new(net, Loss::CrossEntropy, &cfg), cfg).unwrap();
    learner.learn_task(&tasks[0], 1.0, &mut NullProgress).unwrap();
    let second = learner.learn_task(&tasks[1], 0.7, &mut NullProgress).unwrap();
    assert!(second.regularized);

    let results = learner.evaluate_tasks(&tasks).unwrap();
    for result in results {
        assert_eq!(result.mode, OutputMode::Multiclass(3));
        match result.f1 {
            F1Score::PerClass(scores) => assert_eq!(scores.len(), 3),
            other => panic!("expected per-class F1, got {:?}", other),
        }
    }

    let losses = get_loss(learner.model(), &tasks[0].inputs, &tasks[0].targets, 7).unwrap();
    assert_eq!(losses.len(), 60);
    assert!(losses.iter().all(|l| l.is_finite() && *l >= 0.0));
}

#[test]
fn test_consolidation_limits_drift_from_previous_task() {
    let cfg = TrainingConfig { penalty_reduction: PenaltyReduction::Sum, ..config() };
    let mut generator = SyntheticTaskGenerator::new(SyntheticConfig::default(), cfg.seed).unwrap();
    let tasks = generator.sequence(2);

    let build = |cfg: &TrainingConfig| {
        let net = Mlp::new(&[4, 16, 1], Activation::Relu, Activation::Sigmoid, cfg.seed).unwrap();
        Model::new(net, Loss::BinaryCrossEntropy, cfg)
    };

    let mut with_ewc = ContinualLearner::new(build(&cfg), cfg.clone()).unwrap();
    let mut without = ContinualLearner::new(build(&cfg), cfg.clone()).unwrap().without_ewc();
    for learner in [&mut with_ewc, &mut without] {
        learner.learn_task(&tasks[0], 1.0, &mut NullProgress).unwrap();
    }
    let anchor = with_ewc.snapshot().unwrap();
    for learner in [&mut with_ewc, &mut without] {
        learner.learn_task(&tasks[1], 1.0, &mut NullProgress).unwrap();
    }

    // Both runs are identical through task 0, so the same snapshot measures drift.
    let drift_ewc = ewc::penalty(with_ewc.model().parameters(), &anchor, PenaltyReduction::Sum).unwrap();
    let drift_plain = ewc::penalty(without.model().parameters(), &anchor, PenaltyReduction::Sum).unwrap();
    assert!(drift_ewc < drift_plain, "ewc drift {} vs plain {}", drift_ewc, drift_plain);
}
