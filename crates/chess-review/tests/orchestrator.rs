//! Orchestrator behavior with a counting evaluator.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chess_review::{
    AnalysisConfig, AnalysisError, AnalysisOrchestrator, BatchOutcome, ChannelConfig, ChannelError,
    EnsureOutcome,
};
use common::{connect, game, lines, CountingEvaluator, FakeEngine};

type Orchestrator = AnalysisOrchestrator<CountingEvaluator>;

fn shared(evaluator: CountingEvaluator) -> Arc<Orchestrator> {
    Arc::new(AnalysisOrchestrator::new(evaluator, AnalysisConfig::default()))
}

/// Wait until the active sweep has reached `ply`.
async fn wait_for_ply(orchestrator: &Orchestrator, ply: u32) {
    for _ in 0..500 {
        if orchestrator
            .batch_progress()
            .is_some_and(|progress| progress.current_ply >= ply)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("batch never reached ply {}", ply);
}

#[tokio::test]
async fn batch_evaluates_each_position_once_in_order() {
    let (evaluator, probe) = CountingEvaluator::new();
    let orchestrator = shared(evaluator.failing_on(3));
    orchestrator.load_game(game(6)).unwrap();

    let outcome = orchestrator.run_batch().await.unwrap();
    assert_eq!(outcome, BatchOutcome::Completed { analyzed: 6, failed: 1 });
    assert_eq!(probe.calls(), 6);
    assert_eq!(
        probe.fens(),
        vec!["fen-0", "fen-1", "fen-2", "fen-3", "fen-4", "fen-5"]
    );
    assert!(!probe.overlapped());

    let history = orchestrator.history();
    assert_eq!(history.len(), 6);
    let failed = history.get(3).unwrap();
    assert_eq!(failed.score, 0.0);
    assert!(failed.bestmove.is_empty());
    assert_eq!(failed.comment.as_deref(), Some("analysis failed"));
    assert_eq!(history.failed_plies(), vec![3]);
}

#[tokio::test]
async fn batch_classifies_once_finished() {
    let (evaluator, _) = CountingEvaluator::new();
    let orchestrator = shared(evaluator.with_scores(&[0.0, 2.0, 1.5, 1.4]));
    orchestrator.load_game(game(4)).unwrap();
    orchestrator.run_batch().await.unwrap();

    let classification = orchestrator.classification();
    assert_eq!(classification.blunders, vec![2]);
    assert_eq!(classification.comment(2), Some("Blunder!"));

    let stats = orchestrator.stats();
    assert_eq!(stats.total_moves, 3);
    assert_eq!(stats.blunders, 1);
}

#[tokio::test]
async fn concurrent_requests_for_one_ply_hit_the_engine_once() {
    let (evaluator, probe) = CountingEvaluator::new();
    let orchestrator = shared(evaluator.with_delay(Duration::from_millis(20)));
    orchestrator.load_game(game(3)).unwrap();

    let (first, second) = tokio::join!(
        orchestrator.ensure_analyzed(2),
        orchestrator.ensure_analyzed(2)
    );
    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|outcome| *outcome == EnsureOutcome::Cached);
    assert_eq!(outcomes, vec![EnsureOutcome::Analyzed, EnsureOutcome::Cached]);
    assert_eq!(probe.calls(), 1);
    assert!(!probe.overlapped());
}

#[tokio::test]
async fn on_demand_requests_are_deferred_during_a_batch() {
    let (evaluator, probe) = CountingEvaluator::new();
    let orchestrator = shared(evaluator.with_delay(Duration::from_millis(10)));
    orchestrator.load_game(game(5)).unwrap();

    let sweep = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.run_batch().await }
    });
    wait_for_ply(&orchestrator, 1).await;

    assert!(orchestrator.is_running());
    assert_eq!(orchestrator.ensure_analyzed(4).await.unwrap(), EnsureOutcome::Deferred);
    assert_eq!(orchestrator.run_batch().await.unwrap(), BatchOutcome::AlreadyRunning);

    let outcome = sweep.await.unwrap().unwrap();
    assert_eq!(outcome, BatchOutcome::Completed { analyzed: 5, failed: 0 });
    assert_eq!(probe.calls(), 5);
    assert!(!probe.overlapped());
}

#[tokio::test]
async fn loading_a_game_mid_batch_drops_the_sweep() {
    let (evaluator, _) = CountingEvaluator::new();
    let orchestrator = shared(evaluator.with_delay(Duration::from_millis(10)));
    orchestrator.load_game(game(8)).unwrap();

    let sweep = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.run_batch().await }
    });
    wait_for_ply(&orchestrator, 2).await;

    orchestrator.load_game(game(3)).unwrap();
    assert!(!orchestrator.is_running());
    assert!(orchestrator.history().is_empty());
    assert_eq!(orchestrator.current_ply(), 0);

    assert_eq!(sweep.await.unwrap().unwrap(), BatchOutcome::Superseded);
    assert!(orchestrator.history().is_empty());
    assert_eq!(orchestrator.positions().len(), 3);
}

#[tokio::test]
async fn cancelling_keeps_the_previous_history() {
    let (evaluator, _) = CountingEvaluator::new();
    let orchestrator = shared(
        evaluator
            .with_scores(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6])
            .with_delay(Duration::from_millis(10)),
    );
    orchestrator.load_game(game(6)).unwrap();
    orchestrator.ensure_analyzed(0).await.unwrap();
    orchestrator.ensure_analyzed(1).await.unwrap();
    let before = orchestrator.history();

    let sweep = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.run_batch().await }
    });
    wait_for_ply(&orchestrator, 2).await;
    assert!(orchestrator.cancel_batch());

    match sweep.await.unwrap().unwrap() {
        BatchOutcome::Cancelled { at_ply } => assert!((3..=6).contains(&at_ply)),
        other => panic!("expected cancellation, got {:?}", other),
    }
    assert!(!orchestrator.is_running());
    assert_eq!(orchestrator.history(), before);
    assert!(!orchestrator.cancel_batch());
}

#[tokio::test]
async fn cancel_during_last_evaluation_keeps_the_history() {
    let (evaluator, probe) = CountingEvaluator::new();
    let orchestrator = shared(evaluator.with_delay(Duration::from_millis(30)));
    orchestrator.load_game(game(3)).unwrap();

    let sweep = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.run_batch().await }
    });
    while probe.calls() < 3 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(orchestrator.cancel_batch());

    assert_eq!(
        sweep.await.unwrap().unwrap(),
        BatchOutcome::Cancelled { at_ply: 3 }
    );
    assert!(orchestrator.history().is_empty());
    assert!(!orchestrator.is_running());
}

#[tokio::test]
async fn game_loaded_during_last_evaluation_gets_no_old_results() {
    let (evaluator, probe) = CountingEvaluator::new();
    let orchestrator = shared(evaluator.with_delay(Duration::from_millis(30)));
    orchestrator.load_game(game(3)).unwrap();

    let sweep = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.run_batch().await }
    });
    while probe.calls() < 3 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    orchestrator.load_game(game(5)).unwrap();

    assert_eq!(sweep.await.unwrap().unwrap(), BatchOutcome::Superseded);
    assert!(orchestrator.history().is_empty());
    assert!(orchestrator.classification().labels.is_empty());
}

#[tokio::test]
async fn dropped_batch_frees_the_orchestrator() {
    let (evaluator, probe) = CountingEvaluator::new();
    let orchestrator = shared(evaluator.with_delay(Duration::from_millis(50)));
    orchestrator.load_game(game(3)).unwrap();

    let timed_out =
        tokio::time::timeout(Duration::from_millis(20), orchestrator.run_batch()).await;
    assert!(timed_out.is_err());
    assert!(!orchestrator.is_running());
    assert_eq!(orchestrator.batch_progress(), None);
    assert!(orchestrator.history().is_empty());

    assert_eq!(
        orchestrator.ensure_analyzed(1).await.unwrap(),
        EnsureOutcome::Analyzed
    );
    assert_eq!(
        orchestrator.run_batch().await.unwrap(),
        BatchOutcome::Completed { analyzed: 3, failed: 0 }
    );
    assert_eq!(probe.calls(), 5);
}

#[tokio::test]
async fn in_flight_result_for_a_replaced_game_is_discarded() {
    let (evaluator, probe) = CountingEvaluator::new();
    let orchestrator = shared(evaluator.with_delay(Duration::from_millis(30)));
    orchestrator.load_game(game(4)).unwrap();

    let request = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.ensure_analyzed(3).await }
    });
    while probe.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    orchestrator.load_game(game(4)).unwrap();

    assert_eq!(request.await.unwrap().unwrap(), EnsureOutcome::Discarded);
    assert!(orchestrator.history().is_empty());
}

#[tokio::test]
async fn batch_replaces_lazy_results() {
    let (evaluator, probe) = CountingEvaluator::new();
    let orchestrator = shared(evaluator.with_scores(&[0.0, 0.5, 0.5]));
    orchestrator.load_game(game(3)).unwrap();
    orchestrator.ensure_analyzed(1).await.unwrap();

    orchestrator.run_batch().await.unwrap();
    assert_eq!(probe.calls(), 4);
    assert_eq!(orchestrator.history().len(), 3);
    assert_eq!(
        orchestrator.ensure_analyzed(1).await.unwrap(),
        EnsureOutcome::Cached
    );
}

#[tokio::test]
async fn busy_evaluator_is_reported_as_failure() {
    let (mut evaluator, _) = CountingEvaluator::new();
    evaluator.busy = true;
    let orchestrator = shared(evaluator);
    orchestrator.load_game(game(2)).unwrap();

    let err = orchestrator.ensure_analyzed(1).await.unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::Channel(ChannelError::EvaluationFailed(_))
    ));
}

#[tokio::test]
async fn depth_change_applies_to_next_batch() {
    let (mut channel, received) = connect(
        FakeEngine::new(|_| lines(&["info depth 1 score cp 10", "bestmove e2e4"])),
        ChannelConfig::default(),
    );
    channel.initialize().await.unwrap();
    let orchestrator = AnalysisOrchestrator::new(channel, AnalysisConfig::default());
    orchestrator.load_game(game(2)).unwrap();

    orchestrator.set_depth(7).unwrap();
    orchestrator.run_batch().await.unwrap();

    let gos: Vec<String> = received
        .lock()
        .unwrap()
        .iter()
        .filter(|line| line.starts_with("go"))
        .cloned()
        .collect();
    assert_eq!(gos, vec!["go depth 7", "go depth 7"]);

    let mut channel = orchestrator.into_evaluator();
    channel.terminate().await;
}
