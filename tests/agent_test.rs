use std::sync::Arc;
use std::time::Duration;

use taskweave::agent::{
    active_child_count, run_subprocess_agent, AgentOutput, MockPhaseRunner, PhaseRunner,
};
use taskweave::state::StateTracker;
use taskweave::types::Phase;

#[tokio::test]
async fn mock_runner_records_calls_and_failures() {
    let runner = MockPhaseRunner::new().failing("b", Phase::Review, "rejected");

    assert!(runner.run("a", Phase::Plan).await.is_ok());
    let err = runner.run("b", Phase::Review).await.unwrap_err();

    assert_eq!(err.reason, "rejected");
    assert_eq!(err.to_string(), "[b][REVIEW] rejected");
    assert_eq!(
        runner.calls(),
        vec![("a".to_string(), Phase::Plan), ("b".to_string(), Phase::Review)]
    );
    assert_eq!(runner.call_count("b", Phase::Review), 1);
}

#[tokio::test]
async fn mock_runner_tracks_overlap() {
    let runner = Arc::new(MockPhaseRunner::new().with_delay(Duration::from_millis(20)));

    let a = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move { runner.run("a", Phase::Implement).await })
    };
    let b = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move { runner.run("b", Phase::Implement).await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(runner.max_in_flight(), 2);
}

#[test]
fn output_follows_renderer_flag() {
    let tracker = Arc::new(StateTracker::new());
    tracker.initialize(vec!["a"]);
    assert!(matches!(
        AgentOutput::for_task(&tracker, "a"),
        AgentOutput::Inherit
    ));

    tracker.set_renderer_active(true);
    assert!(matches!(
        AgentOutput::for_task(&tracker, "a"),
        AgentOutput::Track { ref task, .. } if task == "a"
    ));
}

#[tokio::test]
async fn finished_agent_is_unregistered() {
    let mut cmd = tokio::process::Command::new("sh");
    cmd.args(["-c", "exit 0"]);
    run_subprocess_agent(cmd, Duration::from_secs(10), AgentOutput::Inherit)
        .await
        .unwrap();

    assert_eq!(active_child_count(), 0);
}
