use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskweave::render::{format_task_line, spawn_renderer, LineRenderer, Renderer};
use taskweave::state::{StateTracker, TaskState};
use taskweave::types::TaskStatus;

fn state(status: TaskStatus, step: Option<&str>, message: Option<&str>) -> TaskState {
    TaskState {
        status,
        current_step: step.map(str::to_string),
        last_message: message.map(str::to_string),
    }
}

#[test]
fn line_omits_empty_parts() {
    assert_eq!(
        format_task_line("a", &state(TaskStatus::Pending, None, None)),
        "[a] pending"
    );
    assert_eq!(
        format_task_line(
            "a",
            &state(TaskStatus::Running, Some("Planning"), Some("reading files"))
        ),
        "[a] running | Planning | reading files"
    );
}

#[test]
fn only_changed_tasks_are_printed() {
    let mut renderer = LineRenderer::new(Vec::new());
    let mut snapshot = BTreeMap::new();
    snapshot.insert("a".to_string(), state(TaskStatus::Pending, None, None));
    snapshot.insert("b".to_string(), state(TaskStatus::Pending, None, None));

    renderer.observe(&snapshot);
    renderer.observe(&snapshot);
    snapshot.insert("b".to_string(), state(TaskStatus::Completed, None, None));
    renderer.observe(&snapshot);

    let output = String::from_utf8(renderer.into_inner()).unwrap();
    assert_eq!(output, "[a] pending\n[b] pending\n[b] completed\n");
}

/// Records every snapshot it is given.
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<BTreeMap<String, TaskState>>>>);

impl Renderer for Recorder {
    fn observe(&mut self, snapshot: &BTreeMap<String, TaskState>) {
        self.0.lock().unwrap().push(snapshot.clone());
    }
}

#[tokio::test]
async fn renderer_flag_spans_the_render_task() {
    let tracker = Arc::new(StateTracker::new());
    tracker.initialize(vec!["a"]);
    let recorder = Recorder::default();

    let handle = spawn_renderer(
        Arc::clone(&tracker),
        recorder.clone(),
        Duration::from_millis(5),
    );
    assert!(tracker.is_renderer_active());

    tracker.update_status("a", TaskStatus::Completed);
    handle.stop().await;

    assert!(!tracker.is_renderer_active());
    let seen = recorder.0.lock().unwrap();
    let last = seen.last().unwrap();
    assert_eq!(last["a"].status, TaskStatus::Completed);
}
