use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{log_debug, log_warn};
use crate::state::{StateTracker, TaskState};

/// Default polling period for [`spawn_renderer`].
pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(250);

/// Consumes tracker snapshots. Pull-based: the caller decides when to poll.
pub trait Renderer: Send {
    fn observe(&mut self, snapshot: &BTreeMap<String, TaskState>);
}

/// Prints one line per task whenever that task's state changes.
pub struct LineRenderer<W: Write + Send = io::Stderr> {
    out: W,
    last: HashMap<String, TaskState>,
}

impl LineRenderer<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> LineRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last: HashMap::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// `[name] status | step | message`, omitting empty parts.
pub fn format_task_line(name: &str, state: &TaskState) -> String {
    let mut line = format!("[{}] {}", name, state.status);
    if let Some(step) = &state.current_step {
        line.push_str(" | ");
        line.push_str(step);
    }
    if let Some(message) = &state.last_message {
        line.push_str(" | ");
        line.push_str(message);
    }
    line
}

impl<W: Write + Send> Renderer for LineRenderer<W> {
    fn observe(&mut self, snapshot: &BTreeMap<String, TaskState>) {
        for (name, state) in snapshot {
            if self.last.get(name) == Some(state) {
                continue;
            }
            if let Err(e) = writeln!(self.out, "{}", format_task_line(name, state)) {
                log_debug!("Renderer write failed: {}", e);
                return;
            }
            self.last.insert(name.clone(), state.clone());
        }
        let _ = self.out.flush();
    }
}

/// A running render task. [`RendererHandle::stop`] draws the final frame and
/// waits for it.
#[must_use = "dropping the handle leaves the render task running"]
pub struct RendererHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RendererHandle {
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            log_warn!("Renderer task panicked: {:?}", e);
        }
    }
}

/// Poll `tracker` every `interval` and feed snapshots to `renderer` until stopped.
///
/// The tracker's renderer-active flag is set for the lifetime of the task so
/// phase runners route agent output through the tracker instead of the terminal.
pub fn spawn_renderer<R: Renderer + 'static>(
    tracker: Arc<StateTracker>,
    mut renderer: R,
    interval: Duration,
) -> RendererHandle {
    let cancel = CancellationToken::new();
    let stopped = cancel.clone();
    tracker.set_renderer_active(true);
    let handle = tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    renderer.observe(&tracker.snapshot());
                }
                _ = stopped.cancelled() => {
                    renderer.observe(&tracker.snapshot());
                    break;
                }
            }
        }
        tracker.set_renderer_active(false);
    });
    RendererHandle { cancel, handle }
}
