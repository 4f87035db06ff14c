use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::types::TaskStatus;

/// Monthly worklog file for `now`: `{worklog_dir}/YYYY-MM.md`.
pub fn worklog_path(worklog_dir: &Path, now: DateTime<Utc>) -> PathBuf {
    worklog_dir.join(format!("{}.md", now.format("%Y-%m")))
}

/// Render one entry.
///
/// ```text
/// ## {datetime} — {task}
///
/// - **Outcome:** {status}
/// - **Detail:** {detail}
///
/// ---
/// ```
pub fn format_entry(now: DateTime<Utc>, task: &str, status: TaskStatus, detail: &str) -> String {
    format!(
        "## {} — {}\n\n- **Outcome:** {}\n- **Detail:** {}\n\n---\n\n",
        now.to_rfc3339(),
        task,
        status,
        detail
    )
}

/// Append a task outcome to this month's worklog, creating directories as needed.
pub fn write_entry(
    worklog_dir: &Path,
    task: &str,
    status: TaskStatus,
    detail: &str,
) -> Result<(), String> {
    let now = Utc::now();
    let path = worklog_path(worklog_dir, now);

    fs::create_dir_all(worklog_dir).map_err(|e| {
        format!(
            "Failed to create worklog directory {}: {}",
            worklog_dir.display(),
            e
        )
    })?;

    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&path)
        .map_err(|e| format!("Failed to open worklog at {}: {}", path.display(), e))?;

    file.write_all(format_entry(now, task, status, detail).as_bytes())
        .map_err(|e| format!("Failed to write worklog at {}: {}", path.display(), e))?;

    Ok(())
}
