use std::path::Path;

use crate::artifacts::{IMPLEMENTATION_FILE_NAME, PLAN_FILE_NAME, REVIEW_FILE_NAME};
use crate::resolver::DeadlockContext;
use crate::store::TASK_FILE_NAME;
use crate::tw_error::format_cycles;
use crate::types::Phase;

/// Build the prompt for one phase of one task.
///
/// Structure: [Autonomous Preamble] + [Task Files] + [Phase Instructions] + [Completion Contract]
pub fn build_phase_prompt(task: &str, phase: Phase, task_dir: &Path) -> String {
    [
        build_preamble(
            "Autonomous Agent",
            "You are running autonomously as part of the taskweave task workflow.\n\
            No human is available for questions. Use your judgment to make decisions.",
        ),
        build_task_files(task, task_dir),
        build_phase_instructions(phase, task_dir),
        build_completion_contract(phase, task_dir),
    ]
    .join("\n\n")
}

fn build_preamble(title: &str, mode: &str) -> String {
    format!("# {}\n\n{}", title, mode)
}

fn build_task_files(task: &str, task_dir: &Path) -> String {
    format!(
        "## Task\n\n\
        **Name:** {}\n\
        **Definition:** {}\n\
        **Plan:** {}\n\
        **Implementation notes:** {}\n\
        **Review:** {}",
        task,
        task_dir.join(TASK_FILE_NAME).display(),
        task_dir.join(PLAN_FILE_NAME).display(),
        task_dir.join(IMPLEMENTATION_FILE_NAME).display(),
        task_dir.join(REVIEW_FILE_NAME).display(),
    )
}

fn build_phase_instructions(phase: Phase, task_dir: &Path) -> String {
    let body = match phase {
        Phase::Plan => format!(
            "Read the task definition and the code it touches. Write a concrete, step-by-step \
            implementation plan to `{}`. Do not change any source code in this phase.",
            task_dir.join(PLAN_FILE_NAME).display()
        ),
        Phase::Implement => format!(
            "Implement the plan in `{}`. If `{}` contains review feedback, address every point \
            before anything else. Keep changes scoped to this task and make sure the project \
            still builds and its tests pass.",
            task_dir.join(PLAN_FILE_NAME).display(),
            task_dir.join(REVIEW_FILE_NAME).display()
        ),
        Phase::Review => format!(
            "Review the implementation of this task against its plan in `{}`. Check correctness, \
            tests and scope. Write your findings to `{}`.",
            task_dir.join(PLAN_FILE_NAME).display(),
            task_dir.join(REVIEW_FILE_NAME).display()
        ),
    };
    format!("## Instructions ({})\n\n{}", phase.label(), body)
}

fn build_completion_contract(phase: Phase, task_dir: &Path) -> String {
    let contract = match phase {
        Phase::Plan => format!(
            "The phase is complete once `{}` exists and is non-empty.",
            task_dir.join(PLAN_FILE_NAME).display()
        ),
        Phase::Implement => format!(
            "When the implementation is finished, write `{}` summarizing the change and \
            include the line `Status: complete`. If you could not finish, write \
            `Status: incomplete` and explain what remains.",
            task_dir.join(IMPLEMENTATION_FILE_NAME).display()
        ),
        Phase::Review => format!(
            "End `{}` with exactly one verdict line: `Verdict: approved` if the work is ready, \
            or `Verdict: changes requested` followed by the required changes. When requesting \
            changes, also change the `Status:` line in `{}` to `Status: incomplete`.",
            task_dir.join(REVIEW_FILE_NAME).display(),
            task_dir.join(IMPLEMENTATION_FILE_NAME).display()
        ),
    };
    format!("## Completion\n\n{}", contract)
}

/// Build the prompt asking an agent to break dependency cycles in the task files.
pub fn build_resolution_prompt(context: &DeadlockContext, tasks_dir: &Path) -> String {
    let mut sections = vec![build_preamble(
        "Autonomous Dependency Resolver",
        "You are running autonomously to unblock a stalled task graph. \
        No human is available for questions.",
    )];

    if context.cycles.is_empty() {
        sections.push("## Circular Dependencies\n\nNone detected.".to_string());
    } else {
        let lines: Vec<String> = context
            .cycles
            .iter()
            .map(|c| format!("- {}", format_cycles(std::slice::from_ref(c))))
            .collect();
        sections.push(format!("## Circular Dependencies\n\n{}", lines.join("\n")));
    }

    if !context.dangling.is_empty() {
        let lines: Vec<String> = context
            .dangling
            .iter()
            .map(|(task, dep)| format!("- `{}` depends on `{}`, which does not exist", task, dep))
            .collect();
        sections.push(format!("## Missing Dependencies\n\n{}", lines.join("\n")));
    }

    let pending: Vec<String> = context
        .pending
        .iter()
        .map(|p| {
            format!(
                "### {}\n\nFile: `{}`\nDeclared: [{}]\nUnmet: [{}]\n\n```markdown\n{}\n```",
                p.name,
                tasks_dir.join(&p.name).join(TASK_FILE_NAME).display(),
                p.dependencies.join(", "),
                p.unmet.join(", "),
                p.raw_declaration
            )
        })
        .collect();
    sections.push(format!("## Blocked Tasks\n\n{}", pending.join("\n\n")));

    let completed = if context.completed.is_empty() {
        "None".to_string()
    } else {
        context.completed.join(", ")
    };
    sections.push(format!("## Completed Tasks\n\n{}", completed));

    sections.push(
        "## Instructions\n\n\
        1. Edit only the `## Dependencies` sections of the task files listed above.\n\
        2. Make the smallest change that breaks every circular dependency. Remove the edge \
        that is least essential to the ordering of the work.\n\
        3. Do not remove dependencies that are not part of a cycle, except references to \
        tasks that do not exist.\n\
        4. Preserve all other content of each file exactly.\n\
        5. Do not create, delete, or rename task directories."
            .to_string(),
    );

    sections.join("\n\n")
}
