//! Prompt assembly
//!
//! BUILD renders a user template with task placeholders. Prompts are opaque
//! to the rest of the engine; this is the only place that knows the
//! placeholder names.

use ralph_core::Task;

pub const DEFAULT_TEMPLATE: &str = "\
You are working through a task list one task at a time.

Current task ({{task_id}}): {{task_title}}

{{task_description}}

Work only on this task. Commit nothing else. When the task is fully
complete and verified, print this exact line on its own:
<promise>COMPLETE</promise>
";

pub fn render(template: &str, task: &Task) -> String {
    template
        .replace("{{task_id}}", &task.id)
        .replace("{{task_title}}", &task.title)
        .replace("{{task_description}}", &task.description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_parser::COMPLETION_SENTINEL;

    #[test]
    fn default_template_instructs_the_sentinel() {
        assert!(DEFAULT_TEMPLATE.contains(COMPLETION_SENTINEL));
    }

    #[test]
    fn placeholders_are_substituted() {
        let mut task = Task::new("T1", "Fix login");
        task.description = "The login page 500s.".into();
        let prompt = render(DEFAULT_TEMPLATE, &task);
        assert!(prompt.contains("(T1): Fix login"));
        assert!(prompt.contains("The login page 500s."));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn custom_template_is_used_verbatim() {
        let task = Task::new("T2", "thing");
        assert_eq!(render("do {{task_title}} now", &task), "do thing now");
    }
}
