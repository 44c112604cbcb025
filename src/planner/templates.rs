//! Heuristic plan templates, one fixed step chain per intent action.

use serde_json::{Value, json};

use super::low_level;
use crate::actions;
use crate::models::{ActionPlan, Intent, Parameters, PlanStep, text_param};

pub const HEURISTIC_NOTES: &str = "Generated by heuristic planner";

/// Deterministic plan for `intent`
pub fn heuristic_plan(intent: &Intent) -> ActionPlan {
    let steps = if looks_like_launch(intent) {
        launch_steps(&intent.parameters)
    } else {
        template_steps(intent)
    };
    ActionPlan::new(intent.clone(), steps, Some(HEURISTIC_NOTES.to_string()))
}

/// Launch-shaped parameters override the classified action
pub fn looks_like_launch(intent: &Intent) -> bool {
    if intent.action == actions::EXECUTE_LOW_LEVEL {
        return false;
    }
    ["target", "command", "verb"]
        .iter()
        .any(|key| match intent.parameters.get(*key) {
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => text_param(&intent.parameters, key).is_some(),
            None => false,
        })
}

fn launch_steps(params: &Parameters) -> Vec<PlanStep> {
    vec![
        PlanStep::new(
            "launch_application",
            actions::LAUNCH_APPLICATION,
            "Launch the requested application for the user.",
        )
        .with_parameters(params.clone()),
    ]
}

/// Chain `steps` so each depends on the one before it
fn chained(steps: Vec<PlanStep>) -> Vec<PlanStep> {
    let mut previous: Option<String> = None;
    steps
        .into_iter()
        .map(|step| {
            let step = match previous.take() {
                Some(id) => step.after(id),
                None => step,
            };
            previous = Some(step.id.clone());
            step
        })
        .collect()
}

fn template_steps(intent: &Intent) -> Vec<PlanStep> {
    let params = &intent.parameters;
    match intent.action.as_str() {
        actions::OPTIMIZE_RESOURCES => chained(vec![
            PlanStep::new(
                "collect_metrics",
                actions::COLLECT_RESOURCE_METRICS,
                "Collect CPU, memory, and IO usage to understand current load.",
            ),
            PlanStep::new(
                "analyze_hotspots",
                actions::ANALYZE_RESOURCE_HOTSPOTS,
                "Analyze metrics to identify processes or services causing pressure.",
            ),
            PlanStep::new(
                "apply_tuning",
                actions::APPLY_RESOURCE_TUNING,
                "Apply scheduling or limit adjustments to balance resource usage.",
            )
            .with_parameters(params.clone()),
        ]),
        actions::MANAGE_PROCESS => chained(vec![
            PlanStep::new(
                "list_processes",
                actions::ENUMERATE_PROCESSES,
                "List relevant processes and capture their current state.",
            )
            .with_parameters(params.clone()),
            PlanStep::new(
                "evaluate_process_actions",
                actions::EVALUATE_PROCESS_ACTIONS,
                "Decide whether to reprioritize, pause, or terminate processes.",
            )
            .with_parameters(params.clone()),
            PlanStep::new(
                "apply_process_change",
                actions::APPLY_PROCESS_MANAGEMENT,
                "Perform the selected process management operations.",
            )
            .with_parameters(params.clone()),
        ]),
        actions::ASSIST_USER => chained(vec![
            PlanStep::new(
                "gather_context",
                actions::COLLECT_USER_CONTEXT,
                "Gather current desktop state and user goal for guidance.",
            )
            .with_parameters(params.clone()),
            PlanStep::new(
                "present_walkthrough",
                actions::PRESENT_WALKTHROUGH,
                "Prepare a walkthrough describing how to accomplish the task in the UI.",
            )
            .with_parameters(params.clone()),
            PlanStep::new(
                "queue_actions",
                actions::QUEUE_ACTIONS,
                "Queue any scripted clicks or commands the assistant can trigger for the user.",
            )
            .with_parameters(params.clone()),
        ]),
        actions::CONTROL_POINTER => {
            let mut focus = Parameters::new();
            focus.insert("focus".into(), json!("pointer"));
            chained(vec![
                PlanStep::new(
                    "capture_pointer_state",
                    actions::COLLECT_USER_CONTEXT,
                    "Capture current pointer position and focused surface for safety.",
                )
                .with_parameters(focus),
                PlanStep::new(
                    "apply_pointer_action",
                    actions::CONTROL_POINTER,
                    "Apply the requested pointer movement or click on behalf of the user.",
                )
                .with_parameters(params.clone()),
            ])
        }
        actions::SCHEDULE_TASK | actions::SCHEDULE_MAINTENANCE => chained(vec![
            PlanStep::new(
                "collect_requirements",
                actions::COLLECT_TASK_REQUIREMENTS,
                "Collect timing preferences and resource constraints for the task.",
            )
            .with_parameters(params.clone()),
            PlanStep::new(
                "draft_schedule",
                actions::CREATE_TASK_SCHEDULE,
                "Draft a schedule or cron entry that satisfies the requirements.",
            )
            .with_parameters(params.clone()),
            PlanStep::new(
                "publish_guidance",
                actions::PUBLISH_USER_GUIDANCE,
                "Share the resulting schedule and any follow-up actions with the user.",
            )
            .with_parameters(params.clone()),
        ]),
        actions::SYSTEM_UPDATE => chained(vec![
            PlanStep::new(
                "refresh_package_index",
                actions::RUN_COMMAND,
                "Update the package index to pull the latest metadata.",
            )
            .with_parameters(command_params(&["apt", "update"])),
            PlanStep::new(
                "apply_updates",
                actions::RUN_COMMAND,
                "Apply available system updates in non-interactive mode.",
            )
            .with_parameters(command_params(&["apt", "upgrade", "-y"])),
        ]),
        actions::EXECUTE_LOW_LEVEL => low_level_steps(intent),
        other => {
            let mut analysis = params.clone();
            analysis.insert("requested_action".into(), json!(other));
            vec![
                PlanStep::new(
                    "analyze",
                    actions::REVIEW_REQUEST,
                    "Analyze request and prepare manual runbook.",
                )
                .with_parameters(analysis),
            ]
        }
    }
}

fn command_params(command: &[&str]) -> Parameters {
    let mut params = Parameters::new();
    params.insert("command".into(), json!(command));
    params
}

fn low_level_steps(intent: &Intent) -> Vec<PlanStep> {
    let prepared = low_level::prepare_parameters(&intent.parameters, &intent.raw_input);
    let execute = PlanStep::new(
        "execute_low_level",
        actions::EXECUTE_LOW_LEVEL,
        "Compile and run the low-level launcher for the requested program.",
    );

    if low_level::has_source(&prepared) {
        return vec![execute.with_parameters(prepared)];
    }

    let mut inspect_params = Parameters::new();
    let request = text_param(&prepared, "original_request").unwrap_or(&intent.raw_input);
    inspect_params.insert("original_request".into(), json!(request));
    if let Some(candidate) = prepared
        .get(low_level::METADATA_KEY)
        .and_then(|meta| meta.get("candidate"))
    {
        inspect_params.insert("candidate".into(), candidate.clone());
    }

    chained(vec![
        PlanStep::new(
            "inspect_low_level_target",
            actions::INSPECT_LOW_LEVEL_TARGET,
            "Identify which executable the request refers to before generating code.",
        )
        .with_parameters(inspect_params),
        execute.with_parameters(prepared),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(action: &str, params: Value) -> Intent {
        Intent::new("request", action, params.as_object().cloned().unwrap_or_default(), 0.6)
    }

    fn ids(plan: &ActionPlan) -> Vec<&str> {
        plan.steps.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_process_manage_chain() {
        let plan = heuristic_plan(&intent(actions::MANAGE_PROCESS, json!({"name": "chrome"})));
        assert_eq!(ids(&plan), ["list_processes", "evaluate_process_actions", "apply_process_change"]);
        assert!(plan.steps[0].depends_on.is_empty());
        assert_eq!(plan.steps[1].depends_on, ["list_processes"]);
        assert_eq!(plan.steps[2].depends_on, ["evaluate_process_actions"]);
        assert_eq!(plan.steps[2].parameters["name"], "chrome");
        assert_eq!(plan.notes.as_deref(), Some(HEURISTIC_NOTES));
    }

    #[test]
    fn test_optimize_only_tuning_gets_parameters() {
        let plan = heuristic_plan(&intent(actions::OPTIMIZE_RESOURCES, json!({"pid": 42})));
        assert_eq!(ids(&plan), ["collect_metrics", "analyze_hotspots", "apply_tuning"]);
        assert!(plan.steps[0].parameters.is_empty());
        assert_eq!(plan.steps[2].parameters["pid"], 42);
    }

    #[test]
    fn test_pointer_plan_captures_state_first() {
        let plan = heuristic_plan(&intent(actions::CONTROL_POINTER, json!({"dx": -25})));
        assert_eq!(ids(&plan), ["capture_pointer_state", "apply_pointer_action"]);
        assert_eq!(plan.steps[0].action, actions::COLLECT_USER_CONTEXT);
        assert_eq!(plan.steps[0].parameters["focus"], "pointer");
        assert_eq!(plan.steps[1].parameters["dx"], -25);
    }

    #[test]
    fn test_maintenance_uses_schedule_template() {
        let plan = heuristic_plan(&intent(actions::SCHEDULE_MAINTENANCE, json!({})));
        assert_eq!(ids(&plan), ["collect_requirements", "draft_schedule", "publish_guidance"]);
    }

    #[test]
    fn test_update_commands() {
        let plan = heuristic_plan(&intent(actions::SYSTEM_UPDATE, json!({})));
        assert_eq!(plan.steps[0].parameters["command"], json!(["apt", "update"]));
        assert_eq!(plan.steps[1].parameters["command"], json!(["apt", "upgrade", "-y"]));
        assert_eq!(plan.steps[1].depends_on, ["refresh_package_index"]);
    }

    #[test]
    fn test_launch_override_beats_classified_action() {
        let plan = heuristic_plan(&intent(actions::MANAGE_PROCESS, json!({"target": "firefox"})));
        assert_eq!(ids(&plan), ["launch_application"]);
        assert_eq!(plan.steps[0].action, actions::LAUNCH_APPLICATION);

        let plan = heuristic_plan(&intent(actions::OPTIMIZE_RESOURCES, json!({"verb": "  "})));
        assert_eq!(plan.steps.len(), 3);
    }

    #[test]
    fn test_unknown_action_gets_single_analysis_step() {
        let plan = heuristic_plan(&intent(actions::PROVISION_GPU, json!({"vendor": "nvidia"})));
        assert_eq!(ids(&plan), ["analyze"]);
        assert_eq!(plan.steps[0].action, actions::REVIEW_REQUEST);
        assert_eq!(plan.steps[0].parameters["requested_action"], actions::PROVISION_GPU);
        assert_eq!(plan.steps[0].parameters["vendor"], "nvidia");
    }

    #[test]
    fn test_low_level_with_target_is_single_step() {
        let plan = heuristic_plan(&intent(
            actions::EXECUTE_LOW_LEVEL,
            json!({"target": "/bin/true", "language": "c"}),
        ));
        assert_eq!(ids(&plan), ["execute_low_level"]);
        assert!(plan.steps[0].parameters["source"].as_str().unwrap().contains("execvp"));
    }

    #[test]
    fn test_low_level_without_target_inspects_first() {
        let plan = heuristic_plan(&intent(
            actions::EXECUTE_LOW_LEVEL,
            json!({"original_request": "assembly please", "language": "assembly"}),
        ));
        assert_eq!(ids(&plan), ["inspect_low_level_target", "execute_low_level"]);
        assert_eq!(plan.steps[0].action, actions::INSPECT_LOW_LEVEL_TARGET);
        assert_eq!(plan.steps[1].depends_on, ["inspect_low_level_target"]);
    }
}
