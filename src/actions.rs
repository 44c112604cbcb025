//! Action identifiers understood by the parser, planner and capability registry.

// Intent-level actions
pub const CONTROL_POINTER: &str = "ui.control_pointer";
pub const LAUNCH_APPLICATION: &str = "application.launch";
pub const OPTIMIZE_RESOURCES: &str = "system.optimize_resources";
pub const MANAGE_PROCESS: &str = "process.manage";
pub const ASSIST_USER: &str = "ui.assist_user";
pub const SCHEDULE_TASK: &str = "system.schedule_task";
pub const SCHEDULE_MAINTENANCE: &str = "orchestration.schedule_maintenance";
pub const SYSTEM_UPDATE: &str = "system.update";
pub const PROVISION_GPU: &str = "hardware.provision_gpu_stack";
pub const CONFIGURE_NETWORK: &str = "network.configure";
pub const EXECUTE_LOW_LEVEL: &str = "system.execute_low_level";
pub const REVIEW_REQUEST: &str = "analysis.review_request";

// Step-level actions
pub const COLLECT_RESOURCE_METRICS: &str = "system.collect_resource_metrics";
pub const ANALYZE_RESOURCE_HOTSPOTS: &str = "system.analyze_resource_hotspots";
pub const APPLY_RESOURCE_TUNING: &str = "system.apply_resource_tuning";
pub const ENUMERATE_PROCESSES: &str = "process.enumerate";
pub const EVALUATE_PROCESS_ACTIONS: &str = "process.evaluate_actions";
pub const APPLY_PROCESS_MANAGEMENT: &str = "process.apply_management";
pub const COLLECT_USER_CONTEXT: &str = "ui.collect_user_context";
pub const PRESENT_WALKTHROUGH: &str = "ui.present_walkthrough";
pub const QUEUE_ACTIONS: &str = "ui.queue_actions";
pub const COLLECT_TASK_REQUIREMENTS: &str = "system.collect_task_requirements";
pub const CREATE_TASK_SCHEDULE: &str = "scheduler.create_task_schedule";
pub const PUBLISH_USER_GUIDANCE: &str = "scheduler.publish_user_guidance";
pub const RUN_COMMAND: &str = "system.run_command";
pub const INSPECT_LOW_LEVEL_TARGET: &str = "analysis.inspect_low_level_target";
pub const ENSURE_PYTHON_PACKAGE: &str = "python.ensure_package";
pub const WRITE_BLUEPRINT: &str = "automation.write_blueprint";

/// Baseline safety deny-list
pub const DEFAULT_DISALLOWED: &[&str] = &["system.shutdown"];
