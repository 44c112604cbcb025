//! Intent parsing
//!
//! Turns request text plus ambient context into an [`Intent`]. With a model
//! client the model proposes the intent; without one, or when the model
//! misbehaves, a keyword table classifies the request.

use regex::Regex;
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};

use crate::actions;
use crate::error::{OrchestratorError, Result};
use crate::model::{self, ChatClient, ModelError};
use crate::models::{Context, Intent, Parameters};
use crate::types::{CodeLanguage, PointerDirection, PointerOperation};

const INTENT_SYSTEM_PROMPT: &str = "You are the intent parser for the Ainux operating system.\n\
Users describe high level goals involving hardware automation, scheduling, \
or system management. Read the request and produce a concise JSON object \
describing the normalized intent.\n\n\
Respond using the following JSON schema:\n\
{\n\
  \"action\": string // dotted identifier describing the goal\n\
  \"confidence\": number // between 0 and 1\n\
  \"parameters\": object // optional parameters inferred from the request\n\
  \"reasoning\": string // one sentence summary explaining the decision\n\
}\n\n\
If you are unsure, choose the closest action and lower the confidence.";

/// Default pointer move in pixels, and the qualified variants
pub const POINTER_DEFAULT_DISTANCE: i64 = 100;
pub const POINTER_SMALL_DISTANCE: i64 = 25;
pub const POINTER_LARGE_DISTANCE: i64 = 400;

struct Rule {
    action: &'static str,
    confidence: f64,
    keywords: &'static [&'static str],
    /// Whole-word matches (ASCII words only)
    words: &'static [&'static str],
}

/// Keyword table; the first matching rule wins
const RULES: &[Rule] = &[
    Rule {
        action: actions::EXECUTE_LOW_LEVEL,
        confidence: 0.65,
        keywords: &["assembly", "machine code", "binary", "어셈", "기계어", "c program", "c code"],
        words: &["asm", "in c"],
    },
    Rule {
        action: actions::CONTROL_POINTER,
        confidence: 0.75,
        keywords: &["mouse", "cursor", "pointer", "마우스", "커서"],
        words: &[],
    },
    Rule {
        action: actions::PROVISION_GPU,
        confidence: 0.7,
        keywords: &["cuda", "gpu", "driver", "드라이버"],
        words: &[],
    },
    Rule {
        action: actions::MANAGE_PROCESS,
        confidence: 0.65,
        keywords: &["process", "kill", "terminate", "프로세스", "종료"],
        words: &[],
    },
    Rule {
        action: actions::OPTIMIZE_RESOURCES,
        confidence: 0.65,
        keywords: &["optimiz", "slow", "resource", "memory usage", "cpu usage", "최적화", "느려"],
        words: &[],
    },
    Rule {
        action: actions::SCHEDULE_MAINTENANCE,
        confidence: 0.6,
        keywords: &["maint", "유지보수"],
        words: &[],
    },
    Rule {
        action: actions::SCHEDULE_TASK,
        confidence: 0.6,
        keywords: &["schedule", "cron", "remind", "스케줄", "예약"],
        words: &[],
    },
    Rule {
        action: actions::CONFIGURE_NETWORK,
        confidence: 0.6,
        keywords: &["network", "firewall", "packet", "패킷", "방화벽"],
        words: &[],
    },
    Rule {
        action: actions::SYSTEM_UPDATE,
        confidence: 0.5,
        keywords: &["update", "upgrade", "업데이트"],
        words: &[],
    },
    Rule {
        action: actions::ASSIST_USER,
        confidence: 0.55,
        keywords: &["how do i", "how to", "help me", "show me", "도와", "어떻게"],
        words: &[],
    },
];

const LAUNCH_CONFIDENCE: f64 = 0.7;
const DEFAULT_CONFIDENCE: f64 = 0.4;

static LAUNCH_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(open|launch|start|run|execute)\s+(?:the\s+|a\s+|an\s+)?([\w./-]+)")
        .expect("valid launch regex")
});
static LAUNCH_KO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\w./-]+?)\s*(?:을|를)?\s*(실행|열어|켜)").expect("valid launch regex")
});
static CLOCK_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").expect("valid time regex"));
static MERIDIEM_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").expect("valid time regex")
});
static KOREAN_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})시(?:\s*(\d{1,2})분)?").expect("valid time regex")
});
static KOREAN_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(월|화|수|목|금|토|일)요일").expect("valid day regex"));
static ENGLISH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
        .expect("valid day regex")
});
// digit runs bounded by non-digits; `\b` never fires between "150" and "픽셀"
static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\D)(\d{1,5})(?:\D|$)").expect("valid integer regex"));
static LARGE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:far|much)\b").expect("valid qualifier regex"));
static DIRECTION_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(left|right|up|down)\b").expect("valid direction regex"));

/// Convert natural language requests into structured intents.
#[derive(Clone, Default)]
pub struct IntentParser {
    client: Option<Arc<dyn ChatClient>>,
}

impl IntentParser {
    pub fn new(client: Option<Arc<dyn ChatClient>>) -> Self {
        Self { client }
    }

    /// Parse `request`; only an empty request is an error.
    pub fn parse(&self, request: &str, context: &Context) -> Result<Intent> {
        let request = request.trim();
        if request.is_empty() {
            return Err(OrchestratorError::invalid_request("Request must not be empty"));
        }

        Ok(model::with_model_fallback(
            self.client.as_deref(),
            "intent",
            |client| parse_with_model(client, request, context),
            || heuristic_parse(request, context),
        ))
    }
}

fn parse_with_model(
    client: &dyn ChatClient,
    request: &str,
    context: &Context,
) -> std::result::Result<Intent, ModelError> {
    let payload = json!({"request": request, "context": context});
    let reply = model::request_json_object(client, INTENT_SYSTEM_PROMPT, &payload, model::INTENT_SEED)?;

    let action = reply
        .get("action")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(actions::REVIEW_REQUEST);
    let confidence = match reply.get("confidence") {
        None | Some(Value::Null) => 0.0,
        Some(value) => value
            .as_f64()
            .ok_or_else(|| ModelError::invalid_payload("confidence must be a number"))?,
    };
    let parameters = match reply.get("parameters") {
        None | Some(Value::Null) => Parameters::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            let mut wrapped = Parameters::new();
            wrapped.insert("value".into(), other.clone());
            wrapped
        }
    };

    let mut intent = Intent::new(request, action, parameters, confidence);
    intent.reasoning = reply.get("reasoning").and_then(|r| match r {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    });
    intent.context_snapshot = Some(context.clone());
    Ok(intent)
}

/// Keyword classification used when no model is available
pub fn heuristic_parse(request: &str, context: &Context) -> Intent {
    let lowered = request.to_lowercase();
    let mut parameters = Parameters::new();

    let (action, confidence) = match RULES.iter().find(|rule| rule_matches(rule, &lowered)) {
        Some(rule) => (rule.action, rule.confidence),
        None => match launch_target(&lowered) {
            Some((verb, target)) => {
                parameters.insert("verb".into(), json!(verb));
                parameters.insert("target".into(), json!(target));
                parameters.insert("command".into(), json!(target));
                (actions::LAUNCH_APPLICATION, LAUNCH_CONFIDENCE)
            }
            None => (actions::REVIEW_REQUEST, DEFAULT_CONFIDENCE),
        },
    };

    match action {
        actions::CONTROL_POINTER => parameters.extend(pointer_parameters(&lowered)),
        actions::EXECUTE_LOW_LEVEL => {
            parameters.insert("language".into(), json!(requested_language(&lowered).to_string()));
            parameters.insert("original_request".into(), json!(request));
        }
        _ => {}
    }

    if let Some(time) = requested_time(&lowered) {
        parameters.insert("requested_time".into(), json!(time));
    }
    if let Some(day) = requested_day(request) {
        parameters.insert("requested_day".into(), json!(day));
    }

    let mut intent = Intent::new(request, action, parameters, confidence)
        .with_reasoning("Heuristic parser");
    intent.context_snapshot = Some(context.clone());
    intent
}

fn rule_matches(rule: &Rule, lowered: &str) -> bool {
    rule.keywords.iter().any(|k| lowered.contains(k))
        || rule.words.iter().any(|w| contains_word(lowered, w))
}

/// Substring match bounded by non-alphanumeric characters on both sides
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn launch_target(lowered: &str) -> Option<(String, String)> {
    if let Some(caps) = LAUNCH_EN.captures(lowered) {
        return Some((caps[1].to_string(), caps[2].to_string()));
    }
    LAUNCH_KO
        .captures(lowered)
        .map(|caps| (caps[2].to_string(), caps[1].to_string()))
}

fn requested_language(lowered: &str) -> CodeLanguage {
    if ["machine code", "binary", "기계어"].iter().any(|k| lowered.contains(k)) {
        CodeLanguage::Machine
    } else if lowered.contains("assembly") || lowered.contains("어셈") || contains_word(lowered, "asm")
    {
        CodeLanguage::Assembly
    } else {
        CodeLanguage::C
    }
}

fn pointer_operation(lowered: &str) -> PointerOperation {
    let any = |keys: &[&str]| keys.iter().any(|k| lowered.contains(k));
    if any(&["double click", "double-click", "더블 클릭", "더블클릭"]) {
        PointerOperation::DoubleClick
    } else if any(&["right click", "right-click", "우클릭", "오른쪽 클릭"]) {
        PointerOperation::RightClick
    } else if any(&["click", "클릭"]) {
        PointerOperation::Click
    } else if any(&["where", "locate", "position", "위치"]) {
        PointerOperation::Locate
    } else {
        PointerOperation::Move
    }
}

fn pointer_direction(lowered: &str) -> Option<PointerDirection> {
    // "right click" names a button, not a direction
    let text = lowered
        .replace("right click", " ")
        .replace("right-click", " ")
        .replace("오른쪽 클릭", " ");
    if let Some(caps) = DIRECTION_WORD.captures(&text) {
        return caps[1].parse().ok();
    }
    [
        ("왼쪽", PointerDirection::Left),
        ("오른쪽", PointerDirection::Right),
        ("위로", PointerDirection::Up),
        ("위쪽", PointerDirection::Up),
        ("아래", PointerDirection::Down),
    ]
    .iter()
    .find(|(keyword, _)| text.contains(keyword))
    .map(|(_, direction)| *direction)
}

fn pointer_distance(lowered: &str) -> i64 {
    if let Some(value) = INTEGER
        .captures(lowered)
        .and_then(|caps| caps[1].parse::<i64>().ok())
    {
        return value;
    }
    let any = |keys: &[&str]| keys.iter().any(|k| lowered.contains(k));
    if any(&["a little", "slightly", "a bit", "조금", "살짝"]) {
        POINTER_SMALL_DISTANCE
    } else if any(&["a lot", "많이"]) || LARGE_WORD.is_match(lowered) {
        POINTER_LARGE_DISTANCE
    } else {
        POINTER_DEFAULT_DISTANCE
    }
}

fn pointer_parameters(lowered: &str) -> Parameters {
    let mut params = Parameters::new();
    let operation = pointer_operation(lowered);

    match pointer_direction(lowered) {
        Some(direction) => {
            let distance = pointer_distance(lowered);
            let (dx, dy) = direction.offset(distance);
            params.insert("operation".into(), json!(PointerOperation::Move.to_string()));
            params.insert("direction".into(), json!(direction.to_string()));
            params.insert("distance".into(), json!(distance));
            params.insert("dx".into(), json!(dx));
            params.insert("dy".into(), json!(dy));
            let clicks = matches!(
                operation,
                PointerOperation::Click | PointerOperation::DoubleClick | PointerOperation::RightClick
            );
            params.insert("click_after".into(), json!(clicks));
            if clicks {
                params.insert("click_operation".into(), json!(operation.to_string()));
            }
        }
        None => {
            params.insert("operation".into(), json!(operation.to_string()));
        }
    }
    params
}

/// `H:MM`, `H시[ MM분]` or `H[:MM]am|pm`, normalized to 24h `H:MM`
fn requested_time(lowered: &str) -> Option<String> {
    if let Some(caps) = MERIDIEM_TIME.captures(lowered) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if (1..=12).contains(&hour) && minute < 60 {
            let hour = match (&caps[3], hour) {
                ("am", 12) => 0,
                ("am", h) => h,
                ("pm", 12) => 12,
                (_, h) => h + 12,
            };
            return Some(format!("{}:{:02}", hour, minute));
        }
    }
    let caps = CLOCK_TIME
        .captures(lowered)
        .or_else(|| KOREAN_TIME.captures(lowered))?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    (hour < 24 && minute < 60).then(|| format!("{}:{:02}", hour, minute))
}

fn requested_day(request: &str) -> Option<String> {
    if let Some(m) = KOREAN_DAY.find(request) {
        return Some(m.as_str().to_string());
    }
    ENGLISH_DAY
        .captures(&request.to_lowercase())
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::ScriptedClient;

    fn parse(request: &str) -> Intent {
        IntentParser::default().parse(request, &Context::new()).unwrap()
    }

    // =========================================================================
    // Classification
    // =========================================================================

    #[test]
    fn test_empty_request_is_rejected() {
        let err = IntentParser::default().parse("   ", &Context::new()).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
    }

    #[test]
    fn test_default_is_review_request() {
        let intent = parse("tell me something interesting");
        assert_eq!(intent.action, actions::REVIEW_REQUEST);
        assert_eq!(intent.confidence, 0.4);
        assert_eq!(intent.reasoning.as_deref(), Some("Heuristic parser"));
    }

    #[test]
    fn test_keyword_classification() {
        assert_eq!(parse("kill the stuck process").action, actions::MANAGE_PROCESS);
        assert_eq!(parse("my laptop is slow, optimize it").action, actions::OPTIMIZE_RESOURCES);
        assert_eq!(parse("install the cuda toolkit").action, actions::PROVISION_GPU);
        assert_eq!(parse("schedule a backup").action, actions::SCHEDULE_TASK);
        assert_eq!(parse("plan maintenance for tonight").action, actions::SCHEDULE_MAINTENANCE);
        assert_eq!(parse("block packets on the firewall").action, actions::CONFIGURE_NETWORK);
        assert_eq!(parse("upgrade everything").action, actions::SYSTEM_UPDATE);
        assert_eq!(parse("how do I change my wallpaper").action, actions::ASSIST_USER);
        assert_eq!(parse("프로세스 정리해줘").action, actions::MANAGE_PROCESS);
    }

    #[test]
    fn test_confidence_stays_in_heuristic_band() {
        for request in ["move the mouse", "open firefox", "hello", "update", "write asm"] {
            let confidence = parse(request).confidence;
            assert!((0.4..=0.8).contains(&confidence), "{request}: {confidence}");
        }
    }

    #[test]
    fn test_launch_extracts_target() {
        let intent = parse("Open the Firefox");
        assert_eq!(intent.action, actions::LAUNCH_APPLICATION);
        assert_eq!(intent.parameters["target"], "firefox");
        assert_eq!(intent.parameters["command"], "firefox");
        assert_eq!(intent.parameters["verb"], "open");

        let intent = parse("firefox 실행해줘");
        assert_eq!(intent.action, actions::LAUNCH_APPLICATION);
        assert_eq!(intent.parameters["target"], "firefox");
        assert_eq!(intent.parameters["verb"], "실행");
    }

    #[test]
    fn test_low_level_language() {
        let intent = parse("launch firefox using assembly");
        assert_eq!(intent.action, actions::EXECUTE_LOW_LEVEL);
        assert_eq!(intent.parameters["language"], "assembly");
        assert_eq!(intent.parameters["original_request"], "launch firefox using assembly");

        assert_eq!(parse("run gedit from machine code").parameters["language"], "machine");
        assert_eq!(parse("write a c program that opens code").parameters["language"], "c");
        assert!(!contains_word("basm", "asm"));
        assert!(contains_word("do it in c please", "in c"));
        assert!(!contains_word("in cache", "in c"));
    }

    // =========================================================================
    // Pointer parameters
    // =========================================================================

    #[test]
    fn test_pointer_default_magnitude() {
        let intent = parse("move the mouse left");
        assert_eq!(intent.action, actions::CONTROL_POINTER);
        assert_eq!(intent.parameters["operation"], "move");
        assert_eq!(intent.parameters["direction"], "left");
        assert_eq!(intent.parameters["distance"], 100);
        assert_eq!(intent.parameters["dx"], -100);
        assert_eq!(intent.parameters["dy"], 0);
    }

    #[test]
    fn test_pointer_qualifiers() {
        assert_eq!(parse("move the cursor up a little").parameters["distance"], 25);
        assert_eq!(parse("move the cursor up a little").parameters["dy"], -25);
        assert_eq!(parse("move the mouse down a lot").parameters["dy"], 400);
        assert_eq!(parse("마우스를 오른쪽으로 조금 움직여").parameters["dx"], 25);
        assert_eq!(parse("마우스 아래로 많이").parameters["dy"], 400);
    }

    #[test]
    fn test_pointer_numeric_literal_wins() {
        let intent = parse("move the mouse right 250 pixels, a little");
        assert_eq!(intent.parameters["distance"], 250);
        assert_eq!(intent.parameters["dx"], 250);
    }

    #[test]
    fn test_pointer_literal_before_hangul_unit() {
        let intent = parse("마우스를 왼쪽으로 150픽셀 움직여");
        assert_eq!(intent.parameters["distance"], 150);
        assert_eq!(intent.parameters["dx"], -150);
        assert_eq!(parse("move the mouse right 123456 times").parameters["distance"], 100);
    }

    #[test]
    fn test_pointer_large_qualifier_is_whole_word() {
        assert_eq!(parse("move the mouse left toward safari").parameters["distance"], 100);
        assert_eq!(parse("move the mouse left far").parameters["distance"], 400);
    }

    #[test]
    fn test_pointer_clicks() {
        assert_eq!(parse("double click with the mouse").parameters["operation"], "double_click");
        let intent = parse("right click the mouse");
        assert_eq!(intent.parameters["operation"], "right_click");
        assert!(intent.parameters.get("direction").is_none());
        assert_eq!(parse("where is my cursor").parameters["operation"], "locate");

        let intent = parse("move the mouse left and click");
        assert_eq!(intent.parameters["operation"], "move");
        assert_eq!(intent.parameters["click_after"], true);
        assert_eq!(intent.parameters["click_operation"], "click");
    }

    // =========================================================================
    // Time and weekday extraction
    // =========================================================================

    #[test]
    fn test_time_extraction() {
        assert_eq!(parse("schedule backup at 3:30").parameters["requested_time"], "3:30");
        assert_eq!(parse("schedule backup at 9pm").parameters["requested_time"], "21:00");
        assert_eq!(parse("schedule backup at 12am").parameters["requested_time"], "0:00");
        assert_eq!(parse("백업 예약 3시").parameters["requested_time"], "3:00");
        assert_eq!(parse("백업 예약 14시 5분").parameters["requested_time"], "14:05");
        assert!(parse("schedule backup at 27:00").parameters.get("requested_time").is_none());
    }

    #[test]
    fn test_day_extraction() {
        assert_eq!(parse("금요일 3시에 업데이트").parameters["requested_day"], "금요일");
        assert_eq!(parse("update on Friday").parameters["requested_day"], "friday");
    }

    // =========================================================================
    // Model path
    // =========================================================================

    #[test]
    fn test_model_intent_is_used() {
        let client = Arc::new(ScriptedClient::replying(json!({
            "action": "process.manage",
            "confidence": 0.92,
            "parameters": {"name": "chrome"},
            "reasoning": "user wants to stop chrome"
        })));
        let parser = IntentParser::new(Some(client.clone()));
        let intent = parser.parse("stop chrome", &Context::new()).unwrap();
        assert_eq!(intent.action, "process.manage");
        assert_eq!(intent.confidence, 0.92);
        assert_eq!(intent.parameters["name"], "chrome");
        assert_eq!(client.seen_seeds.lock().unwrap().as_slice(), &[Some(model::INTENT_SEED)]);
    }

    #[test]
    fn test_model_scalar_parameters_are_wrapped() {
        let client = Arc::new(ScriptedClient::replying(json!({
            "action": "system.update", "confidence": 0.5, "parameters": "now"
        })));
        let intent = IntentParser::new(Some(client)).parse("update", &Context::new()).unwrap();
        assert_eq!(intent.parameters["value"], "now");
    }

    #[test]
    fn test_malformed_model_output_falls_back() {
        let client = Arc::new(ScriptedClient::new(vec![Ok("definitely not json".into())]));
        let intent = IntentParser::new(Some(client))
            .parse("kill the process", &Context::new())
            .unwrap();
        assert_eq!(intent.action, actions::MANAGE_PROCESS);
        assert_eq!(intent.reasoning.as_deref(), Some("Heuristic parser"));
    }
}
