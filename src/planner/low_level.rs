//! Low-level launcher synthesis
//!
//! When a request asks for something to be run "in assembly" or "as machine
//! code" without supplying source, the planner infers which executable is
//! meant and writes a minimal launcher for it:
//!
//! - C: `execvp` with the resolved argv
//! - assembly: AT&T x86-64 stub issuing `execve` then `exit`
//! - machine: hex of a static x86-64 ELF image doing the same syscalls

use regex::Regex;
use serde_json::{Value, json};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::models::{Parameters, text_param};
use crate::types::CodeLanguage;

/// Parameter key holding synthesis metadata
pub const METADATA_KEY: &str = "_low_level";

/// (keyword, candidates, fallback path)
const KEYWORD_TARGETS: &[(&str, &[&str], &str)] = &[
    ("firefox", &["firefox", "/usr/bin/firefox"], "/usr/bin/firefox"),
    (
        "terminal",
        &["gnome-terminal", "x-terminal-emulator", "/usr/bin/gnome-terminal", "xfce4-terminal"],
        "/usr/bin/gnome-terminal",
    ),
    ("gnome-terminal", &["gnome-terminal", "/usr/bin/gnome-terminal"], "/usr/bin/gnome-terminal"),
    ("chrome", &["google-chrome", "/usr/bin/google-chrome"], "/usr/bin/google-chrome"),
    ("chromium", &["chromium-browser", "chromium", "/usr/bin/chromium"], "/usr/bin/chromium"),
    ("code", &["code", "/usr/bin/code"], "/usr/bin/code"),
];

/// Words that never name the program to launch
const STOP_WORDS: &[&str] = &[
    "assembly", "asm", "machine", "binary", "code", "by", "using", "with", "in", "from", "please",
    "the", "this", "that", "request", "program", "app", "application", "launch", "run", "open",
    "start", "execute", "excute", "write", "어셈", "기계어", "실행", "열어", "켜", "줘", "좀",
    "으로", "해서",
];

/// Phrases naming the language, removed before keyword scanning
const LANGUAGE_PHRASES: &[&str] = &["machine code", "assembly code", "c code", "asm code"];

static VERB_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:execute|excute|run|launch|start|open|실행|열어|켜)\s+([\w.-]+)")
        .expect("valid verb regex")
});
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.-]+").expect("valid token regex"));

/// Executable plus extra argv entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    pub executable: String,
    pub args: Vec<String>,
}

impl LaunchTarget {
    fn bare(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
        }
    }

    fn argv(&self) -> Vec<&str> {
        std::iter::once(self.executable.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

/// Return a copy of `parameters` with launcher source synthesized when possible.
///
/// `source` is left unset when neither provided source nor a target could
/// be found; the planner then schedules an inspection step first.
pub fn prepare_parameters(parameters: &Parameters, raw_input: &str) -> Parameters {
    let mut params = parameters.clone();
    let mut metadata = params
        .get(METADATA_KEY)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    metadata.entry("synthesized_source").or_insert(json!(false));
    metadata.entry("target").or_insert(Value::Null);

    if has_source(&params) {
        metadata.insert("provided_source".into(), json!(true));
        params.insert(METADATA_KEY.into(), Value::Object(metadata));
        return params;
    }

    let request = text_param(&params, "original_request")
        .unwrap_or(raw_input)
        .trim()
        .to_string();
    let target = explicit_target(&params).or_else(|| {
        if request.is_empty() {
            None
        } else {
            infer_target(&request)
        }
    });

    let Some(target) = target else {
        params.insert(METADATA_KEY.into(), Value::Object(metadata));
        return params;
    };

    metadata.insert(
        "target".into(),
        json!({"executable": target.executable, "args": target.args}),
    );
    metadata.insert("candidate".into(), json!(target.executable));
    metadata.insert("synthesized_source".into(), json!(true));

    let language = text_param(&params, "language")
        .and_then(|l| l.parse::<CodeLanguage>().ok())
        .unwrap_or_default();
    let (language, source) = match language {
        CodeLanguage::Assembly => (CodeLanguage::Assembly, assembly_launcher(&target)),
        CodeLanguage::Machine => (CodeLanguage::Machine, machine_launcher_hex(&target)),
        _ => (CodeLanguage::C, c_launcher(&target)),
    };

    params.insert("args".into(), json!(target.args));
    params.insert("language".into(), json!(language.to_string()));
    params.insert("source".into(), json!(source));
    params.remove("code");
    params.insert(METADATA_KEY.into(), Value::Object(metadata));
    params
}

/// True when `params` carry source to run
pub fn has_source(params: &Parameters) -> bool {
    ["source", "code"].iter().any(|key| match params.get(*key) {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    })
}

fn explicit_target(params: &Parameters) -> Option<LaunchTarget> {
    for key in ["executable", "program", "target"] {
        if let Some(value) = text_param(params, key) {
            return Some(LaunchTarget {
                executable: value.to_string(),
                args: arg_list(params.get("args")),
            });
        }
    }

    match params.get("command")? {
        Value::Array(items) => {
            let mut parts = items
                .iter()
                .map(value_text)
                .filter(|s| !s.trim().is_empty());
            let head = parts.next()?.trim().to_string();
            Some(LaunchTarget {
                executable: head,
                args: parts.collect(),
            })
        }
        Value::String(s) => {
            let mut parts = s.split_whitespace().map(str::to_string);
            let head = parts.next()?;
            Some(LaunchTarget {
                executable: head,
                args: parts.collect(),
            })
        }
        _ => None,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Coerce an `args` parameter (list or whitespace-separated string)
pub fn arg_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().map(value_text).collect(),
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Infer an executable from free text
pub fn infer_target(request: &str) -> Option<LaunchTarget> {
    let mut lowered = request.to_lowercase();
    for phrase in LANGUAGE_PHRASES {
        lowered = lowered.replace(phrase, " ");
    }
    let tokens: Vec<&str> = TOKEN.find_iter(&lowered).map(|m| m.as_str()).collect();

    for (keyword, candidates, fallback) in KEYWORD_TARGETS {
        if tokens.contains(keyword) {
            let resolved = resolve_executable(candidates).unwrap_or_else(|| (*fallback).to_string());
            return Some(LaunchTarget::bare(resolved));
        }
    }

    if let Some(caps) = VERB_TARGET.captures(&lowered) {
        let candidate = &caps[1];
        if !STOP_WORDS.contains(&candidate) {
            if let Some(resolved) =
                resolve_executable(&[candidate]).or_else(|| default_executable(candidate))
            {
                return Some(LaunchTarget::bare(resolved));
            }
        }
    }

    tokens
        .iter()
        .filter(|token| !STOP_WORDS.contains(token) && token.chars().count() >= 2)
        .filter(|token| !token.chars().all(|c| c.is_ascii_digit()))
        .find_map(|token| resolve_executable(&[*token]).or_else(|| default_executable(token)))
        .map(LaunchTarget::bare)
}

/// Absolute executable paths win, then a `$PATH` scan
pub fn resolve_executable(candidates: &[&str]) -> Option<String> {
    candidates.iter().filter(|c| !c.is_empty()).find_map(|candidate| {
        let path = Path::new(candidate);
        if path.is_absolute() {
            return is_executable(path).then(|| candidate.to_string());
        }
        which(candidate).map(|p| p.to_string_lossy().into_owned())
    })
}

/// Locate `name` on `$PATH`
pub fn which(name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        return None;
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn default_executable(token: &str) -> Option<String> {
    let token = token.trim();
    if token.is_empty() || token.contains('/') {
        return None;
    }
    Some(format!("/usr/bin/{}", token))
}

/// Escape for a double-quoted literal; valid for both C and GNU `as`
fn escape_c_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // three octal digits so a following digit is never absorbed
            c if c.is_ascii_control() => out.push_str(&format!("\\{:03o}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// C program calling `execvp` with the target argv
pub fn c_launcher(target: &LaunchTarget) -> String {
    let escaped: Vec<String> = target.argv().iter().map(|a| escape_c_string(a)).collect();
    let initializer = escaped
        .iter()
        .map(|a| format!("\"{}\"", a))
        .collect::<Vec<_>>()
        .join(", ");

    [
        "#include <errno.h>".to_string(),
        "#include <string.h>".to_string(),
        "#include <unistd.h>".to_string(),
        "#include <stdio.h>".to_string(),
        String::new(),
        "int main(void) {".to_string(),
        format!("    const char *args[] = {{{}, NULL}};", initializer),
        format!("    execvp(\"{}\", (char * const *)args);", escaped[0]),
        "    perror(\"execvp\");".to_string(),
        "    return errno ? (int)errno : 1;".to_string(),
        "}".to_string(),
    ]
    .join("\n")
}

/// AT&T x86-64 stub: `execve(path, argv, envp)` then `exit(-ret)`
pub fn assembly_launcher(target: &LaunchTarget) -> String {
    let argv = target.argv();
    let escaped: Vec<String> = argv.iter().map(|a| escape_c_string(a)).collect();

    let mut lines: Vec<String> = [
        ".section .text",
        ".global _start",
        "_start:",
        "    mov $59, %rax",
        "    lea cmd_path(%rip), %rdi",
        "    lea argv_list(%rip), %rsi",
        "    lea env_list(%rip), %rdx",
        "    syscall",
        "    neg %rax",
        "    mov %rax, %rdi",
        "    mov $60, %rax",
        "    syscall",
        "",
        ".section .rodata",
        "cmd_path:",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    lines.push(format!("    .string \"{}\"", escaped[0]));
    lines.push("argv_list:".to_string());
    lines.push("    .quad cmd_path".to_string());
    for index in 1..argv.len() {
        lines.push(format!("    .quad arg_{}", index));
    }
    lines.push("    .quad 0".to_string());
    lines.push(String::new());
    lines.push("env_list:".to_string());
    lines.push("    .quad 0".to_string());
    for (index, value) in escaped.iter().enumerate().skip(1) {
        lines.push(String::new());
        lines.push(format!("arg_{}:", index));
        lines.push(format!("    .string \"{}\"", value));
    }
    lines.push(String::new());
    lines.join("\n")
}

const ELF_BASE: u64 = 0x400000;
const ELF_HEADER_LEN: usize = 64;
const PROGRAM_HEADER_LEN: usize = 56;
const CODE_LEN: usize = 50;

/// Static ELF64 image performing the same syscalls as [`assembly_launcher`]
pub fn machine_launcher_image(target: &LaunchTarget) -> Vec<u8> {
    let code_off = ELF_HEADER_LEN + PROGRAM_HEADER_LEN;
    let strings_off = code_off + CODE_LEN;

    let mut strings = Vec::new();
    let mut string_addrs = Vec::new();
    for arg in target.argv() {
        string_addrs.push(ELF_BASE + (strings_off + strings.len()) as u64);
        strings.extend_from_slice(arg.as_bytes());
        strings.push(0);
    }
    let argv_off = (strings_off + strings.len()).next_multiple_of(8);
    let envp_off = argv_off + 8 * (string_addrs.len() + 1);
    let total_len = envp_off + 8;

    let addr = |off: usize| ELF_BASE + off as u64;
    let mut image = Vec::with_capacity(total_len);

    // ELF header
    image.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    image.extend_from_slice(&[0; 8]);
    image.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
    image.extend_from_slice(&0x3eu16.to_le_bytes()); // x86-64
    image.extend_from_slice(&1u32.to_le_bytes());
    image.extend_from_slice(&addr(code_off).to_le_bytes());
    image.extend_from_slice(&(ELF_HEADER_LEN as u64).to_le_bytes());
    image.extend_from_slice(&0u64.to_le_bytes());
    image.extend_from_slice(&0u32.to_le_bytes());
    image.extend_from_slice(&(ELF_HEADER_LEN as u16).to_le_bytes());
    image.extend_from_slice(&(PROGRAM_HEADER_LEN as u16).to_le_bytes());
    image.extend_from_slice(&1u16.to_le_bytes());
    image.extend_from_slice(&64u16.to_le_bytes());
    image.extend_from_slice(&0u16.to_le_bytes());
    image.extend_from_slice(&0u16.to_le_bytes());

    // PT_LOAD covering the whole file, R+X
    image.extend_from_slice(&1u32.to_le_bytes());
    image.extend_from_slice(&5u32.to_le_bytes());
    image.extend_from_slice(&0u64.to_le_bytes());
    image.extend_from_slice(&ELF_BASE.to_le_bytes());
    image.extend_from_slice(&ELF_BASE.to_le_bytes());
    image.extend_from_slice(&(total_len as u64).to_le_bytes());
    image.extend_from_slice(&(total_len as u64).to_le_bytes());
    image.extend_from_slice(&0x1000u64.to_le_bytes());

    // movabs rdi, path; movabs rsi, argv; movabs rdx, envp
    image.extend_from_slice(&[0x48, 0xbf]);
    image.extend_from_slice(&string_addrs[0].to_le_bytes());
    image.extend_from_slice(&[0x48, 0xbe]);
    image.extend_from_slice(&addr(argv_off).to_le_bytes());
    image.extend_from_slice(&[0x48, 0xba]);
    image.extend_from_slice(&addr(envp_off).to_le_bytes());
    // mov eax, 59; syscall; neg rax; mov rdi, rax; mov eax, 60; syscall
    image.extend_from_slice(&[0xb8, 59, 0, 0, 0, 0x0f, 0x05]);
    image.extend_from_slice(&[0x48, 0xf7, 0xd8, 0x48, 0x89, 0xc7]);
    image.extend_from_slice(&[0xb8, 60, 0, 0, 0, 0x0f, 0x05]);

    image.extend_from_slice(&strings);
    image.resize(argv_off, 0);
    for string_addr in &string_addrs {
        image.extend_from_slice(&string_addr.to_le_bytes());
    }
    image.extend_from_slice(&0u64.to_le_bytes());
    image.extend_from_slice(&0u64.to_le_bytes());
    image
}

/// Lowercase hex of [`machine_launcher_image`]
pub fn machine_launcher_hex(target: &LaunchTarget) -> String {
    machine_launcher_image(target)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Decode hex text, ignoring whitespace and an optional `0x` prefix
pub fn decode_hex(text: &str) -> Option<Vec<u8>> {
    let cleaned: String = text
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() || cleaned.len() % 2 != 0 {
        return None;
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(cleaned.get(i..i + 2)?, 16).ok())
        .collect()
}
