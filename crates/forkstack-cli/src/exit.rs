//! Exit codes and error reporting.
//!
//! Commands return `anyhow::Error`; the code is chosen by downcasting to
//! [`ForkError`] anywhere in the error chain.

use forkstack::ForkError;
use serde_json::{Map, Value, json};

use crate::format::OutputFormat;

pub const SUCCESS: u8 = 0;
pub const FAILURE: u8 = 1;
pub const CONFIG: u8 = 2;
pub const PATCH: u8 = 3;
pub const STALE: u8 = 4;
pub const CANCELLED: u8 = 5;
pub const UNTRACKED: u8 = 6;

/// Exit code for a failed command.
pub fn code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|e| e.downcast_ref::<ForkError>())
        .map_or(FAILURE, fork_error_code)
}

pub const fn fork_error_code(err: &ForkError) -> u8 {
    match err {
        ForkError::Config { .. }
        | ForkError::CycleDetected { .. }
        | ForkError::UnresolvedParent { .. }
        | ForkError::UnknownFork { .. }
        | ForkError::OutputPathConflict { .. }
        | ForkError::Snapshot { .. } => CONFIG,
        ForkError::PatchApplyFailure { .. }
        | ForkError::PatchParse { .. }
        | ForkError::BinaryFile { .. } => PATCH,
        ForkError::StaleTree { .. } | ForkError::NotMaterialized { .. } => STALE,
        ForkError::Cancelled { .. } => CANCELLED,
        ForkError::UntrackedAddition { .. } => UNTRACKED,
        ForkError::Io { .. } => FAILURE,
    }
}

/// Print `err` the way the selected format expects: a JSON envelope on
/// stdout, or the message chain on stderr.
pub fn report(err: &anyhow::Error, format: OutputFormat) {
    if format.is_json() {
        let envelope = json!({ "error": error_json(err) });
        match serde_json::to_string_pretty(&envelope) {
            Ok(text) => println!("{text}"),
            Err(_) => eprintln!("error: {err:#}"),
        }
    } else {
        eprintln!("error: {err:#}");
    }
}

/// `{ kind, message, ...locator }` for `err`.
pub fn error_json(err: &anyhow::Error) -> Value {
    let mut obj = Map::new();
    match err.chain().find_map(|e| e.downcast_ref::<ForkError>()) {
        Some(fork_err) => {
            obj.insert("kind".to_owned(), json!(fork_err.kind()));
            obj.insert("message".to_owned(), json!(format!("{err:#}")));
            obj.extend(locator(fork_err));
        }
        None => {
            obj.insert("kind".to_owned(), json!("internal"));
            obj.insert("message".to_owned(), json!(format!("{err:#}")));
        }
    }
    Value::Object(obj)
}

fn locator(err: &ForkError) -> Map<String, Value> {
    let value = match err {
        ForkError::CycleDetected { cycle } => json!({ "cycle": cycle }),
        ForkError::UnresolvedParent { fork, parent } => {
            json!({ "fork": fork, "parent": parent.to_string() })
        }
        ForkError::UnknownFork { name } => json!({ "fork": name }),
        ForkError::PatchApplyFailure {
            fork,
            patch_set,
            unit_path,
            fragment_index,
            patch_file,
            reason,
        } => json!({
            "fork": fork,
            "patch_set": patch_set,
            "unit_path": unit_path,
            "fragment_index": fragment_index,
            "patch_file": patch_file,
            "reason": reason.to_string(),
        }),
        ForkError::StaleTree {
            fork,
            upstream,
            recorded,
            configured,
            ..
        } => json!({
            "fork": fork,
            "upstream": upstream,
            "recorded_revision": recorded,
            "configured_revision": configured,
        }),
        ForkError::UntrackedAddition {
            fork,
            patch_set,
            paths,
        } => json!({ "fork": fork, "patch_set": patch_set, "paths": paths }),
        ForkError::OutputPathConflict {
            first,
            second,
            path,
        } => json!({ "first": first, "second": second, "path": path }),
        ForkError::NotMaterialized { fork } => json!({ "fork": fork }),
        ForkError::Cancelled { fork, patch_set } => {
            json!({ "fork": fork, "patch_set": patch_set })
        }
        ForkError::Config { path, .. } | ForkError::Io { path, .. } => json!({ "path": path }),
        ForkError::PatchParse { file, line, .. } => json!({ "patch_file": file, "line": line }),
        ForkError::BinaryFile {
            fork,
            patch_set,
            path,
        } => json!({ "fork": fork, "patch_set": patch_set, "unit_path": path }),
        ForkError::Snapshot { upstream, .. } => json!({ "upstream": upstream }),
    };
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
