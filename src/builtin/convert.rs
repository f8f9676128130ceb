//! `format-convert` built-in action (spec.md §4.9): runs an approved
//! converter executable (`ffmpeg`, `magick`, ...) named in the operation's
//! `tool` argument against `input`/`output`.

use std::sync::Arc;

use serde_json::Value;

use crate::sdk::process::exec;
use crate::sdk::HostSdk;
use crate::Result;

use super::ActionRequest;

pub async fn run(request: ActionRequest, sdk: Arc<HostSdk>) -> Result<bool> {
    let Some(tool) = request.str_arg("tool") else {
        sdk.warn("format-convert: missing `tool` argument").await;
        return Ok(false);
    };
    let Some(input) = request.str_arg("input") else {
        sdk.warn("format-convert: missing `input` argument").await;
        return Ok(false);
    };
    let Some(output) = request.str_arg("output") else {
        sdk.warn("format-convert: missing `output` argument").await;
        return Ok(false);
    };

    let extra_args: Vec<String> = match request.args.get("args") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    };

    let mut argv = vec![tool.to_string(), input.to_string()];
    argv.extend(extra_args);
    argv.push(output.to_string());

    sdk.start(Some("format-convert")).await;
    let ok = exec(&argv, sdk.sink.clone(), &sdk.exec_policy).await;
    if ok {
        sdk.success(&format!("converted {input} -> {output}")).await;
    } else {
        sdk.error(&format!("conversion failed: {input} -> {output}")).await;
    }
    Ok(ok)
}
