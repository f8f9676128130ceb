//! `download_tools` built-in action (spec.md §4.9).
//!
//! Verifies that every tool id named in the operation's `tools` argument
//! resolves to an existing executable under the module's `tools` directory,
//! fetching it with an approved downloader executable when absent. Network
//! retrieval itself is delegated to an allow-listed external tool (the core
//! does not embed an HTTP client for this; spec.md §1 keeps the tool
//! downloader an external collaborator; this action only orchestrates it).

use std::sync::Arc;

use serde_json::Value;

use crate::sdk::process::exec;
use crate::sdk::HostSdk;
use crate::Result;

use super::ActionRequest;

pub async fn run(request: ActionRequest, sdk: Arc<HostSdk>) -> Result<bool> {
    let Some(Value::Array(tools)) = request.args.get("tools") else {
        sdk.warn("download_tools: missing `tools` array argument").await;
        return Ok(false);
    };

    let dest_dir = request.path_arg("dest_dir").unwrap_or_else(|| request.module_root.join("tools"));
    let downloader = request.str_arg("downloader").unwrap_or("git");

    let mut all_ok = true;
    for tool in tools {
        let Some(tool_id) = tool.as_str() else {
            continue;
        };
        let tool_path = dest_dir.join(tool_id);
        if tool_path.is_file() {
            sdk.info(&format!("{tool_id} already present")).await;
            continue;
        }

        sdk.start(Some(&format!("download {tool_id}"))).await;
        let url = request
            .args
            .get("url_for")
            .and_then(|m| m.get(tool_id))
            .and_then(Value::as_str)
            .map(str::to_string);

        let Some(url) = url else {
            all_ok = false;
            sdk.error(&format!("no download URL configured for '{tool_id}'")).await;
            continue;
        };

        let argv = vec![
            downloader.to_string(),
            "clone".to_string(),
            "--depth".to_string(),
            "1".to_string(),
            url,
            tool_path.display().to_string(),
        ];
        let ok = exec(&argv, sdk.sink.clone(), &sdk.exec_policy).await;
        all_ok &= ok;
    }

    Ok(all_ok)
}
