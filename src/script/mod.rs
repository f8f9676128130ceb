//! Embedded script hosts (spec.md §4.9): a Lua host (`mlua`) and a JS host
//! (`boa_engine`), both wiring the shared [`crate::sdk::HostSdk`] behind the
//! same set of host globals: `argv`, `tool(id)`, `emit`, `warn`, `error`,
//! `prompt`, `progress`, `sdk`, `sqlite`.

pub mod js;
pub mod lua;

use std::sync::Arc;

use crate::sdk::HostSdk;
use crate::tool_resolver::ToolMap;

/// Everything a script host needs besides the script text itself.
pub struct ScriptContext {
    pub argv: Vec<String>,
    pub sdk: Arc<HostSdk>,
    pub tools: Arc<ToolMap>,
}
