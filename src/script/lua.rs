//! Lua script host (spec.md §4.9), backed by `mlua`.

use std::path::Path;
use std::sync::Arc;

use mlua::{Lua, LuaSerdeExt, UserData, UserDataMethods, Value as LuaValue, Variadic};
use serde_json::Value;

use crate::sdk::{HostSdk, ProgressHandle};
use crate::{Error, Result};

use super::ScriptContext;

/// Load and run `script_path` inside a fresh Lua state.
///
/// Returns `Ok(true)` iff the script completed without raising; a raised
/// Lua error is surfaced as a host `error` event and yields `Ok(false)`
/// rather than propagating, per spec.md §4.9.
pub async fn run(script_path: &Path, ctx: ScriptContext) -> Result<bool> {
    let lua = Lua::new();
    install_globals(&lua, &ctx).map_err(|e| Error::ScriptError(e.to_string()))?;

    let text = std::fs::read_to_string(script_path)?;
    let chunk = lua.load(&text).set_name(script_path.display().to_string());

    match chunk.exec_async().await {
        Ok(()) => Ok(true),
        Err(e) => {
            ctx.sdk.error(&e.to_string()).await;
            Ok(false)
        }
    }
}

fn install_globals(lua: &Lua, ctx: &ScriptContext) -> mlua::Result<()> {
    let globals = lua.globals();

    globals.set("argv", ctx.argv.clone())?;

    let tools = ctx.tools.clone();
    globals.set(
        "tool",
        lua.create_function(move |_, id: String| Ok(tools.resolve(&id)))?,
    )?;

    let sdk = ctx.sdk.clone();
    globals.set(
        "emit",
        lua.create_async_function(move |lua, (event_name, fields): (String, Option<LuaValue>)| {
            let sdk = sdk.clone();
            async move {
                let mut event = crate::event::Event::new(event_name);
                if let Some(fields) = fields {
                    if let Value::Object(map) = lua.from_value(fields)? {
                        event.fields = map;
                    }
                }
                sdk.sink.emit(event).await;
                Ok(())
            }
        })?,
    )?;

    let sdk = ctx.sdk.clone();
    globals.set(
        "warn",
        lua.create_async_function(move |_, message: String| {
            let sdk = sdk.clone();
            async move {
                sdk.warn(&message).await;
                Ok(())
            }
        })?,
    )?;

    let sdk = ctx.sdk.clone();
    globals.set(
        "error",
        lua.create_async_function(move |_, message: String| {
            let sdk = sdk.clone();
            async move {
                sdk.error(&message).await;
                Ok(())
            }
        })?,
    )?;

    let sdk = ctx.sdk.clone();
    globals.set(
        "prompt",
        lua.create_async_function(
            move |_, (message, id, secret): (String, Option<String>, Option<bool>)| {
                let sdk = sdk.clone();
                async move { Ok(sdk.prompt(&message, id.as_deref(), secret.unwrap_or(false)).await) }
            },
        )?,
    )?;

    let sdk = ctx.sdk.clone();
    globals.set(
        "progress",
        lua.create_function(move |_, (total, id, label): (u64, Option<String>, Option<String>)| {
            Ok(LuaProgressHandle(Arc::new(sdk.progress(total, id, label))))
        })?,
    )?;

    globals.set("sdk", build_sdk_table(lua, ctx.sdk.clone())?)?;
    globals.set("sqlite", build_sqlite_table(lua, ctx.sdk.clone())?)?;

    Ok(())
}

struct LuaProgressHandle(Arc<ProgressHandle>);

impl UserData for LuaProgressHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_async_method("update", |_, this, inc: Option<u64>| {
            let handle = this.0.clone();
            async move {
                handle.update(inc.unwrap_or(1)).await;
                Ok(())
            }
        });
    }
}

fn build_sdk_table(lua: &Lua, sdk: Arc<HostSdk>) -> mlua::Result<mlua::Table> {
    let table = lua.create_table()?;

    macro_rules! bind {
        ($name:literal, $body:expr) => {
            table.set($name, $body)?;
        };
    }

    {
        let sdk = sdk.clone();
        bind!(
            "print",
            lua.create_async_function(move |_, (message, color, newline): (String, Option<String>, Option<bool>)| {
                let sdk = sdk.clone();
                async move {
                    sdk.print(&message, color.as_deref(), newline.unwrap_or(true)).await;
                    Ok(())
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "warn",
            lua.create_async_function(move |_, message: String| {
                let sdk = sdk.clone();
                async move {
                    sdk.warn(&message).await;
                    Ok(())
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "error",
            lua.create_async_function(move |_, message: String| {
                let sdk = sdk.clone();
                async move {
                    sdk.error(&message).await;
                    Ok(())
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "info",
            lua.create_async_function(move |_, message: String| {
                let sdk = sdk.clone();
                async move {
                    sdk.info(&message).await;
                    Ok(())
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "success",
            lua.create_async_function(move |_, message: String| {
                let sdk = sdk.clone();
                async move {
                    sdk.success(&message).await;
                    Ok(())
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "start",
            lua.create_async_function(move |_, op: Option<String>| {
                let sdk = sdk.clone();
                async move {
                    sdk.start(op.as_deref()).await;
                    Ok(())
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "end",
            lua.create_async_function(move |_, (success, exit_code): (bool, i32)| {
                let sdk = sdk.clone();
                async move {
                    sdk.end(success, exit_code).await;
                    Ok(())
                }
            })?
        );
    }

    {
        let sdk = sdk.clone();
        bind!(
            "exec",
            lua.create_async_function(move |_, argv: Variadic<String>| {
                let sdk = sdk.clone();
                async move {
                    let argv: Vec<String> = argv.into_iter().collect();
                    Ok(crate::sdk::process::exec(&argv, sdk.sink.clone(), &sdk.exec_policy).await)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "run_process",
            lua.create_async_function(move |lua, (argv, timeout_secs): (Variadic<String>, Option<f64>)| {
                let sdk = sdk.clone();
                async move {
                    let argv: Vec<String> = argv.into_iter().collect();
                    let timeout = timeout_secs.map(std::time::Duration::from_secs_f64);
                    let out = crate::sdk::process::run_process(&argv, &sdk.exec_policy, timeout)
                        .await
                        .map_err(to_lua_err)?;
                    let table = lua.create_table()?;
                    table.set("success", out.success)?;
                    table.set("stdout", out.stdout)?;
                    table.set("stderr", out.stderr)?;
                    table.set("exit_code", out.exit_code)?;
                    Ok(table)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "spawn_process",
            lua.create_function(move |_, argv: Variadic<String>| {
                let argv: Vec<String> = argv.into_iter().collect();
                crate::sdk::process::spawn_process(&sdk.processes, &argv, &sdk.exec_policy).map_err(to_lua_err)
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "poll_process",
            lua.create_function(move |lua, handle: u64| {
                let status = crate::sdk::process::poll_process(&sdk.processes, handle).map_err(to_lua_err)?;
                status_table(lua, &status)
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "wait_process",
            lua.create_async_function(move |lua, (handle, timeout_secs): (u64, Option<f64>)| {
                let sdk = sdk.clone();
                async move {
                    let timeout = timeout_secs.map(std::time::Duration::from_secs_f64);
                    let status = crate::sdk::process::wait_process(&sdk.processes, handle, timeout)
                        .await
                        .map_err(to_lua_err)?;
                    status_table(lua, &status)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "close_process",
            lua.create_function(move |_, handle: u64| {
                crate::sdk::process::close_process(&sdk.processes, handle);
                Ok(())
            })?
        );
    }

    {
        let sdk = sdk.clone();
        bind!(
            "sha1",
            lua.create_async_function(move |_, path: String| {
                let sdk = sdk.clone();
                async move {
                    crate::sdk::fs::sha1_file(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path))
                        .await
                        .map_err(to_lua_err)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "md5",
            lua.create_async_function(move |_, path: String| {
                let sdk = sdk.clone();
                async move {
                    crate::sdk::fs::md5_file(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path))
                        .await
                        .map_err(to_lua_err)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "copy_file",
            lua.create_async_function(move |_, (src, dst): (String, String)| {
                let sdk = sdk.clone();
                async move {
                    crate::sdk::fs::copy_file(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&src), Path::new(&dst))
                        .await
                        .map_err(to_lua_err)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "remove_file",
            lua.create_async_function(move |_, path: String| {
                let sdk = sdk.clone();
                async move {
                    crate::sdk::fs::remove_file(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path))
                        .await
                        .map_err(to_lua_err)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "copy_dir",
            lua.create_async_function(move |_, (src, dst): (String, String)| {
                let sdk = sdk.clone();
                async move {
                    let sink = sdk.sink.clone();
                    crate::sdk::fs::copy_dir(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&src), Path::new(&dst), |current, total| {
                        let sink = sink.clone();
                        tokio::spawn(async move {
                            sink.emit(
                                crate::event::Event::new("progress")
                                    .with("id", "copy_dir")
                                    .with("current", current)
                                    .with("total", total),
                            )
                            .await;
                        });
                    })
                    .await
                    .map_err(to_lua_err)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "move_dir",
            lua.create_async_function(move |_, (src, dst): (String, String)| {
                let sdk = sdk.clone();
                async move {
                    crate::sdk::fs::move_dir(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&src), Path::new(&dst))
                        .await
                        .map_err(to_lua_err)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "remove_dir",
            lua.create_async_function(move |_, path: String| {
                let sdk = sdk.clone();
                async move {
                    crate::sdk::fs::remove_dir(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path))
                        .await
                        .map_err(to_lua_err)
                }
            })?
        );
    }
    #[cfg(unix)]
    {
        let sdk = sdk.clone();
        bind!(
            "symlink",
            lua.create_async_function(move |_, (target, link): (String, String)| {
                let sdk = sdk.clone();
                async move {
                    crate::sdk::fs::symlink(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&target), Path::new(&link))
                        .await
                        .map_err(to_lua_err)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "hardlink",
            lua.create_async_function(move |_, (src, dst): (String, String)| {
                let sdk = sdk.clone();
                async move {
                    crate::sdk::fs::hardlink(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&src), Path::new(&dst))
                        .await
                        .map_err(to_lua_err)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "realpath",
            lua.create_async_function(move |_, path: String| {
                let sdk = sdk.clone();
                async move {
                    crate::sdk::fs::realpath(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path))
                        .await
                        .map(|p| p.display().to_string())
                        .map_err(to_lua_err)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "readlink",
            lua.create_async_function(move |_, path: String| {
                let sdk = sdk.clone();
                async move {
                    crate::sdk::fs::readlink(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path))
                        .await
                        .map(|p| p.display().to_string())
                        .map_err(to_lua_err)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "scan_dir",
            lua.create_async_function(move |lua, path: String| {
                let sdk = sdk.clone();
                async move {
                    let entries = crate::sdk::fs::scan_dir(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path))
                        .await
                        .map_err(to_lua_err)?;
                    let table = lua.create_table()?;
                    for (i, entry) in entries.iter().enumerate() {
                        table.set(i + 1, entry.display().to_string())?;
                    }
                    Ok(table)
                }
            })?
        );
    }

    {
        let sdk = sdk.clone();
        bind!(
            "read_json",
            lua.create_async_function(move |lua, path: String| {
                let sdk = sdk.clone();
                async move {
                    let value = crate::sdk::data::read_json(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path))
                        .await
                        .map_err(to_lua_err)?;
                    lua.to_value(&value)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "write_json",
            lua.create_async_function(move |lua, (path, value): (String, LuaValue)| {
                let sdk = sdk.clone();
                async move {
                    let value: Value = lua.from_value(value)?;
                    crate::sdk::data::write_json(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path), &value)
                        .await
                        .map_err(to_lua_err)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "read_toml",
            lua.create_async_function(move |lua, path: String| {
                let sdk = sdk.clone();
                async move {
                    let value = crate::sdk::data::read_toml(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path))
                        .await
                        .map_err(to_lua_err)?;
                    lua.to_value(&value)
                }
            })?
        );
    }
    {
        let sdk = sdk.clone();
        bind!(
            "write_toml",
            lua.create_async_function(move |lua, (path, value): (String, LuaValue)| {
                let sdk = sdk.clone();
                async move {
                    let value: Value = lua.from_value(value)?;
                    crate::sdk::data::write_toml(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path), &value)
                        .await
                        .map_err(to_lua_err)
                }
            })?
        );
    }

    let archive = lua.create_table()?;
    {
        let sdk = sdk.clone();
        archive.set(
            "create",
            lua.create_async_function(move |_, (src, dst): (String, String)| {
                let sdk = sdk.clone();
                async move {
                    crate::sdk::archive::create(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&src), Path::new(&dst))
                        .await
                        .map_err(to_lua_err)
                }
            })?,
        )?;
    }
    {
        let sdk = sdk.clone();
        archive.set(
            "extract",
            lua.create_async_function(move |_, (src, dst): (String, String)| {
                let sdk = sdk.clone();
                async move {
                    crate::sdk::archive::extract(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&src), Path::new(&dst))
                        .await
                        .map_err(to_lua_err)
                }
            })?,
        )?;
    }
    table.set("archive", archive)?;

    Ok(table)
}

fn status_table(lua: &Lua, status: &crate::process::ManagedStatus) -> mlua::Result<mlua::Table> {
    let table = lua.create_table()?;
    table.set("running", status.running)?;
    table.set("stdout_delta", status.stdout_delta.clone())?;
    table.set("stderr_delta", status.stderr_delta.clone())?;
    table.set("exit_code", status.exit_code)?;
    Ok(table)
}

fn build_sqlite_table(lua: &Lua, sdk: Arc<HostSdk>) -> mlua::Result<mlua::Table> {
    let table = lua.create_table()?;
    table.set(
        "open",
        lua.create_async_function(move |_, path: String| {
            let sdk = sdk.clone();
            async move {
                let handle = crate::sdk::sql::SqlHandle::open(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path))
                    .await
                    .map_err(to_lua_err)?;
                Ok(LuaSqlHandle(Arc::new(handle)))
            }
        })?,
    )?;
    Ok(table)
}

struct LuaSqlHandle(Arc<crate::sdk::sql::SqlHandle>);

impl UserData for LuaSqlHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("exec", |_, this, sql: String| {
            this.0.exec(&sql, &[]).map_err(to_lua_err)
        });
        methods.add_method("query", |lua, this, sql: String| {
            let rows = this.0.query(&sql, &[]).map_err(to_lua_err)?;
            lua.to_value(&rows)
        });
        methods.add_method("begin", |_, this, ()| this.0.begin().map_err(to_lua_err));
        methods.add_method("commit", |_, this, ()| this.0.commit().map_err(to_lua_err));
        methods.add_method("rollback", |_, this, ()| this.0.rollback().map_err(to_lua_err));
        methods.add_method("close", |_, this, ()| {
            this.0.close();
            Ok(())
        });
    }
}

fn to_lua_err(e: Error) -> mlua::Error {
    mlua::Error::RuntimeError(e.to_string())
}
