//! JS script host (spec.md §4.9), backed by `boa_engine`.
//!
//! `boa_engine` executes synchronously; native functions that need the
//! (async) host SDK bridge back onto the current Tokio runtime with
//! `block_in_place` + `Handle::block_on`, which is sound here because a
//! script's execution is confined to a single blocking call on a
//! multi-thread runtime (spec.md §5: "Embedded script execution itself is
//! single-threaded per script").

use std::path::Path;
use std::sync::Arc;

use boa_engine::object::builtins::JsArray;
use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsError, JsObject, JsResult, JsValue, NativeFunction, Source};
use serde_json::Value;
use tokio::runtime::Handle;

use crate::process::ManagedStatus;
use crate::sdk::process::CapturedOutput;
use crate::sdk::HostSdk;
use crate::{Error, Result};

use super::ScriptContext;

/// Load and run `script_path` inside a fresh JS context. Same completion
/// contract as [`super::lua::run`]: a raised JS exception surfaces as an
/// `error` event and yields `Ok(false)` rather than propagating.
pub async fn run(script_path: &Path, ctx: ScriptContext) -> Result<bool> {
    let text = std::fs::read_to_string(script_path)?;
    let sdk = ctx.sdk.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        let mut context = Context::default();
        if let Err(e) = install_globals(&mut context, &ctx) {
            return Err(e.to_string());
        }
        match context.eval(Source::from_bytes(&text)) {
            Ok(_) => Ok(()),
            Err(e) => Err(e.to_string()),
        }
    })
    .await
    .map_err(|e| Error::ScriptError(format!("js host task panicked: {e}")))?;

    match outcome {
        Ok(()) => Ok(true),
        Err(message) => {
            sdk.error(&message).await;
            Ok(false)
        }
    }
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::task::block_in_place(|| Handle::current().block_on(fut))
}

fn install_globals(context: &mut Context, ctx: &ScriptContext) -> JsResult<()> {
    let argv = JsArray::from_iter(
        ctx.argv.iter().map(|s| JsValue::from(js_string!(s.clone()))),
        context,
    );
    context.register_global_property(js_string!("argv"), argv, Attribute::all())?;

    let tools = ctx.tools.clone();
    context.register_global_callable(
        js_string!("tool"),
        1,
        NativeFunction::from_copy_closure(move |_, args, _| {
            let id = arg_string(args, 0);
            Ok(JsValue::from(js_string!(tools.resolve(&id))))
        }),
    )?;

    let sdk = ctx.sdk.clone();
    context.register_global_callable(
        js_string!("warn"),
        1,
        NativeFunction::from_copy_closure(move |_, args, _| {
            block_on(sdk.warn(&arg_string(args, 0)));
            Ok(JsValue::undefined())
        }),
    )?;

    let sdk = ctx.sdk.clone();
    context.register_global_callable(
        js_string!("error"),
        1,
        NativeFunction::from_copy_closure(move |_, args, _| {
            block_on(sdk.error(&arg_string(args, 0)));
            Ok(JsValue::undefined())
        }),
    )?;

    let sdk = ctx.sdk.clone();
    context.register_global_callable(
        js_string!("prompt"),
        1,
        NativeFunction::from_copy_closure(move |_, args, _| {
            let message = arg_string(args, 0);
            let id = args.get(1).and_then(JsValue::as_string).map(|s| s.to_std_string_escaped());
            let secret = args.get(2).is_some_and(JsValue::to_boolean);
            let answer = block_on(sdk.prompt(&message, id.as_deref(), secret));
            Ok(JsValue::from(js_string!(answer)))
        }),
    )?;

    let sdk = ctx.sdk.clone();
    context.register_global_callable(
        js_string!("emit"),
        2,
        NativeFunction::from_copy_closure(move |_, args, context| {
            let event_name = arg_string(args, 0);
            let mut event = crate::event::Event::new(event_name);
            if let Some(fields) = args.get(1) {
                if let Ok(json) = js_value_to_json(fields, context) {
                    if let Value::Object(map) = json {
                        event.fields = map;
                    }
                }
            }
            block_on(sdk.sink.emit(event));
            Ok(JsValue::undefined())
        }),
    )?;

    let sdk = ctx.sdk.clone();
    context.register_global_callable(
        js_string!("progress"),
        3,
        NativeFunction::from_copy_closure(move |_, args, context| {
            let total = arg_number(args, 0).unwrap_or(0.0) as u64;
            let id = args.get(1).and_then(JsValue::as_string).map(|s| s.to_std_string_escaped());
            let label = args.get(2).and_then(JsValue::as_string).map(|s| s.to_std_string_escaped());
            let handle = Arc::new(sdk.progress(total, id, label));
            let update_obj = ObjectInitializer::new(context)
                .function(
                    NativeFunction::from_copy_closure(move |_, args, _| {
                        let inc = arg_number(args, 0).unwrap_or(1.0) as u64;
                        block_on(handle.update(inc));
                        Ok(JsValue::undefined())
                    }),
                    js_string!("update"),
                    1,
                )
                .build();
            Ok(JsValue::from(update_obj))
        }),
    )?;

    let sdk_obj = build_sdk_object(context, ctx.sdk.clone())?;
    context.register_global_property(js_string!("sdk"), sdk_obj, Attribute::all())?;

    let sqlite_obj = build_sqlite_object(context, ctx.sdk.clone());
    context.register_global_property(js_string!("sqlite"), sqlite_obj, Attribute::all())?;

    Ok(())
}

/// Build the `sdk` object: output/control passthroughs to [`HostSdk`], plus
/// the policy-gated process/filesystem/data/archive helpers (spec.md §4.8),
/// mirroring `src/script/lua.rs`'s `build_sdk_table`.
fn build_sdk_object(context: &mut Context, sdk: Arc<HostSdk>) -> JsResult<JsObject> {
    // Built first so its own `ObjectInitializer` borrow of `context` ends
    // before the outer builder below takes its own.
    let archive_obj = {
        let mut archive_builder = ObjectInitializer::new(context);
        {
            let sdk = sdk.clone();
            archive_builder.function(
                NativeFunction::from_copy_closure(move |_, args, _| {
                    let (src, dst) = (arg_string(args, 0), arg_string(args, 1));
                    block_on(crate::sdk::archive::create(
                        &sdk.path_policy,
                        sdk.sink.as_ref(),
                        Path::new(&src),
                        Path::new(&dst),
                    ))
                    .map_err(to_js_err)?;
                    Ok(JsValue::undefined())
                }),
                js_string!("create"),
                2,
            );
        }
        {
            let sdk = sdk.clone();
            archive_builder.function(
                NativeFunction::from_copy_closure(move |_, args, _| {
                    let (src, dst) = (arg_string(args, 0), arg_string(args, 1));
                    block_on(crate::sdk::archive::extract(
                        &sdk.path_policy,
                        sdk.sink.as_ref(),
                        Path::new(&src),
                        Path::new(&dst),
                    ))
                    .map_err(to_js_err)?;
                    Ok(JsValue::undefined())
                }),
                js_string!("extract"),
                2,
            );
        }
        archive_builder.build()
    };

    let mut builder = ObjectInitializer::new(context);

    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let message = arg_string(args, 0);
                let color = args.get(1).and_then(JsValue::as_string).map(|s| s.to_std_string_escaped());
                let newline = args.get(2).map_or(true, JsValue::to_boolean);
                block_on(sdk.print(&message, color.as_deref(), newline));
                Ok(JsValue::undefined())
            }),
            js_string!("print"),
            3,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                block_on(sdk.warn(&arg_string(args, 0)));
                Ok(JsValue::undefined())
            }),
            js_string!("warn"),
            1,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                block_on(sdk.error(&arg_string(args, 0)));
                Ok(JsValue::undefined())
            }),
            js_string!("error"),
            1,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                block_on(sdk.info(&arg_string(args, 0)));
                Ok(JsValue::undefined())
            }),
            js_string!("info"),
            1,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                block_on(sdk.success(&arg_string(args, 0)));
                Ok(JsValue::undefined())
            }),
            js_string!("success"),
            1,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let op = args.first().and_then(JsValue::as_string).map(|s| s.to_std_string_escaped());
                block_on(sdk.start(op.as_deref()));
                Ok(JsValue::undefined())
            }),
            js_string!("start"),
            1,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let success = args.first().is_some_and(JsValue::to_boolean);
                let exit_code = arg_number(args, 1).unwrap_or(0.0) as i32;
                block_on(sdk.end(success, exit_code));
                Ok(JsValue::undefined())
            }),
            js_string!("end"),
            2,
        );
    }

    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, context| {
                let argv = arg_string_array(args.first(), context)?;
                Ok(JsValue::from(block_on(crate::sdk::process::exec(
                    &argv,
                    sdk.sink.clone(),
                    &sdk.exec_policy,
                ))))
            }),
            js_string!("exec"),
            1,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, context| {
                let argv = arg_string_array(args.first(), context)?;
                let timeout = arg_number(args, 1).map(std::time::Duration::from_secs_f64);
                let out = block_on(crate::sdk::process::run_process(&argv, &sdk.exec_policy, timeout))
                    .map_err(to_js_err)?;
                Ok(JsValue::from(captured_output_object(context, &out)))
            }),
            js_string!("run_process"),
            2,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, context| {
                let argv = arg_string_array(args.first(), context)?;
                let handle = crate::sdk::process::spawn_process(&sdk.processes, &argv, &sdk.exec_policy)
                    .map_err(to_js_err)?;
                Ok(JsValue::from(handle as f64))
            }),
            js_string!("spawn_process"),
            1,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, context| {
                let handle = arg_number(args, 0).unwrap_or(0.0) as u64;
                let status = crate::sdk::process::poll_process(&sdk.processes, handle).map_err(to_js_err)?;
                Ok(JsValue::from(status_object(context, &status)))
            }),
            js_string!("poll_process"),
            1,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, context| {
                let handle = arg_number(args, 0).unwrap_or(0.0) as u64;
                let timeout = arg_number(args, 1).map(std::time::Duration::from_secs_f64);
                let status = block_on(crate::sdk::process::wait_process(&sdk.processes, handle, timeout))
                    .map_err(to_js_err)?;
                Ok(JsValue::from(status_object(context, &status)))
            }),
            js_string!("wait_process"),
            2,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let handle = arg_number(args, 0).unwrap_or(0.0) as u64;
                crate::sdk::process::close_process(&sdk.processes, handle);
                Ok(JsValue::undefined())
            }),
            js_string!("close_process"),
            1,
        );
    }

    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let path = arg_string(args, 0);
                let hash = block_on(crate::sdk::fs::sha1_file(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path)))
                    .map_err(to_js_err)?;
                Ok(JsValue::from(js_string!(hash)))
            }),
            js_string!("sha1"),
            1,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let path = arg_string(args, 0);
                let hash = block_on(crate::sdk::fs::md5_file(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path)))
                    .map_err(to_js_err)?;
                Ok(JsValue::from(js_string!(hash)))
            }),
            js_string!("md5"),
            1,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let (src, dst) = (arg_string(args, 0), arg_string(args, 1));
                block_on(crate::sdk::fs::copy_file(
                    &sdk.path_policy,
                    sdk.sink.as_ref(),
                    Path::new(&src),
                    Path::new(&dst),
                ))
                .map_err(to_js_err)?;
                Ok(JsValue::undefined())
            }),
            js_string!("copy_file"),
            2,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let path = arg_string(args, 0);
                block_on(crate::sdk::fs::remove_file(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path)))
                    .map_err(to_js_err)?;
                Ok(JsValue::undefined())
            }),
            js_string!("remove_file"),
            1,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let (src, dst) = (arg_string(args, 0), arg_string(args, 1));
                let sink = sdk.sink.clone();
                block_on(crate::sdk::fs::copy_dir(
                    &sdk.path_policy,
                    sdk.sink.as_ref(),
                    Path::new(&src),
                    Path::new(&dst),
                    |current, total| {
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
                    },
                ))
                .map_err(to_js_err)?;
                Ok(JsValue::undefined())
            }),
            js_string!("copy_dir"),
            2,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let (src, dst) = (arg_string(args, 0), arg_string(args, 1));
                block_on(crate::sdk::fs::move_dir(
                    &sdk.path_policy,
                    sdk.sink.as_ref(),
                    Path::new(&src),
                    Path::new(&dst),
                ))
                .map_err(to_js_err)?;
                Ok(JsValue::undefined())
            }),
            js_string!("move_dir"),
            2,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let path = arg_string(args, 0);
                block_on(crate::sdk::fs::remove_dir(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path)))
                    .map_err(to_js_err)?;
                Ok(JsValue::undefined())
            }),
            js_string!("remove_dir"),
            1,
        );
    }
    #[cfg(unix)]
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let (target, link) = (arg_string(args, 0), arg_string(args, 1));
                block_on(crate::sdk::fs::symlink(
                    &sdk.path_policy,
                    sdk.sink.as_ref(),
                    Path::new(&target),
                    Path::new(&link),
                ))
                .map_err(to_js_err)?;
                Ok(JsValue::undefined())
            }),
            js_string!("symlink"),
            2,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let (src, dst) = (arg_string(args, 0), arg_string(args, 1));
                block_on(crate::sdk::fs::hardlink(
                    &sdk.path_policy,
                    sdk.sink.as_ref(),
                    Path::new(&src),
                    Path::new(&dst),
                ))
                .map_err(to_js_err)?;
                Ok(JsValue::undefined())
            }),
            js_string!("hardlink"),
            2,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let path = arg_string(args, 0);
                let resolved =
                    block_on(crate::sdk::fs::realpath(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path)))
                        .map_err(to_js_err)?;
                Ok(JsValue::from(js_string!(resolved.display().to_string())))
            }),
            js_string!("realpath"),
            1,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let path = arg_string(args, 0);
                let target =
                    block_on(crate::sdk::fs::readlink(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path)))
                        .map_err(to_js_err)?;
                Ok(JsValue::from(js_string!(target.display().to_string())))
            }),
            js_string!("readlink"),
            1,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, context| {
                let path = arg_string(args, 0);
                let entries =
                    block_on(crate::sdk::fs::scan_dir(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path)))
                        .map_err(to_js_err)?;
                let array = JsArray::from_iter(
                    entries.iter().map(|p| JsValue::from(js_string!(p.display().to_string()))),
                    context,
                );
                Ok(JsValue::from(array))
            }),
            js_string!("scan_dir"),
            1,
        );
    }

    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, context| {
                let path = arg_string(args, 0);
                let value =
                    block_on(crate::sdk::data::read_json(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path)))
                        .map_err(to_js_err)?;
                json_to_js_value(&value, context)
            }),
            js_string!("read_json"),
            1,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, context| {
                let path = arg_string(args, 0);
                let value = args.get(1).cloned().unwrap_or(JsValue::undefined());
                let json = js_value_to_json(&value, context)?;
                block_on(crate::sdk::data::write_json(
                    &sdk.path_policy,
                    sdk.sink.as_ref(),
                    Path::new(&path),
                    &json,
                ))
                .map_err(to_js_err)?;
                Ok(JsValue::undefined())
            }),
            js_string!("write_json"),
            2,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, context| {
                let path = arg_string(args, 0);
                let value =
                    block_on(crate::sdk::data::read_toml(&sdk.path_policy, sdk.sink.as_ref(), Path::new(&path)))
                        .map_err(to_js_err)?;
                json_to_js_value(&value, context)
            }),
            js_string!("read_toml"),
            1,
        );
    }
    {
        let sdk = sdk.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, context| {
                let path = arg_string(args, 0);
                let value = args.get(1).cloned().unwrap_or(JsValue::undefined());
                let json = js_value_to_json(&value, context)?;
                block_on(crate::sdk::data::write_toml(
                    &sdk.path_policy,
                    sdk.sink.as_ref(),
                    Path::new(&path),
                    &json,
                ))
                .map_err(to_js_err)?;
                Ok(JsValue::undefined())
            }),
            js_string!("write_toml"),
            2,
        );
    }

    builder.property(js_string!("archive"), archive_obj, Attribute::all());

    Ok(builder.build())
}

fn build_sqlite_object(context: &mut Context, sdk: Arc<HostSdk>) -> JsObject {
    let mut builder = ObjectInitializer::new(context);
    builder.function(
        NativeFunction::from_copy_closure(move |_, args, context| {
            let path = arg_string(args, 0);
            let handle = block_on(crate::sdk::sql::SqlHandle::open(
                &sdk.path_policy,
                sdk.sink.as_ref(),
                Path::new(&path),
            ))
            .map_err(to_js_err)?;
            Ok(JsValue::from(build_sql_handle_object(context, Arc::new(handle))))
        }),
        js_string!("open"),
        1,
    );
    builder.build()
}

fn build_sql_handle_object(context: &mut Context, handle: Arc<crate::sdk::sql::SqlHandle>) -> JsObject {
    let mut builder = ObjectInitializer::new(context);
    {
        let handle = handle.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, _| {
                let sql = arg_string(args, 0);
                let affected = handle.exec(&sql, &[]).map_err(to_js_err)?;
                Ok(JsValue::from(affected as f64))
            }),
            js_string!("exec"),
            1,
        );
    }
    {
        let handle = handle.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, args, context| {
                let sql = arg_string(args, 0);
                let rows = handle.query(&sql, &[]).map_err(to_js_err)?;
                json_to_js_value(&Value::Array(rows), context)
            }),
            js_string!("query"),
            1,
        );
    }
    {
        let handle = handle.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, _, _| {
                handle.begin().map_err(to_js_err)?;
                Ok(JsValue::undefined())
            }),
            js_string!("begin"),
            0,
        );
    }
    {
        let handle = handle.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, _, _| {
                handle.commit().map_err(to_js_err)?;
                Ok(JsValue::undefined())
            }),
            js_string!("commit"),
            0,
        );
    }
    {
        let handle = handle.clone();
        builder.function(
            NativeFunction::from_copy_closure(move |_, _, _| {
                handle.rollback().map_err(to_js_err)?;
                Ok(JsValue::undefined())
            }),
            js_string!("rollback"),
            0,
        );
    }
    builder.function(
        NativeFunction::from_copy_closure(move |_, _, _| {
            handle.close();
            Ok(JsValue::undefined())
        }),
        js_string!("close"),
        0,
    );
    builder.build()
}

fn captured_output_object(context: &mut Context, out: &CapturedOutput) -> JsObject {
    ObjectInitializer::new(context)
        .property(js_string!("success"), out.success, Attribute::all())
        .property(js_string!("stdout"), js_string!(out.stdout.clone()), Attribute::all())
        .property(js_string!("stderr"), js_string!(out.stderr.clone()), Attribute::all())
        .property(
            js_string!("exit_code"),
            out.exit_code.map_or(JsValue::null(), JsValue::from),
            Attribute::all(),
        )
        .build()
}

fn status_object(context: &mut Context, status: &ManagedStatus) -> JsObject {
    ObjectInitializer::new(context)
        .property(js_string!("running"), status.running, Attribute::all())
        .property(js_string!("stdout_delta"), js_string!(status.stdout_delta.clone()), Attribute::all())
        .property(js_string!("stderr_delta"), js_string!(status.stderr_delta.clone()), Attribute::all())
        .property(
            js_string!("exit_code"),
            status.exit_code.map_or(JsValue::null(), JsValue::from),
            Attribute::all(),
        )
        .build()
}

fn arg_string(args: &[JsValue], idx: usize) -> String {
    args.get(idx)
        .and_then(JsValue::as_string)
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_default()
}

fn arg_number(args: &[JsValue], idx: usize) -> Option<f64> {
    args.get(idx).and_then(JsValue::as_number)
}

/// An `argv`-shaped argument: a JS array of strings (spec.md §4.8's process
/// helpers all take `argv` as a list of strings, passed from JS as a real
/// array rather than varargs).
fn arg_string_array(value: Option<&JsValue>, context: &mut Context) -> JsResult<Vec<String>> {
    let Some(value) = value else { return Ok(Vec::new()) };
    let json = js_value_to_json(value, context)?;
    Ok(match json {
        Value::Array(items) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        _ => Vec::new(),
    })
}

fn to_js_err(e: Error) -> JsError {
    JsError::from_opaque(JsValue::from(js_string!(e.to_string())))
}

fn js_value_to_json(value: &JsValue, context: &mut Context) -> JsResult<Value> {
    // boa's JSON.stringify round trip is the simplest reliable conversion
    // to serde_json for an arbitrary script value.
    let stringified = context
        .global_object()
        .get(js_string!("JSON"), context)?
        .as_object()
        .and_then(|o| o.get(js_string!("stringify"), context).ok())
        .ok_or_else(|| JsError::from_opaque(JsValue::from(js_string!("JSON missing"))))?;
    let func = stringified
        .as_callable()
        .ok_or_else(|| JsError::from_opaque(JsValue::from(js_string!("JSON.stringify not callable"))))?;
    let result = func.call(&JsValue::undefined(), &[value.clone()], context)?;
    let text = result
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_default();
    serde_json::from_str(&text).map_err(|e| JsError::from_opaque(JsValue::from(js_string!(e.to_string()))))
}

/// The reverse of [`js_value_to_json`]: round trip a `serde_json::Value`
/// into a script value via `JSON.parse`.
fn json_to_js_value(value: &Value, context: &mut Context) -> JsResult<JsValue> {
    let text = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
    let parse = context
        .global_object()
        .get(js_string!("JSON"), context)?
        .as_object()
        .and_then(|o| o.get(js_string!("parse"), context).ok())
        .ok_or_else(|| JsError::from_opaque(JsValue::from(js_string!("JSON missing"))))?;
    let func = parse
        .as_callable()
        .ok_or_else(|| JsError::from_opaque(JsValue::from(js_string!("JSON.parse not callable"))))?;
    func.call(&JsValue::undefined(), &[JsValue::from(js_string!(text))], context)
}
