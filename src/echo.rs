use serde_json::json;
use std::path::PathBuf;

use crate::binder::{Args, CallContext, OutputKind, Reply};

// Stand-in handler: echoes the bound arguments back
pub fn echo_handler(ctx: &mut CallContext<'_>, args: Args) -> anyhow::Result<Reply> {
    let request = ctx.request();
    Ok(Reply::Value(json!({
        "method": request.method().to_string(),
        "path": request.path(),
        "request_id": ctx.request_id().to_string(),
        "args": args.to_json(),
    })))
}

/// Echo shaped for `output`, so view and attachment routes render too.
pub fn echo_for_output(
    name: &str,
    output: OutputKind,
) -> impl Fn(&mut CallContext<'_>, Args) -> anyhow::Result<Reply> + Send + Sync + 'static {
    let name = name.to_string();
    move |ctx, args| match output {
        OutputKind::Content => echo_handler(ctx, args),
        OutputKind::View => match echo_handler(ctx, args)? {
            Reply::Value(model) => Ok(Reply::view(name.clone(), model)),
            other => Ok(other),
        },
        OutputKind::Attachment => Ok(Reply::File(PathBuf::from(format!("{name}.bin")))),
    }
}

/// Echo gate: lets every request through.
pub fn echo_gate(_ctx: &mut CallContext<'_>, _args: Args) -> anyhow::Result<Reply> {
    Ok(Reply::Continue(true))
}
