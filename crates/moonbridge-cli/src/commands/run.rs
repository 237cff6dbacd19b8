//! `moonbridge run`: execute a Lua file.

use crate::config::CliConfig;
use crate::session::{Overrides, Session};
use std::path::Path;

pub fn execute(
    config: &CliConfig,
    overrides: &Overrides,
    file: &Path,
    args: Vec<String>,
) -> anyhow::Result<bool> {
    let session = Session::open(config, overrides)?;
    let state = &session.state;

    // arg[0] is the script, arg[1..] its arguments
    let arg = state.new_table_with(args.len(), 1)?;
    arg.raw_set(0i64, file.to_string_lossy().as_ref())?;
    for (i, value) in args.iter().enumerate() {
        arg.raw_set(i as i64 + 1, value.as_str())?;
    }

    tracing::info!(file = %file.display(), sandbox = session.sandbox, "running");
    let ok = match session.environment()? {
        Some(env) => {
            env.raw_set("arg", &arg)?;
            state.do_file_in(file, &env)
        }
        None => {
            state.globals()?.raw_set("arg", &arg)?;
            state.do_file(file)
        }
    };
    Ok(ok)
}
