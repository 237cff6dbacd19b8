//! `moonbridge eval`: evaluate an inline chunk and print its results.

use crate::config::CliConfig;
use crate::session::{Overrides, Session};
use moonbridge_engine::LuaError;

pub fn execute(config: &CliConfig, overrides: &Overrides, code: &str) -> anyhow::Result<bool> {
    let session = Session::open(config, overrides)?;
    let state = &session.state;

    let results = match session.environment()? {
        Some(env) => state.eval_in(code, &env),
        None => state.eval(code),
    };
    let values = match results {
        Ok(values) => values,
        // Already reported by the handler
        Err(LuaError::Load(_) | LuaError::Runtime(_)) => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    if !values.is_empty() {
        let line: Vec<String> = values.iter().map(|v| session.display(v)).collect();
        println!("{}", line.join("\t"));
    }
    Ok(true)
}
