//! `moonbridge check`: compile files without running them.

use crate::config::CliConfig;
use crate::session::{Overrides, Session};
use std::path::PathBuf;

pub fn execute(config: &CliConfig, files: &[PathBuf]) -> anyhow::Result<bool> {
    let overrides = Overrides {
        no_std: true,
        ..Overrides::default()
    };
    let session = Session::open(config, &overrides)?;

    let mut failed = 0usize;
    for file in files {
        if session.state.load_file(file).is_nil() {
            failed += 1;
        } else {
            println!("{}: ok", file.display());
        }
    }

    tracing::debug!(checked = files.len(), failed, "check finished");
    Ok(failed == 0)
}
