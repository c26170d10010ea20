//! `degit clear`: remove cached archives.

use crate::output::StyledOutput;
use degit::{Cache, ClearOutcome, ClearScope, Config, Confirm};
use std::io;

/// Arguments for the clear command.
pub struct ClearArgs {
    pub filter: Option<String>,
    pub yes: bool,
}

/// Terminal yes/no prompt, defaulting to no
pub struct DialoguerConfirm;

impl Confirm for DialoguerConfirm {
    fn confirm(&self, prompt: &str) -> io::Result<bool> {
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(io::Error::other)
    }
}

pub fn execute(
    args: ClearArgs,
    config: &Config,
    confirm: &dyn Confirm,
    out: &mut StyledOutput,
) -> anyhow::Result<()> {
    let cache = Cache::from_config(config);
    let scope = ClearScope::parse(args.filter.as_deref().unwrap_or(""))?;

    match cache.clear_confirmed(&scope, args.yes, confirm)? {
        ClearOutcome::Cleared(dir) => {
            out.success("Cleared");
            out.plain(&format!(" {}", dir.display()));
            out.newline();
        }
        ClearOutcome::NotFound(dir) => {
            let what = match &scope {
                ClearScope::All => "No cache found".to_string(),
                ClearScope::Repository(repo) => format!("No cache found for {}", repo),
            };
            out.warning(&what);
            out.dim(&format!(" ({})", dir.display()));
            out.newline();
        }
        ClearOutcome::Declined => {
            out.info("Aborted.");
            out.newline();
        }
    }

    Ok(())
}
