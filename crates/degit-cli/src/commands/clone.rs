//! `degit clone`: copy a repository into a local directory.

use crate::output::StyledOutput;
use degit::{CancellationToken, CloneOptions, Config, Degit, Repo};
use std::path::PathBuf;

/// Arguments for the clone command.
pub struct CloneArgs {
    pub src: String,
    pub dst: Option<PathBuf>,
    pub force: bool,
    pub verbose: bool,
}

pub fn execute(
    args: CloneArgs,
    config: &Config,
    cancel: CancellationToken,
    out: &mut StyledOutput,
) -> anyhow::Result<()> {
    let repo = Repo::parse(&args.src)?;
    let dest = args
        .dst
        .unwrap_or_else(|| PathBuf::from(repo.default_destination()));

    if args.verbose {
        out.info(&format!("Cloning `{}` into `{}`", repo.url, dest.display()));
        out.newline();
    }

    let degit = Degit::from_config(config)?.with_cancellation(cancel);
    let outcome = degit.clone(&repo, &dest, &CloneOptions { force: args.force })?;

    if args.verbose {
        let source = if outcome.from_cache { "cache" } else { "download" };
        out.dim(&format!("  commit {} from {}", outcome.hash, source));
        out.newline();
        if let Some(evicted) = &outcome.evicted {
            out.dim(&format!("  removed outdated archive {}", evicted.display()));
            out.newline();
        }
    }

    if outcome.is_empty() {
        out.warning("Output directory is empty");
        out.plain(", you might have specified a non-existing subfolder in the repository");
        out.newline();
        return Ok(());
    }

    out.success("Cloned");
    out.plain(&format!(
        " {} ({} files) into {}",
        repo,
        outcome.summary.files,
        dest.display()
    ));
    out.newline();
    Ok(())
}
