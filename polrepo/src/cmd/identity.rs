use std::io::Write;

use anyhow::{Context, Result, bail};
use policy_tree::{
    ConsumptionQuery, IdentityResolver, IdentityService, PolicyService, reserved_id,
    reserved_identities, validate_tokens,
};
use tracing::{Level, debug, instrument};

use crate::style;

/// Prints the security ID of a reserved identity, or the whole table.
pub fn handle_get_id(label: Option<&str>, list: bool, out: &mut dyn Write) -> Result<()> {
    if list {
        writeln!(out, "{}", style::header(&format!("{:<15} {:>3}", "NAME", "ID")))?;
        for (name, id) in reserved_identities() {
            writeln!(out, "{:<15} {:>3}", name, id)?;
        }
        return Ok(());
    }

    let Some(label) = label else {
        bail!("no reserved identity name given");
    };
    match reserved_id(label) {
        Some(id) => writeln!(out, "{id}")?,
        None => bail!("unable to find reserved label '{label}'"),
    }
    Ok(())
}

/// Resolves both sides of a consumption query and prints the decision trace.
///
/// Both token lists are checked before `open` is called, so malformed input
/// never reaches the repository.
#[instrument(level = Level::TRACE, skip(open, out))]
pub fn handle_allowed<R, F>(
    source: &[String],
    destination: &[String],
    open: F,
    out: &mut dyn Write,
) -> Result<()>
where
    R: PolicyService + IdentityService,
    F: FnOnce() -> Result<R>,
{
    validate_tokens(source).context("invalid source")?;
    validate_tokens(destination).context("invalid destination")?;

    let repo = open()?;
    let resolver = IdentityResolver::new(&repo);
    let from = resolver
        .resolve(source)
        .context("unable to resolve source identity")?;
    let to = resolver
        .resolve(destination)
        .context("unable to resolve destination identity")?;
    debug!(%from, %to, "querying consumption");

    let reply = repo
        .query_consumption(&ConsumptionQuery {
            from,
            to,
            trace: true,
        })
        .context("unable to query consumption")?;
    out.write_all(&reply.trace_log)?;
    Ok(())
}
