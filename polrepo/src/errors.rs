//! User-facing error display.
//!
//! Formats anyhow errors with their causal chain and the first help hint any
//! domain error in that chain offers.

use std::io::Write;

use policy_tree::{IdentityError, LabelError, LoadError, ServiceError};

use crate::style;

/// Finds the first help hint offered by a domain error in the chain.
pub fn hint(err: &anyhow::Error) -> Option<String> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<LoadError>() {
            return e.help();
        }
        if let Some(e) = cause.downcast_ref::<IdentityError>() {
            return e.help();
        }
        if let Some(e) = cause.downcast_ref::<LabelError>() {
            return e.help();
        }
        if let Some(e) = cause.downcast_ref::<ServiceError>() {
            return e.help();
        }
        None
    })
}

/// Display a user-facing error on stderr.
///
/// Format:
///   error: top-level message
///     caused by: chain item
///
///   hint: actionable suggestion (if available)
///
/// With `verbose`, the Debug representation of the whole chain follows.
pub fn display_error(err: &anyhow::Error, verbose: bool) {
    let mut stderr = std::io::stderr().lock();

    let _ = writeln!(stderr, "{}: {}", style::err_red_bold("error"), err);

    let chain: Vec<_> = err.chain().skip(1).collect();
    if chain.len() == 1 {
        let _ = writeln!(
            stderr,
            "  {}",
            style::err_dim(&format!("caused by: {}", chain[0]))
        );
    } else {
        for (i, cause) in chain.iter().enumerate() {
            let _ = writeln!(
                stderr,
                "  {}",
                style::err_dim(&format!("{}: {}", i + 1, cause))
            );
        }
    }

    if let Some(hint) = hint(err) {
        let _ = writeln!(stderr, "\n  {}: {}", style::err_cyan_bold("hint"), hint);
    }

    if verbose {
        let _ = writeln!(stderr, "\nFull error chain:\n{:?}", err);
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use policy_tree::Label;

    use super::*;

    #[test]
    fn hint_found_through_context() {
        let err = Label::parse("oops")
            .map_err(IdentityError::from)
            .context("invalid source")
            .unwrap_err();
        assert!(hint(&err).unwrap().contains("SOURCE:KEY"));
    }

    #[test]
    fn hint_absent_for_plain_errors() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(hint(&err), None);
    }

    #[test]
    fn hint_from_service_error() {
        let err = anyhow::Error::new(ServiceError::InvalidPath("a..b".into()));
        assert!(hint(&err).unwrap().contains("dot-separated"));
    }
}
