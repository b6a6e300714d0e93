use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::version::version_long;

#[derive(Parser, Debug)]
#[command(name = "polrepo")]
#[command(version = version_long())]
#[command(about = "Compose and query hierarchical network policy")]
pub struct Cli {
    /// Show the full error chain on failure
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log at debug level
    #[arg(long, global = true)]
    pub debug: bool,

    /// Settings file to use instead of ~/.polrepo/settings.json
    #[arg(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Repository state file to use instead of the configured one
    #[arg(long, global = true, value_name = "FILE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the policy tree and query identities
    #[command(subcommand)]
    Policy(PolicyCmd),
}

#[derive(Subcommand, Debug)]
pub enum PolicyCmd {
    /// Load a policy file or directory and report whether it is valid
    Validate {
        /// Fragment file or policy directory
        path: PathBuf,
        /// Print the loaded tree after validating it
        #[arg(short, long)]
        dump: bool,
    },
    /// Load a policy file or directory into the repository
    Import {
        /// Fragment file or policy directory
        path: PathBuf,
    },
    /// Print the policy subtree at a dot-separated path
    Dump {
        /// Node path, e.g. root.frontend (default: root)
        path: Option<String>,
    },
    /// Remove the policy subtree at a dot-separated path
    Delete {
        /// Node path, e.g. root.frontend
        path: String,
    },
    /// Look up the security ID of a reserved identity
    #[command(name = "get-id")]
    GetId {
        /// Reserved identity name, e.g. host or reserved:world
        #[arg(required_unless_present = "list")]
        label: Option<String>,
        /// List all reserved identities
        #[arg(short, long)]
        list: bool,
    },
    /// Ask a policy decision service whether one identity may consume another
    ///
    /// Both identities are checked and resolved locally. The verdict and its
    /// trace come from an external decision service; the local repository
    /// cannot answer the query itself and reports it as unsupported.
    Allowed {
        /// Source security ID or SOURCE:KEY[=VALUE] labels
        #[arg(short, long = "source", value_name = "TOKEN", num_args = 1.., required = true)]
        source: Vec<String>,
        /// Destination security ID or SOURCE:KEY[=VALUE] labels
        #[arg(short, long = "destination", value_name = "TOKEN", num_args = 1.., required = true)]
        destination: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_allowed() {
        let cli = Cli::try_parse_from([
            "polrepo", "policy", "allowed", "-s", "k8s:role=a", "k8s:env=b", "-d", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Policy(PolicyCmd::Allowed {
                source,
                destination,
            }) => {
                assert_eq!(source, vec!["k8s:role=a", "k8s:env=b"]);
                assert_eq!(destination, vec!["2"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "polrepo", "policy", "dump", "root.web", "--state", "/tmp/s.json", "--debug",
        ])
        .unwrap();
        assert!(cli.debug);
        assert_eq!(cli.state, Some(PathBuf::from("/tmp/s.json")));
    }

    #[test]
    fn allowed_help_names_decision_service() {
        let cli = Cli::command();
        let allowed = cli
            .find_subcommand("policy")
            .and_then(|policy| policy.find_subcommand("allowed"))
            .unwrap();
        let about = allowed.get_about().unwrap().to_string();
        assert!(about.contains("decision service"));
    }

    #[test]
    fn get_id_needs_label_or_list() {
        assert!(Cli::try_parse_from(["polrepo", "policy", "get-id"]).is_err());
        assert!(Cli::try_parse_from(["polrepo", "policy", "get-id", "--list"]).is_ok());
    }
}
