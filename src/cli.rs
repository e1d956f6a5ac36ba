use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Chrysalis - run transformation plans against application source trees
#[derive(Parser)]
#[command(name = "chrysalis")]
#[command(about = "Apply transformation plans and upgrade paths to application folders")]
#[command(version)]
pub struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a plan or upgrade path against an application folder
    Transform(TransformArgs),
    /// Load a plan document and report definition problems
    Validate {
        /// Plan document to validate
        #[arg(short, long)]
        plan: PathBuf,
    },
    /// List the plan documents a directory provides
    List {
        /// Directory holding plan documents (*.json)
        #[arg(short = 'd', long)]
        plans_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct TransformArgs {
    /// Application folder to transform
    pub application: PathBuf,

    /// Plan document to run
    #[arg(short, long, conflicts_with_all = ["template", "plans_dir"], required_unless_present = "template")]
    pub plan: Option<PathBuf>,

    /// Name of a plan document in --plans-dir
    #[arg(short, long, requires = "plans_dir")]
    pub template: Option<String>,

    /// Directory holding plan documents (*.json)
    #[arg(short = 'd', long)]
    pub plans_dir: Option<PathBuf>,

    /// Stop an upgrade path once this version is reached
    #[arg(short, long)]
    pub upgrade_version: Option<String>,

    /// Write the transformed copy into this folder
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Archive the transformed copy as a zip file
    #[arg(short, long)]
    pub zip: bool,

    /// Property passed to every step (repeatable)
    #[arg(long = "property", value_name = "KEY=VALUE")]
    pub properties: Vec<String>,

    /// Configuration file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the JSON result here instead of stdout
    #[arg(short, long)]
    pub result_file: Option<PathBuf>,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["chrysalis"]).is_err());
    }

    #[test]
    fn test_transform_with_plan() {
        let cli = Cli::try_parse_from([
            "chrysalis",
            "transform",
            "app",
            "--plan",
            "plan.json",
            "--property",
            "env=prod",
            "--property",
            "tier=web",
            "--zip",
        ])
        .unwrap();
        let Commands::Transform(args) = cli.command else {
            panic!("expected transform");
        };
        assert_eq!(args.application, PathBuf::from("app"));
        assert_eq!(args.properties, vec!["env=prod", "tier=web"]);
        assert!(args.zip);
    }

    #[test]
    fn test_transform_with_template() {
        let result = Cli::try_parse_from([
            "chrysalis",
            "transform",
            "app",
            "--template",
            "spring",
            "--plans-dir",
            "plans",
            "--upgrade-version",
            "6",
        ]);
        assert!(result.is_ok());
    }

    #[test]
    fn test_transform_plan_sources() {
        // Neither source
        assert!(Cli::try_parse_from(["chrysalis", "transform", "app"]).is_err());
        // Template without a directory
        assert!(Cli::try_parse_from(["chrysalis", "transform", "app", "--template", "x"]).is_err());
        // Both sources
        assert!(
            Cli::try_parse_from([
                "chrysalis",
                "transform",
                "app",
                "--plan",
                "p.json",
                "--template",
                "x",
                "--plans-dir",
                "d"
            ])
            .is_err()
        );
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["chrysalis", "list", "--plans-dir", "plans", "-v"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_validate_and_list() {
        assert!(Cli::try_parse_from(["chrysalis", "validate", "--plan", "p.json"]).is_ok());
        assert!(Cli::try_parse_from(["chrysalis", "list", "--plans-dir", "plans"]).is_ok());
        assert!(Cli::try_parse_from(["chrysalis", "validate"]).is_err());
    }
}
