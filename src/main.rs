//! Chrysalis - command-line entry point
//!
//! Loads plans from JSON documents, runs them through the facade and prints
//! the JSON result.

use chrysalis::cli::{Cli, Commands, TransformArgs};
use chrysalis::config::{Configuration, parse_property};
use chrysalis::{
    PlanDocument, PlanRegistry, TransformationListener, TransformationRequest, TransformationResult, Transformer,
};
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing; `RUST_LOG` overrides the default level
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Logs every finished transformation
struct LoggingListener;

impl TransformationListener for LoggingListener {
    fn post_transformation(&self, request: &TransformationRequest, result: &TransformationResult) {
        // Aborted runs are reported by post_transformation_abort
        if !result.successful {
            return;
        }
        info!(
            request = %request.name(),
            operations = result.statistics.operations_count,
            location = %result.transformed_application_location.display(),
            "Transformation completed"
        );
    }

    fn post_transformation_abort(&self, request: &TransformationRequest, result: &TransformationResult) {
        if let Some(details) = &result.abort_details {
            warn!(
                request = %request.name(),
                step = %details.utility_name,
                plan = %details.plan_name,
                "Transformation aborted: {}",
                details.abort_message
            );
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);
    debug!("Chrysalis starting up");

    match cli.command {
        Commands::Transform(args) => {
            let result = match run_transform(&args) {
                Ok(result) => result,
                Err(e) => {
                    error!("Transformation failed: {}", e);
                    eprintln!("✗ Transformation failed: {}", e);
                    std::process::exit(1);
                }
            };

            match &args.result_file {
                Some(path) => {
                    result.save_to_file(path)?;
                    info!("Result written to {:?}", path);
                }
                None => println!("{}", result.to_json()?),
            }

            if result.successful {
                eprintln!("✓ {} applied to {:?}", result.request_name, result.transformed_application_location);
            } else {
                let message = result
                    .abort_details
                    .as_ref()
                    .map(|d| d.abort_message.as_str())
                    .unwrap_or("transformation did not complete");
                eprintln!("✗ {} aborted: {}", result.request_name, message);
                std::process::exit(1);
            }
        }
        Commands::Validate { plan } => {
            info!("Validating plan document: {:?}", plan);
            if let Err(e) = validate_document(&plan) {
                error!("Plan validation failed: {}", e);
                eprintln!("✗ Plan validation failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::List { plans_dir } => {
            let mut registry = PlanRegistry::new();
            match registry.load_from_directory(&plans_dir) {
                Ok(0) => println!("No plan documents in {:?}", plans_dir),
                Ok(_) => {
                    for document in registry.all() {
                        println!("{:<30} {}", document.name, document.description);
                    }
                }
                Err(e) => {
                    error!("Failed to load plan documents: {}", e);
                    eprintln!("✗ Failed to load plan documents: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Layer flags over the optional configuration file and run the request
fn run_transform(args: &TransformArgs) -> chrysalis::Result<TransformationResult> {
    let mut config = match &args.config {
        Some(path) => Configuration::load_from_file(path)?,
        None => Configuration::new(),
    };
    if let Some(output) = &args.output {
        config.output_folder = Some(output.clone());
    }
    if args.zip {
        config.zip_output = true;
    }
    for property in &args.properties {
        let (key, value) = parse_property(property)?;
        config.properties.insert(key, value);
    }

    let up_to = args.upgrade_version.as_deref();
    let request = match (&args.plan, &args.template, &args.plans_dir) {
        (Some(plan), _, _) => PlanDocument::from_file(plan)?.build(up_to)?,
        (None, Some(template), Some(dir)) => {
            let mut registry = PlanRegistry::new();
            let count = registry.load_from_directory(dir)?;
            debug!("Loaded {} plan documents from {:?}", count, dir);
            registry.request(template, up_to)?
        }
        _ => {
            return Err(chrysalis::ChrysalisError::validation(
                "either --plan or --template with --plans-dir is required",
            ));
        }
    };

    info!(request = %request.name(), application = %args.application.display(), "Starting transformation");
    Transformer::new()
        .with_listener(LoggingListener)
        .transform(&args.application, &request, &config)
}

/// Build every plan of a document and print its definition problems
fn validate_document(path: &Path) -> chrysalis::Result<()> {
    let document = PlanDocument::from_file(path)?;
    let plans = document.build_plans()?;
    // Chain checks for upgrade documents
    document.build(None)?;

    let mut problems = 0;
    for plan in &plans {
        let issues = plan.validate();
        let (warnings, errors): (Vec<_>, Vec<_>) = issues.iter().partition(|issue| issue.is_warning());
        if errors.is_empty() {
            println!("✓ {} ({} steps)", plan.name(), plan.len());
        } else {
            println!("✗ {}", plan.name());
        }
        for issue in &errors {
            println!("    {}", issue);
        }
        for issue in &warnings {
            warn!(plan = %plan.name(), "{}", issue);
            println!("    warning: {}", issue);
        }
        problems += errors.len();
    }

    if problems > 0 {
        return Err(chrysalis::ChrysalisError::validation(format!(
            "{problems} definition problem(s) in '{}'",
            document.name
        )));
    }
    println!("✓ Plan document is valid: {}", document.name);
    Ok(())
}
