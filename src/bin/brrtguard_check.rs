use brrtguard::logging::{LogConfig, LoggingState};
use brrtguard::security::{compile_security, SecurityHandlerFactory};
use brrtguard::spec::{load_spec, ApiDocument, SecurityScheme};
use brrtguard::{GuardConfig, UriParsingPolicy};
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;

/// Inspect how BRRTGuard compiles a specification
#[derive(Parser)]
#[command(name = "brrtguard-check", version)]
#[command(about = "Load a spec and report its operations, parameters and security compilation", long_about = None)]
struct Cli {
    /// Path to the Swagger 2.0 / OpenAPI 3.x document (YAML or JSON)
    spec: PathBuf,

    /// Pretend a verifier capability is registered for every scheme
    #[arg(long, default_value_t = false)]
    assume_all_verifiers: bool,

    /// Exit non-zero when any security alternative is dropped
    #[arg(long, env = "BRRTG_STRICT_SECURITY", default_value_t = false)]
    strict: bool,

    /// Parsing policy to report (defaults to the document version's)
    #[arg(long)]
    uri_parser: Option<UriParsingPolicy>,

    /// Log compilation details to stdout
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

/// A factory whose capabilities recognise nobody, one per declared scheme
fn permissive_factory(doc: &ApiDocument) -> SecurityHandlerFactory {
    doc.security_schemes
        .iter()
        .fold(SecurityHandlerFactory::new(), |factory, (name, scheme)| match scheme {
            SecurityScheme::ApiKey { .. } => factory
                .with_api_key_info(name.clone(), |_: &str, _: &[String]| None::<Value>)
                .with_bearer_info(name.clone(), |_: &str| None::<Value>),
            SecurityScheme::Basic => factory.with_basic_info(name.clone(), |_: &str, _: &str| None::<Value>),
            SecurityScheme::Http { .. } => factory
                .with_basic_info(name.clone(), |_: &str, _: &str| None::<Value>)
                .with_bearer_info(name.clone(), |_: &str| None::<Value>),
            SecurityScheme::OAuth2 { .. } => factory.with_token_info(name.clone(), |_: &str| None::<Value>),
            SecurityScheme::Unsupported { .. } => factory,
        })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = LoggingState::new();
    if cli.verbose {
        let mut config = LogConfig::default_dev();
        config.log_level = "info".to_string();
        if let Err(e) = logging.init_once(&config) {
            eprintln!("warning: {e:#}");
        }
    }

    let doc = match load_spec(&cli.spec) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(1);
        }
    };

    let factory = if cli.assume_all_verifiers {
        permissive_factory(&doc)
    } else {
        SecurityHandlerFactory::new()
    };
    let config = GuardConfig {
        uri_parser: cli.uri_parser,
        ..GuardConfig::default()
    };

    println!("{} ({:?})", doc.title, doc.version);
    println!("uri parser: {}", config.policy_for(doc.version));
    println!("operations: {}", doc.operations.len());

    let mut dropped_total = 0;
    for op in &doc.operations {
        println!();
        println!("{} {} [{}] -> {}", op.method, op.path, op.operation_id, op.mimetype());
        for param in &op.parameters {
            let shape = if param.is_array() {
                format!("array<{}>", param.item_type.as_deref().unwrap_or("string"))
            } else {
                param.param_type.clone().unwrap_or_else(|| "string".to_string())
            };
            println!(
                "  param {} in {}: {}{}",
                param.name,
                param.location,
                shape,
                if param.required { " (required)" } else { "" }
            );
        }

        let compiled = compile_security(&op.operation_id, &op.security, &doc.security_schemes, &factory);
        if compiled.auth.is_passthrough() {
            println!("  security: none");
        } else {
            println!(
                "  security: {} of {} alternative(s) usable",
                compiled.auth.alternatives(),
                op.security.alternatives().len()
            );
        }
        for dropped in &compiled.dropped {
            println!("  dropped alternative #{}: {}", dropped.index, dropped.reason);
        }
        dropped_total += compiled.dropped.len();
    }

    if cli.strict && dropped_total > 0 {
        eprintln!("error: {dropped_total} security alternative(s) dropped");
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}
