//! ForgeSite CLI - rule inspection bridge
//!
//! Commands: rules, explain
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 when the rules fail to load

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use forgesite_core::{
    CallbackRegistry, ConfigurationBuilder, Identifier, Rule, RuleSet, DEFAULT_REP, LAST_SNAPSHOT,
};

#[derive(Parser)]
#[command(name = "forgesite-cli")]
#[command(about = "ForgeSite CLI - Static Content Rule Engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the rules file
    #[arg(short, long, default_value = "Rules.json")]
    rules: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the loaded rule set
    Rules,

    /// Show which rules apply to an identifier
    Explain {
        /// Item or layout identifier
        #[arg(short, long)]
        identifier: String,

        /// Representation name
        #[arg(long, default_value = DEFAULT_REP)]
        rep: String,

        /// Snapshot name for the routing lookup
        #[arg(long, default_value = LAST_SNAPSHOT)]
        snapshot: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Host callbacks are not linked into the CLI; rules naming them fail to load.
    let rules = match ConfigurationBuilder::from_path(&cli.rules, CallbackRegistry::new()) {
        Ok(r) => r,
        Err(e) => {
            let output = serde_json::json!({
                "success": false,
                "error": e.to_string(),
            });
            println!("{}", output);
            return ExitCode::from(2);
        }
    };

    let output = match cli.command {
        Commands::Rules => serde_json::json!({
            "success": true,
            "rules": rules.summary(),
        }),
        Commands::Explain { identifier, rep, snapshot } => explain(&rules, &identifier, &rep, &snapshot),
    };

    match serde_json::to_string_pretty(&output) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("failed to serialize output: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn explain(rules: &RuleSet, identifier: &str, rep: &str, snapshot: &str) -> serde_json::Value {
    let identifier = Identifier::new(identifier);
    serde_json::json!({
        "success": true,
        "identifier": identifier,
        "rep": rep,
        "compile": rules.compilation_rule_for(&identifier, rep).map(Rule::describe),
        "route": rules.routing_rule_for(&identifier, rep, snapshot).map(Rule::describe),
        "layout": rules.filter_for_layout(&identifier).map(|(filter, options)| serde_json::json!({
            "filter": filter,
            "options": options,
        })),
    })
}
