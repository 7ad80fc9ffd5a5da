use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use repex::config::load_vars_file;
use repex::logging::{self, LogArgs};
use repex::{
    iterate, load_from_path, FileOutcome, PathSpec, RepexConfig, ReplaceScope, RunOptions,
    RunReport, ValidationPolicy, ValidatorSpec, Variables,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "repex")]
#[command(about = "Replace strings in files using regular expressions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace strings in every path listed in a config file
    FromConfig(FromConfigArgs),

    /// Replace strings in one explicit path
    InPath(InPathArgs),
}

#[derive(Args)]
struct RunFlags {
    /// Write a unified diff of every change to .repex/diff-<timestamp>
    #[arg(long)]
    diff: bool,

    /// Only run validators; do not replace anything
    #[arg(long, conflicts_with = "no_validate")]
    validate_only: bool,

    /// Skip all validators
    #[arg(long)]
    no_validate: bool,
}

impl RunFlags {
    fn options(&self) -> RunOptions {
        RunOptions {
            with_diff: self.diff,
            validate: !self.no_validate,
            validate_only: self.validate_only,
            ..RunOptions::default()
        }
    }
}

#[derive(Args)]
struct FromConfigArgs {
    /// Path to the repex config file
    config: PathBuf,

    /// YAML file with variables (name: value)
    #[arg(long)]
    vars_file: Option<PathBuf>,

    /// A variable as key=value (repeatable; overrides --vars-file)
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// Only run paths with this tag (repeatable; `any` runs everything)
    #[arg(short, long = "tag")]
    tags: Vec<String>,

    #[command(flatten)]
    run: RunFlags,
}

#[derive(Args)]
struct InPathArgs {
    /// File path, or directory regex when --ftype is given
    path: String,

    /// Regex of the string(s) to replace
    #[arg(short, long)]
    replace: String,

    /// Replacement string
    #[arg(short, long)]
    with: String,

    /// Context regex (defaults to --replace)
    #[arg(short, long = "match")]
    match_regex: Option<String>,

    /// Filename regex; turns PATH into a directory regex
    #[arg(short = 't', long, conflicts_with = "to_file")]
    ftype: Option<String>,

    /// Write the result here instead of in place
    #[arg(long)]
    to_file: Option<String>,

    /// Base directory for discovery and relative paths
    #[arg(short, long)]
    basedir: Option<String>,

    /// Path to exclude, relative to the base directory (repeatable)
    #[arg(short = 'x', long = "exclude")]
    excluded: Vec<String>,

    /// Filename regex to exclude from discovery
    #[arg(long)]
    exclude_filename: Option<String>,

    /// String that must be present before replacing (repeatable)
    #[arg(short = 'i', long = "must-include")]
    must_include: Vec<String>,

    /// Validator as SCRIPT:FUNCTION
    #[arg(long, value_parser = parse_validator)]
    validator: Option<(String, String)>,

    /// When to run the validator
    #[arg(long, value_parser = parse_policy, default_value = "per_type")]
    validator_type: ValidationPolicy,

    /// Replace at exact match offsets instead of every literal occurrence
    #[arg(long)]
    offsets: bool,

    #[command(flatten)]
    run: RunFlags,
}

impl InPathArgs {
    fn into_spec(self) -> PathSpec {
        let validator = self.validator.map(|(path, function)| ValidatorSpec {
            policy: self.validator_type,
            path: Some(path),
            function: Some(function),
        });
        PathSpec {
            path: self.path,
            file_type: self.ftype,
            base_directory: self.basedir,
            match_expression: self.match_regex,
            replace: self.replace,
            with: Some(self.with),
            to_file: self.to_file,
            must_include: self.must_include,
            excluded: self.excluded,
            excluded_filename: self.exclude_filename,
            validator,
            scope: if self.offsets {
                ReplaceScope::Offsets
            } else {
                ReplaceScope::Literal
            },
            ..PathSpec::default()
        }
    }
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

fn parse_validator(raw: &str) -> Result<(String, String), String> {
    raw.rsplit_once(':')
        .filter(|(path, function)| !path.is_empty() && !function.is_empty())
        .map(|(path, function)| (path.to_string(), function.to_string()))
        .ok_or_else(|| format!("expected SCRIPT:FUNCTION, got `{raw}`"))
}

fn parse_policy(raw: &str) -> Result<ValidationPolicy, String> {
    match raw {
        "per_file" => Ok(ValidationPolicy::PerFile),
        "per_type" => Ok(ValidationPolicy::PerType),
        other => Err(format!("expected per_file or per_type, got `{other}`")),
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log);

    let result = match cli.command {
        Commands::FromConfig(args) => cmd_from_config(args),
        Commands::InPath(args) => cmd_in_path(args),
    };

    if let Err(err) = result {
        eprintln!("{} {}", "✗".red(), err);
        std::process::exit(1);
    }
}

fn cmd_from_config(args: FromConfigArgs) -> Result<()> {
    let config = load_from_path(&args.config)?;

    let mut vars = match &args.vars_file {
        Some(path) => load_vars_file(path)?,
        None => Variables::new(),
    };
    for (name, value) in args.vars {
        vars.insert(name, value);
    }

    println!("Config: {}", args.config.display());
    if !args.tags.is_empty() {
        println!("Tags: {}", args.tags.join(", "));
    }
    println!();

    let report = iterate(&config, &vars, &args.tags, &args.run.options())?;
    print_report(&report);
    Ok(())
}

fn cmd_in_path(args: InPathArgs) -> Result<()> {
    let options = args.run.options();
    let config = RepexConfig {
        paths: vec![args.into_spec()],
        ..RepexConfig::default()
    };

    let report = iterate(&config, &Variables::new(), &[], &options)?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    let mut replaced = 0;
    let mut unchanged = 0;
    let mut no_matches = 0;
    let mut not_processed = 0;

    for path in &report.handled {
        println!("{}", path.path.display().to_string().bold());
        for outcome in &path.outcomes {
            match outcome {
                FileOutcome::Replaced { .. } => {
                    println!("  {} {}", "✓".green(), outcome);
                    replaced += 1;
                }
                FileOutcome::Unchanged { .. } => {
                    println!("  {} {}", "⊙".yellow(), outcome);
                    unchanged += 1;
                }
                FileOutcome::NoMatches { .. } => {
                    println!("  {} {}", "⊘".cyan(), outcome);
                    no_matches += 1;
                }
                FileOutcome::NotProcessed { .. } => {
                    println!("  {} {}", "⊙".cyan(), outcome);
                    not_processed += 1;
                }
            }
        }
        if path.outcomes.is_empty() {
            println!("  {}", "No files found".dimmed());
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} replaced", format!("{}", replaced).green());
    println!("  {} unchanged", format!("{}", unchanged).yellow());
    println!("  {} without matches", format!("{}", no_matches).cyan());
    if not_processed > 0 {
        println!("  {} validated only", format!("{}", not_processed).cyan());
    }
    if !report.skipped.is_empty() {
        println!(
            "  {} path(s) skipped by tag",
            format!("{}", report.skipped.len()).dimmed()
        );
    }
    if let Some(diff_log) = &report.diff_log {
        println!("  diff written to {}", diff_log.display());
    }
}
