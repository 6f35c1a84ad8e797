use std::fs;
use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use miette::IntoDiagnostic;
use miette::WrapErr;
use rule_engine::Lexer;
use rule_engine::Node;
use rule_engine::TokenKind;
use rule_engine::lex::SingleTokenError;
use rule_engine::lex::StringTerminationError;

#[derive(Parser, Debug)]
#[command(version, about = "Compile and evaluate rule expressions")]
struct Cli {
    /// Log pipeline stages (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the token stream
    Tokenize(Source),
    /// Print the compiled tree
    Parse(Source),
    /// Evaluate against parameters
    Eval {
        #[command(flatten)]
        source: Source,

        /// Bind NAME to VALUE; VALUE is read as JSON, else as a string
        #[arg(short, long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
        params: Vec<(String, serde_json::Value)>,

        /// Bind every key of a JSON object
        #[arg(long = "params", value_name = "JSON")]
        params_json: Option<String>,

        /// Print the result as a JSON object
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
struct Source {
    /// Expression text
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    expression: Option<String>,

    /// Read the expression from a file
    #[arg(short, long)]
    file: Option<PathBuf>,
}

impl Source {
    fn read(&self) -> miette::Result<(Option<String>, String)> {
        match (&self.expression, &self.file) {
            (Some(expression), _) => Ok((None, expression.clone())),
            (None, Some(filename)) => {
                let contents = fs::read_to_string(filename)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("reading `{}` failed", filename.display()))?;
                Ok((Some(filename.display().to_string()), contents))
            }
            (None, None) => Err(miette::miette!("no expression given")),
        }
    }
}

fn parse_param(s: &str) -> Result<(String, serde_json::Value), String> {
    let (name, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{s}`"))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::from(raw));
    Ok((name.to_string(), value))
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn compile_or_exit(filename: Option<&str>, source: &str) -> Node {
    match rule_engine::compile_named(filename, source) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("{e:?}");
            std::process::exit(65);
        }
    }
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Tokenize(source) => {
            let (filename, contents) = source.read()?;

            for token in Lexer::new(filename.as_deref(), &contents) {
                let token = match token {
                    Ok(token) => token,
                    Err(e) => {
                        if let Some(single_token_error) = e.downcast_ref::<SingleTokenError>() {
                            eprintln!(
                                "Error: Unexpected character: {}",
                                single_token_error.token
                            );
                        } else if e.downcast_ref::<StringTerminationError>().is_some() {
                            eprintln!("Error: Unterminated string");
                        }
                        eprintln!("{e:?}");
                        std::process::exit(65);
                    }
                };
                if token.kind == TokenKind::Eof {
                    println!("{token}");
                } else {
                    println!("{token} @{}", token.position);
                }
            }
        }
        Commands::Parse(source) => {
            let (filename, contents) = source.read()?;
            let root = compile_or_exit(filename.as_deref(), &contents);
            println!("{root}");
        }
        Commands::Eval {
            source,
            params,
            params_json,
            json,
        } => {
            let (filename, contents) = source.read()?;

            let mut bindings = match params_json {
                Some(raw) => serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&raw)
                    .into_diagnostic()
                    .wrap_err("`--params` must be a JSON object")?,
                None => serde_json::Map::new(),
            };
            bindings.extend(params);

            let mut root = compile_or_exit(filename.as_deref(), &contents);
            if let Err(e) = root.eval(&bindings) {
                eprintln!("{e:?}");
                std::process::exit(70);
            }

            let (value, flag) = root.value();
            tracing::debug!(%flag, "evaluated expression");
            if json {
                let value = value.cloned().map_or(serde_json::Value::Null, Into::into);
                println!("{}", serde_json::json!({ "value": value, "type": flag.to_string() }));
            } else {
                match value {
                    Some(value) => println!("{value} ({flag})"),
                    None => println!("null ({flag})"),
                }
            }
        }
    }
    Ok(())
}
