// ABOUTME: Entry point for the openai-exam command line
// Loads configuration, validates the credential and dispatches to a subcommand

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgMatches, Command};
use openai_exam::{
    app::config::AppConfig,
    chat::{AssistantSession, CompletionClient},
    ui::report::{CostReport, PriceTable, SessionTotals},
    CostCalculator, OpenAiClient,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant designed to output JSON.";

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the environment may already carry the key
    let _ = dotenvy::dotenv();

    let matches = build_cli().get_matches();
    let debug = matches.get_flag("debug");
    init_tracing(debug);

    let config_path = matches.get_one::<PathBuf>("config");

    // --init must work before any config file exists
    if let Some(("config", sub)) = matches.subcommand() {
        if sub.get_flag("init") {
            return init_config(config_path, sub.get_flag("force"));
        }
    }

    let mut config = AppConfig::load_from(config_path.map(|p| p.as_path()))?;
    config.debug = debug;

    let calculator = Arc::new(load_calculator(&config)?);

    match matches.subcommand() {
        Some(("complete", sub)) => run_complete(config, calculator, sub).await,
        Some(("chat", sub)) => run_chat(config, calculator, sub).await,
        Some(("cost", sub)) => run_cost(&calculator, sub),
        Some(("models", _)) => {
            print!("{}", PriceTable::new(&calculator));
            Ok(())
        }
        Some(("config", _)) => show_config(&config),
        _ => unreachable!("clap requires a subcommand"),
    }
}

fn build_cli() -> Command {
    Command::new("openai-exam")
        .version(env!("CARGO_PKG_VERSION"))
        .author("OpenAI Exam Team")
        .about("Chat with OpenAI assistants and completions while tracking token cost")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Enable debug logging")
                .action(clap::ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("complete")
                .about("Send one system+user prompt in JSON mode and print the reply")
                .arg(Arg::new("prompt").required(true).value_name("PROMPT"))
                .arg(
                    Arg::new("system")
                        .short('s')
                        .long("system")
                        .value_name("TEXT")
                        .default_value(DEFAULT_SYSTEM_PROMPT),
                )
                .arg(Arg::new("model").short('m').long("model").value_name("MODEL")),
        )
        .subcommand(
            Command::new("chat")
                .about("Start an interactive assistant session (type 'exit' or 'quit' to leave)")
                .arg(Arg::new("model").short('m').long("model").value_name("MODEL"))
                .arg(Arg::new("name").long("name").value_name("NAME"))
                .arg(Arg::new("instructions").long("instructions").value_name("TEXT"))
                .arg(
                    Arg::new("run-instructions")
                        .long("run-instructions")
                        .value_name("TEXT"),
                )
                .arg(
                    Arg::new("context")
                        .long("context")
                        .value_name("TEXT")
                        .help("Extra context added to the thread before the first prompt"),
                )
                .arg(
                    Arg::new("poll-interval")
                        .long("poll-interval")
                        .value_name("DURATION")
                        .help("Delay between run status checks, e.g. 500ms")
                        .value_parser(humantime::parse_duration),
                )
                .arg(
                    Arg::new("poll-timeout")
                        .long("poll-timeout")
                        .value_name("DURATION")
                        .help("Give up on a run after this long, e.g. 2m")
                        .value_parser(humantime::parse_duration),
                )
                .arg(
                    Arg::new("replay-history")
                        .long("replay-history")
                        .help("Reprint every assistant message in the thread on each turn")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("cost")
                .about("Estimate the cost of a call from its token counts")
                .arg(Arg::new("model").required(true).value_name("MODEL"))
                .arg(
                    Arg::new("prompt-tokens")
                        .required(true)
                        .value_name("PROMPT_TOKENS")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("completion-tokens")
                        .required(true)
                        .value_name("COMPLETION_TOKENS")
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(Command::new("models").about("List priced models and tool fees"))
        .subcommand(
            Command::new("config")
                .about("Show the effective configuration")
                .arg(
                    Arg::new("init")
                        .long("init")
                        .help("Write a default config file")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help("Overwrite an existing file with --init")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("openai_exam=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("openai_exam=warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_calculator(config: &AppConfig) -> Result<CostCalculator> {
    match &config.pricing_file {
        Some(path) => CostCalculator::load_from_json(path)
            .with_context(|| format!("loading pricing file {}", path.display())),
        None => Ok(CostCalculator::new()),
    }
}

async fn run_complete(
    mut config: AppConfig,
    calculator: Arc<CostCalculator>,
    matches: &ArgMatches,
) -> Result<()> {
    if let Some(model) = matches.get_one::<String>("model") {
        config.completion.model = model.clone();
    }

    // Credential and model are both checked before any request goes out
    let api = OpenAiClient::from_config(&config)?;
    let client = CompletionClient::new(Box::new(api), calculator.clone(), config.completion.clone())?;

    let system = matches
        .get_one::<String>("system")
        .map(String::as_str)
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let prompt = matches
        .get_one::<String>("prompt")
        .context("prompt is required")?;

    let completion = client.complete(system, prompt).await?;

    let pricing = calculator.pricing(client.model())?;
    eprintln!("{}", CostReport::new(pricing, &completion.cost));
    println!("{}", completion.content);

    Ok(())
}

async fn run_chat(
    mut config: AppConfig,
    calculator: Arc<CostCalculator>,
    matches: &ArgMatches,
) -> Result<()> {
    let assistant = &mut config.assistant;
    if let Some(model) = matches.get_one::<String>("model") {
        assistant.model = model.clone();
    }
    if let Some(name) = matches.get_one::<String>("name") {
        assistant.name = name.clone();
    }
    if let Some(instructions) = matches.get_one::<String>("instructions") {
        assistant.instructions = instructions.clone();
    }
    if let Some(run_instructions) = matches.get_one::<String>("run-instructions") {
        assistant.run_instructions = Some(run_instructions.clone());
    }
    if matches.get_flag("replay-history") {
        assistant.replay_history = true;
    }

    let poll_interval = matches
        .get_one::<Duration>("poll-interval")
        .copied()
        .unwrap_or_else(|| config.assistant.poll_interval());
    let poll_timeout = matches
        .get_one::<Duration>("poll-timeout")
        .copied()
        .unwrap_or_else(|| config.assistant.poll_timeout());
    if poll_interval.is_zero() || poll_timeout < poll_interval {
        bail!("poll timeout must be at least one non-zero poll interval");
    }

    let api = OpenAiClient::from_config(&config)?;
    let mut session = AssistantSession::create(Box::new(api), calculator, config.assistant.clone())
        .await?
        .with_polling(poll_interval, poll_timeout);

    if let Some(context) = matches.get_one::<String>("context") {
        session.add_system_message(context).await?;
    }

    let summary = session
        .run_interactive(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    println!(
        "{}",
        SessionTotals {
            turns: summary.turns,
            token_cost: &summary.token_cost,
            tool_cost: summary.tool_cost,
        }
    );

    Ok(())
}

fn run_cost(calculator: &CostCalculator, matches: &ArgMatches) -> Result<()> {
    let model = matches
        .get_one::<String>("model")
        .context("model is required")?;
    let prompt_tokens = *matches
        .get_one::<u64>("prompt-tokens")
        .context("prompt token count is required")?;
    let completion_tokens = *matches
        .get_one::<u64>("completion-tokens")
        .context("completion token count is required")?;

    let breakdown = calculator.estimate(model, prompt_tokens, completion_tokens)?;
    let pricing = calculator.pricing(model)?;
    println!("{}", CostReport::new(pricing, &breakdown));

    Ok(())
}

fn init_config(explicit: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = match explicit {
        Some(path) => path.clone(),
        None => AppConfig::default_path().context("no config directory on this platform")?,
    };
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    AppConfig::default().save_to(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn show_config(config: &AppConfig) -> Result<()> {
    match &config.config_path {
        Some(path) => println!("# loaded from {}", path.display()),
        None => println!("# built-in defaults (no config file)"),
    }
    println!(
        "# OPENAI_API_KEY is {}",
        if config.api_key.is_some() { "set" } else { "not set" }
    );
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
