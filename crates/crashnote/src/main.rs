//! `crashnote` - CLI for building and inspecting error reports

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::debug;

use crashnote::cli::{
    Cli, ClassifyCommand, Command, ConfigCommand, EnvCommand, ReportCommand, UserCommand,
};
use crashnote::environment::{FixedClock, USER_ID_KEY};
use crashnote::incident::Context;
use crashnote::sink::{JsonLinesSink, TracingSink};
use crashnote::{
    init_logging, CaughtError, Classifier, Config, EnvironmentSource, ErrorHandler, ErrorInfo,
    ErrorReporter, FileStore, KeyValueStore, ReportParams, ReportSink,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config_path = cli.config;
    match cli.command {
        Command::Report(report_cmd) => handle_report(&load_config(config_path)?, report_cmd),
        Command::Env(env_cmd) => handle_env(&load_config(config_path)?, &env_cmd),
        Command::Classify(classify_cmd) => {
            handle_classify(&load_config(config_path)?, &classify_cmd)
        }
        Command::User(user_cmd) => handle_user(&load_config(config_path)?, &user_cmd),
        Command::Config(config_cmd) => handle_config(config_path, config_cmd),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
    let config = Config::load_from(path)?;
    debug!(?config, "Configuration loaded");
    Ok(config)
}

fn handle_report(config: &Config, cmd: ReportCommand) -> Result<(), Box<dyn std::error::Error>> {
    let sink: Box<dyn ReportSink> = match &config.handler.output_path {
        Some(path) => Box::new(JsonLinesSink::append_to(path)?),
        None => Box::new(TracingSink),
    };

    let handler = Arc::new(ErrorHandler::from_config(config, sink));
    crashnote::install_panic_hook(Arc::clone(&handler));

    let mut source = EnvironmentSource::new();
    if let Some(user_agent) = cmd.user_agent {
        source = source.with_user_agent(user_agent);
    }
    if let Some(url) = cmd.url {
        source = source.with_href(url);
    }
    if let Some(at) = cmd.at {
        source = source.with_clock(Arc::new(FixedClock(at)));
    }

    let mut error = CaughtError::new(cmd.message);
    if let Some(stack) = cmd.stack {
        error = error.with_stack(stack);
    }

    let mut params = ReportParams::new(error).with_environment(source);
    if let Some(error_id) = cmd.error_id {
        params = params.with_error_id(error_id);
    }
    if let Some(component_stack) = cmd.component_stack {
        params = params.with_error_info(ErrorInfo::with_component_stack(component_stack));
    }

    let context: Context = cmd
        .context
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect();

    let incident = handler.handle_with_context(params, context);

    if cmd.pretty {
        println!("{}", serde_json::to_string_pretty(&incident)?);
    } else {
        println!("{}", serde_json::to_string(&incident)?);
    }
    Ok(())
}

fn handle_env(config: &Config, cmd: &EnvCommand) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = ErrorReporter::from_config(&config.reporter).resolve_environment(None);
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("Environment");
        println!("-----------");
        println!("User agent:  {}", snapshot.user_agent);
        println!("URL:         {}", snapshot.url);
        println!("User id:     {}", snapshot.user_id);
    }
    Ok(())
}

fn handle_classify(
    config: &Config,
    cmd: &ClassifyCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind = Classifier::with_config(&config.classifier).classify(&cmd.message);
    if cmd.json {
        let out = serde_json::json!({
            "kind": kind,
            "severity": kind.severity(),
            "user_message": kind.user_message(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Kind:      {kind}");
        println!("Severity:  {}", kind.severity());
        println!("Message:   {}", kind.user_message());
    }
    Ok(())
}

fn handle_user(config: &Config, cmd: &UserCommand) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileStore::new(config.storage_path());
    match cmd {
        UserCommand::Show => match store.get_item(USER_ID_KEY)? {
            Some(id) => println!("{id}"),
            None => println!("(not set)"),
        },
        UserCommand::Set { id } => {
            if id.trim().is_empty() {
                return Err("user id cannot be blank".into());
            }
            store.set_item(USER_ID_KEY, id)?;
            println!("User id stored in {}", store.path().display());
        }
        UserCommand::Clear => match store.remove_item(USER_ID_KEY)? {
            Some(_) => println!("User id removed."),
            None => println!("No user id was stored."),
        },
    }
    if !config.reporter.storage_enabled {
        println!("Note: storage is disabled; reports will not read this value.");
    }
    Ok(())
}

fn handle_config(
    config_path: Option<PathBuf>,
    cmd: ConfigCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = &load_config(config_path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Reporter]");
                println!(
                    "  User agent:         {}",
                    config.reporter.user_agent.as_deref().unwrap_or("(process)")
                );
                println!(
                    "  URL:                {}",
                    config.reporter.url.as_deref().unwrap_or("(working directory)")
                );
                println!("  Storage enabled:    {}", config.reporter.storage_enabled);
                println!("  Storage path:       {}", config.storage_path().display());
                println!();
                println!("[Handler]");
                println!("  Reporting:          {}", config.handler.enable_reporting);
                println!("  Auto retry:         {}", config.handler.enable_auto_retry);
                println!("  Max retries:        {}", config.handler.max_retries);
                println!("  Retry delay (ms):   {}", config.handler.retry_delay_ms);
                println!();
                println!("[Classifier]");
                println!(
                    "  Custom rules:       {}",
                    config.classifier.custom_rules.len()
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            Config::check_file(&path)?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}
