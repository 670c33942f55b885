use hspi::error::CliError;
use hspi::selftest::{self, SelfTestOptions};
use hspi_orchestrator::OrchestratorConfig;
use std::env;

fn parse_count(flag: &str, value: Option<String>) -> Result<usize, CliError> {
    let value = value.ok_or_else(|| CliError::Usage(format!("{flag} needs a value")))?;
    value
        .parse::<usize>()
        .map_err(|_| CliError::Usage(format!("{flag} expects a number, got {value}")))
}

fn parse_args(mut args: Vec<String>) -> Result<(String, SelfTestOptions), CliError> {
    if args.is_empty() {
        return Err(CliError::Usage("missing <config.toml>".into()));
    }
    let path = args.remove(0);

    let mut options = SelfTestOptions::default();
    let mut rest = args.into_iter();
    while let Some(flag) = rest.next() {
        match flag.as_str() {
            "--frames" => options.frames = parse_count("--frames", rest.next())?,
            "--words" => options.words = parse_count("--words", rest.next())?,
            other => return Err(CliError::Usage(format!("unknown argument: {other}"))),
        }
    }
    Ok((path, options))
}

fn run(args: Vec<String>) -> Result<bool, CliError> {
    let (path, options) = parse_args(args)?;
    let config = OrchestratorConfig::from_file(&path)?;
    let report = selftest::run(&config, &options)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.passed())
}

fn main() {
    env_logger::init();

    let mut args = env::args();
    let program = args.next().unwrap_or_else(|| "hspi".to_string());

    match run(args.collect()) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err @ CliError::Usage(_)) => {
            eprintln!("{err}");
            eprintln!("Usage: {program} <config.toml> [--frames N] [--words N]");
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
