//! Command-line front end: answer one question and print progress events as
//! JSON lines.

use std::path::PathBuf;
use std::process::ExitCode;

use analysis_pipeline::constants::paths;
use analysis_pipeline::{AnalysisAssistant, InvokeRequest, PipelineConfig, ProgressEvent};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use futures_util::StreamExt;

fn cli() -> Command {
    Command::new("analysis-pipeline")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Answer a question about a registered dataset")
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding config.json, indices and preprocessed copies"),
        )
        .arg(
            Arg::new("dataset")
                .long("dataset")
                .value_name("ID")
                .help("Dataset to analyse"),
        )
        .arg(
            Arg::new("source")
                .long("source")
                .value_name("ID")
                .help("Source id of the dataset, preferred over --dataset"),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .value_name("ID")
                .help("Chat model override"),
        )
        .arg(
            Arg::new("init-config")
                .long("init-config")
                .action(ArgAction::SetTrue)
                .help("Write the effective configuration and exit"),
        )
        .arg(
            Arg::new("question")
                .num_args(1..)
                .trailing_var_arg(true)
                .required_unless_present("init-config")
                .help("The question to answer"),
        )
}

fn question(matches: &ArgMatches) -> String {
    matches
        .get_many::<String>("question")
        .map(|words| words.map(String::as_str).collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let matches = match cli().try_get_matches() {
        Ok(matches) => matches,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let Some(data_dir) = matches
        .get_one::<PathBuf>("data-dir")
        .cloned()
        .or_else(|| dirs::data_dir().map(|d| d.join(paths::APP_DIR)))
    else {
        log::error!("No data directory available; pass --data-dir");
        return ExitCode::FAILURE;
    };

    let config = match PipelineConfig::load(&data_dir).await {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if matches.get_flag("init-config") {
        return match config.save(&data_dir).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("Failed to save configuration: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let assistant = match AnalysisAssistant::from_config(&config, &data_dir).await {
        Ok(assistant) => assistant,
        Err(e) => {
            log::error!("Failed to start the pipeline: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut request = InvokeRequest::new(
        format!("cli-{}", uuid::Uuid::new_v4()),
        question(&matches),
    );
    request.dataset_id = matches.get_one::<String>("dataset").cloned();
    request.source_id = matches.get_one::<String>("source").cloned();
    request.model_id = matches.get_one::<String>("model").cloned();

    let mut failed = false;
    let mut events = assistant.invoke(request);
    while let Some(event) = events.next().await {
        failed |= matches!(event, ProgressEvent::Error { .. });
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => log::error!("Failed to encode event: {}", e),
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(list: &[&str]) -> Result<ArgMatches, clap::Error> {
        cli().try_get_matches_from(std::iter::once("analysis-pipeline").chain(list.iter().copied()))
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn test_parse_flags_and_question() {
        let matches = parse(&["--dataset=7", "--model", "m", "average", "revenue?"]).unwrap();
        assert_eq!(matches.get_one::<String>("dataset").map(String::as_str), Some("7"));
        assert_eq!(matches.get_one::<String>("model").map(String::as_str), Some("m"));
        assert_eq!(question(&matches), "average revenue?");
    }

    #[test]
    fn test_question_words_may_start_with_dashes() {
        let matches = parse(&["--data-dir", "/tmp/data", "what", "is", "--verbose", "here?"]).unwrap();
        assert_eq!(
            matches.get_one::<PathBuf>("data-dir"),
            Some(&PathBuf::from("/tmp/data"))
        );
        assert_eq!(question(&matches), "what is --verbose here?");
    }

    #[test]
    fn test_parse_rejects_missing_value_and_unknown_flag() {
        assert!(parse(&["hello", "--source"]).is_ok());
        assert!(parse(&["--source"]).is_err());
        assert!(parse(&["--verbose", "hello"]).is_err());
    }

    #[test]
    fn test_question_required_unless_init_config() {
        assert!(parse(&[]).is_err());
        let matches = parse(&["--init-config"]).unwrap();
        assert!(matches.get_flag("init-config"));
        assert_eq!(question(&matches), "");
    }
}
