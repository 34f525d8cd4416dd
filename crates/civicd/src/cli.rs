use std::path::PathBuf;

use civic_config::InferenceProviderKind;
use civic_core::{Department, Status};
use civic_infer::ProviderOverrides;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ServeArgs {
    #[arg(long, help = "Listen address, overrides [server].bind")]
    pub bind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ReportArgs {
    #[arg(long, value_parser = parse_department, help = "Department to report on")]
    pub department: Department,

    #[arg(long, help = "Ask the assistant for key insights")]
    pub insights: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct LeaderboardArgs {
    #[arg(long, default_value_t = 10, help = "Number of citizens to list")]
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct TrackArgs {
    #[arg(help = "Issue id to look up")]
    pub issue_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct SetStatusArgs {
    #[arg(help = "Issue id to update")]
    pub issue_id: String,

    #[arg(value_parser = parse_status, help = "Pending, in-progress or resolved")]
    pub status: Status,

    #[arg(long, help = "User id of the acting administrator")]
    pub admin: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Print one department's report as JSON
    Report(ReportArgs),
    /// Print the city-wide report for every department
    AdminReport,
    /// Print the citizen leaderboard
    Leaderboard(LeaderboardArgs),
    /// Ask the assistant for an issue's status
    Track(TrackArgs),
    /// Move an issue to a new status as an administrator
    SetStatus(SetStatusArgs),
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Civic issue reporting service")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Data root holding the .civic directory"
    )]
    pub root: PathBuf,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log output format: human or json"
    )]
    pub log_format: LogFormat,

    #[arg(long, global = true, value_parser = parse_inference_provider)]
    pub inference_provider: Option<InferenceProviderKind>,

    #[arg(long, global = true)]
    pub inference_model: Option<String>,

    #[arg(long, global = true)]
    pub inference_api_key_env: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn provider_overrides(&self) -> ProviderOverrides {
        ProviderOverrides {
            provider: self.inference_provider,
            model: self.inference_model.clone(),
            api_key_env: self.inference_api_key_env.clone(),
        }
    }
}

fn parse_inference_provider(value: &str) -> Result<InferenceProviderKind, String> {
    value.parse()
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_department(value: &str) -> Result<Department, String> {
    value.parse()
}

fn parse_status(value: &str) -> Result<Status, String> {
    value.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_and_serve() {
        let cli = Cli::try_parse_from([
            "civicd",
            "--root",
            "/tmp/city",
            "--log-format",
            "json",
            "serve",
            "--bind",
            "0.0.0.0:9000",
        ])
        .expect("parse serve");

        assert_eq!(cli.root, PathBuf::from("/tmp/city"));
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(
            cli.command,
            Commands::Serve(ServeArgs {
                bind: Some("0.0.0.0:9000".to_owned()),
            })
        );
    }

    #[test]
    fn parses_set_status_with_lenient_status_names() {
        let cli = Cli::try_parse_from([
            "civicd",
            "set-status",
            "issue-1-abcdef12",
            "in-progress",
            "--admin",
            "user-9",
            "--inference-provider",
            "mock",
        ])
        .expect("parse set-status");

        assert_eq!(
            cli.command,
            Commands::SetStatus(SetStatusArgs {
                issue_id: "issue-1-abcdef12".to_owned(),
                status: Status::InProgress,
                admin: "user-9".to_owned(),
            })
        );
        assert_eq!(
            cli.provider_overrides().provider,
            Some(InferenceProviderKind::Mock)
        );
    }

    #[test]
    fn report_requires_known_department() {
        let cli = Cli::try_parse_from(["civicd", "report", "--department", "water", "--insights"])
            .expect("parse report");
        assert_eq!(
            cli.command,
            Commands::Report(ReportArgs {
                department: Department::Water,
                insights: true,
            })
        );

        assert!(Cli::try_parse_from(["civicd", "report", "--department", "parks"]).is_err());
        assert!(Cli::try_parse_from(["civicd", "--log-format", "xml", "admin-report"]).is_err());
    }

    #[test]
    fn log_format_round_trips_names() {
        for format in [LogFormat::Human, LogFormat::Json] {
            assert_eq!(format.as_str().parse::<LogFormat>(), Ok(format));
        }
    }
}
