//! Command-line interface definitions for Cable News.
//!
//! Run tuning and country profiles live in the YAML config file; the CLI only
//! points at it, picks the output directory and carries secrets.

use clap::Parser;

/// Command-line arguments for the Cable News agent.
///
/// # Examples
///
/// ```sh
/// # Every configured country
/// cable_news -c ./cable_news.yaml -o ./newsletters
///
/// # Two countries, key from the environment
/// GEMINI_API_KEY=... cable_news -c ./cable_news.yaml -o ./out --only CO --only PE
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    pub config: String,

    /// Directory the newsletters are written to
    #[arg(short, long)]
    pub output_dir: String,

    /// Gemini API key (overrides `gemini.api_key` in the config)
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Restrict the run to these country codes
    #[arg(long, value_name = "CODE", num_args = 1..)]
    pub only: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "cable_news",
            "--config",
            "./cable_news.yaml",
            "--output-dir",
            "./out",
        ])
        .unwrap();

        assert_eq!(cli.config, "./cable_news.yaml");
        assert_eq!(cli.output_dir, "./out");
        assert!(cli.only.is_empty());
    }

    #[test]
    fn test_cli_short_flags_and_only() {
        let cli = Cli::try_parse_from([
            "cable_news",
            "-c",
            "/etc/cable_news.yaml",
            "-o",
            "/tmp/out",
            "--only",
            "CO",
            "PE",
            "--gemini-api-key",
            "k",
        ])
        .unwrap();

        assert_eq!(cli.config, "/etc/cable_news.yaml");
        assert_eq!(cli.output_dir, "/tmp/out");
        assert_eq!(cli.only, vec!["CO", "PE"]);
        assert_eq!(cli.gemini_api_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_cli_requires_config() {
        assert!(Cli::try_parse_from(["cable_news", "-o", "./out"]).is_err());
    }
}
