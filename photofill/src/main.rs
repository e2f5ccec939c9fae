use anyhow::Result;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::{Path, PathBuf};

mod formatter;
mod logger;

#[derive(Parser)]
#[command(name = "photofill")]
#[command(about = "Fill photo counts from a text report into a color-coded XLSX workbook", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the text report
    #[arg(value_name = "REPORT", default_value = "info.txt")]
    report: PathBuf,

    /// Workbook to fill
    #[arg(value_name = "INPUT", default_value = "output.xlsx")]
    input: PathBuf,

    /// Where to save the filled workbook
    #[arg(value_name = "OUTPUT", default_value = "output_filled.xlsx")]
    output: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let report = expand_home(&cli.report);
    let input = expand_home(&cli.input);
    let output = expand_home(&cli.output);

    let outcome = photofill_core::fill_report(&report, &input, &output)?;

    match cli.format {
        OutputFormat::Human => formatter::print_human(&outcome),
        OutputFormat::Json => formatter::print_json(&outcome)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["photofill"]);
        assert_eq!(cli.report, PathBuf::from("info.txt"));
        assert_eq!(cli.input, PathBuf::from("output.xlsx"));
        assert_eq!(cli.output, PathBuf::from("output_filled.xlsx"));
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_positionals_and_flags() {
        let cli = Cli::parse_from(["photofill", "r.txt", "in.xlsx", "-vv", "--format", "json"]);
        assert_eq!(cli.report, PathBuf::from("r.txt"));
        assert_eq!(cli.input, PathBuf::from("in.xlsx"));
        assert_eq!(cli.output, PathBuf::from("output_filled.xlsx"));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.format, OutputFormat::Json));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home(Path::new("a/b.txt")), PathBuf::from("a/b.txt"));
        assert_eq!(expand_home(Path::new("/tmp/~x")), PathBuf::from("/tmp/~x"));
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                expand_home(Path::new("~/r/info.txt")),
                PathBuf::from(home).join("r/info.txt")
            );
        }
    }
}
