use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "basinio", about = "Inspect, verify and convert basin model projects", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Summarize a project without reading its payloads
    Info(InfoArgs),
    /// Load every payload and report value ranges
    Verify(VerifyArgs),
    /// Re-export a project, optionally cell-centered or against a baseline
    Convert(ConvertArgs),
}

#[derive(Args)]
pub struct InfoArgs {
    pub xml: PathBuf,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub xml: PathBuf,
    #[arg(short = 'j', long, default_value = "1")]
    pub threads: usize,
}

#[derive(Args)]
pub struct ConvertArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Overrides `num_threads` from the config file
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,
    /// Cell-center maps and volumes and merge formation volumes
    #[arg(long)]
    pub center: bool,
    /// Store payloads uncompressed
    #[arg(long)]
    pub no_compress: bool,
    /// Reference data already written by this project instead of copying it
    #[arg(long)]
    pub baseline: Option<PathBuf>,
    /// TOML file with export settings
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_info() {
        let cli = Cli::try_parse_from(["basinio", "info", "project.xml"]).unwrap();
        if let Command::Info(args) = cli.command {
            assert_eq!(args.xml, PathBuf::from("project.xml"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_verify_threads() {
        let cli = Cli::try_parse_from(["basinio", "verify", "p.xml", "-j", "8"]).unwrap();
        if let Command::Verify(args) = cli.command {
            assert_eq!(args.threads, 8);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn verify_defaults_to_one_thread() {
        let cli = Cli::try_parse_from(["basinio", "verify", "p.xml"]).unwrap();
        if let Command::Verify(args) = cli.command {
            assert_eq!(args.threads, 1);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_convert() {
        let cli = Cli::try_parse_from([
            "basinio", "convert", "in.xml", "out.xml", "--center", "--baseline", "base.xml", "--config", "export.toml",
        ])
        .unwrap();
        if let Command::Convert(args) = cli.command {
            assert!(args.center);
            assert!(!args.no_compress);
            assert_eq!(args.threads, None);
            assert_eq!(args.baseline, Some(PathBuf::from("base.xml")));
            assert_eq!(args.config, Some(PathBuf::from("export.toml")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn convert_needs_output() {
        assert!(Cli::try_parse_from(["basinio", "convert", "in.xml"]).is_err());
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["basinio", "--verbose", "info", "p.xml"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["basinio", "info", "p.xml", "--format", "json"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
