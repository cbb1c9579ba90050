//! Unit tests for CLI argument parsing

use clap::Parser;
use mailcast::cli::{Cli, Commands, OutputFormat};
use mailcast::dispatch::ProgressMode;

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::parse_from([
        "mailcast",
        "send",
        "--message",
        "m.json",
        "--recipients",
        "r.json",
        "--concurrency",
        "12",
        "--max-retries",
        "0",
        "--output-format",
        "json",
        "--no-progress",
    ]);

    assert_eq!(cli.concurrency, 12);
    assert_eq!(cli.max_retries, 0);
    assert_eq!(cli.output_format, OutputFormat::Json);
    assert_eq!(cli.progress_mode(), ProgressMode::Disabled);
    assert!(matches!(cli.command, Commands::Send(_)));
}

#[test]
fn test_verbose_selects_periodic_progress() {
    let cli = Cli::parse_from(["mailcast", "-v", "export", "--failures", "f.json"]);
    assert_eq!(cli.progress_mode(), ProgressMode::DebugPeriodic);
}

#[test]
fn test_retry_all_flag() {
    let cli = Cli::parse_from([
        "mailcast",
        "retry",
        "--failures",
        "failed.json",
        "--message",
        "m.json",
        "--all",
    ]);
    match cli.command {
        Commands::Retry(args) => assert!(args.all),
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn test_invalid_values_are_rejected() {
    let bad = [
        vec!["mailcast", "--batch-size", "0", "export", "--failures", "f.json"],
        vec!["mailcast", "--max-retries", "21", "export", "--failures", "f.json"],
        vec!["mailcast", "--output-format", "xml", "export", "--failures", "f.json"],
        vec!["mailcast", "--sandbox", "export", "--failures", "f.json"],
    ];
    for args in bad {
        assert!(
            Cli::try_parse_from(args.iter().copied()).is_err(),
            "accepted {args:?}"
        );
    }
}

#[test]
fn test_failures_dir_override() {
    let cli = Cli::parse_from([
        "mailcast",
        "--failures-dir",
        "/tmp/mailcast-failures",
        "export",
        "--failures",
        "f.json",
    ]);
    let persister = cli.failure_persister().unwrap();
    assert_eq!(
        persister.dir(),
        std::path::Path::new("/tmp/mailcast-failures")
    );
}
