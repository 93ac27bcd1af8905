// src/bin/threshold_tuner.rs - Inspect and edit the compensatory-error threshold table
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use physio_core::{BodyRegion, ErrorType, ThresholdLevel, ThresholdStore};

#[derive(Parser, Debug)]
#[command(name = "threshold_tuner")]
#[command(author, version, about = "Tune warning/critical thresholds for compensatory errors")]
struct Cli {
    /// Threshold file (JSON). Defaults to the user config directory.
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every threshold
    Show,
    /// Print one threshold
    Get {
        region: BodyRegion,
        error_type: ErrorType,
        level: ThresholdLevel,
    },
    /// Change one threshold; rejected if critical would not exceed warning
    Set {
        region: BodyRegion,
        error_type: ErrorType,
        level: ThresholdLevel,
        value: f64,
    },
    /// Check the whole table
    Validate,
    /// Write the table to another file
    Export { path: PathBuf },
    /// Replace the table with the contents of another file
    Import { path: PathBuf },
    /// Restore clinical defaults
    Reset,
    /// Interactive editing session on stdin
    Edit,
}

fn default_file() -> PathBuf {
    directories::ProjectDirs::from("org", "physio", "physio_core")
        .map(|dirs| dirs.config_dir().join("thresholds.json"))
        .unwrap_or_else(|| PathBuf::from("thresholds.json"))
}

fn open_store(path: &Path) -> Result<ThresholdStore> {
    if path.exists() {
        ThresholdStore::load(path).with_context(|| format!("Failed to load {}", path.display()))
    } else {
        info!(path = %path.display(), "no threshold file yet, using clinical defaults");
        Ok(ThresholdStore::new())
    }
}

fn print_table(store: &ThresholdStore, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{:<10} {:<22} {:>9} {:>9}", "region", "error", "warning", "critical")?;
    for (region, error_type, pair) in store.table().entries() {
        let unit = error_type.unit().suffix();
        writeln!(
            out,
            "{:<10} {:<22} {:>7.2}{:<2} {:>7.2}{:<2}",
            region.as_str(),
            error_type.as_str(),
            pair.warning,
            unit,
            pair.critical,
            unit
        )?;
    }
    Ok(())
}

/// Result of an interactive session.
#[derive(Debug, Default, PartialEq)]
struct EditOutcome {
    accepted: usize,
    rejected: usize,
    saved: bool,
}

fn run_edit_session(
    store: &mut ThresholdStore,
    path: &Path,
    input: impl BufRead,
    out: &mut impl Write,
) -> Result<EditOutcome> {
    let mut outcome = EditOutcome::default();
    let mut dirty = false;

    writeln!(out, "commands: show | get <region> <error> <level> | set <region> <error> <level> <value> | validate | save | quit")?;
    for line in input.lines() {
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();

        match parts.as_slice() {
            [] => continue,
            ["show"] => print_table(store, out)?,
            ["get", region, error_type, level] => match parse_target(region, error_type, level) {
                Ok((r, e, l)) => match store.get_threshold(r, e, l) {
                    Some(value) => writeln!(out, "{}", value)?,
                    None => writeln!(out, "no threshold for {}/{}", r, e)?,
                },
                Err(msg) => writeln!(out, "error: {}", msg)?,
            },
            ["set", region, error_type, level, value] => {
                let parsed = parse_target(region, error_type, level).and_then(|target| {
                    value
                        .parse::<f64>()
                        .map(|v| (target, v))
                        .map_err(|_| format!("'{}' is not a number", value))
                });
                let ((r, e, l), v) = match parsed {
                    Ok(p) => p,
                    Err(msg) => {
                        writeln!(out, "error: {}", msg)?;
                        outcome.rejected += 1;
                        continue;
                    }
                };
                match store.update_threshold(r, e, l, v) {
                    Ok(()) => {
                        outcome.accepted += 1;
                        dirty = true;
                        writeln!(out, "ok: {}/{} {} = {}", r, e, l, v)?;
                    }
                    Err(err) => {
                        outcome.rejected += 1;
                        writeln!(out, "rejected: {}", err)?;
                    }
                }
            }
            ["validate"] => {
                report_violations(store, out)?;
            }
            ["save"] => {
                store.save(path)?;
                dirty = false;
                outcome.saved = true;
                writeln!(out, "saved {}", path.display())?;
            }
            ["quit"] | ["exit"] => break,
            _ => writeln!(out, "unrecognised command: {}", line.trim())?,
        }
    }

    if dirty {
        writeln!(out, "warning: unsaved changes discarded")?;
    }
    Ok(outcome)
}

fn parse_target(region: &str, error_type: &str, level: &str) -> Result<(BodyRegion, ErrorType, ThresholdLevel), String> {
    Ok((region.parse()?, error_type.parse()?, level.parse()?))
}

fn report_violations(store: &ThresholdStore, out: &mut impl Write) -> io::Result<bool> {
    let violations = store.validate_config();
    if violations.is_empty() {
        writeln!(out, "all thresholds valid")?;
        return Ok(true);
    }
    for violation in &violations {
        writeln!(out, "invalid: {}", violation)?;
    }
    Ok(false)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let path = cli.file.unwrap_or_else(default_file);
    let mut store = open_store(&path)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Show => print_table(&store, &mut out)?,
        Command::Get {
            region,
            error_type,
            level,
        } => match store.get_threshold(region, error_type, level) {
            Some(value) => writeln!(out, "{}", value)?,
            None => bail!("no threshold for {}/{}", region, error_type),
        },
        Command::Set {
            region,
            error_type,
            level,
            value,
        } => {
            store.update_threshold(region, error_type, level, value)?;
            store.save(&path)?;
            writeln!(out, "{}/{} {} = {} (saved to {})", region, error_type, level, value, path.display())?;
        }
        Command::Validate => {
            if !report_violations(&store, &mut out)? {
                bail!("threshold table has violations");
            }
        }
        Command::Export { path: target } => {
            store.save(&target)?;
            writeln!(out, "exported to {}", target.display())?;
        }
        Command::Import { path: source } => {
            let content = std::fs::read_to_string(&source)
                .with_context(|| format!("Cannot read {}", source.display()))?;
            store.import_config(&content)?;
            store.save(&path)?;
            writeln!(out, "imported {} into {}", source.display(), path.display())?;
        }
        Command::Reset => {
            store.reset_to_defaults();
            store.save(&path)?;
            writeln!(out, "restored clinical defaults in {}", path.display())?;
        }
        Command::Edit => {
            let stdin = io::stdin();
            let outcome = run_edit_session(&mut store, &path, stdin.lock(), &mut out)?;
            if outcome.rejected > 0 {
                bail!("{} edit(s) rejected", outcome.rejected);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn session(script: &str, path: &Path) -> (ThresholdStore, EditOutcome, String) {
        let mut store = ThresholdStore::new();
        let mut out = Vec::new();
        let outcome = run_edit_session(&mut store, path, Cursor::new(script.to_string()), &mut out).unwrap();
        (store, outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_valid_edit_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        let (store, outcome, _) = session("set shoulder shoulder_hiking warning 2.5\nsave\nquit\n", &path);

        assert_eq!(outcome, EditOutcome { accepted: 1, rejected: 0, saved: true });
        let reloaded = ThresholdStore::load(&path).unwrap();
        assert_eq!(reloaded.table(), store.table());
        assert_eq!(
            reloaded.get_threshold(BodyRegion::Shoulder, ErrorType::ShoulderHiking, ThresholdLevel::Warning),
            Some(2.5)
        );
    }

    #[test]
    fn test_invalid_edit_keeps_prior_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        let (store, outcome, output) = session("set knee knee_valgus critical 5\nset knee knee_valgus warning abc\n", &path);

        assert_eq!(outcome.rejected, 2);
        assert_eq!(outcome.accepted, 0);
        assert!(output.contains("rejected"));
        assert_eq!(
            store.get_threshold(BodyRegion::Knee, ErrorType::KneeValgus, ThresholdLevel::Critical),
            Some(20.0)
        );
        assert!(!path.exists());
    }

    #[test]
    fn test_show_and_validate() {
        let dir = tempfile::tempdir().unwrap();
        let (_, _, output) = session("show\nvalidate\nbogus\n", &dir.path().join("t.json"));

        assert!(output.contains("shoulder_hiking"));
        assert!(output.contains("all thresholds valid"));
        assert!(output.contains("unrecognised command: bogus"));
    }

    #[test]
    fn test_unsaved_changes_warning() {
        let dir = tempfile::tempdir().unwrap();
        let (_, outcome, output) = session("set elbow shoulder_compensation critical 40\nquit\n", &dir.path().join("t.json"));

        assert_eq!(outcome.accepted, 1);
        assert!(!outcome.saved);
        assert!(output.contains("unsaved changes"));
    }

    #[test]
    fn test_open_store_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir.path().join("missing.json")).unwrap();
        assert!(store.validate_config().is_empty());
    }
}
