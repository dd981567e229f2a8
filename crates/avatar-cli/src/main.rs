use anyhow::{Context, Result};
use avatar_core::config::{self as policy, PoseOverrides};
use avatar_core::regression;
use avatar_core::{CheckOutcome, Checker, ImageRef, JsonLinesSink, RecordedProvider, ThresholdConfig};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "avatar-check", about = "Avatar validity checks over recorded face-attribute responses")]
struct Cli {
    #[command(flatten)]
    thresholds: ThresholdArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ThresholdArgs {
    /// Built-in preset (vendor-default, relaxed) [env: AVATAR_PRESET]
    #[arg(long, global = true)]
    preset: Option<String>,
    /// Threshold TOML file, replaces the preset [env: AVATAR_THRESHOLDS_PATH]
    #[arg(long, global = true)]
    thresholds: Option<PathBuf>,
    #[arg(long, global = true, allow_hyphen_values = true)]
    pitch_min: Option<f64>,
    #[arg(long, global = true, allow_hyphen_values = true)]
    pitch_max: Option<f64>,
    #[arg(long, global = true, allow_hyphen_values = true)]
    yaw_min: Option<f64>,
    #[arg(long, global = true, allow_hyphen_values = true)]
    yaw_max: Option<f64>,
    #[arg(long, global = true, allow_hyphen_values = true)]
    roll_min: Option<f64>,
    #[arg(long, global = true, allow_hyphen_values = true)]
    roll_max: Option<f64>,
}

impl ThresholdArgs {
    fn overrides(&self) -> PoseOverrides {
        PoseOverrides {
            pitch_min: self.pitch_min,
            pitch_max: self.pitch_max,
            yaw_min: self.yaw_min,
            yaw_max: self.yaw_max,
            roll_min: self.roll_min,
            roll_max: self.roll_max,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate recorded vendor responses and print verdicts as JSON lines
    Evaluate {
        /// Recorded DetectFaceAttributes response files
        #[arg(required = true)]
        responses: Vec<PathBuf>,
    },
    /// Print the built-in threshold presets as TOML
    Presets,
    /// Score the resolved thresholds against a labeled case file
    Regress {
        /// JSON array of {source, expected_valid, response}
        cases: PathBuf,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let env = Config::from_env();

    match cli.command {
        Commands::Evaluate { responses } => {
            let thresholds = resolve_thresholds(&cli.thresholds, &env)?;
            let tally = run_evaluate(&responses, thresholds, &env, std::io::stdout())?;
            for (source, reason) in &tally.not_evaluable {
                eprintln!("{source}: {reason}");
            }
            eprintln!(
                "{} valid, {} invalid, {} not evaluable",
                tally.valid,
                tally.invalid,
                tally.not_evaluable.len()
            );
        }
        Commands::Presets => {
            for preset in policy::list_presets() {
                let body = preset
                    .config
                    .to_toml_string()
                    .context("failed to serialize preset")?;
                println!("# {}: {}\n{body}", preset.name, preset.description);
            }
        }
        Commands::Regress { cases, json } => {
            let thresholds = resolve_thresholds(&cli.thresholds, &env)?;
            run_regress(&cases, &thresholds, json, &mut std::io::stdout().lock())?;
        }
    }

    Ok(())
}

/// Preset or file, then per-axis overrides. Flags win over environment.
fn resolve_thresholds(args: &ThresholdArgs, env: &Config) -> Result<ThresholdConfig> {
    let base = match args.thresholds.as_ref().or(env.thresholds_path.as_ref()) {
        Some(path) => ThresholdConfig::load(path)
            .with_context(|| format!("failed to load thresholds from {}", path.display()))?,
        None => {
            let name = args.preset.as_deref().unwrap_or(&env.preset);
            policy::preset(name)?.config.clone()
        }
    };

    let overrides = args.overrides();
    if overrides.is_empty() {
        return Ok(base);
    }
    tracing::info!(?overrides, "applying pose overrides");
    Ok(overrides.apply(&base)?)
}

/// Verdict counts from one `evaluate` run.
#[derive(Debug, Default)]
struct EvaluateTally {
    valid: usize,
    invalid: usize,
    /// Source and reason for each input that produced no verdict.
    not_evaluable: Vec<(String, String)>,
}

/// Check each recorded response and write verdict records to `out` as JSON lines.
fn run_evaluate<W: Write + Send>(
    paths: &[PathBuf],
    thresholds: ThresholdConfig,
    env: &Config,
    out: W,
) -> Result<EvaluateTally> {
    let mut provider = RecordedProvider::new();
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let key = path.display().to_string();
        provider.insert(key.clone(), body);
        sources.push(key);
    }

    let checker = Checker::new(provider, JsonLinesSink::new(out), thresholds)
        .with_retry(env.retry_policy())
        .with_max_faces(env.max_faces);

    let mut tally = EvaluateTally::default();
    for source in &sources {
        match checker.check(&ImageRef::Url(source.clone()), source) {
            CheckOutcome::Evaluated {
                verdict,
                sink_error,
                ..
            } => {
                if verdict.is_valid {
                    tally.valid += 1;
                } else {
                    tally.invalid += 1;
                }
                if let Some(err) = sink_error {
                    return Err(anyhow::Error::new(err).context("failed to write verdict"));
                }
            }
            CheckOutcome::NotEvaluable { error, attempts } => {
                tally.not_evaluable.push((
                    source.clone(),
                    format!("not evaluable after {attempts} attempt(s): {error}"),
                ));
            }
        }
    }

    Ok(tally)
}

fn run_regress(
    path: &Path,
    thresholds: &ThresholdConfig,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let src = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cases = regression::load_cases(&src)?;
    let report = regression::score(&cases, thresholds);

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    writeln!(
        out,
        "{} cases: {} evaluated, {} not evaluable, agreement {:.1}%",
        report.cases.len(),
        report.evaluated(),
        report.not_evaluable,
        report.agreement() * 100.0
    )?;
    writeln!(
        out,
        "true accept {}, false accept {}, true reject {}, false reject {}",
        report.true_accept, report.false_accept, report.true_reject, report.false_reject
    )?;
    for case in report.disagreements() {
        let expected = if case.expected_valid { "accept" } else { "reject" };
        let reasons = if case.reasons.is_empty() {
            "no rule failed".to_string()
        } else {
            case.reasons.join("; ")
        };
        writeln!(out, "  {} (expected {expected}): {reasons}", case.source)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_core::AngleRange;

    fn env_with_preset(preset: &str) -> Config {
        Config {
            preset: preset.to_string(),
            thresholds_path: None,
            max_attempts: 1,
            retry_backoff_ms: 0,
            max_faces: 5,
        }
    }

    fn contrib(rel: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../contrib").join(rel)
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).unwrap()
    }

    #[test]
    fn test_env_preset_used_without_flags() {
        let cli = parse(&["avatar-check", "presets"]);
        let thresholds = resolve_thresholds(&cli.thresholds, &env_with_preset("relaxed")).unwrap();
        assert_eq!(thresholds, ThresholdConfig::relaxed());
    }

    #[test]
    fn test_preset_flag_beats_env() {
        let cli = parse(&["avatar-check", "regress", "cases.json", "--preset", "vendor-default"]);
        let thresholds = resolve_thresholds(&cli.thresholds, &env_with_preset("relaxed")).unwrap();
        assert_eq!(thresholds, ThresholdConfig::vendor_default());
    }

    #[test]
    fn test_negative_pose_overrides() {
        let cli = parse(&[
            "avatar-check",
            "evaluate",
            "a.json",
            "--pitch-min",
            "-15",
            "--pitch-max",
            "12",
        ]);
        let thresholds =
            resolve_thresholds(&cli.thresholds, &env_with_preset("vendor-default")).unwrap();
        assert_eq!(thresholds.pitch_range, AngleRange::new(-15.0, 12.0));
        assert_eq!(thresholds.yaw_range, AngleRange::symmetric(10.0));
    }

    #[test]
    fn test_unknown_preset_is_error() {
        let cli = parse(&["avatar-check", "presets"]);
        assert!(resolve_thresholds(&cli.thresholds, &env_with_preset("lenient")).is_err());
    }

    #[test]
    fn test_missing_thresholds_file_is_error() {
        let cli = parse(&["avatar-check", "presets", "--thresholds", "/nonexistent/t.toml"]);
        let err = resolve_thresholds(&cli.thresholds, &env_with_preset("vendor-default"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/t.toml"));
    }

    #[test]
    fn test_regress_summary_over_sample_cases() {
        let mut out = Vec::new();
        run_regress(
            &contrib("cases/sample-cases.json"),
            &ThresholdConfig::vendor_default(),
            false,
            &mut out,
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "4 cases: 4 evaluated, 0 not evaluable, agreement 75.0%",
                "true accept 1, false accept 0, true reject 2, false reject 1",
                "  avatar_0004.jpg (expected accept): pitch out of range: 13 not in [-10,10]",
            ]
        );
    }

    #[test]
    fn test_regress_json_report() {
        let mut out = Vec::new();
        run_regress(
            &contrib("cases/sample-cases.json"),
            &ThresholdConfig::relaxed(),
            true,
            &mut out,
        )
        .unwrap();
        let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(report["cases"].as_array().unwrap().len(), 4);
        assert_eq!(report["false_reject"], 0);
        assert_eq!(report["true_reject"], 2);
    }

    #[test]
    fn test_evaluate_writes_json_lines() {
        let paths = vec![
            contrib("responses/frontal.json"),
            contrib("responses/group.json"),
            contrib("responses/no-face.json"),
        ];
        let mut out = Vec::new();
        let tally = run_evaluate(
            &paths,
            ThresholdConfig::vendor_default(),
            &env_with_preset("vendor-default"),
            &mut out,
        )
        .unwrap();

        assert_eq!(tally.valid, 1);
        assert_eq!(tally.invalid, 1);
        assert_eq!(tally.not_evaluable.len(), 1);
        assert!(tally.not_evaluable[0].0.ends_with("no-face.json"));
        assert!(tally.not_evaluable[0].1.contains("no face in image"));

        let text = String::from_utf8(out).unwrap();
        let records: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert!(records[0]["source"].as_str().unwrap().ends_with("frontal.json"));
        assert_eq!(records[0]["verdict"]["is_valid"], true);
        assert_eq!(records[1]["verdict"]["face_count"], 2);
        assert_eq!(records[1]["verdict"]["reasons"][0], "multiple faces detected (2)");
    }

    #[test]
    fn test_evaluate_missing_file_is_error() {
        let paths = vec![PathBuf::from("/nonexistent/response.json")];
        let result = run_evaluate(
            &paths,
            ThresholdConfig::vendor_default(),
            &env_with_preset("vendor-default"),
            Vec::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_evaluate_requires_files() {
        assert!(Cli::try_parse_from(["avatar-check", "evaluate"]).is_err());
    }
}
