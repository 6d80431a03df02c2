use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use log::{info, warn};
use serde::Serialize;
use vehicle_classifier::service::{
    manifest::{ArtifactManifest, ManifestError},
    outcome::Outcome,
    Config, RankedLabel, Service, ServiceBuilder, ServiceError,
};

mod cli;
use cli::{Args, OutputFormat};
use thiserror::Error;

#[derive(Debug, Error)]
enum AppError {
    #[error("Invalid manifest -> {0}")]
    InvalidManifest(#[from] ManifestError),
    #[error("Could not create the classifier -> {0}")]
    ServiceCreation(#[from] ServiceError),
    #[error("Could not write the report -> {0}")]
    Report(#[from] serde_json::Error),
}

/// Result for one input file.
#[derive(Debug, Serialize)]
struct ImageReport {
    path: PathBuf,
    kind: &'static str,
    label: Option<String>,
    confidence: Option<f32>,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ranking: Vec<RankingEntry>,
}

#[derive(Debug, Serialize)]
struct RankingEntry {
    label: Option<String>,
    score: f32,
}

impl From<RankedLabel> for RankingEntry {
    fn from(ranked: RankedLabel) -> Self {
        Self {
            label: ranked.label,
            score: ranked.score,
        }
    }
}

fn main() {
    if let Err(e) = exec_program() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn exec_program() -> Result<(), AppError> {
    env_logger::init();

    let args = Args::parse();

    info!("Model path: {}", args.model.display());
    info!("Input image path: {:?}", args.input);

    let mut config = Config::default();
    let mut builder = ServiceBuilder::new(args.model.clone());

    if let Some(path) = &args.manifest {
        info!("Manifest path: {}", path.display());
        let manifest = ArtifactManifest::from_file(path)?;
        manifest.apply(&mut config);
        if let Some(labels) = manifest.label_set() {
            builder = builder.labels(labels.map_err(ServiceError::from)?);
        }
    }
    apply_args(&args, &mut config);
    info!("Configuration: {:?}", config);

    if let Some(path) = &args.labels {
        info!("Labels path: {}", path.display());
        builder = builder.labels_file(path.clone());
    }

    let service = builder.config(config).build()?;
    info!("Service created successfully");

    let reports = args
        .input
        .iter()
        .map(|path| classify_file(&service, path, args.show))
        .collect::<Vec<_>>();

    match args.format {
        OutputFormat::Text => print_text_reports(&reports, args.show),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }

    Ok(())
}

/// Overrides the configuration with the options given on the command line.
fn apply_args(args: &Args, config: &mut Config) {
    if let Some(width) = args.width {
        config.prepare.target_size.0 = width;
    }
    if let Some(height) = args.height {
        config.prepare.target_size.1 = height;
    }
    if let Some(layout) = args.layout {
        config.prepare.layout = layout;
    }
    if let Some(normalization) = args.normalization {
        config.prepare.normalization = normalization;
    }
    if let Some(softmax) = args.softmax {
        config.apply_softmax = softmax;
    }
    if let Some(min_confidence) = args.min_confidence {
        config.min_confidence = Some(min_confidence);
    }
    config.inference_timeout = match args.timeout_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };
    config.num_threads = args.threads.into();
}

fn classify_file(service: &Service, path: &Path, ranking_len: usize) -> ImageReport {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => return unreadable_report(path, e),
    };

    let tensor = match service.preprocess(&bytes) {
        Ok(tensor) => tensor,
        Err(e) => {
            warn!("{}: {}", path.display(), e);
            return report(path, Outcome::Failed(e.into()), vec![]);
        }
    };

    match service.infer(tensor) {
        Ok(output) => {
            let ranking = service
                .rank(&output, ranking_len)
                .into_iter()
                .map(RankingEntry::from)
                .collect();
            report(path, service.label_output(&output), ranking)
        }
        Err(e) => {
            warn!("{}: {}", path.display(), e);
            report(path, Outcome::Failed(e.into()), vec![])
        }
    }
}

fn report(path: &Path, outcome: Outcome, ranking: Vec<RankingEntry>) -> ImageReport {
    ImageReport {
        path: path.to_path_buf(),
        kind: outcome.kind(),
        label: outcome.label().map(String::from),
        confidence: outcome.confidence(),
        message: outcome.to_string(),
        ranking,
    }
}

fn unreadable_report(path: &Path, error: io::Error) -> ImageReport {
    warn!("Could not read {}: {}", path.display(), error);
    ImageReport {
        path: path.to_path_buf(),
        kind: "unreadable_file",
        label: None,
        confidence: None,
        message: format!("Error: could not read file ({})", error),
        ranking: vec![],
    }
}

fn print_text_reports(reports: &[ImageReport], k: usize) {
    for report in reports {
        println!("{}", report.path.display());
        println!("  {}", report.message);
        if k > 0 && !report.ranking.is_empty() {
            println!("  Top {} predictions:", k);
            print_ranking(&report.ranking);
        }
    }
}

fn print_ranking(ranking: &[RankingEntry]) {
    for (rank, entry) in ranking.iter().enumerate() {
        println!(
            "    {}. class: {}, score: {}",
            rank + 1,
            entry.label.as_deref().unwrap_or("unrecognized"),
            entry.score
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let base = ["vehicle-classifier", "--model", "m.onnx", "--input", "a.jpg"];
        Args::try_parse_from(base.iter().chain(extra)).unwrap()
    }

    fn manifest_config(json: &str) -> Config {
        let mut config = Config::default();
        ArtifactManifest::from_json(json).unwrap().apply(&mut config);
        config
    }

    #[test]
    fn command_line_turns_off_manifest_softmax() {
        let mut config = manifest_config(r#"{ "softmax": true }"#);
        assert!(config.apply_softmax);

        apply_args(&args(&["--softmax", "false"]), &mut config);
        assert!(!config.apply_softmax);
    }

    #[test]
    fn manifest_softmax_is_kept_without_flag() {
        let mut config = manifest_config(r#"{ "softmax": true }"#);
        apply_args(&args(&[]), &mut config);
        assert!(config.apply_softmax);
    }

    #[test]
    fn zero_timeout_waits_without_bound() {
        let mut config = Config::default();
        apply_args(&args(&["--timeout-ms", "0", "--threads", "2"]), &mut config);
        assert_eq!(config.inference_timeout, None);
        assert_eq!(config.num_threads, 2);
    }
}
