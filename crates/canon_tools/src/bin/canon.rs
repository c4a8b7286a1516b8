#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use canon_engines::calib::{CalibrationRuntime, IntrinsicCalibrationFile, MethodParamsFile};
use canon_kernel_contracts::calib::{MethodId, RuntimeLayers};
use canon_kernel_contracts::chunk::ChunkId;
use canon_kernel_contracts::phase::{CanonInputRecord, IngestDraft};
use canon_kernel_contracts::question::QuestionCatalog;
use canon_os::{CanonPipeline, PipelineInput, RuntimeContext, SystemClock};
use canon_storage::{ArtifactStore, AuditLedger};
use canon_tools::assert_shared_context;
use canon_tools::coverage::validate_coverage;
use canon_tools::files::enforce_file_discipline;
use canon_tools::probe::FileSignalPacks;

const USAGE: &str = "usage: canon <validate|plan> <dir>";

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let subcommand = args.first().map(String::as_str).ok_or(USAGE)?;
    let dir = args.get(1).map(String::as_str).ok_or(USAGE)?;
    match subcommand {
        "validate" => validate_deployment(Path::new(dir)),
        "plan" => assemble_plan(Path::new(dir)),
        _ => Err(USAGE.to_string()),
    }
}

fn load_runtime(config_dir: &Path) -> Result<CalibrationRuntime, String> {
    let paths = enforce_file_discipline(config_dir)?;
    let intrinsic =
        IntrinsicCalibrationFile::load(&paths.intrinsic).map_err(|e| e.to_string())?;
    let params = MethodParamsFile::load(&paths.params).map_err(|e| e.to_string())?;
    CalibrationRuntime::new(intrinsic, params).map_err(|e| e.to_string())
}

fn validate_deployment(config_dir: &Path) -> Result<(), String> {
    let paths = enforce_file_discipline(config_dir)?;
    let intrinsic =
        IntrinsicCalibrationFile::load(&paths.intrinsic).map_err(|e| e.to_string())?;
    let params = MethodParamsFile::load(&paths.params).map_err(|e| e.to_string())?;
    let catalog: Vec<MethodId> = params.methods.keys().cloned().collect();
    let report = validate_coverage(&catalog, &intrinsic).map_err(|e| e.to_string())?;

    let runtime = CalibrationRuntime::new(intrinsic, params).map_err(|e| e.to_string())?;
    RuntimeContext::install(RuntimeContext::new(runtime));
    assert_shared_context()?;

    println!(
        "coverage ok: {} calibrated, {} excluded",
        report.calibrated.len(),
        report.excluded.len()
    );
    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>, String> {
    fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))
}

fn parse<T: serde::de::DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T, String> {
    serde_json::from_slice(bytes).map_err(|e| format!("cannot parse {}: {e}", path.display()))
}

fn assemble_plan(input_dir: &Path) -> Result<(), String> {
    let record_path = input_dir.join("input_record.json");
    let record: CanonInputRecord = parse(&record_path, &read(&record_path)?)?;

    let draft_path = input_dir.join("ingest_draft.json");
    let draft: IngestDraft = parse(&draft_path, &read(&draft_path)?)?;

    let catalog_path = input_dir.join("questionnaire.json");
    let catalog_raw = read(&catalog_path)?;
    let catalog: QuestionCatalog = parse(&catalog_path, &catalog_raw)?;

    let packs_path = input_dir.join("signal_packs.json");
    let packs_raw = read(&packs_path)?;
    let probe = FileSignalPacks::from_json_str(
        std::str::from_utf8(&packs_raw)
            .map_err(|_| format!("{} must be utf-8", packs_path.display()))?,
    )
    .map_err(|e| e.to_string())?;

    let layers_path = input_dir.join("runtime_layers.json");
    let layers_by_chunk: BTreeMap<ChunkId, RuntimeLayers> = if layers_path.exists() {
        parse(&layers_path, &read(&layers_path)?)?
    } else {
        BTreeMap::new()
    };

    let runtime = load_runtime(&input_dir.join("config"))?;
    let context = RuntimeContext::install(RuntimeContext::new(runtime));
    assert_shared_context()?;

    let pipeline = CanonPipeline::new(probe, context);
    let clock = SystemClock::start();
    let mut audit = AuditLedger::new();
    let run = pipeline
        .run(
            PipelineInput {
                record,
                draft,
                catalog,
                catalog_raw,
                layers_by_chunk,
            },
            &clock,
            &mut audit,
        )
        .map_err(|e| e.to_string())?;

    let store =
        ArtifactStore::open(input_dir.join("artifacts")).map_err(|e| e.to_string())?;
    let body = serde_json::to_vec_pretty(&run.plan).map_err(|e| e.to_string())?;
    let address = store.put(&body).map_err(|e| e.to_string())?;

    println!(
        "plan assembled: {} tasks, plan_hash {}, artifact {}",
        run.plan.tasks.len(),
        run.plan.plan_hash,
        address
    );
    println!(
        "audit: {} rows ({} warnings)",
        audit.len(),
        audit.warnings().count()
    );
    Ok(())
}
