use crate::{
    config::Config,
    document::{PdfBuilder, output_file_name},
    error::JobError,
    job::{Job, Trigger},
    notify::{LogNotifier, NoticeLevel, Notifier, completion_text, notify_quietly},
    progress::{ConsoleProgress, TracingProgress},
    raster::SurfaceRasterizer,
    util::{ensure_dir, now_rfc3339, sha256_hex},
    viewer::{ReplayViewer, Viewer},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pagecap")]
#[command(about = "Capture a lazily rendered paginated document into a PDF, one validated page at a time")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./pagecap.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check the viewer and list what a run would capture.
    Probe {
        #[arg(long)]
        input: PathBuf,
    },
    /// Capture every page and assemble the output document.
    Run {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

pub async fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let cfg = if cfg_path.exists() {
        Config::load(&cfg_path)?
    } else {
        Config::default()
    };

    match &args.cmd {
        Command::Probe { input } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            probe(&cfg, input).await
        }
        Command::Run { input, out_dir } => run(&args, &cfg, input, out_dir.as_deref()).await,
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        if !p.exists() {
            return Err(anyhow!("config does not exist: {}", p.display()));
        }
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("pagecap.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("pagecap.example.toml"))
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

async fn probe(cfg: &Config, input: &Path) -> Result<()> {
    let mut viewer = ReplayViewer::new(input, cfg);
    viewer.locate().await?;
    let units = viewer.units();
    if units.is_empty() {
        return Err(JobError::NoUnits.into());
    }
    let title = viewer.title();
    let file_name = output_file_name(cfg, title.as_deref())?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "input": input,
            "pages": units.len(),
            "title": title,
            "file_name": file_name,
        }))?
    );
    Ok(())
}

async fn run(args: &Args, cfg: &Config, input: &Path, out_override: Option<&Path>) -> Result<()> {
    let out_root = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    ensure_dir(&out_root)?;

    let trigger = Trigger::in_dir(&out_root);
    let _busy = trigger.try_acquire()?.ok_or_else(|| {
        anyhow!(
            "a capture job is already running (lock: {})",
            trigger.lock_path().display()
        )
    })?;

    let started = now_rfc3339();
    let cfg_hash = sha256_hex(cfg.normalized_for_hash().as_bytes());
    let job_id = sha256_hex(format!("{}:{}:{}", cfg_hash, input.display(), started).as_bytes());

    let job_dir = out_root.join(&job_id[..16]);
    ensure_dir(&job_dir)?;
    ensure_dir(&job_dir.join("logs"))?;

    let log_path = resolve_log_path(cfg, Some(&job_dir));
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    info!("job_id={job_id} out={}", job_dir.display());

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(job_dir.join("effective-config.toml"), raw)?;
    }

    let notifier = LogNotifier;
    match capture(cfg, input, &job_dir).await {
        Ok(summary) => {
            notify_quietly(
                &notifier,
                NoticeLevel::Info,
                "capture complete",
                &completion_text(summary.captured, summary.total),
            );
            if cfg.global.print_summary {
                let status = if summary.captured == summary.total {
                    "ok"
                } else {
                    "partial"
                };
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "job_id": job_id,
                        "job_dir": job_dir,
                        "file": summary.path,
                        "captured": summary.captured,
                        "total": summary.total,
                        "status": status,
                    }))?
                );
            }
            Ok(())
        }
        Err(err) => {
            report_failure(&notifier, &err);
            Err(err)
        }
    }
}

struct RunSummary {
    path: PathBuf,
    captured: usize,
    total: usize,
}

async fn capture(cfg: &Config, input: &Path, job_dir: &Path) -> Result<RunSummary> {
    let viewer = ReplayViewer::new(input, cfg);
    let job = Job::start(cfg, viewer, SurfaceRasterizer, PdfBuilder::new(cfg)).await?;

    // No redrawn stderr bar next to JSON logs.
    let output = if cfg.logging.json {
        job.run(&TracingProgress).await?
    } else {
        let progress = ConsoleProgress::default();
        let output = job.run(&progress).await;
        progress.finish();
        output?
    };

    let path = job_dir.join(&output.file_name);
    std::fs::write(&path, &output.document)
        .with_context(|| format!("writing document: {}", path.display()))?;
    info!("wrote {} ({} bytes)", path.display(), output.document.len());

    if cfg.output.write_report_json {
        std::fs::write(
            job_dir.join(&cfg.output.report_filename),
            serde_json::to_string_pretty(&output.report)?,
        )?;
    }

    Ok(RunSummary {
        path,
        captured: output.report.tally.captured,
        total: output.report.tally.total,
    })
}

fn report_failure(notifier: &dyn Notifier, err: &anyhow::Error) {
    notify_quietly(
        notifier,
        NoticeLevel::Error,
        "capture failed",
        &format!("{err:#}"),
    );
}

fn resolve_log_path(cfg: &Config, job_dir: Option<&Path>) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    if let Some(job_dir) = job_dir {
        return Some(job_dir.join("logs").join("pagecap.log"));
    }

    Some(PathBuf::from(&cfg.paths.out_dir).join("pagecap.log"))
}
