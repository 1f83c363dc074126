use anyhow::{Context, Result, bail};
use boxfuse::config::{BoxfuseConfig, FusionConfig};
use boxfuse::orchestrator::{SceneListing, list_scenes};
use boxfuse::pointcloud::PointCloud;
use boxfuse::report::{FusionReport, SceneStatus};
use boxfuse::table::write_rows_path;
use boxfuse::{ConfigError, DetectionTable, FusionEngine, FusionError, SceneFilter, fuse_tables};
use clap::{ArgAction, Args, ColorChoice, CommandFactory, FromArgMatches, Parser, Subcommand};
use colored::Colorize;
use is_terminal::IsTerminal;
use std::path::{Path, PathBuf};

const LOG_ENV: &str = "BOXFUSE_LOG";

#[derive(Parser)]
#[command(
    name = "boxfuse",
    version,
    about = "Fuse 3D bounding-box detections from several models",
    arg_required_else_help = true
)]
struct Cli {
    /// Disable color
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of $BOXFUSE_CONFIG or the user config
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuse detection tables into one table of boxes
    Fuse(FuseArgs),
    /// List the scenes and classes in a detection table
    Scenes(ScenesArgs),
    /// Show or initialize the configuration
    Config(ConfigArgs),
    /// Print the JSON schema of the fusion report
    Schema,
    /// Convert ASCII sensor points to a KITTI .bin point cloud
    Convert(ConvertArgs),
}

#[derive(Args, Clone)]
struct FuseArgs {
    /// One CSV table per model
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Where to write the fused table
    #[arg(short, long, value_name = "PATH")]
    output: PathBuf,

    /// Overlap above which two boxes are the same object
    #[arg(long = "iou-thr", value_name = "X")]
    iou_thr: Option<f64>,

    /// Drop boxes whose weighted score is below this
    #[arg(long = "skip-box-thr", value_name = "X")]
    skip_box_thr: Option<f64>,

    /// Comma-separated weight per input table
    #[arg(long, value_delimiter = ',', value_name = "W,...", allow_negative_numbers = true)]
    weights: Option<Vec<f64>>,

    /// Confidence aggregation rule
    #[arg(long = "conf-type", value_name = "RULE")]
    conf_type: Option<String>,

    /// Only fuse scenes whose id matches this regular expression
    #[arg(long, value_name = "REGEX")]
    scenes: Option<String>,

    /// Rank by weighted scores above 1.0 (output scores stay capped)
    #[arg(long)]
    allow_overflow: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Suppress the summary
    #[arg(short, long)]
    quiet: bool,

    /// Exit non-zero on configuration warnings
    #[arg(long)]
    strict: bool,
}

#[derive(Args, Clone)]
struct ScenesArgs {
    /// CSV table to inspect
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Clone)]
struct ConvertArgs {
    /// Text file with `x y z` or `x y z intensity` per line
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Where to write the .bin file
    #[arg(short, long, value_name = "PATH")]
    output: PathBuf,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    /// Write the default configuration file
    #[arg(long, conflicts_with = "path")]
    init: bool,

    /// Overwrite an existing file with --init
    #[arg(long, requires = "init")]
    force: bool,

    /// Print the config file location
    #[arg(long)]
    path: bool,
}

fn detect_color_choice() -> ColorChoice {
    // Scan args before clap so help/errors honor `--no-color`.
    let mut args = std::env::args_os();
    args.next();
    let mut flag = false;
    for arg in args {
        if arg == "--" {
            break;
        }
        if arg == "--no-color" {
            flag = true;
            break;
        }
    }
    if flag || std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "boxfuse=warn",
        1 => "boxfuse=info",
        _ => "boxfuse=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn heading(text: &str, color: bool) -> String {
    if color {
        text.bold().cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Command-line values take precedence over the config file.
fn merge_fusion_config(base: &FusionConfig, args: &FuseArgs) -> FusionConfig {
    let mut merged = base.clone();
    if let Some(v) = args.iou_thr {
        merged.match_iou_threshold = v;
    }
    if let Some(v) = args.skip_box_thr {
        merged.score_threshold = v;
    }
    if let Some(w) = &args.weights {
        merged.weights = w.clone();
    }
    if let Some(rule) = &args.conf_type {
        merged.confidence_aggregation = rule.clone();
    }
    merged.allow_overflow |= args.allow_overflow;
    merged
}

fn run_fuse(args: FuseArgs, config: &BoxfuseConfig, color: bool) -> Result<i32> {
    let fusion = merge_fusion_config(&config.fusion, &args);
    let (options, aggregation_warning) = fusion.options();
    let engine = FusionEngine::new(options).context("invalid fusion options")?;
    let filter = args
        .scenes
        .as_deref()
        .map(SceneFilter::new)
        .transpose()
        .context("invalid --scenes pattern")?;

    let tables = args
        .inputs
        .iter()
        .map(|path| {
            DetectionTable::read_path(path)
                .with_context(|| format!("failed to read detections from {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut output = fuse_tables(&engine, &tables, fusion.weights(), filter.as_ref());
    if let Some(warning) = aggregation_warning {
        output.report.warnings.insert(0, warning.to_string());
    }

    write_rows_path(&args.output, &output.rows)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output.report)?);
    } else if config.output.summary && !args.quiet {
        println!("{}", render_report(&output.report, &args.output, color));
    }

    let strict = args.strict || config.output.strict;
    if output.report.has_failures() || (strict && !output.report.warnings.is_empty()) {
        Ok(1)
    } else {
        Ok(0)
    }
}

fn render_report(report: &FusionReport, output: &Path, color: bool) -> String {
    let mut out = String::new();
    out.push_str(&heading("Scenes:", color));
    for scene in &report.scenes {
        let status = match scene.status {
            SceneStatus::Fused => "fused",
            SceneStatus::Empty => "empty",
            SceneStatus::Failed => "failed",
        };
        let status = match (color, scene.status) {
            (true, SceneStatus::Failed) => status.red().to_string(),
            (true, SceneStatus::Empty) => status.yellow().to_string(),
            (true, SceneStatus::Fused) => status.green().to_string(),
            (false, _) => status.to_string(),
        };
        out.push_str(&format!(
            "\n  {} {} {} -> {}",
            scene.scene_id, status, scene.input_boxes, scene.fused_boxes
        ));
        for err in &scene.errors {
            out.push_str(&format!("\n    {}", err));
        }
    }
    out.push('\n');
    out.push_str(&heading("Totals:", color));
    out.push_str(&format!(
        "\n  scenes = {}\n  failed = {}\n  input boxes = {}\n  fused boxes = {}",
        report.totals.scenes,
        report.totals.failed_scenes,
        report.totals.input_boxes,
        report.totals.fused_boxes
    ));
    if !report.warnings.is_empty() {
        out.push('\n');
        out.push_str(&heading("Warnings:", color));
        for w in &report.warnings {
            out.push_str(&format!("\n  {}", w));
        }
    }
    out.push_str(&format!("\nWrote {}", output.display()));
    out
}

fn run_scenes(args: ScenesArgs, color: bool) -> Result<i32> {
    let table = DetectionTable::read_path(&args.input)
        .with_context(|| format!("failed to read detections from {}", args.input.display()))?;
    let listing = list_scenes(&table);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        println!("{}", render_listing(&listing, color));
    }
    Ok(0)
}

fn render_listing(listing: &[SceneListing], color: bool) -> String {
    let mut out = heading("Scenes:", color);
    for scene in listing {
        let classes: Vec<String> = scene
            .classes
            .iter()
            .map(|(label, n)| format!("{}x{}", n, label))
            .collect();
        out.push_str(&format!("\n  {}: {} boxes", scene.scene_id, scene.boxes));
        if !classes.is_empty() {
            out.push_str(&format!(" [{}]", classes.join(", ")));
        }
        if let Some(max) = scene.max_score {
            out.push_str(&format!(" max score {:.3}", max));
        }
        if scene.rejected_rows > 0 {
            let note = format!("{} rejected", scene.rejected_rows);
            out.push(' ');
            out.push_str(&if color { note.red().to_string() } else { note });
        }
    }
    out
}

fn run_convert(args: ConvertArgs) -> Result<i32> {
    let input = std::fs::File::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let cloud = PointCloud::read_text(std::io::BufReader::new(input))
        .with_context(|| format!("failed to read points from {}", args.input.display()))?;
    let output = std::fs::File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    cloud
        .write_bin(std::io::BufWriter::new(output))
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    tracing::info!(points = cloud.len(), output = %args.output.display(), "converted points");
    Ok(0)
}

fn run_config(
    args: ConfigArgs,
    explicit: Option<&Path>,
    config: Option<BoxfuseConfig>,
) -> Result<i32> {
    let path = BoxfuseConfig::resolve_path(explicit);
    if args.path {
        match path {
            Some(p) => println!("{}", p.display()),
            None => bail!("no user config directory on this platform"),
        }
        return Ok(0);
    }
    if args.init {
        let Some(path) = path else {
            bail!("no user config directory on this platform");
        };
        if path.exists() && !args.force {
            bail!("{} already exists (use --force to overwrite)", path.display());
        }
        BoxfuseConfig::default().save_to(&path)?;
        println!("Wrote {}", path.display());
        return Ok(0);
    }
    print!("{}", config.unwrap_or_default().to_toml()?);
    Ok(0)
}

/// Exit status for a failed command: 2 for configuration and usage
/// problems, 3 for files that could not be read or written.
fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<FusionError>() {
            return match e {
                FusionError::Io { .. }
                | FusionError::Csv { .. }
                | FusionError::MissingColumn { .. } => 3,
                FusionError::Validation(_)
                | FusionError::Config(_)
                | FusionError::ConfigParse { .. }
                | FusionError::ConfigSerialize(_) => 2,
            };
        }
        if cause.is::<ConfigError>() {
            return 2;
        }
        if cause.is::<std::io::Error>() {
            return 3;
        }
    }
    2
}

fn main() {
    let color_choice = detect_color_choice();
    let matches = Cli::command().color(color_choice).get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    init_logging(cli.verbose);

    let never = cli.no_color || matches!(color_choice, ColorChoice::Never);
    let color = std::io::stdout().is_terminal() && !never;

    let result = match cli.command {
        Some(Commands::Fuse(args)) => {
            BoxfuseConfig::load(cli.config.as_deref())
                .context("failed to load configuration")
                .and_then(|config| run_fuse(args, &config, color))
        }
        Some(Commands::Scenes(args)) => run_scenes(args, color),
        Some(Commands::Config(args)) => {
            if args.init || args.path {
                run_config(args, cli.config.as_deref(), None)
            } else {
                BoxfuseConfig::load(cli.config.as_deref())
                    .context("failed to load configuration")
                    .and_then(|config| run_config(args, cli.config.as_deref(), Some(config)))
            }
        }
        Some(Commands::Convert(args)) => run_convert(args),
        Some(Commands::Schema) => serde_json::to_string_pretty(&schemars::schema_for!(FusionReport))
            .map(|schema| {
                println!("{}", schema);
                0
            })
            .map_err(Into::into),
        None => Ok(0),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(exit_code(&err));
        }
    }
}
