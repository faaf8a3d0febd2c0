use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;

use cloudiverse::api::{ApiClient, ArchitectureRequest};
use cloudiverse::error::ApiError;
use cloudiverse::export::{self, EXPORT_BACKGROUND, EXPORT_PADDING, PIXEL_RATIO};
use cloudiverse::layout::{LayoutConfig, RankDir};
use cloudiverse::metadata::{canonical_service_id, get_service_metadata};
use cloudiverse::poll::{CancelToken, PollOutcome};
use cloudiverse::reconcile::{ReconcileAction, Service, apply_reconcile};
use cloudiverse::report::{ReportInput, build_report};
#[cfg(feature = "server")]
use cloudiverse::serve::{ServeArgs, run_serve};
use cloudiverse::utils::slugify;
use cloudiverse::{ArchitectureGraph, DiagramRenderer, Settings};

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Parser)]
#[command(
    name = "cloudiverse",
    version,
    about = "Render, export and report on Cloudiverse architecture diagrams."
)]
pub struct Cli {
    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long = "log-level", global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Render an architecture JSON file to SVG or PNG.
    Render(RenderArgs),
    /// Write a timestamped PNG snapshot of the diagram into a directory.
    Export(ExportArgs),
    /// Build the PDF report for a generation response.
    Report(ReportArgs),
    /// Show the description of a cloud service.
    Lookup(LookupArgs),
    /// Ask the backend to generate an architecture from a description.
    Generate(GenerateArgs),
    /// Add or remove a service and merge the backend's answer.
    Reconcile(ReconcileArgs),
    /// Show (or follow) the status of a deployment job.
    DeployStatus(DeployStatusArgs),
    /// Log in and store the session token.
    Login(LoginArgs),
    /// Forget the stored session token.
    Logout,
    /// Serve a live preview of an architecture file.
    #[cfg(feature = "server")]
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Path to the architecture JSON. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Output format (defaults to the output file extension or svg).
    #[arg(short = 'e', long = "output-format")]
    output_format: Option<OutputFormat>,

    /// Layout direction.
    #[arg(long = "rank-dir", default_value = "LR")]
    rank_dir: RankDir,

    /// Background colour of the image.
    #[arg(short = 'b', long = "background-color", default_value = EXPORT_BACKGROUND)]
    background_color: String,

    /// Pixel ratio for PNG output.
    #[arg(long, default_value_t = PIXEL_RATIO)]
    scale: f32,

    /// Suppress informational output.
    #[arg(short = 'q', long)]
    quiet: bool,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Path to the architecture JSON or generation response.
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Directory the snapshot is written into.
    #[arg(short = 'd', long = "dir", default_value = ".")]
    dir: PathBuf,

    /// Provider for the file name. Read from the response when omitted.
    #[arg(long)]
    provider: Option<String>,

    /// Architecture pattern for the file name. Read from the response when omitted.
    #[arg(long)]
    pattern: Option<String>,

    /// Also attach the snapshot to this workspace on the backend.
    #[arg(long = "upload", value_name = "WORKSPACE")]
    upload: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Path to the generation response JSON.
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output PDF path. Defaults to a name derived from the project.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// PNG to embed as the architecture diagram.
    #[arg(long, conflicts_with = "capture")]
    diagram: Option<PathBuf>,

    /// Render the diagram from the response and embed it.
    #[arg(long)]
    capture: bool,

    /// Fail instead of falling back when fields are not in the canonical shape.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Args)]
pub struct LookupArgs {
    /// Service name, alias or free text.
    name: String,

    /// Print the record as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Natural-language description of the application.
    description: String,

    /// Preferred cloud provider.
    #[arg(long)]
    provider: Option<String>,

    /// Workspace the architecture belongs to.
    #[arg(long)]
    workspace: Option<String>,

    /// Where to write the response. Use '-' for stdout.
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: String,
}

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// JSON file with the current services array. It is updated in place.
    #[arg(short = 's', long = "services")]
    services: PathBuf,

    /// Service id to add.
    #[arg(long, conflicts_with = "remove", required_unless_present = "remove")]
    add: Option<String>,

    /// Service id to remove.
    #[arg(long)]
    remove: Option<String>,

    /// Workspace the services belong to.
    #[arg(long)]
    workspace: Option<String>,
}

#[derive(Debug, Args)]
pub struct DeployStatusArgs {
    job_id: String,

    /// Keep polling until the job completes or fails.
    #[arg(short = 'w', long)]
    watch: bool,
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    #[arg(long)]
    email: String,

    /// Password. Read from CLOUDIVERSE_PASSWORD or stdin when omitted.
    #[arg(long)]
    password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Svg,
    Png,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
        }
    }

    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "svg" => Some(OutputFormat::Svg),
            "png" => Some(OutputFormat::Png),
            _ => None,
        }
    }
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Render(args) => run_render(args),
        Command::Export(args) => run_export(args).await,
        Command::Report(args) => run_report(args),
        Command::Lookup(args) => run_lookup(args),
        Command::Generate(args) => run_generate(args).await,
        Command::Reconcile(args) => run_reconcile(args).await,
        Command::DeployStatus(args) => run_deploy_status(args).await,
        Command::Login(args) => run_login(args).await,
        Command::Logout => run_logout(),
        #[cfg(feature = "server")]
        Command::Serve(args) => run_serve(args).await,
    }
}

fn run_render(cli: RenderArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref())?;
    let output_dest = parse_output(cli.output.as_deref(), &input_source, cli.output_format)?;
    let format = determine_format(cli.output_format, &output_dest)?;

    if format == OutputFormat::Png && cli.scale <= 0.0 {
        bail!("--scale must be greater than zero for PNG output");
    }

    let source = load_source(&input_source)?;
    let architecture = ArchitectureGraph::from_json(&source).context("invalid architecture JSON")?;
    let config = LayoutConfig {
        rank_dir: cli.rank_dir,
        ..LayoutConfig::default()
    };
    let renderer = DiagramRenderer::from_architecture(&architecture, &config);

    let frame = export::export_frame(renderer.laid_out(), EXPORT_PADDING)
        .ok_or_else(|| anyhow!("architecture has no nodes to render"))?;
    let svg = renderer.render_svg(&frame.viewport, frame.width, frame.height, &cli.background_color)?;

    let output_bytes = match format {
        OutputFormat::Svg => svg.into_bytes(),
        OutputFormat::Png => export::rasterize(&svg, cli.scale)?,
    };

    write_output(output_dest, &output_bytes, cli.quiet)
}

async fn run_export(args: ExportArgs) -> Result<()> {
    let response = read_json(&args.input)?;
    let input = ReportInput::from_response(&response);
    let architecture = ArchitectureGraph::from_value(response).context("invalid architecture JSON")?;
    let renderer = DiagramRenderer::from_architecture(&architecture, &LayoutConfig::default());

    if !args.dir.is_dir() {
        bail!("output directory '{}' does not exist", args.dir.display());
    }

    let provider = args.provider.unwrap_or(input.provider);
    let pattern = args.pattern.unwrap_or(input.pattern);
    let Some(screenshot) = renderer.capture_screenshot()? else {
        println!("Nothing to export: the architecture has no nodes.");
        return Ok(());
    };
    let path = screenshot.save(&args.dir, &provider, &pattern, Local::now())?;
    println!("Exported diagram -> {}", path.display());

    if let Some(workspace) = args.upload {
        let (mut settings, client) = api_client()?;
        let result = client
            .save_diagram_snapshot(&workspace, &screenshot.to_data_url())
            .await;
        guard_session(&mut settings, result)?;
        println!("Attached diagram to workspace {workspace}.");
    }
    Ok(())
}

fn run_report(args: ReportArgs) -> Result<()> {
    let response = read_json(&args.input)?;
    let input = if args.strict {
        ReportInput::from_canonical(&response)?
    } else {
        ReportInput::from_response(&response)
    };
    for warning in &input.warnings {
        log::warn!(input:% = args.input.display(); "{warning}");
    }

    let diagram = if let Some(path) = &args.diagram {
        Some(fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?)
    } else if args.capture {
        let architecture = ArchitectureGraph::from_value(response.clone())
            .context("invalid architecture JSON")?;
        DiagramRenderer::from_architecture(&architecture, &LayoutConfig::default())
            .capture_screenshot()?
            .map(|shot| shot.png)
    } else {
        None
    };

    let pdf = build_report(&input, diagram.as_deref())?;
    let output = args.output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "cloudiverse-report-{}.pdf",
            slugify(&input.project_name, "project")
        ))
    });
    fs::write(&output, pdf).with_context(|| format!("failed to write '{}'", output.display()))?;
    println!("Generated report -> {}", output.display());
    Ok(())
}

fn run_lookup(args: LookupArgs) -> Result<()> {
    let metadata = get_service_metadata(&args.name);
    if args.json {
        let record = serde_json::json!({
            "query": args.name,
            "canonical": canonical_service_id(&args.name),
            "metadata": metadata,
        });
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let canonical = canonical_service_id(&args.name).unwrap_or("unknown");
    println!("{} ({canonical})", args.name);
    println!("\n{}\n", metadata.desc);
    println!("How it works: {}", metadata.how_it_works);
    print_list("Pros", metadata.pros);
    print_list("Cons", metadata.cons);
    print_list("Best for", metadata.best_for);
    println!("\nDocs:");
    println!("  AWS:   {}", metadata.links.aws);
    println!("  GCP:   {}", metadata.links.gcp);
    println!("  Azure: {}", metadata.links.azure);
    Ok(())
}

fn print_list(title: &str, items: &[&str]) {
    println!("\n{title}:");
    for item in items {
        println!("  - {item}");
    }
}

async fn run_generate(args: GenerateArgs) -> Result<()> {
    let (mut settings, client) = api_client()?;
    let request = ArchitectureRequest {
        description: args.description,
        provider: args.provider,
        workspace_id: args.workspace,
        ..Default::default()
    };
    let response = guard_session(&mut settings, client.generate_architecture(&request).await)?;

    let mut bytes = serde_json::to_vec_pretty(&response)?;
    bytes.push(b'\n');
    let dest = match args.output.as_str() {
        "-" => OutputDestination::Stdout,
        path => OutputDestination::File(PathBuf::from(path)),
    };
    write_output(dest, &bytes, false)
}

async fn run_reconcile(args: ReconcileArgs) -> Result<()> {
    let contents = fs::read_to_string(&args.services)
        .with_context(|| format!("failed to read '{}'", args.services.display()))?;
    let local: Vec<Service> = serde_json::from_str(&contents)
        .with_context(|| format!("'{}' is not a services array", args.services.display()))?;

    let action = match (args.add, args.remove) {
        (Some(id), None) => ReconcileAction::AddService(id),
        (None, Some(id)) => ReconcileAction::RemoveService(id),
        _ => bail!("exactly one of --add or --remove is required"),
    };

    let (mut settings, client) = api_client()?;
    let result = client
        .reconcile(args.workspace.as_deref(), &action, &local)
        .await;
    let response = guard_session(&mut settings, result)?;

    let merged = apply_reconcile(&local, &action, &response);
    fs::write(&args.services, serde_json::to_string_pretty(&merged)?)
        .with_context(|| format!("failed to write '{}'", args.services.display()))?;

    if let Some(message) = response.message {
        println!("{message}");
    }
    println!(
        "{} services -> {}",
        merged.len(),
        args.services.display()
    );
    Ok(())
}

async fn run_deploy_status(args: DeployStatusArgs) -> Result<()> {
    let (mut settings, client) = api_client()?;

    if !args.watch {
        let status = guard_session(&mut settings, client.deploy_status(&args.job_id).await)?;
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let token = CancelToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = client.wait_for_deployment(&args.job_id, &token).await;
    token.cancel();
    match guard_session(&mut settings, outcome)? {
        PollOutcome::Finished(status) => {
            println!("{}", serde_json::to_string_pretty(&status)?);
            if !status.succeeded() {
                bail!("deployment {} {}", args.job_id, status.status);
            }
            Ok(())
        }
        PollOutcome::Cancelled => {
            println!("Stopped watching deployment {}.", args.job_id);
            Ok(())
        }
    }
}

async fn run_login(args: LoginArgs) -> Result<()> {
    let password = match args.password {
        Some(password) => password,
        None => match std::env::var("CLOUDIVERSE_PASSWORD") {
            Ok(password) => password,
            Err(_) => read_password_from_stdin()?,
        },
    };

    let (mut settings, client) = api_client()?;
    let auth = client.login(&args.email, &password).await?;
    settings.set_token(auth.token);
    settings.save()?;
    println!("Logged in as {}.", args.email);
    if settings.token_from_env() {
        log::warn!("CLOUDIVERSE_TOKEN is set and takes precedence over the saved token");
    }
    Ok(())
}

fn run_logout() -> Result<()> {
    let mut settings = Settings::load()?;
    settings.clear_token();
    settings.save()?;
    println!("Logged out.");
    if settings.token_from_env() {
        log::warn!("CLOUDIVERSE_TOKEN is still set; requests keep using it");
    }
    Ok(())
}

fn read_password_from_stdin() -> Result<String> {
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("no password supplied");
    }
    Ok(password)
}

fn api_client() -> Result<(Settings, ApiClient)> {
    let settings = Settings::load()?;
    let client = ApiClient::from_settings(&settings)?;
    Ok((settings, client))
}

/// Drops the stored token when the backend rejects it.
fn guard_session<T>(settings: &mut Settings, result: Result<T, ApiError>) -> Result<T> {
    match result {
        Err(ApiError::Unauthorized(message)) => {
            // Only the file token can be cleared here.
            if settings.token.is_some() {
                settings.clear_token();
                if let Err(err) = settings.save() {
                    log::warn!(error:% = err; "failed to clear stored token");
                }
            }
            Err(anyhow!("{message}; please run `cloudiverse login` again"))
        }
        Err(err) => {
            let message = err.user_message();
            Err(anyhow::Error::new(err).context(message))
        }
        Ok(value) => Ok(value),
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("'{}' is not valid JSON", path.display()))
}

fn parse_input(input: Option<&str>) -> Result<InputSource> {
    match input {
        Some("-") | None => Ok(InputSource::Stdin),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                return Err(anyhow!("input file '{path_str}' does not exist"));
            }
            Ok(InputSource::File(path))
        }
    }
}

fn parse_output(
    output: Option<&str>,
    input: &InputSource,
    format_hint: Option<OutputFormat>,
) -> Result<OutputDestination> {
    match output {
        Some("-") => Ok(OutputDestination::Stdout),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(anyhow!(
                        "output directory '{}' does not exist",
                        parent.display()
                    ));
                }
            }
            Ok(OutputDestination::File(path))
        }
        None => {
            let ext = format_hint.unwrap_or(OutputFormat::Svg).extension();
            match input {
                InputSource::File(path) => {
                    let mut default_path = path.to_path_buf();
                    default_path.set_extension(ext);
                    Ok(OutputDestination::File(default_path))
                }
                InputSource::Stdin => Ok(OutputDestination::File(PathBuf::from(format!(
                    "architecture.{ext}"
                )))),
            }
        }
    }
}

fn determine_format(
    preference: Option<OutputFormat>,
    output: &OutputDestination,
) -> Result<OutputFormat> {
    if let Some(fmt) = preference {
        return Ok(fmt);
    }

    match output {
        OutputDestination::Stdout => Ok(OutputFormat::Svg),
        OutputDestination::File(path) => OutputFormat::from_path(path).ok_or_else(|| {
            anyhow!(
                "unable to determine output format from '{}'; please specify --output-format",
                path.display()
            )
        }),
    }
}

fn load_source(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                Err(anyhow!("no architecture supplied on stdin"))
            } else {
                Ok(buffer)
            }
        }
        InputSource::File(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            if contents.trim().is_empty() {
                Err(anyhow!("input file '{}' was empty", path.display()))
            } else {
                Ok(contents)
            }
        }
    }
}

fn write_output(dest: OutputDestination, bytes: &[u8], quiet: bool) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            if !quiet {
                println!("Generated diagram -> {}", path.display());
            }
        }
    }
    Ok(())
}
