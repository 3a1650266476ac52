use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use flexi_logger::{Duplicate, FileSpec, Logger};
use log::{error, info, warn};

use justice::{
  compile, default_format, parse_env, AnomalyReporter, CompileRequest, Container, ContainerId,
  ExecutionRequest, JusticeExit, LogReporter, ResourceGroupManager, ResourceLimits, Result,
  SentryReporter, Stage, Supervisor, Verdict, VerdictCodes,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
  #[arg(long, env = "JUSTICE_SENTRY_DSN", help = "Sentry DSN receiving anomalies")]
  sentry_dsn: Option<String>,

  #[arg(long, default_value = "justice=info", help = "Log specification")]
  log: String,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  #[command(about = "Compile user code under a deadline")]
  Compile {
    #[arg(long, help = "Compiler, defaults to the language preset")]
    compiler: Option<String>,

    #[arg(long, default_value = "/tmp", help = "Directory holding the source file")]
    basedir: PathBuf,

    #[arg(long, default_value = "Main.cpp", help = "Source file name")]
    filename: String,

    #[arg(long, default_value_t = 10000, help = "Time limit (unit: ms)")]
    timeout: u64,

    #[arg(long = "std", help = "Language standard, defaults to the language preset")]
    standard: Option<String>,

    #[arg(long = "static", default_value_t = false, help = "Link statically")]
    link_static: bool,

    #[arg(short, long, help = "Language, detected from the file extension otherwise")]
    language: Option<String>,
  },

  #[command(about = "Run user program in a container")]
  Run {
    #[arg(long, help = "Unique name of this container")]
    container_id: String,

    #[arg(long, help = "Directory that becomes the container's root")]
    rootfs: Option<PathBuf>,

    #[arg(short, long, default_value_t = 256, help = "Memory limit (unit: MB)")]
    memory: u64,

    #[arg(long, default_value_t = 2, help = "Max number of tasks")]
    processes: u64,

    #[arg(long, default_value_t = 2000, help = "CPU quota per 100 ms period (unit: us)")]
    cpu_quota: u64,

    #[arg(short, long, default_value_t = 1000, help = "Time limit (unit: ms)")]
    timeout: u64,

    #[arg(long, help = "Redirect stdin from this file")]
    stdin: Option<PathBuf>,

    #[arg(long, help = "Working directory, inside the new root when --rootfs is set")]
    cwd: Option<PathBuf>,

    #[arg(short, long = "env", help = "Pass environment variables (KEY=VALUE or KEY)")]
    envs: Vec<String>,

    #[arg(long, help = "JSON file overriding the verdict status codes")]
    verdict_codes: Option<PathBuf>,

    #[arg(help = "Program")]
    program: String,

    #[arg(help = "Arguments", trailing_var_arg = true, allow_hyphen_values = true)]
    arguments: Vec<String>,
  },

  #[command(about = "Remove the resource groups of a container")]
  Release {
    #[arg(long, help = "Unique name of the container")]
    container_id: String,
  },
}

fn reporter(dsn: &Option<String>) -> Arc<dyn AnomalyReporter> {
  match dsn {
    Some(dsn) => match SentryReporter::new(dsn) {
      Ok(reporter) => Arc::new(reporter),
      Err(err) => {
        warn!("Fall back to log reporter: {}", err);
        Arc::new(LogReporter)
      }
    },
    None => Arc::new(LogReporter),
  }
}

fn run_compile(supervisor: &Supervisor, command: Commands) -> Result<()> {
  if let Commands::Compile {
    compiler,
    basedir,
    filename,
    timeout,
    standard,
    link_static,
    language,
  } = command
  {
    let mut request = CompileRequest::new(basedir, filename)
      .timeout_ms(timeout)
      .link_static(link_static);
    if let Some(compiler) = compiler {
      request = request.compiler(compiler);
    }
    if let Some(standard) = standard {
      request = request.standard(standard);
    }
    if let Some(language) = language {
      request = request.language(language);
    }

    let report = compile(supervisor, &request)?;
    report.emit()?;
  }
  Ok(())
}

fn run_container(supervisor: &Supervisor, command: Commands) -> Result<()> {
  if let Commands::Run {
    container_id,
    rootfs,
    memory,
    processes,
    cpu_quota,
    timeout,
    stdin,
    cwd,
    envs,
    verdict_codes,
    program,
    arguments,
  } = command
  {
    let codes = match verdict_codes {
      Some(path) => VerdictCodes::load(path)?,
      None => VerdictCodes::default(),
    };
    let limits = ResourceLimits::new(memory)
      .cpu_quota(cpu_quota)
      .max_processes(processes);
    limits.validate()?;

    let groups = ResourceGroupManager::detect()?;
    let id = ContainerId::new(container_id)?;

    let cwd = match (cwd, &rootfs) {
      (Some(cwd), _) => cwd,
      (None, Some(_)) => PathBuf::from("/"),
      (None, None) => env::current_dir()?,
    };
    let mut request = ExecutionRequest::new(program, arguments)
      .label(id.as_str())
      .stage(Stage::Run)
      .cwd(cwd)
      .timeout_ms(timeout)
      .set_stdin(stdin)
      .limits(limits);
    for text in envs {
      let (key, value) = parse_env(text)?;
      request = request.env(key, value);
    }

    let mut container = Container::new(id, limits, &groups);
    if let Some(rootfs) = rootfs {
      container = container.root(rootfs);
    }

    let result = supervisor.run_with(&request, &container);
    let usage = container.usage();
    info!("Container {} usage: {:?}", container.id(), usage);
    let released = container.release_owned();
    if let Err(err) = &released {
      error!("Release container {} fails: {}", container.id(), err);
    }

    Verdict::new(&result, &usage, &codes).report();
    // leaked groups fail the command after the verdict is out
    released?;
  }
  Ok(())
}

fn run_release(command: Commands) -> Result<()> {
  if let Commands::Release { container_id } = command {
    let groups = ResourceGroupManager::detect()?;
    let id = ContainerId::new(container_id)?;
    groups.release_limits(&id)?;
    info!("Container {} released", id);
  }
  Ok(())
}

fn start(cli: Cli) -> Result<()> {
  let _logger = Logger::try_with_str(&cli.log)?
    .log_to_file(
      FileSpec::default()
        .directory(env::var("LOG_DIR").unwrap_or("./logs/".into()))
        .basename("justice")
        .discriminant(format!("{}", chrono::offset::Local::now().format("%Y-%m-%d")))
        .suppress_timestamp(),
    )
    .append()
    .duplicate_to_stderr(Duplicate::Error)
    .format_for_files(default_format)
    .start()?;

  info!("Start running justice");

  let reporter = reporter(&cli.sentry_dsn);
  let supervisor = Supervisor::new(reporter.clone());

  let result = match cli.command {
    command @ Commands::Compile { .. } => run_compile(&supervisor, command),
    command @ Commands::Run { .. } => run_container(&supervisor, command),
    command @ Commands::Release { .. } => run_release(command),
  };

  reporter.flush();
  info!("Running justice finished");

  result
}

fn main() -> JusticeExit {
  let cli = Cli::parse();
  start(cli).into()
}
