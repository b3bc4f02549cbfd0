use std::path::PathBuf;

use asset_mapper::logging::{self, LogFiles};
use asset_mapper::sync::{self, Task, Workspace};
use asset_mapper::{AppConfig, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let workspace = Workspace::new(&cli.base_dir);
    workspace.prepare()?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    logging::init(&LogFiles::in_dir(&workspace.logs_dir(), &timestamp))?;
    info!("script start");

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| workspace.base.join("config.json"));
    let config = AppConfig::load(&config_path)?;

    let tasks = if cli.task.is_empty() {
        info!("no tasks on the command line, running default tasks from configuration");
        Task::from_config(&config)
    } else {
        cli.task.iter().copied().map(Task::from).collect()
    };

    if let Some(report) = sync::run(&workspace, &config, &tasks)? {
        info!(path = %report.display(), "report written");
    }
    info!("script end");
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Consolidate network asset data into a per-IP report by department."
)]
struct Cli {
    /// Base directory holding config.json and the Data, Import, Logs and
    /// Output folders.
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Configuration file path. Defaults to `<base-dir>/config.json`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Collection task to run. Repeat to run several.
    #[arg(long, value_enum)]
    task: Vec<TaskArg>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TaskArg {
    Directory,
    InventoryDevices,
    InventoryUsers,
    ImportFiles,
}

impl From<TaskArg> for Task {
    fn from(arg: TaskArg) -> Self {
        match arg {
            TaskArg::Directory => Task::Directory,
            TaskArg::InventoryDevices => Task::InventoryDevices,
            TaskArg::InventoryUsers => Task::InventoryUsers,
            TaskArg::ImportFiles => Task::ImportFiles,
        }
    }
}
