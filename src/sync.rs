//! Run orchestration: collect sources, consolidate, summarise, write.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, instrument, warn};

use crate::config::AppConfig;
use crate::consolidate::Consolidator;
use crate::error::Result;
use crate::flatten::build_report;
use crate::io::inventory_api::{Entity, InventoryClient};
use crate::io::{directory_export, excel_write, import};
use crate::model::{ConsolidatedRecord, DIRECTORY_SOURCE, SourceSet};
use crate::summary::{
    DeptSubnetSummary, UserReverseLookup, dept_subnet_summary, user_reverse_lookup,
};

/// File name of the generated report.
pub const REPORT_FILE: &str = "Consolidated_Network_Data_by_Dept.xlsx";

/// Data collection tasks, run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Task {
    Directory,
    InventoryDevices,
    InventoryUsers,
    ImportFiles,
}

impl Task {
    pub const ALL: [Task; 4] = [
        Task::Directory,
        Task::InventoryDevices,
        Task::InventoryUsers,
        Task::ImportFiles,
    ];

    /// Display name, as used in `default_tasks_to_run`.
    pub fn display_name(self) -> &'static str {
        match self {
            Task::Directory => "Active Directory Data",
            Task::InventoryDevices => "Axonius Device Data",
            Task::InventoryUsers => "Axonius User Data",
            Task::ImportFiles => "Import Files",
        }
    }

    pub fn from_display_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|task| task.display_name().eq_ignore_ascii_case(name.trim()))
    }

    /// Tasks named in the configuration, or every task when none are named.
    /// Unknown names are logged and ignored.
    pub fn from_config(config: &AppConfig) -> Vec<Task> {
        let Some(names) = &config.script_settings.default_tasks_to_run else {
            return Self::ALL.to_vec();
        };
        let mut tasks: Vec<Task> = names
            .iter()
            .filter_map(|name| {
                let task = Self::from_display_name(name);
                if task.is_none() {
                    warn!(%name, "ignoring unknown task name");
                }
                task
            })
            .collect();
        tasks.sort();
        tasks.dedup();
        tasks
    }
}

/// Folder layout under the base directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub base: PathBuf,
}

impl Workspace {
    pub const FOLDERS: [&'static str; 4] = ["Data", "Import", "Logs", "Output"];

    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Creates the working folders when missing.
    pub fn prepare(&self) -> Result<()> {
        for folder in Self::FOLDERS {
            fs::create_dir_all(self.base.join(folder))?;
        }
        Ok(())
    }

    pub fn import_dir(&self) -> PathBuf {
        self.base.join("Import")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base.join("Logs")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.base.join("Output")
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir().join(REPORT_FILE)
    }
}

/// Runs the selected collection tasks. Each task degrades to "no data" on
/// failure.
#[instrument(level = "info", skip_all, fields(tasks = ?tasks))]
pub fn collect_sources(workspace: &Workspace, config: &AppConfig, tasks: &[Task]) -> SourceSet {
    let mut sources = SourceSet::new();
    let mut ordered = tasks.to_vec();
    ordered.sort();
    ordered.dedup();

    for task in ordered {
        info!(task = task.display_name(), "running task");
        match task {
            Task::Directory => {
                let helper = &config.ad_config.helper_command;
                if let Err(err) = directory_export::run_helper(helper, &workspace.base) {
                    error!(%err, "directory export failed");
                }
                load_directory_export(workspace, &mut sources);
            }
            Task::InventoryDevices => fetch_inventory(config, Entity::Devices, &mut sources),
            Task::InventoryUsers => fetch_inventory(config, Entity::Users, &mut sources),
            Task::ImportFiles => match import::import_directory(&workspace.import_dir()) {
                Ok(tables) => tables.into_iter().for_each(|table| sources.insert(table)),
                Err(err) => error!(%err, "failed to read import directory"),
            },
        }
    }

    if !sources.contains(DIRECTORY_SOURCE) {
        load_directory_export(workspace, &mut sources);
    }
    sources
}

fn load_directory_export(workspace: &Workspace, sources: &mut SourceSet) {
    match directory_export::load_export(&workspace.import_dir()) {
        Ok(Some(table)) => sources.insert(table),
        Ok(None) => {}
        Err(err) => error!(%err, "failed to load directory export"),
    }
}

fn fetch_inventory(config: &AppConfig, entity: Entity, sources: &mut SourceSet) {
    match InventoryClient::from_config(&config.axonius_api) {
        Ok(Some(client)) => sources.insert(client.fetch(entity)),
        Ok(None) => info!(?entity, "inventory API configuration is missing, skipping"),
        Err(err) => error!(%err, "failed to build inventory API client"),
    }
}

/// Outputs of one consolidation run.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub records: Vec<ConsolidatedRecord>,
    pub dept_summary: DeptSubnetSummary,
    pub reverse_lookup: UserReverseLookup,
}

/// Consolidates the sources and derives both summary views.
pub fn build(config: &AppConfig, sources: &SourceSet) -> Report {
    let records = Consolidator::new(config.pipeline()).consolidate(sources);
    let dept_summary = dept_subnet_summary(&records);
    let reverse_lookup = user_reverse_lookup(&records);
    Report {
        records,
        dept_summary,
        reverse_lookup,
    }
}

/// Writes the report workbook. Returns `false` when there was nothing to write.
#[instrument(level = "info", skip_all, fields(output = %output.display()))]
pub fn write_report(output: &Path, report: &Report, sources: &SourceSet) -> Result<bool> {
    let workbook = build_report(
        &report.records,
        &report.dept_summary,
        &report.reverse_lookup,
        sources.iter(),
    );
    if workbook.is_empty() {
        info!("no data was generated from any selected source, skipping report creation");
        return Ok(false);
    }
    excel_write::write_workbook(output, &workbook)?;
    info!(sheets = workbook.tables.len(), "final report created");
    Ok(true)
}

/// Full run: collect, consolidate, summarise, write.
#[instrument(level = "info", skip_all, fields(base = %workspace.base.display()))]
pub fn run(workspace: &Workspace, config: &AppConfig, tasks: &[Task]) -> Result<Option<PathBuf>> {
    if tasks.is_empty() {
        info!("no tasks selected, exiting");
        return Ok(None);
    }
    let names: Vec<&str> = tasks.iter().map(|t| t.display_name()).collect();
    info!(tasks = %names.join(", "), "selected tasks");

    let sources = collect_sources(workspace, config, tasks);
    if sources.is_empty() {
        info!("no data collected from any selected task, exiting");
        return Ok(None);
    }
    info!("all data collection tasks complete");

    let report = build(config, &sources);
    let output = workspace.report_path();
    if write_report(&output, &report, &sources)? {
        Ok(Some(output))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_names_resolve_from_config() {
        let config = AppConfig::from_json(
            r#"{"script_settings": {"default_tasks_to_run": ["Import Files", "active directory data", "Bogus", "Import Files"]}}"#,
        )
        .expect("config parsed");
        assert_eq!(Task::from_config(&config), vec![Task::Directory, Task::ImportFiles]);
    }

    #[test]
    fn all_tasks_when_unconfigured() {
        let config = AppConfig::default();
        assert_eq!(Task::from_config(&config), Task::ALL.to_vec());
    }
}
