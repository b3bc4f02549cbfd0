use std::path::Path;
use std::process::Command;

use tracing::{info, instrument, warn};

use crate::error::{Result, ToolError};
use crate::io::csv_read;
use crate::model::{DIRECTORY_SOURCE, SourceTable};

/// File the directory export helper leaves in the import directory.
pub const DIRECTORY_EXPORT_FILE: &str = "user_ad_data.csv";

/// Runs the configured export helper and waits for it to exit.
#[instrument(level = "info", skip(command), fields(program = command.first().map(String::as_str)))]
pub fn run_helper(command: &[String], working_dir: &Path) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        warn!("no directory export helper configured");
        return Ok(());
    };
    info!("launching directory export helper");
    let status = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .status()
        .map_err(|err| ToolError::Helper(format!("could not start '{program}': {err}")))?;
    if !status.success() {
        return Err(ToolError::Helper(format!("'{program}' exited with {status}")));
    }
    info!("directory export helper finished");
    Ok(())
}

/// Loads the export from `import_dir` when it exists.
pub fn load_export(import_dir: &Path) -> Result<Option<SourceTable>> {
    let path = import_dir.join(DIRECTORY_EXPORT_FILE);
    if !path.exists() {
        return Ok(None);
    }
    info!(path = %path.display(), "loading directory export");
    csv_read::read_table(&path, DIRECTORY_SOURCE).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_export_is_not_an_error() {
        let dir = tempdir().expect("temporary directory");
        assert!(load_export(dir.path()).expect("lookup ok").is_none());
    }

    #[test]
    fn export_is_registered_under_directory_source() {
        let dir = tempdir().expect("temporary directory");
        fs::write(
            dir.path().join(DIRECTORY_EXPORT_FILE),
            "User Display Name,User Department\njdoe,Engineering\n",
        )
        .expect("export written");
        let table = load_export(dir.path()).expect("export read").expect("export present");
        assert_eq!(table.name, DIRECTORY_SOURCE);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn empty_command_is_a_no_op() {
        let dir = tempdir().expect("temporary directory");
        assert!(run_helper(&[], dir.path()).is_ok());
    }
}
