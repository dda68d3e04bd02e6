//! Host-side checks of a Terraform source tree.

use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{FileCategory, IacError, IacResult};

pub const MODULE_FILES: [&str; 5] = ["main.tf", "variables.tf", "outputs.tf", "locals.tf", "versions.tf"];
pub const DOC_FILES: [&str; 2] = ["README.md", ".terraform-docs.yml"];
pub const TOOLING_FILES: [&str; 1] = [".tflint.hcl"];

/// Files that mark a directory as a Terraform module.
const MODULE_MARKERS: [&str; 3] = ["main.tf", "variables.tf", "outputs.tf"];

fn check_category(dir: &Path, category: FileCategory, required: &[String]) -> IacResult<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|f| !dir.join(f.as_str()).is_file())
        .cloned()
        .collect();

    if missing.is_empty() {
        debug!("All {} files present in {}", category, dir.display());
        Ok(())
    } else {
        Err(IacError::MissingFiles {
            category,
            missing,
            required: required.to_vec(),
        })
    }
}

fn owned(files: &[&str]) -> Vec<String> {
    files.iter().map(|f| f.to_string()).collect()
}

/// Check that `dir` carries the mandatory module, documentation and tooling
/// files, then `extras`. Reports the first category with missing files.
pub fn verify_files(dir: &Path, extras: &[String]) -> IacResult<()> {
    info!("Verifying mandatory files in {}", dir.display());
    ensure_directory(dir)?;

    check_category(dir, FileCategory::Module, &owned(&MODULE_FILES))?;
    check_category(dir, FileCategory::Docs, &owned(&DOC_FILES))?;
    check_category(dir, FileCategory::Tooling, &owned(&TOOLING_FILES))?;

    let extras: Vec<String> = extras
        .iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();
    if !extras.is_empty() {
        check_category(dir, FileCategory::Extra, &extras)?;
    }
    Ok(())
}

fn ensure_directory(dir: &Path) -> IacResult<()> {
    if !dir.is_dir() {
        return Err(IacError::InvalidSourceDir {
            path: dir.display().to_string(),
            reason: "not a directory".to_string(),
        });
    }
    Ok(())
}

/// Check that `dir` exists, is not empty and contains Terraform sources.
pub fn validate_source_dir(dir: &Path) -> IacResult<()> {
    ensure_directory(dir)?;

    if std::fs::read_dir(dir)?.next().is_none() {
        return Err(IacError::InvalidSourceDir {
            path: dir.display().to_string(),
            reason: "directory is empty".to_string(),
        });
    }

    let has_terraform = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".terraform" && e.file_name() != ".git")
        .filter_map(Result::ok)
        .any(|e| e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "tf"));

    if !has_terraform {
        return Err(IacError::InvalidSourceDir {
            path: dir.display().to_string(),
            reason: "no Terraform files found".to_string(),
        });
    }
    Ok(())
}

/// Whether `dir` holds a module: one of the marker files or `extras`.
pub fn is_module_dir(dir: &Path, extras: &[String]) -> bool {
    MODULE_MARKERS
        .iter()
        .map(|m| m.to_string())
        .chain(extras.iter().cloned())
        .filter(|f| f.ends_with(".tf"))
        .any(|f| dir.join(f).is_file())
}
