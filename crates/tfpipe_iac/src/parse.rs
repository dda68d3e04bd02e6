//! Parsing of user-supplied environment variables, arguments and `.env` files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tfpipe_core::CommandLine;
use tracing::debug;

use crate::error::{IacError, IacResult};

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Parse one strict `KEY=VALUE` entry. Exactly one `=` is allowed.
pub fn parse_env_var(entry: &str) -> IacResult<(String, String)> {
    let entry = entry.trim();
    if entry.is_empty() {
        return Err(IacError::InvalidEnvVar(entry.to_string()));
    }

    let parts: Vec<&str> = entry.split('=').collect();
    match parts.as_slice() {
        [key, value] if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(IacError::InvalidEnvVar(entry.to_string())),
    }
}

pub fn parse_env_vars<S: AsRef<str>>(entries: &[S]) -> IacResult<BTreeMap<String, String>> {
    entries
        .iter()
        .map(|e| parse_env_var(e.as_ref()))
        .collect()
}

/// Parse Terraform input variables. Splits on the first `=`; blank entries
/// are skipped.
pub fn parse_tf_variables<S: AsRef<str>>(entries: &[S]) -> IacResult<BTreeMap<String, String>> {
    let mut variables = BTreeMap::new();
    for entry in entries {
        let entry = entry.as_ref().trim();
        if entry.is_empty() {
            continue;
        }
        let Some((key, value)) = entry.split_once('=') else {
            return Err(IacError::InvalidVariable(entry.to_string()));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(IacError::InvalidVariable(entry.to_string()));
        }
        variables.insert(key.to_string(), value.trim().to_string());
    }
    Ok(variables)
}

/// Split a comma-separated argument list.
///
/// Blank input yields no arguments; input made only of separators is an error.
pub fn parse_args(input: &str) -> IacResult<Vec<String>> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    let args: Vec<String> = input
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();

    if args.is_empty() {
        return Err(IacError::InvalidArgs("no valid arguments".to_string()));
    }
    Ok(args)
}

/// Build `terraform <command> <args>`. Multi-word commands such as
/// `state list` are split on whitespace.
pub fn build_terraform_command<S: AsRef<str>>(command: &str, args: &[S]) -> IacResult<CommandLine> {
    let command = command.trim();
    if command.is_empty() {
        return Err(IacError::EmptyCommand);
    }

    let tokens = command
        .split_whitespace()
        .map(str::to_string)
        .chain(
            args.iter()
                .map(|a| a.as_ref().trim())
                .filter(|a| !a.is_empty())
                .map(str::to_string),
        );
    Ok(CommandLine::terraform(tokens))
}

/// Normalise a `TF_LOG` level. Empty means `info`.
pub fn validate_log_level(level: &str) -> IacResult<String> {
    let level = level.trim().to_lowercase();
    if level.is_empty() {
        return Ok("info".to_string());
    }
    if LOG_LEVELS.contains(&level.as_str()) {
        Ok(level)
    } else {
        Err(IacError::InvalidLogLevel(level))
    }
}

/// Variables read from `.env` files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DotEnv {
    pub env: BTreeMap<String, String>,
    /// Values from files whose name contains `secret`.
    pub secrets: BTreeMap<String, String>,
}

/// Parse the content of one `.env` file.
pub fn parse_dotenv(content: &str, source: &str) -> IacResult<Vec<(String, String)>> {
    let mut entries = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(IacError::DotEnv(format!(
                "{}:{}: expected KEY=VALUE",
                source,
                number + 1
            )));
        };
        let key = key.trim().trim_start_matches("export ").trim();
        if key.is_empty() {
            return Err(IacError::DotEnv(format!("{}:{}: empty key", source, number + 1)));
        }
        entries.push((key.to_string(), strip_quotes(value.trim()).to_string()));
    }
    Ok(entries)
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Load every `*.env` file in `dir`, in name order.
pub fn load_dotenv_dir(dir: &Path) -> IacResult<DotEnv> {
    let pattern = glob::Pattern::escape(&dir.to_string_lossy()) + "/*.env";
    debug!("Looking for .env files matching {}", pattern);

    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| IacError::DotEnv(e.to_string()))?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(IacError::DotEnv(format!("no .env files found in {}", dir.display())));
    }

    let mut dotenv = DotEnv::default();
    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let content = std::fs::read_to_string(&file)?;
        let target = if name.to_lowercase().contains("secret") {
            &mut dotenv.secrets
        } else {
            &mut dotenv.env
        };
        target.extend(parse_dotenv(&content, &name)?);
        debug!("Loaded {}", name);
    }
    Ok(dotenv)
}

/// Whether `version` looks like a release identifier usable in URLs and tags.
pub fn is_valid_version(version: &str) -> bool {
    !version.is_empty()
        && version.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_env_var() {
        assert_eq!(
            parse_env_var(" TF_IN_AUTOMATION=1 ").unwrap(),
            ("TF_IN_AUTOMATION".to_string(), "1".to_string())
        );
        assert!(parse_env_var("").is_err());
        assert!(parse_env_var("NO_EQUALS").is_err());
        assert!(parse_env_var("A=b=c").is_err());
        assert!(parse_env_var("=value").is_err());
    }

    #[test]
    fn test_parse_tf_variables() {
        let vars = parse_tf_variables(&["region=eu-west-1", "", "tags=a=b"]).unwrap();
        assert_eq!(vars.get("region").map(String::as_str), Some("eu-west-1"));
        assert_eq!(vars.get("tags").map(String::as_str), Some("a=b"));
        assert_eq!(vars.len(), 2);

        assert!(parse_tf_variables(&["=oops"]).is_err());
        assert!(parse_tf_variables(&["novalue"]).is_err());
    }

    #[test]
    fn test_parse_args() {
        assert!(parse_args("  ").unwrap().is_empty());
        assert_eq!(parse_args("-upgrade, -backend=false,").unwrap(), vec!["-upgrade", "-backend=false"]);
        assert!(matches!(parse_args(", ,"), Err(IacError::InvalidArgs(_))));
    }

    #[test]
    fn test_build_terraform_command() {
        let cmd = build_terraform_command("state list", &["", "-id=x"]).unwrap();
        assert_eq!(cmd.tokens(), &["terraform", "state", "list", "-id=x"]);
        assert!(matches!(
            build_terraform_command::<&str>("  ", &[]),
            Err(IacError::EmptyCommand)
        ));
    }

    #[test]
    fn test_validate_log_level() {
        assert_eq!(validate_log_level("").unwrap(), "info");
        assert_eq!(validate_log_level("DEBUG").unwrap(), "debug");
        assert!(validate_log_level("verbose").is_err());
    }

    #[test]
    fn test_parse_dotenv() {
        let content = "# comment\n\nAWS_PROFILE=\"dev\"\nexport NAME='x y'\nPLAIN=value=with=equals\n";
        let entries = parse_dotenv(content, "app.env").unwrap();
        assert_eq!(
            entries,
            vec![
                ("AWS_PROFILE".to_string(), "dev".to_string()),
                ("NAME".to_string(), "x y".to_string()),
                ("PLAIN".to_string(), "value=with=equals".to_string()),
            ]
        );
        assert!(parse_dotenv("=value", "bad.env").is_err());
        assert!(parse_dotenv("garbage", "bad.env").is_err());
    }

    #[test]
    fn test_load_dotenv_dir_splits_secrets() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("app.env"), "REGION=eu-west-1\n").unwrap();
        fs::write(dir.path().join("secrets.env"), "DB_PASSWORD=hunter2\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "IGNORED=1\n").unwrap();

        let dotenv = load_dotenv_dir(dir.path()).unwrap();
        assert_eq!(dotenv.env.get("REGION").map(String::as_str), Some("eu-west-1"));
        assert_eq!(dotenv.secrets.get("DB_PASSWORD").map(String::as_str), Some("hunter2"));
        assert!(!dotenv.env.contains_key("IGNORED"));
    }

    #[test]
    fn test_load_dotenv_dir_requires_files() {
        let dir = tempdir().unwrap();
        assert!(matches!(load_dotenv_dir(dir.path()), Err(IacError::DotEnv(_))));
    }

    #[test]
    fn test_version_validation() {
        assert!(is_valid_version("1.12.0"));
        assert!(is_valid_version("1.13.0-beta1"));
        assert!(!is_valid_version(""));
        assert!(!is_valid_version("1.0; rm -rf /"));
    }
}
