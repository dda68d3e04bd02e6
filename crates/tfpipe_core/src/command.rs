//! Command line type.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A program and its arguments.
///
/// Always holds at least one token. Rendered shell-quoted for logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CommandLine {
    tokens: Vec<String>,
}

impl CommandLine {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tokens = vec![program.into()];
        tokens.extend(args.into_iter().map(Into::into));
        Self { tokens }
    }

    /// Build from a token list; the first token is the program.
    pub fn from_tokens<I, S>(tokens: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        if tokens.is_empty() || tokens[0].trim().is_empty() {
            return Err(CoreError::EmptyCommand);
        }
        Ok(Self { tokens })
    }

    /// `terraform <args>`.
    pub fn terraform<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("terraform", args)
    }

    pub fn program(&self) -> &str {
        &self.tokens[0]
    }

    pub fn args(&self) -> &[String] {
        &self.tokens[1..]
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Shell-quoted rendering, safe to paste into `sh -c`.
    pub fn to_shell(&self) -> String {
        shell_words::join(&self.tokens)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell())
    }
}

impl TryFrom<Vec<String>> for CommandLine {
    type Error = CoreError;

    fn try_from(tokens: Vec<String>) -> CoreResult<Self> {
        Self::from_tokens(tokens)
    }
}

impl From<CommandLine> for Vec<String> {
    fn from(command: CommandLine) -> Self {
        command.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_and_args() {
        let cmd = CommandLine::terraform(["init", "-backend=false"]);
        assert_eq!(cmd.program(), "terraform");
        assert_eq!(cmd.args(), &["init".to_string(), "-backend=false".to_string()]);
        assert_eq!(cmd.tokens().len(), 3);
    }

    #[test]
    fn test_empty_tokens_rejected() {
        let empty: Vec<String> = Vec::new();
        assert!(matches!(
            CommandLine::from_tokens(empty),
            Err(CoreError::EmptyCommand)
        ));
        assert!(CommandLine::from_tokens(["  "]).is_err());
    }

    #[test]
    fn test_shell_rendering_quotes_spaces() {
        let cmd = CommandLine::new("sh", ["-c", "echo hello world"]);
        assert_eq!(cmd.to_string(), "sh -c 'echo hello world'");
    }

    #[test]
    fn test_deserialize_rejects_empty() {
        let ok: CommandLine = serde_json::from_str(r#"["terraform","validate"]"#).unwrap();
        assert_eq!(ok, CommandLine::terraform(["validate"]));
        assert!(serde_json::from_str::<CommandLine>("[]").is_err());
    }
}
