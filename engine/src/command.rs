use serde::{Deserialize, Serialize};
use std::{env, fmt, os::unix::fs::MetadataExt, path::Path, path::PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("command is empty")]
    Empty,
    #[error("unterminated quote in command: {0}")]
    UnterminatedQuote(String),
}

/// An external program plus its fixed arguments, owned as the raw string it
/// was configured with and the token vector it was split into.
///
/// Splitting follows shell-like rules: tokens are separated by unquoted
/// whitespace, single and double quotes group characters and are stripped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Command {
    raw: String,
    tokens: Vec<String>,
}

impl Command {
    pub fn new(raw: &str) -> Result<Self, CommandError> {
        let tokens = split_tokens(raw)?;

        if tokens.is_empty() {
            return Err(CommandError::Empty);
        }

        Ok(Self {
            raw: raw.to_string(),
            tokens,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The program name, i.e. the first token.
    pub fn program(&self) -> &str {
        &self.tokens[0]
    }

    /// The fixed arguments following the program name.
    pub fn args(&self) -> &[String] {
        &self.tokens[1..]
    }

    /// Whether the program resolves to an executable file, either directly or
    /// through `$PATH` for bare program names.
    pub fn is_executable(&self) -> bool {
        let program = Path::new(self.program());

        if self.program().contains('/') {
            is_executable_file(program)
        } else {
            resolve_in_path(self.program()).is_some()
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for Command {
    type Error = CommandError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Command::new(&raw)
    }
}

impl From<Command> for String {
    fn from(command: Command) -> Self {
        command.raw
    }
}

// check if a file exists and carries an executable mode bit
fn is_executable_file(path: &Path) -> bool {
    match path.metadata() {
        Ok(metadata) => metadata.is_file() && (metadata.mode() & 0o111) != 0,
        Err(_) => false,
    }
}

fn resolve_in_path(program: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;

    env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable_file(candidate))
}

fn split_tokens(raw: &str) -> Result<Vec<String>, CommandError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in raw.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }

    if quote.is_some() {
        return Err(CommandError::UnterminatedQuote(raw.to_string()));
    }

    if in_token {
        tokens.push(current);
    }

    Ok(tokens)
}
