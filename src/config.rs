//! Child process start configuration.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::Result;

/// Text encoding used to decode captured output bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// UTF-8, the default. Decoding fails on invalid sequences.
    #[default]
    Utf8,
    /// ISO-8859-1. Every byte maps to a character, so decoding
    /// cannot fail.
    Latin1,
}

impl TextEncoding {
    /// Decode captured bytes to text.
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            TextEncoding::Utf8 => {
                String::from_utf8(bytes.to_vec()).map_err(crate::Error::OutputDecode)
            }
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

/// How to launch a child process: the program, its arguments, an optional
/// working directory, and the encoding its output should be decoded with.
///
/// # Example
///
/// ```ignore
/// use childrpc::StartInfo;
///
/// let info = StartInfo::new("sort")
///     .arg("-r")
///     .current_dir("/tmp");
/// let result = childrpc::process::run(&info).await?;
/// ```
#[derive(Debug, Clone)]
pub struct StartInfo {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    encoding: TextEncoding,
}

impl StartInfo {
    /// Start building a launch configuration for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            encoding: TextEncoding::default(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the child.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Override the output text encoding (default UTF-8).
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// The program this configuration launches.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The configured output encoding.
    pub fn output_encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Build a command with all three standard streams piped.
    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_args() {
        let info = StartInfo::new("prog").arg("-a").args(["b", "c"]);
        assert_eq!(info.program(), "prog");
        assert_eq!(info.args, vec!["-a", "b", "c"]);
    }

    #[test]
    fn utf8_decode_rejects_invalid_bytes() {
        let err = TextEncoding::Utf8.decode(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, crate::Error::OutputDecode(_)));
    }

    #[test]
    fn latin1_decode_accepts_any_bytes() {
        let text = TextEncoding::Latin1.decode(&[0x68, 0x69, 0xe9]).unwrap();
        assert_eq!(text, "hié");
    }

    #[test]
    fn default_encoding_is_utf8() {
        assert_eq!(StartInfo::new("x").output_encoding(), TextEncoding::Utf8);
    }
}
