use crate::error::{PipelineError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where a consumer stage delivers its records
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OutputTarget {
    /// `file://<path>`, created or truncated on open
    File(PathBuf),
    /// `pipe://<fd>`, an inherited file descriptor
    Pipe(i32),
    /// `tcp://<host>:<port>`
    Tcp { host: String, port: u16 },
}

impl OutputTarget {
    /// Schemes a target may use; each names the consumer stage serving it
    pub const SCHEMES: [&'static str; 3] = ["file", "pipe", "tcp"];

    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = |why: &str| PipelineError::configuration(format!("invalid output '{uri}': {why}"));

        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| invalid("expected <scheme>://<address>"))?;

        match scheme {
            "file" => {
                if rest.is_empty() {
                    return Err(invalid("missing path"));
                }
                Ok(OutputTarget::File(PathBuf::from(rest)))
            }
            "pipe" => {
                let fd = rest
                    .parse::<i32>()
                    .ok()
                    .filter(|fd| *fd >= 0)
                    .ok_or_else(|| invalid("descriptor must be a non-negative integer"))?;
                Ok(OutputTarget::Pipe(fd))
            }
            "tcp" => {
                let (host, port) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| invalid("expected host:port"))?;
                if host.is_empty() {
                    return Err(invalid("missing host"));
                }
                let port = port
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p > 0)
                    .ok_or_else(|| invalid("bad port"))?;
                Ok(OutputTarget::Tcp {
                    host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
                    port,
                })
            }
            other => Err(invalid(&format!("unknown scheme '{other}'"))),
        }
    }

    /// Name of the consumer stage serving this target
    pub fn scheme(&self) -> &'static str {
        match self {
            OutputTarget::File(_) => "file",
            OutputTarget::Pipe(_) => "pipe",
            OutputTarget::Tcp { .. } => "tcp",
        }
    }

    /// Identity under which streams share the underlying sink
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl FromStr for OutputTarget {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::File(path) => write!(f, "file://{}", path.display()),
            OutputTarget::Pipe(fd) => write!(f, "pipe://{fd}"),
            OutputTarget::Tcp { host, port } if host.contains(':') => {
                write!(f, "tcp://[{host}]:{port}")
            }
            OutputTarget::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}
