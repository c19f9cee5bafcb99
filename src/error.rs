use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum NodeboxError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("virtualization extensions not found in {path}")]
    #[diagnostic(help("enable VT-x (vmx) or AMD-V (svm) in the firmware settings"))]
    VirtualizationUnsupported { path: String },

    #[error("firewalld is not running")]
    #[diagnostic(help("start it with `sudo systemctl enable --now firewalld`"))]
    FirewallInactive,

    #[error("firewalld reports no active zone")]
    #[diagnostic(help("check `firewall-cmd --get-active-zones`"))]
    NoActiveZone,

    #[error("invalid disk image {path}: {message}")]
    InvalidImage { path: String, message: String },

    #[error("`{command}` failed{}", exit_suffix(.code))]
    #[diagnostic(help("{stderr}"))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to run `{command}`")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!(" with exit code {c}"),
        None => " (terminated by signal)".into(),
    }
}

impl NodeboxError {
    /// Process exit code for this error.
    ///
    /// A failing external command hands its own code through, everything
    /// else (preconditions, config, I/O) exits with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            NodeboxError::CommandFailed {
                code: Some(c @ 1..=255),
                ..
            } => *c as u8,
            _ => 1,
        }
    }
}
