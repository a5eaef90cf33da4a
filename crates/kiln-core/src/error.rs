/// Shell lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellError {
    /// A plugin was registered after the shell was disposed.
    Disposed { plugin: String },
    /// The plugin's host API requirement does not accept this shell.
    Incompatible { plugin: String, reason: String },
    /// The plugin's `init` returned an error.
    PluginInit { plugin: String, reason: String },
}

impl std::fmt::Display for ShellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disposed { plugin } => {
                write!(f, "cannot register plugin {plugin}: shell is disposed")
            }
            Self::Incompatible { plugin, reason } => {
                write!(f, "plugin {plugin} is incompatible: {reason}")
            }
            Self::PluginInit { plugin, reason } => {
                write!(f, "plugin {plugin} failed to initialize: {reason}")
            }
        }
    }
}

impl std::error::Error for ShellError {}
