use std::rc::Rc;

use kiln_config::{check_host_api, ShellConfig};

use crate::clock::FrameClock;
use crate::context::Context;
use crate::disposer::Disposer;
use crate::error::ShellError;
use crate::plugin::Plugin;
use crate::scheduler::RefreshScheduler;

/// Version of the plugin-facing API, matched against [`Plugin::host_api`].
pub const HOST_API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lifecycle state of a [`Shell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    Running,
    Disposed,
}

/// Owns the shared [`Context`] and the lifecycle of registered plugins.
///
/// Construction builds the services and starts the frame clock. Plugins are
/// added one at a time with [`use_plugin`](Shell::use_plugin); teardown runs
/// their disposers oldest-first, so a plugin may rely on earlier plugins
/// still being live while it cleans up, but not on later ones.
pub struct Shell<S> {
    context: Context<S>,
    disposers: Vec<(String, Disposer)>,
    plugins: Vec<String>,
    state: ShellState,
}

impl<S> Shell<S> {
    pub fn new(surface: S, scheduler: Rc<dyn RefreshScheduler>) -> Self {
        Self::with_config(surface, scheduler, &ShellConfig::default())
    }

    pub fn with_config(
        surface: S,
        scheduler: Rc<dyn RefreshScheduler>,
        config: &ShellConfig,
    ) -> Self {
        let clock = FrameClock::with_config(scheduler, &config.clock);
        let context = Context::new(surface, clock);
        context.clock().start();
        tracing::info!(host_api = HOST_API_VERSION, "shell started");

        Self {
            context,
            disposers: Vec::new(),
            plugins: Vec::new(),
            state: ShellState::Running,
        }
    }

    pub fn context(&self) -> &Context<S> {
        &self.context
    }

    pub fn state(&self) -> ShellState {
        self.state
    }

    /// Names of successfully initialised plugins, in registration order.
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(String::as_str).collect()
    }

    /// Initialise `plugin` against the shared context.
    ///
    /// Fails without calling `init` if the shell is disposed or the plugin's
    /// host API requirement rejects [`HOST_API_VERSION`]. A disposer returned
    /// by `init` is kept until [`dispose`](Shell::dispose).
    pub fn use_plugin(&mut self, mut plugin: impl Plugin<S>) -> Result<(), ShellError> {
        let name = plugin.name().to_string();

        if self.state == ShellState::Disposed {
            tracing::error!(plugin = %name, "plugin registered on a disposed shell");
            return Err(ShellError::Disposed { plugin: name });
        }

        if let Some(requirement) = plugin.host_api() {
            if let Err(err) = check_host_api(requirement, HOST_API_VERSION) {
                return Err(ShellError::Incompatible {
                    plugin: name,
                    reason: format!("{err:#}"),
                });
            }
        }

        let disposer = plugin
            .init(&self.context)
            .map_err(|err| ShellError::PluginInit {
                plugin: name.clone(),
                reason: format!("{err:#}"),
            })?;

        tracing::info!(
            plugin = %name,
            has_disposer = disposer.is_some(),
            "plugin initialized"
        );
        if let Some(disposer) = disposer {
            self.disposers.push((name.clone(), disposer));
        }
        self.plugins.push(name);
        Ok(())
    }

    /// Run every pending disposer in registration order, then stop the clock.
    ///
    /// Only the first call has any effect. A panicking disposer is not
    /// caught: disposers registered after it never run, but the clock is
    /// still stopped while the panic unwinds.
    pub fn dispose(&mut self) {
        if self.state == ShellState::Disposed {
            return;
        }
        self.state = ShellState::Disposed;

        let _stop = StopClock(self.context.clock().clone());
        let disposers = std::mem::take(&mut self.disposers);
        tracing::info!(disposers = disposers.len(), "shell disposing");
        for (plugin, mut disposer) in disposers {
            tracing::debug!(plugin = %plugin, "running plugin disposer");
            disposer.dispose();
        }
    }
}

struct StopClock(Rc<FrameClock>);

impl Drop for StopClock {
    fn drop(&mut self) {
        self.0.stop();
    }
}

impl<S> Drop for Shell<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}
