use std::fmt;
use std::marker::PhantomData;

use anyhow::Result;

use crate::context::Context;
use crate::disposer::Disposer;

/// A pluggable unit of behaviour.
///
/// Plugins are the extension point of the shell. Each one has a
/// human-readable [`name`](Plugin::name) and an [`init`](Plugin::init) that
/// is called exactly once when the plugin is registered with
/// [`Shell::use_plugin`](crate::shell::Shell::use_plugin). During `init` a
/// plugin may publish services in the registry, subscribe to topics and
/// register tick callbacks; anything that needs explicit teardown goes into
/// the returned [`Disposer`].
///
/// Plugins that do not touch the surface can implement `Plugin<S>` for
/// every `S`.
pub trait Plugin<S> {
    fn name(&self) -> &str;

    /// Semver requirement on [`HOST_API_VERSION`](crate::shell::HOST_API_VERSION),
    /// checked before `init` runs. `None` accepts any host.
    fn host_api(&self) -> Option<&str> {
        None
    }

    fn init(&mut self, ctx: &Context<S>) -> Result<Option<Disposer>>;
}

/// A plugin built from a name and an init closure.
pub struct FnPlugin<S, F> {
    name: String,
    init: F,
    _surface: PhantomData<fn(&S)>,
}

impl<S, F> FnPlugin<S, F>
where
    F: FnMut(&Context<S>) -> Result<Option<Disposer>>,
{
    pub fn new(name: impl Into<String>, init: F) -> Self {
        Self {
            name: name.into(),
            init,
            _surface: PhantomData,
        }
    }
}

impl<S, F> Plugin<S> for FnPlugin<S, F>
where
    F: FnMut(&Context<S>) -> Result<Option<Disposer>>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, ctx: &Context<S>) -> Result<Option<Disposer>> {
        (self.init)(ctx)
    }
}

impl<S, F> fmt::Debug for FnPlugin<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPlugin").field("name", &self.name).finish()
    }
}
