//! Lifecycle hooks for model instances.
//!
//! Hooks mutate the instance synchronously and return a boxed future for
//! any follow-up work, so synchronous, async, and callback-style hooks all
//! normalize to one stored shape.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::instance::Instance;

/// A stored lifecycle hook.
///
/// The hook receives the instance mutably before the future is created;
/// any mutation it needs must happen in that synchronous phase.
pub type HookFn = Arc<dyn Fn(&mut Instance) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Hook sets for one model, invoked in registration order.
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) pre_save: Vec<HookFn>,
    pub(crate) post_save: Vec<HookFn>,
    pub(crate) pre_remove: Vec<HookFn>,
    pub(crate) post_remove: Vec<HookFn>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("pre_save", &self.pre_save.len())
            .field("post_save", &self.post_save.len())
            .field("pre_remove", &self.pre_remove.len())
            .field("post_remove", &self.post_remove.len())
            .finish()
    }
}

impl Hooks {
    pub(crate) async fn run(&self, which: HookPoint, instance: &mut Instance) -> Result<()> {
        let hooks = match which {
            HookPoint::PreSave => &self.pre_save,
            HookPoint::PostSave => &self.post_save,
            HookPoint::PreRemove => &self.pre_remove,
            HookPoint::PostRemove => &self.post_remove,
        };
        for hook in hooks {
            hook(instance).await?;
        }
        Ok(())
    }
}

/// Which lifecycle point a hook set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookPoint {
    PreSave,
    PostSave,
    PreRemove,
    PostRemove,
}

/// Wraps a plain closure as a stored hook.
pub fn hook<F>(f: F) -> HookFn
where
    F: Fn(&mut Instance) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps a synchronous closure as a stored hook.
pub fn sync_hook<F>(f: F) -> HookFn
where
    F: Fn(&mut Instance) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(move |instance: &mut Instance| -> BoxFuture<'static, Result<()>> {
        let outcome = f(instance);
        Box::pin(async move { outcome })
    })
}
