//! Trait-based callback definitions for hooks and permission deciders.
//!
//! Users can implement these traits on their own types, or wrap closures
//! with [`FnHookCallback`] / [`FnPermissionCallback`]. All callbacks run on
//! their own tasks so a slow handler never stalls the inbound frame router.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{HookContext, HookInput, HookOutput, PermissionContext, PermissionRequest, PermissionResult};

// ============================================================================
// Hook Callback
// ============================================================================

/// Callback invoked at a named lifecycle point of the Agent.
///
/// # Example
///
/// ```no_run
/// use agent_sdk::callbacks::HookCallback;
/// use agent_sdk::types::{HookContext, HookInput, HookOutput};
/// use agent_sdk::Result;
/// use async_trait::async_trait;
///
/// struct BlockDangerousCommands;
///
/// #[async_trait]
/// impl HookCallback for BlockDangerousCommands {
///     async fn call(&self, input: HookInput, _context: HookContext) -> Result<HookOutput> {
///         if input.tool_name.as_deref() == Some("Bash") {
///             return Ok(HookOutput::block("no shell access"));
///         }
///         Ok(HookOutput::proceed())
///     }
/// }
/// ```
#[async_trait]
pub trait HookCallback: Send + Sync {
    /// Called when the Agent reports a matching hook event.
    ///
    /// Returning an error is equivalent to returning
    /// `HookOutput::block(error.to_string())`.
    async fn call(&self, input: HookInput, context: HookContext) -> Result<HookOutput>;
}

#[async_trait]
impl<T: HookCallback + ?Sized> HookCallback for Arc<T> {
    async fn call(&self, input: HookInput, context: HookContext) -> Result<HookOutput> {
        (**self).call(input, context).await
    }
}

/// Shared, reference-counted hook callback.
pub type SharedHookCallback = Arc<dyn HookCallback>;

// ============================================================================
// Permission Callback
// ============================================================================

/// Decider invoked when the Agent asks whether a tool may be used.
///
/// # Example
///
/// ```no_run
/// use agent_sdk::callbacks::PermissionCallback;
/// use agent_sdk::types::{PermissionContext, PermissionRequest, PermissionResult};
/// use agent_sdk::Result;
/// use async_trait::async_trait;
///
/// struct ReadOnly;
///
/// #[async_trait]
/// impl PermissionCallback for ReadOnly {
///     async fn call(
///         &self,
///         request: PermissionRequest,
///         _context: PermissionContext,
///     ) -> Result<PermissionResult> {
///         match request.tool_name.as_str() {
///             "Read" | "Glob" | "Grep" => Ok(PermissionResult::allow()),
///             other => Ok(PermissionResult::deny(format!("{other} not allowed"))),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait PermissionCallback: Send + Sync {
    /// Called for each `can_use_tool` request from the Agent.
    async fn call(
        &self,
        request: PermissionRequest,
        context: PermissionContext,
    ) -> Result<PermissionResult>;
}

#[async_trait]
impl<T: PermissionCallback + ?Sized> PermissionCallback for Arc<T> {
    async fn call(
        &self,
        request: PermissionRequest,
        context: PermissionContext,
    ) -> Result<PermissionResult> {
        (**self).call(request, context).await
    }
}

/// Shared, reference-counted permission callback.
pub type SharedPermissionCallback = Arc<dyn PermissionCallback>;

// ============================================================================
// Closure wrappers
// ============================================================================

type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Adapter turning a closure into a [`HookCallback`].
pub struct FnHookCallback<F>
where
    F: Fn(HookInput, HookContext) -> BoxFuture<Result<HookOutput>> + Send + Sync,
{
    func: F,
}

impl<F> FnHookCallback<F>
where
    F: Fn(HookInput, HookContext) -> BoxFuture<Result<HookOutput>> + Send + Sync,
{
    /// Create a new function-based hook callback.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> HookCallback for FnHookCallback<F>
where
    F: Fn(HookInput, HookContext) -> BoxFuture<Result<HookOutput>> + Send + Sync,
{
    async fn call(&self, input: HookInput, context: HookContext) -> Result<HookOutput> {
        (self.func)(input, context).await
    }
}

/// Wrap an async closure as a shared [`HookCallback`].
///
/// ```no_run
/// use agent_sdk::types::HookOutput;
///
/// let hook = agent_sdk::callbacks::hook_fn(|input, _ctx| async move {
///     println!("tool: {:?}", input.tool_name);
///     Ok(HookOutput::proceed())
/// });
/// ```
pub fn hook_fn<F, Fut>(f: F) -> SharedHookCallback
where
    F: Fn(HookInput, HookContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<HookOutput>> + Send + 'static,
{
    Arc::new(FnHookCallback::new(move |input, context| {
        Box::pin(f(input, context)) as BoxFuture<Result<HookOutput>>
    }))
}

/// Adapter turning a closure into a [`PermissionCallback`].
pub struct FnPermissionCallback<F>
where
    F: Fn(PermissionRequest, PermissionContext) -> BoxFuture<Result<PermissionResult>>
        + Send
        + Sync,
{
    func: F,
}

impl<F> FnPermissionCallback<F>
where
    F: Fn(PermissionRequest, PermissionContext) -> BoxFuture<Result<PermissionResult>>
        + Send
        + Sync,
{
    /// Create a new function-based permission callback.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> PermissionCallback for FnPermissionCallback<F>
where
    F: Fn(PermissionRequest, PermissionContext) -> BoxFuture<Result<PermissionResult>>
        + Send
        + Sync,
{
    async fn call(
        &self,
        request: PermissionRequest,
        context: PermissionContext,
    ) -> Result<PermissionResult> {
        (self.func)(request, context).await
    }
}

/// Wrap an async closure as a shared [`PermissionCallback`].
pub fn permission_fn<F, Fut>(f: F) -> SharedPermissionCallback
where
    F: Fn(PermissionRequest, PermissionContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<PermissionResult>> + Send + 'static,
{
    Arc::new(FnPermissionCallback::new(move |request, context| {
        Box::pin(f(request, context)) as BoxFuture<Result<PermissionResult>>
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HookEvent;

    struct PassThrough;

    #[async_trait]
    impl HookCallback for PassThrough {
        async fn call(&self, _input: HookInput, _context: HookContext) -> Result<HookOutput> {
            Ok(HookOutput::proceed())
        }
    }

    #[tokio::test]
    async fn hook_trait_object() {
        let cb: SharedHookCallback = Arc::new(PassThrough);
        let out = cb
            .call(HookInput::for_event(HookEvent::PreToolUse), HookContext::default())
            .await
            .unwrap();
        assert!(out.is_continue());
    }

    #[tokio::test]
    async fn hook_closure_wrapper() {
        let cb = hook_fn(|input, _ctx| async move {
            assert_eq!(input.event, HookEvent::PostToolUse);
            Ok(HookOutput::block("nope"))
        });
        let out = cb
            .call(HookInput::for_event(HookEvent::PostToolUse), HookContext::default())
            .await
            .unwrap();
        assert!(!out.is_continue());
    }

    #[tokio::test]
    async fn permission_closure_wrapper() {
        let cb = permission_fn(|request, _ctx| async move {
            if request.tool_name == "Write" {
                Ok(PermissionResult::deny("read-only"))
            } else {
                Ok(PermissionResult::allow())
            }
        });
        let req = PermissionRequest {
            tool_name: "Write".into(),
            input: serde_json::json!({}),
            suggestions: Vec::new(),
            blocked_path: None,
        };
        let result = cb.call(req, PermissionContext::default()).await.unwrap();
        assert!(matches!(result, PermissionResult::Deny { .. }));
    }
}
